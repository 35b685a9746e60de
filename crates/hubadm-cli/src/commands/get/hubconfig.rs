//! `hubadm get hubconfig`
//!
//! Escalates trust with the hub from a bootstrap token, then stores the
//! verified kubeconfig in the agent namespace of the local cluster.

use std::fmt;
use std::path::PathBuf;

use clap::Args;
use hubadm_bootstrap::provision::{SecretProvisioner, BOOTSTRAP_KUBECONFIG_SECRET};
use hubadm_bootstrap::retry::{retry_transient, RetryConfig};
use hubadm_bootstrap::trust::{CaResolver, EscalationRequest, TrustEscalator};
use tracing::info;

use crate::commands::{print_line, write_output_file, GlobalArgs};
use crate::{Error, Result};

/// Flags of `get hubconfig`
#[derive(Args)]
pub struct HubconfigArgs {
    /// Bootstrap token generated on the hub
    #[arg(long)]
    pub hub_token: String,

    /// External hub API server URL (https://<host>:<port>)
    #[arg(long)]
    pub hub_apiserver: String,

    /// File holding the hub CA
    #[arg(long, conflicts_with = "ca_data_enc")]
    pub ca_file: Option<PathBuf>,

    /// Base64-encoded hub CA
    #[arg(long)]
    pub ca_data_enc: Option<String>,

    /// Also write the bootstrap kubeconfig to this file
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Use the hub's in-cluster endpoint from its public cluster-info
    #[arg(long)]
    pub force_internal_endpoint_lookup: bool,

    /// Namespace the agent runs in
    #[arg(long)]
    pub agent_namespace: String,

    /// Name of the bootstrap kubeconfig Secret
    #[arg(long, default_value = BOOTSTRAP_KUBECONFIG_SECRET)]
    pub secret_name: String,

    /// Attempts for transient failures while storing the Secret
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
}

impl fmt::Debug for HubconfigArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubconfigArgs")
            .field("hub_token", &"<redacted>")
            .field("hub_apiserver", &self.hub_apiserver)
            .field("ca_file", &self.ca_file)
            .field("ca_data_enc", &self.ca_data_enc)
            .field("output_file", &self.output_file)
            .field("force_internal_endpoint_lookup", &self.force_internal_endpoint_lookup)
            .field("agent_namespace", &self.agent_namespace)
            .field("secret_name", &self.secret_name)
            .field("retries", &self.retries)
            .finish()
    }
}

impl HubconfigArgs {
    /// Check every flag and build the escalation request; no network access
    pub fn validate(&self) -> Result<EscalationRequest> {
        if self.agent_namespace.trim().is_empty() {
            return Err(Error::validation("--agent-namespace is required"));
        }
        if self.secret_name.trim().is_empty() {
            return Err(Error::validation("--secret-name must not be empty"));
        }

        let request = EscalationRequest {
            token: self.hub_token.clone(),
            external_endpoint: self.hub_apiserver.clone(),
            ca: CaResolver::new(self.ca_file.clone(), self.ca_data_enc.clone()),
            internal_endpoint_lookup: self.force_internal_endpoint_lookup,
        };
        request.validate()?;
        Ok(request)
    }
}

pub(crate) async fn run(global: &GlobalArgs, args: HubconfigArgs) -> Result<()> {
    let request = args.validate()?;
    info!(
        hub = %args.hub_apiserver,
        namespace = %args.agent_namespace,
        dry_run = global.dry_run,
        "bootstrapping hub trust"
    );

    let escalator = TrustEscalator::new(request)?;
    let descriptor = escalator.escalate_over_network(global.timeouts()).await?;
    let kubeconfig = SecretProvisioner::render(&descriptor)?;

    let client = global.local_client().await?;
    let provisioner = SecretProvisioner::new(global.engine(client));
    let retry = RetryConfig::with_max_attempts(args.retries);
    let outcome = retry_transient(&retry, "provision", || {
        provisioner.provision(&args.agent_namespace, &args.secret_name, &descriptor)
    })
    .await?;

    print_line(format_args!(
        "{} Secret {}/{}",
        outcome.action, args.agent_namespace, args.secret_name
    ))?;
    if global.dry_run {
        print_line(&kubeconfig)?;
    }

    if let Some(path) = &args.output_file {
        write_output_file(path, &kubeconfig)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::commands::get::GetResource;
    use crate::{Cli, Commands};

    fn parse(extra: &[&str]) -> std::result::Result<Cli, clap::Error> {
        let mut argv = vec![
            "hubadm",
            "get",
            "hubconfig",
            "--hub-token",
            "tkn-1",
            "--hub-apiserver",
            "https://hub.example:6443",
            "--agent-namespace",
            "open-cluster-management-agent",
        ];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv)
    }

    fn hubconfig_args(cli: Cli) -> HubconfigArgs {
        match cli.command {
            Commands::Get(get) => match get.resource {
                GetResource::Hubconfig(args) => args,
                other => panic!("unexpected resource {:?}", other),
            },
        }
    }

    #[test]
    fn test_parse_defaults() {
        let args = hubconfig_args(parse(&[]).unwrap());
        assert_eq!(args.hub_token, "tkn-1");
        assert_eq!(args.secret_name, BOOTSTRAP_KUBECONFIG_SECRET);
        assert_eq!(args.retries, 3);
        assert!(!args.force_internal_endpoint_lookup);
        assert!(args.ca_file.is_none());

        let request = args.validate().unwrap();
        assert!(!request.internal_endpoint_lookup);
        assert!(!request.ca.is_explicit());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["--dry-run", "--request-timeout", "10"]).unwrap();
        assert!(cli.global.dry_run);
        assert_eq!(cli.global.request_timeout, Some(10));
    }

    #[test]
    fn test_ca_flags_conflict() {
        let err = parse(&["--ca-file", "/tmp/ca.crt", "--ca-data-enc", "Q0FGRUJBQkU="])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_token_is_required() {
        let err = Cli::try_parse_from([
            "hubadm",
            "get",
            "hubconfig",
            "--hub-apiserver",
            "https://hub.example:6443",
            "--agent-namespace",
            "agent",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_validation_rejects_non_url_server() {
        let cli = Cli::try_parse_from([
            "hubadm",
            "get",
            "hubconfig",
            "--hub-token",
            "tkn-1",
            "--hub-apiserver",
            "hub.example:6443",
            "--agent-namespace",
            "agent",
        ])
        .unwrap();
        let err = hubconfig_args(cli).validate().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("hub.example:6443"));
    }

    #[test]
    fn test_validation_rejects_blank_values() {
        let mut args = hubconfig_args(parse(&[]).unwrap());
        args.agent_namespace = " ".to_string();
        assert!(args.validate().unwrap_err().is_validation());

        let mut args = hubconfig_args(parse(&[]).unwrap());
        args.hub_token = String::new();
        assert!(args.validate().unwrap_err().is_validation());
    }

    #[test]
    fn test_debug_redacts_token() {
        let args = hubconfig_args(parse(&[]).unwrap());
        let debug = format!("{:?}", args);
        assert!(!debug.contains("tkn-1"));
        assert!(debug.contains("https://hub.example:6443"));

        let cli = format!("{:?}", parse(&[]).unwrap());
        assert!(!cli.contains("tkn-1"));
    }

    /// Story: invalid flags fail before any client is built
    #[tokio::test]
    async fn story_validation_happens_before_network() {
        let mut args = hubconfig_args(parse(&[]).unwrap());
        args.hub_apiserver = "ftp://hub.example".to_string();
        let global = GlobalArgs {
            kubeconfig: Some(PathBuf::from("/nonexistent/kubeconfig")),
            ..Default::default()
        };

        let err = run(&global, args).await.unwrap_err();
        assert!(err.is_validation());
    }
}
