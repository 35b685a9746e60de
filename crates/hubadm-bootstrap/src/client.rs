//! Kubernetes client construction
//!
//! Every core call receives its connection handle explicitly; nothing here
//! caches a client across invocations.

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::{Error, Result};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request deadlines applied to every client built by this crate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientTimeouts {
    /// TCP/TLS connect timeout
    pub connect: Duration,
    /// Response read timeout
    pub read: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ClientTimeouts {
    /// Use the same read deadline for every request, keeping the default connect timeout
    pub fn with_read_timeout(read: Duration) -> Self {
        Self {
            read,
            ..Default::default()
        }
    }
}

/// Build a client from an already-parsed kubeconfig
pub async fn client_from_kubeconfig(
    kubeconfig: Kubeconfig,
    options: &KubeConfigOptions,
    timeouts: ClientTimeouts,
) -> Result<Client> {
    let config = Config::from_custom_kubeconfig(kubeconfig, options)
        .await
        .map_err(|e| {
            Error::internal_with_context("client", format!("failed to load kubeconfig: {}", e))
        })?;
    client_from_config(config, timeouts)
}

/// Build a client from kubeconfig YAML text
pub async fn client_from_kubeconfig_yaml(yaml: &str, timeouts: ClientTimeouts) -> Result<Client> {
    let kubeconfig: Kubeconfig = serde_yaml::from_str(yaml).map_err(|e| {
        Error::internal_with_context("client", format!("invalid kubeconfig YAML: {}", e))
    })?;
    client_from_kubeconfig(kubeconfig, &KubeConfigOptions::default(), timeouts).await
}

/// Build a client for the local cluster
///
/// Uses the kubeconfig at `path` when given, otherwise the standard inference
/// chain (`KUBECONFIG`, `~/.kube/config`, in-cluster). `context` selects a
/// non-default context.
pub async fn local_client(
    path: Option<&Path>,
    context: Option<&str>,
    timeouts: ClientTimeouts,
) -> Result<Client> {
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };

    match path {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::validation_for_field(
                    "kubeconfig",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            client_from_kubeconfig(kubeconfig, &options, timeouts).await
        }
        None if context.is_some() => {
            let config = Config::from_kubeconfig(&options).await.map_err(|e| {
                Error::internal_with_context("client", format!("failed to load kubeconfig: {}", e))
            })?;
            client_from_config(config, timeouts)
        }
        None => {
            let config = Config::infer().await.map_err(|e| {
                Error::internal_with_context("client", format!("failed to infer config: {}", e))
            })?;
            client_from_config(config, timeouts)
        }
    }
}

fn client_from_config(mut config: Config, timeouts: ClientTimeouts) -> Result<Client> {
    config.connect_timeout = Some(timeouts.connect);
    config.read_timeout = Some(timeouts.read);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("client", format!("failed to create client: {}", e))
    })
}
