//! CLI commands

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use hubadm_bootstrap::client::{local_client, ClientTimeouts};
use hubadm_bootstrap::reconcile::ReconcileEngine;
use hubadm_bootstrap::store::{KubeObjectStore, WriteOptions};
use kube::Client;
use tracing::debug;

use crate::Result;

pub mod get;

/// Flags shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to kubeconfig file for the local cluster (default: $KUBECONFIG or ~/.kube/config)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use for the local cluster
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Compute and print results without writing to any cluster
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Connect and read timeout in seconds for every API request
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub request_timeout: Option<u64>,
}

impl GlobalArgs {
    /// Client deadlines from `--request-timeout`
    pub fn timeouts(&self) -> ClientTimeouts {
        match self.request_timeout {
            Some(secs) => ClientTimeouts {
                connect: Duration::from_secs(secs),
                read: Duration::from_secs(secs),
            },
            None => ClientTimeouts::default(),
        }
    }

    /// Write options from `--dry-run`
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions::dry_run(self.dry_run)
    }

    /// Client for the local cluster
    pub async fn local_client(&self) -> Result<Client> {
        let client = local_client(
            self.kubeconfig.as_deref(),
            self.context.as_deref(),
            self.timeouts(),
        )
        .await?;
        Ok(client)
    }

    /// Reconcile engine writing to the local cluster
    pub fn engine(&self, client: Client) -> ReconcileEngine {
        ReconcileEngine::new(Arc::new(KubeObjectStore::new(client)), self.write_options())
    }
}

/// Print a line of command output to stdout
pub fn print_line(line: impl std::fmt::Display) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", line)?;
    Ok(())
}

/// Write `content` to `path`, creating it or truncating existing content
pub fn write_output_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| hubadm_bootstrap::Error::io(path, e))?;
    debug!(path = %path.display(), "wrote output file");
    Ok(())
}
