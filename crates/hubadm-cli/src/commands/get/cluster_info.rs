//! `hubadm get cluster-info`

use clap::Args;
use hubadm_bootstrap::cluster_info::{
    collect, split_namespaced_key, store_in_cluster_claim, store_in_configmap,
    KubeClusterIdentity,
};
use hubadm_bootstrap::retry::{retry_transient, RetryConfig};

use crate::commands::{print_line, GlobalArgs};
use crate::{Error, Result};

/// Flags of `get cluster-info`
#[derive(Args, Debug)]
pub struct ClusterInfoArgs {
    /// Name of this cluster
    #[arg(long)]
    pub cluster_name: String,

    /// Store the snapshot in ConfigMap <namespace>/<name>
    #[arg(long, value_name = "NAMESPACE/NAME")]
    pub store_in_configmap: Option<String>,

    /// Create the ConfigMap's namespace if missing
    #[arg(long, requires = "store_in_configmap")]
    pub create_namespace: bool,

    /// Store the snapshot in this ClusterClaim
    #[arg(long, value_name = "NAME")]
    pub store_in_clusterclaim: Option<String>,
}

impl ClusterInfoArgs {
    /// Check every flag; no network access
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.trim().is_empty() {
            return Err(Error::validation("--cluster-name is required"));
        }
        if let Some(key) = &self.store_in_configmap {
            split_namespaced_key(key)?;
        }
        if matches!(&self.store_in_clusterclaim, Some(name) if name.trim().is_empty()) {
            return Err(Error::validation("--store-in-clusterclaim must not be empty"));
        }
        Ok(())
    }
}

pub(crate) async fn run(global: &GlobalArgs, args: ClusterInfoArgs) -> Result<()> {
    args.validate()?;

    let client = global.local_client().await?;
    let metadata = collect(&KubeClusterIdentity::new(client.clone()), &args.cluster_name).await?;
    let snapshot = metadata.to_yaml()?;
    print_line(&snapshot)?;

    let engine = global.engine(client);
    let retry = RetryConfig::default();

    if let Some(key) = &args.store_in_configmap {
        let outcome = retry_transient(&retry, "store-in-configmap", || {
            store_in_configmap(&engine, key, args.create_namespace, &snapshot)
        })
        .await?;
        print_line(format_args!("{} ConfigMap {}", outcome.action, key))?;
    }

    if let Some(name) = &args.store_in_clusterclaim {
        let outcome = retry_transient(&retry, "store-in-clusterclaim", || {
            store_in_cluster_claim(&engine, name, &snapshot)
        })
        .await?;
        print_line(format_args!("{} ClusterClaim {}", outcome.action, name))?;
    }
    Ok(())
}
