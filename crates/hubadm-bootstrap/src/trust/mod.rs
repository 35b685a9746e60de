//! Two-phase trust escalation against the hub
//!
//! Phase 1 opens an unverified, token-authenticated connection. It is only
//! used to read the public `kube-public/cluster-info` object, which yields the
//! hub CA and its in-cluster endpoint. Phase 2 is the CA-pinned descriptor
//! that may be persisted.

mod ca;
mod escalator;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::kubeconfig::KubeconfigDoc;
use crate::{Error, Result};

pub use ca::CaResolver;
pub use escalator::{EscalationRequest, TrustEscalator};

/// Namespace of the public discovery object
pub const CLUSTER_INFO_NAMESPACE: &str = "kube-public";
/// Name of the public discovery object
pub const CLUSTER_INFO_NAME: &str = "cluster-info";
/// Data key holding the discovery kubeconfig
pub const CLUSTER_INFO_KUBECONFIG_KEY: &str = "kubeconfig";

/// Trust material published by the hub
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    /// In-cluster API endpoint, if published
    pub server: Option<String>,
    /// CA bytes; empty when none is published
    pub ca_data: Vec<u8>,
}

/// Source of the hub's public cluster-info
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterInfoSource: Send + Sync {
    /// Fetch cluster-info; `Ok(None)` when the hub publishes none
    async fn cluster_info(&self) -> Result<Option<ClusterInfo>>;
}

/// [`ClusterInfoSource`] reading `kube-public/cluster-info` from the hub
pub struct KubeClusterInfoSource {
    client: Client,
}

impl KubeClusterInfoSource {
    /// Read cluster-info through the given (phase 1) client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterInfoSource for KubeClusterInfoSource {
    async fn cluster_info(&self) -> Result<Option<ClusterInfo>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), CLUSTER_INFO_NAMESPACE);
        let cm = api.get_opt(CLUSTER_INFO_NAME).await.map_err(|e| {
            Error::trust_discovery(format!(
                "failed to read {}/{}: {}",
                CLUSTER_INFO_NAMESPACE, CLUSTER_INFO_NAME, e
            ))
        })?;

        match cm {
            Some(cm) => parse_cluster_info(&cm).map(Some),
            None => {
                debug!("hub publishes no cluster-info");
                Ok(None)
            }
        }
    }
}

/// Extract trust material from a cluster-info ConfigMap
///
/// The object must carry a kubeconfig with at least one cluster entry.
pub fn parse_cluster_info(cm: &ConfigMap) -> Result<ClusterInfo> {
    let kubeconfig = cm
        .data
        .as_ref()
        .and_then(|d| d.get(CLUSTER_INFO_KUBECONFIG_KEY))
        .ok_or_else(|| {
            Error::trust_discovery(format!(
                "{}/{} has no {} key",
                CLUSTER_INFO_NAMESPACE, CLUSTER_INFO_NAME, CLUSTER_INFO_KUBECONFIG_KEY
            ))
        })?;

    let doc = KubeconfigDoc::parse(kubeconfig)
        .map_err(|e| Error::trust_discovery(format!("malformed cluster-info: {}", e)))?;
    let cluster = doc
        .first_cluster()
        .ok_or_else(|| Error::trust_discovery("cluster-info kubeconfig has no clusters"))?;

    let ca_data = cluster.ca_bytes().map_err(|e| {
        Error::trust_discovery(format!("cluster-info carries an unreadable CA: {}", e))
    })?;
    let server = Some(cluster.server.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(ClusterInfo { server, ca_data })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn cluster_info_cm(kubeconfig: Option<&str>) -> ConfigMap {
        ConfigMap {
            data: kubeconfig.map(|k| {
                BTreeMap::from([(CLUSTER_INFO_KUBECONFIG_KEY.to_string(), k.to_string())])
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_server_and_ca() {
        let cm = cluster_info_cm(Some(
            "apiVersion: v1\nkind: Config\nclusters:\n- name: \"\"\n  cluster:\n    server: https://10.0.0.1:6443\n    certificate-authority-data: Q0FGRUJBQkU=\n",
        ));
        let info = parse_cluster_info(&cm).unwrap();
        assert_eq!(info.server.as_deref(), Some("https://10.0.0.1:6443"));
        assert_eq!(info.ca_data, b"CAFEBABE");
    }

    #[test]
    fn test_parse_without_ca_or_server() {
        let cm = cluster_info_cm(Some("clusters:\n- name: hub\n  cluster: {}\n"));
        let info = parse_cluster_info(&cm).unwrap();
        assert_eq!(info, ClusterInfo::default());
    }

    #[test]
    fn test_missing_kubeconfig_key_is_discovery_error() {
        let err = parse_cluster_info(&cluster_info_cm(None)).unwrap_err();
        assert!(matches!(err, Error::TrustDiscovery { .. }));
    }

    #[test]
    fn test_no_clusters_is_discovery_error() {
        let cm = cluster_info_cm(Some("apiVersion: v1\nkind: Config\nclusters: []\n"));
        let err = parse_cluster_info(&cm).unwrap_err();
        assert!(matches!(err, Error::TrustDiscovery { .. }));
        assert!(err.to_string().contains("no clusters"));
    }

    #[test]
    fn test_garbage_kubeconfig_is_discovery_error() {
        let err = parse_cluster_info(&cluster_info_cm(Some("clusters: ["))).unwrap_err();
        assert!(matches!(err, Error::TrustDiscovery { .. }));
    }
}
