//! ClusterClaim custom resource
//!
//! A cluster-scoped key/value claim about the local cluster, read by the hub.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single claim published by a managed cluster.
///
/// Example:
/// ```yaml
/// apiVersion: cluster.open-cluster-management.io/v1alpha1
/// kind: ClusterClaim
/// metadata:
///   name: clusterinfo.hubadm.io
/// spec:
///   value: |
///     clusterMetadata:
///       uid: 0a1b...
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1alpha1",
    kind = "ClusterClaim",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClaimSpec {
    /// Claim value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_cluster_claim_is_cluster_scoped() {
        assert_eq!(
            ClusterClaim::api_version(&()),
            "cluster.open-cluster-management.io/v1alpha1"
        );
        assert_eq!(ClusterClaim::kind(&()), "ClusterClaim");
        assert_eq!(ClusterClaim::plural(&()), "clusterclaims");

        let claim = ClusterClaim::new("id.k8s.io", ClusterClaimSpec::default());
        assert_eq!(claim.meta().namespace, None);
    }
}
