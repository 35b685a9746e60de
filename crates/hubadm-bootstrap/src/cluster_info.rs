//! Cluster metadata snapshots
//!
//! Collects the local cluster's identity into a [`ClusterMetadata`] snapshot and
//! persists it into a ConfigMap and/or a [`ClusterClaim`] through the same
//! reconcile engine the bootstrap flow uses.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::api::ListParams;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

use crate::crd::ClusterClaim;
use crate::provision::ensure_namespace;
use crate::reconcile::{Mutation, ReconcileEngine, ReconcileOutcome, ReconcileTarget};
use crate::store::{ApiErrorKind, ObjectRef};
use crate::{Error, Result};

/// ConfigMap data key holding the snapshot
pub const CLUSTER_INFO_DATA_KEY: &str = "clusterinfo.yaml";
/// Namespace whose UID identifies the cluster
pub const CLUSTER_UID_NAMESPACE: &str = "kube-system";

/// Manager namespaces and the manager each one indicates
const MANAGER_NAMESPACES: &[(&str, &str)] = &[
    ("open-cluster-management-hub", "OCMHub"),
    ("open-cluster-management-agent", "OCMSpoke"),
    ("openshift-config", "OpenShift"),
    ("cattle-system", "Rancher"),
];

const CAPI_CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";
const CAPI_CLUSTER_NAMESPACE_LABEL: &str = "cluster.x-k8s.io/cluster-namespace";
const CAPI_PROVIDER_LABEL: &str = "cluster.x-k8s.io/provider";

/// Cluster API provenance of the cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapiInfo {
    /// Infrastructure provider (e.g., "aws")
    pub provider: String,
    /// Namespace of the CAPI Cluster object on the management cluster
    pub namespace: String,
    /// Name of the CAPI Cluster object
    pub cluster_name: String,
}

/// Identity snapshot of a cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub cluster_managers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capi: Option<CapiInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<'a> {
    cluster_metadata: &'a ClusterMetadata,
}

impl ClusterMetadata {
    /// Render as `clusterMetadata: {...}` YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&Snapshot {
            cluster_metadata: self,
        })
        .map_err(|e| {
            Error::internal_with_context("cluster-info", format!("failed to serialize: {}", e))
        })
    }
}

/// Reads identity facts from a cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterIdentity: Send + Sync {
    /// Stable cluster UID
    async fn uid(&self) -> Result<String>;

    /// Names of the managers operating the cluster
    async fn cluster_managers(&self) -> Result<Vec<String>>;

    /// CAPI provenance, if the cluster was provisioned by Cluster API
    async fn capi_info(&self) -> Result<Option<CapiInfo>>;
}

/// Collect a snapshot of the cluster named `name`
pub async fn collect(identity: &dyn ClusterIdentity, name: &str) -> Result<ClusterMetadata> {
    if name.trim().is_empty() {
        return Err(Error::validation_for_field(
            "cluster-name",
            "cluster name is required",
        ));
    }
    Ok(ClusterMetadata {
        uid: identity.uid().await?,
        name: name.to_string(),
        cluster_managers: identity.cluster_managers().await?,
        capi: identity.capi_info().await?,
    })
}

/// [`ClusterIdentity`] over the Kubernetes API
pub struct KubeClusterIdentity {
    client: Client,
}

impl KubeClusterIdentity {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn uid_namespace(&self) -> Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get(CLUSTER_UID_NAMESPACE).await.map_err(|e| {
            let target = ObjectRef::of::<Namespace>(None, CLUSTER_UID_NAMESPACE);
            ApiErrorKind::classify(&e).into_error("get", &target, &e)
        })
    }
}

#[async_trait]
impl ClusterIdentity for KubeClusterIdentity {
    async fn uid(&self) -> Result<String> {
        self.uid_namespace().await?.metadata.uid.ok_or_else(|| {
            Error::internal_with_context("cluster-info", "kube-system namespace has no uid")
        })
    }

    async fn cluster_managers(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = api.list(&ListParams::default()).await.map_err(|e| {
            let target = ObjectRef::of::<Namespace>(None, "");
            ApiErrorKind::classify(&e).into_error("list", &target, &e)
        })?;
        let names: BTreeSet<String> = namespaces
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect();
        Ok(managers_from_namespaces(&names))
    }

    async fn capi_info(&self) -> Result<Option<CapiInfo>> {
        let labels = self.uid_namespace().await?.metadata.labels.unwrap_or_default();
        Ok(capi_from_labels(&labels))
    }
}

fn managers_from_namespaces(names: &BTreeSet<String>) -> Vec<String> {
    MANAGER_NAMESPACES
        .iter()
        .filter(|(ns, _)| names.contains(*ns))
        .map(|(_, manager)| manager.to_string())
        .collect()
}

fn capi_from_labels(labels: &BTreeMap<String, String>) -> Option<CapiInfo> {
    let cluster_name = labels.get(CAPI_CLUSTER_NAME_LABEL)?;
    Some(CapiInfo {
        provider: labels.get(CAPI_PROVIDER_LABEL).cloned().unwrap_or_default(),
        namespace: labels
            .get(CAPI_CLUSTER_NAMESPACE_LABEL)
            .cloned()
            .unwrap_or_default(),
        cluster_name: cluster_name.clone(),
    })
}

/// Split a `namespace/name` key
pub fn split_namespaced_key(key: &str) -> Result<(String, String)> {
    match key.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((ns.to_string(), name.to_string()))
        }
        _ => Err(Error::validation_for_field(
            "store-in-configmap",
            format!("expected <namespace>/<name>, got {:?}", key),
        )),
    }
}

/// Reconcile the snapshot into ConfigMap `namespace/name`
///
/// Only the `clusterinfo.yaml` key is written. With `create_namespace` the
/// namespace is ensured first.
#[instrument(skip(engine, snapshot_yaml))]
pub async fn store_in_configmap(
    engine: &ReconcileEngine,
    key: &str,
    create_namespace: bool,
    snapshot_yaml: &str,
) -> Result<ReconcileOutcome<ConfigMap>> {
    let (namespace, name) = split_namespaced_key(key)?;
    if create_namespace {
        let ns = ensure_namespace(engine, &namespace, BTreeMap::new()).await?;
        debug!(action = %ns.action, "namespace ensured");
    }

    let payload = snapshot_yaml.to_string();
    let mutate = Mutation::new(move |mut cm: ConfigMap| {
        cm.data
            .get_or_insert_with(BTreeMap::new)
            .insert(CLUSTER_INFO_DATA_KEY.to_string(), payload.clone());
        cm
    });
    engine
        .reconcile(&ReconcileTarget::namespaced(namespace, name, mutate))
        .await
}

/// Reconcile the snapshot into the cluster-scoped ClusterClaim `name`
#[instrument(skip(engine, snapshot_yaml))]
pub async fn store_in_cluster_claim(
    engine: &ReconcileEngine,
    name: &str,
    snapshot_yaml: &str,
) -> Result<ReconcileOutcome<ClusterClaim>> {
    if name.trim().is_empty() {
        return Err(Error::validation_for_field(
            "store-in-clusterclaim",
            "cluster claim name is required",
        ));
    }

    let payload = snapshot_yaml.to_string();
    let mutate = Mutation::new(move |mut claim: ClusterClaim| {
        claim.spec.value = payload.clone();
        claim
    });
    engine
        .reconcile(&ReconcileTarget::cluster_scoped(name, mutate))
        .await
}
