//! Durable storage of the bootstrap kubeconfig
//!
//! [`SecretProvisioner::provision`] ensures the agent namespace, renders the
//! verified descriptor and reconciles it into a single data key of a Secret.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::ByteString;
use tracing::{info, instrument};

use crate::descriptor::{ConnectionDescriptor, Verified};
use crate::reconcile::{
    CreateRacePolicy, Mutation, ReconcileEngine, ReconcileOutcome, ReconcileTarget,
};
use crate::{Error, Result};

/// Default name of the bootstrap kubeconfig Secret
pub const BOOTSTRAP_KUBECONFIG_SECRET: &str = "bootstrap-hub-kubeconfig";
/// Secret data key holding the rendered kubeconfig
pub const KUBECONFIG_KEY: &str = "kubeconfig";
/// Annotation placed on namespaces created for the agent
pub const MANAGEMENT_WORKLOAD_ANNOTATION: &str = "workload.openshift.io/allowed";
/// Value of [`MANAGEMENT_WORKLOAD_ANNOTATION`]
pub const MANAGEMENT_WORKLOAD_VALUE: &str = "management";

/// Ensure a namespace exists (idempotent)
///
/// `annotations` are only applied when the namespace is created; an existing
/// namespace is left exactly as it is. Losing the create race to a concurrent
/// creator counts as success.
pub async fn ensure_namespace(
    engine: &ReconcileEngine,
    name: &str,
    annotations: BTreeMap<String, String>,
) -> Result<ReconcileOutcome<Namespace>> {
    if name.trim().is_empty() {
        return Err(Error::validation_for_field(
            "namespace",
            "namespace name is required",
        ));
    }

    let mutate = Mutation::new(move |mut ns: Namespace| {
        if ns.metadata.resource_version.is_none() && !annotations.is_empty() {
            ns.metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .extend(annotations.clone());
        }
        ns
    });
    let target = ReconcileTarget::cluster_scoped(name, mutate)
        .with_race_policy(CreateRacePolicy::TreatAsSuccess);
    engine.reconcile(&target).await
}

/// Annotations applied to a freshly created agent namespace
pub fn agent_namespace_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([(
        MANAGEMENT_WORKLOAD_ANNOTATION.to_string(),
        MANAGEMENT_WORKLOAD_VALUE.to_string(),
    )])
}

/// Persists a verified descriptor as a Secret
pub struct SecretProvisioner {
    engine: ReconcileEngine,
}

impl SecretProvisioner {
    /// Provision through the given engine
    pub fn new(engine: ReconcileEngine) -> Self {
        Self { engine }
    }

    /// Render the descriptor as the Secret payload
    ///
    /// Only verified descriptors are accepted, so the payload never skips
    /// TLS verification.
    pub fn render(descriptor: &ConnectionDescriptor<Verified>) -> Result<String> {
        descriptor.render()
    }

    /// Ensure `namespace` and reconcile `secret_name` to hold the descriptor
    ///
    /// Only the `kubeconfig` data key is written; other keys, labels and
    /// annotations on the Secret are preserved.
    #[instrument(skip_all, fields(namespace = %namespace, secret = %secret_name))]
    pub async fn provision(
        &self,
        namespace: &str,
        secret_name: &str,
        descriptor: &ConnectionDescriptor<Verified>,
    ) -> Result<ReconcileOutcome<Secret>> {
        if secret_name.trim().is_empty() {
            return Err(Error::validation_for_field(
                "secret-name",
                "secret name is required",
            ));
        }

        let ns = ensure_namespace(&self.engine, namespace, agent_namespace_annotations()).await?;
        info!(action = %ns.action, "agent namespace ensured");

        let payload = ByteString(Self::render(descriptor)?.into_bytes());
        let mutate = Mutation::new(move |mut secret: Secret| {
            secret
                .data
                .get_or_insert_with(BTreeMap::new)
                .insert(KUBECONFIG_KEY.to_string(), payload.clone());
            secret
        });

        let outcome = self
            .engine
            .reconcile(&ReconcileTarget::namespaced(namespace, secret_name, mutate))
            .await?;
        info!(action = %outcome.action, "bootstrap kubeconfig provisioned");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::reconcile::ReconcileAction;
    use crate::store::memory::{MemoryStore, Write};
    use crate::store::{ObjectRef, WriteOptions};

    fn descriptor(ca: &[u8]) -> ConnectionDescriptor<Verified> {
        ConnectionDescriptor::bootstrap("https://hub.example:6443", "tkn-1")
            .verify("https://hub.example:6443".to_string(), ca.to_vec())
    }

    fn provisioner(store: Arc<MemoryStore>) -> SecretProvisioner {
        SecretProvisioner::new(ReconcileEngine::new(store, WriteOptions::default()))
    }

    fn secret_ref() -> ObjectRef {
        ObjectRef::of::<Secret>(Some("ns1"), "bootstrap-kubeconfig")
    }

    /// Story: provisioning the same descriptor twice writes nothing the second time
    #[tokio::test]
    async fn story_second_provision_is_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let provisioner = provisioner(store.clone());
        let desc = descriptor(b"CAFEBABE");

        let first = provisioner
            .provision("ns1", "bootstrap-kubeconfig", &desc)
            .await
            .unwrap();
        assert_eq!(first.action, ReconcileAction::Created);
        let writes = store.writes().len();
        assert_eq!(writes, 2, "namespace and secret created");

        let second = provisioner
            .provision("ns1", "bootstrap-kubeconfig", &desc)
            .await
            .unwrap();
        assert_eq!(second.action, ReconcileAction::Unchanged);
        assert_eq!(store.writes().len(), writes);
        assert_eq!(store.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_secret_holds_rendered_kubeconfig() {
        let store = Arc::new(MemoryStore::new());
        let desc = descriptor(b"CAFEBABE");
        let outcome = provisioner(store)
            .provision("ns1", "bootstrap-kubeconfig", &desc)
            .await
            .unwrap();

        let data = outcome.object.data.unwrap();
        let stored = String::from_utf8(data[KUBECONFIG_KEY].0.clone()).unwrap();
        assert_eq!(stored, desc.render().unwrap());
        assert!(!stored.contains("insecure-skip-tls-verify"));
    }

    #[tokio::test]
    async fn test_changed_descriptor_patches_only_kubeconfig_key() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            &ObjectRef::of::<Namespace>(None, "ns1"),
            json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "ns1"}}),
        );
        store.insert(
            &secret_ref(),
            json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": "bootstrap-kubeconfig", "namespace": "ns1",
                             "labels": {"owner": "someone-else"}},
                "data": {"kubeconfig": "b2xk", "other": "a2VlcA=="},
            }),
        );

        let outcome = provisioner(store.clone())
            .provision("ns1", "bootstrap-kubeconfig", &descriptor(b"CAFEBABE"))
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Updated);

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        let Write::Patch { patch, .. } = &writes[0] else {
            panic!("expected a patch");
        };
        let data = patch["data"].as_object().unwrap();
        assert_eq!(data.len(), 1);
        assert!(data.contains_key(KUBECONFIG_KEY));
        assert!(patch["metadata"].is_null());

        let stored = store.object(&secret_ref()).unwrap();
        assert_eq!(stored["data"]["other"], "a2VlcA==");
        assert_eq!(stored["metadata"]["labels"]["owner"], "someone-else");
    }

    #[tokio::test]
    async fn test_namespace_create_race_is_success() {
        let store = Arc::new(MemoryStore::new());
        store.race_next_create();

        let outcome = provisioner(store.clone())
            .provision("ns1", "bootstrap-kubeconfig", &descriptor(b""))
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Created);
        assert!(store.object(&secret_ref()).is_some());
    }

    #[tokio::test]
    async fn test_created_namespace_is_annotated() {
        let store = Arc::new(MemoryStore::new());
        let engine = ReconcileEngine::new(store.clone(), WriteOptions::default());
        let outcome = ensure_namespace(&engine, "ns1", agent_namespace_annotations())
            .await
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::Created);
        let stored = store
            .object(&ObjectRef::of::<Namespace>(None, "ns1"))
            .unwrap();
        assert_eq!(
            stored["metadata"]["annotations"][MANAGEMENT_WORKLOAD_ANNOTATION],
            MANAGEMENT_WORKLOAD_VALUE
        );
    }

    #[tokio::test]
    async fn test_existing_namespace_is_never_modified() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            &ObjectRef::of::<Namespace>(None, "ns1"),
            json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "ns1"}}),
        );
        let engine = ReconcileEngine::new(store.clone(), WriteOptions::default());

        let outcome = ensure_namespace(&engine, "ns1", agent_namespace_annotations())
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Unchanged);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_provision_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let provisioner = SecretProvisioner::new(ReconcileEngine::new(
            store.clone(),
            WriteOptions::dry_run(true),
        ));

        let outcome = provisioner
            .provision("ns1", "bootstrap-kubeconfig", &descriptor(b"CAFEBABE"))
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Created);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_empty_names_are_validation_errors() {
        let store = Arc::new(MemoryStore::new());
        let err = provisioner(store.clone())
            .provision("", "bootstrap-kubeconfig", &descriptor(b""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = provisioner(store.clone())
            .provision("ns1", "", &descriptor(b""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(store.writes().is_empty());
    }
}
