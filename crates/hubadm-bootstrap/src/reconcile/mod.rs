//! Create-or-patch reconciliation
//!
//! [`ReconcileEngine::reconcile`] brings one remote object to the state
//! described by a [`Mutation`]:
//!
//! 1. fetch the object by identity
//! 2. absent: apply the mutation to a zero object stamped with the identity
//!    and create it
//! 3. present: apply the mutation to a copy, diff the serialized forms and
//!    send a merge patch carrying only the difference, or nothing at all
//!    when the diff is empty
//!
//! At most one write is issued per call and no lock is held across calls.
//! Retrying a failed call is always safe because the mutation is idempotent
//! and every call re-derives fetch, diff and write from fresh state.

mod merge;

use std::fmt;
use std::sync::Arc;

use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::store::{ObjectRef, ObjectStore, WriteOptions};
use crate::{Error, Result};

pub use merge::{create_merge_patch, is_empty_patch};

/// Bound shared by every kind the engine reconciles
pub trait Reconcilable:
    Resource<DynamicType = ()> + Clone + Default + Serialize + DeserializeOwned + Send + Sync
{
}

impl<K> Reconcilable for K where
    K: Resource<DynamicType = ()> + Clone + Default + Serialize + DeserializeOwned + Send + Sync
{
}

/// A pure transformation from current-or-zero object to desired object
///
/// Precondition: the transformation is idempotent (`f(f(x)) == f(x)`) and
/// depends only on its input and captured values. The engine relies on this
/// to make re-running a failed reconcile safe.
pub struct Mutation<K>(Box<dyn Fn(K) -> K + Send + Sync>);

impl<K> Mutation<K> {
    /// Wrap a transformation
    pub fn new(f: impl Fn(K) -> K + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Apply the transformation
    pub fn apply(&self, object: K) -> K {
        (self.0)(object)
    }
}

impl<K> fmt::Debug for Mutation<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mutation")
    }
}

/// What to do when a create loses against a concurrent creator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CreateRacePolicy {
    /// Surface [`Error::ConflictRace`]
    #[default]
    Fail,
    /// Treat the existing object as success without merging the mutation
    TreatAsSuccess,
}

/// The object to reconcile and how it should look
#[derive(Debug)]
pub struct ReconcileTarget<K> {
    namespace: Option<String>,
    name: String,
    mutate: Mutation<K>,
    race_policy: CreateRacePolicy,
}

impl<K: Reconcilable> ReconcileTarget<K> {
    /// Target a namespaced object
    pub fn namespaced(
        namespace: impl Into<String>,
        name: impl Into<String>,
        mutate: Mutation<K>,
    ) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
            mutate,
            race_policy: CreateRacePolicy::default(),
        }
    }

    /// Target a cluster-scoped object
    pub fn cluster_scoped(name: impl Into<String>, mutate: Mutation<K>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
            mutate,
            race_policy: CreateRacePolicy::default(),
        }
    }

    /// Select the create-race policy
    pub fn with_race_policy(mut self, policy: CreateRacePolicy) -> Self {
        self.race_policy = policy;
        self
    }

    /// Identity of the target on the remote store
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::of::<K>(self.namespace.as_deref(), &self.name)
    }

    fn zero_object(&self) -> K {
        let mut zero = K::default();
        let meta = zero.meta_mut();
        meta.name = Some(self.name.clone());
        meta.namespace = self.namespace.clone();
        zero
    }
}

/// What a reconcile did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// The object did not exist and was created
    Created,
    /// The object existed and a patch was sent
    Updated,
    /// Nothing was written
    Unchanged,
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileAction::Created => write!(f, "created"),
            ReconcileAction::Updated => write!(f, "updated"),
            ReconcileAction::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Result of one reconcile call
#[derive(Clone, Debug)]
pub struct ReconcileOutcome<K> {
    /// What was done
    pub action: ReconcileAction,
    /// Object state after the call (the desired state under dry-run)
    pub object: K,
}

/// Generic create-or-patch engine over an [`ObjectStore`]
#[derive(Clone)]
pub struct ReconcileEngine {
    store: Arc<dyn ObjectStore>,
    options: WriteOptions,
}

impl ReconcileEngine {
    /// Create an engine writing with the given options
    pub fn new(store: Arc<dyn ObjectStore>, options: WriteOptions) -> Self {
        Self { store, options }
    }

    /// Write options applied to every create and patch
    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Bring the target object to the state its mutation describes
    #[instrument(skip_all, fields(target = %target.object_ref()))]
    pub async fn reconcile<K: Reconcilable>(
        &self,
        target: &ReconcileTarget<K>,
    ) -> Result<ReconcileOutcome<K>> {
        let object_ref = target.object_ref();
        match self.store.get(&object_ref).await? {
            None => self.create(target, &object_ref).await,
            Some(current) => self.patch(target, &object_ref, current).await,
        }
    }

    async fn create<K: Reconcilable>(
        &self,
        target: &ReconcileTarget<K>,
        object_ref: &ObjectRef,
    ) -> Result<ReconcileOutcome<K>> {
        let desired = apply_checked(&target.mutate, target.zero_object())?;
        let mut body = encode(&desired)?;
        stamp_type_meta(&mut body, object_ref);

        if self.options.dry_run {
            info!("dry run: would create");
            return Ok(ReconcileOutcome {
                action: ReconcileAction::Created,
                object: desired,
            });
        }

        match self.store.create(object_ref, &body, &self.options).await {
            Ok(created) => {
                info!("created");
                Ok(ReconcileOutcome {
                    action: ReconcileAction::Created,
                    object: decode(created)?,
                })
            }
            Err(Error::ConflictRace { .. })
                if target.race_policy == CreateRacePolicy::TreatAsSuccess =>
            {
                debug!("lost create race to a concurrent creator, keeping existing object");
                let object = match self.store.get(object_ref).await? {
                    Some(existing) => decode(existing)?,
                    None => desired,
                };
                Ok(ReconcileOutcome {
                    action: ReconcileAction::Unchanged,
                    object,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn patch<K: Reconcilable>(
        &self,
        target: &ReconcileTarget<K>,
        object_ref: &ObjectRef,
        current: Value,
    ) -> Result<ReconcileOutcome<K>> {
        let current: K = decode(current)?;
        let original = encode(&current)?;
        let desired = apply_checked(&target.mutate, current.clone())?;
        let modified = encode(&desired)?;

        let patch = create_merge_patch(&original, &modified);
        if is_empty_patch(&patch) {
            debug!("already up to date");
            return Ok(ReconcileOutcome {
                action: ReconcileAction::Unchanged,
                object: current,
            });
        }

        if self.options.dry_run {
            info!(patch = %patch, "dry run: would patch");
            return Ok(ReconcileOutcome {
                action: ReconcileAction::Updated,
                object: desired,
            });
        }

        debug!(patch = %patch, "patching");
        let patched = self.store.patch(object_ref, &patch, &self.options).await?;
        info!("updated");
        Ok(ReconcileOutcome {
            action: ReconcileAction::Updated,
            object: decode(patched)?,
        })
    }
}

/// Apply a mutation; test builds also verify it is idempotent on this input
fn apply_checked<K: Reconcilable>(mutate: &Mutation<K>, input: K) -> Result<K> {
    let once = mutate.apply(input);
    #[cfg(test)]
    {
        let twice = mutate.apply(once.clone());
        assert_eq!(
            encode(&once)?,
            encode(&twice)?,
            "mutation is not idempotent"
        );
    }
    Ok(once)
}

fn stamp_type_meta(body: &mut Value, object_ref: &ObjectRef) {
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "apiVersion".to_string(),
            Value::String(object_ref.resource.api_version.clone()),
        );
        obj.insert(
            "kind".to_string(),
            Value::String(object_ref.resource.kind.clone()),
        );
    }
}

fn encode<K: Serialize>(object: &K) -> Result<Value> {
    serde_json::to_value(object)
        .map_err(|e| Error::internal_with_context("reconcile", format!("failed to encode: {}", e)))
}

fn decode<K: DeserializeOwned>(value: Value) -> Result<K> {
    serde_json::from_value(value)
        .map_err(|e| Error::internal_with_context("reconcile", format!("failed to decode: {}", e)))
}
