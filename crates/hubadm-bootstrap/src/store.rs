//! Remote object store boundary
//!
//! [`ObjectStore`] is the only way the core talks to a cluster's object API.
//! Objects cross it as JSON so one engine serves every kind. API failures are
//! classified into [`ApiErrorKind`] here, once, and surface to callers as
//! [`Error`] variants; nothing downstream inspects status codes.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::discovery::ApiResource;
use kube::{Client, Resource};
use serde_json::Value;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Field manager recorded on every write
pub const DEFAULT_FIELD_MANAGER: &str = "hubadm";

/// Identity of a remote object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    /// Group/version/kind/plural of the object
    pub resource: ApiResource,
    /// Namespace; `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectRef {
    /// Reference an object of a statically known kind
    pub fn of<K>(namespace: Option<&str>, name: &str) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            resource: ApiResource::erase::<K>(&()),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Kind of the referenced object
    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    /// `namespace/name` for namespaced objects, `name` otherwise
    pub fn key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.resource.kind, self.key())
    }
}

/// Options applied to create and patch calls
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOptions {
    /// Compute the outcome but never write
    pub dry_run: bool,
    /// Field manager recorded by the API server
    pub field_manager: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl WriteOptions {
    /// Default options with dry-run set as given
    pub fn dry_run(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }
}

/// Classification of a remote API failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The object does not exist
    NotFound,
    /// A create found the object already present
    AlreadyExists,
    /// Network, timeout, throttling, write conflict or server error
    Transient,
    /// The request itself was refused or could not be built
    Rejected,
}

impl ApiErrorKind {
    /// Classify a kube client error
    pub fn classify(err: &kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => ApiErrorKind::NotFound,
                409 if ae.reason == "AlreadyExists" => ApiErrorKind::AlreadyExists,
                409 | 429 => ApiErrorKind::Transient,
                code if code >= 500 => ApiErrorKind::Transient,
                _ => ApiErrorKind::Rejected,
            },
            kube::Error::SerdeError(_) | kube::Error::BuildRequest(_) => ApiErrorKind::Rejected,
            _ => ApiErrorKind::Transient,
        }
    }

    /// Convert a classified failure of `operation` on `target` into an [`Error`]
    pub fn into_error(self, operation: &str, target: &ObjectRef, err: &kube::Error) -> Error {
        match self {
            ApiErrorKind::AlreadyExists => Error::conflict_race(target.kind(), target.key()),
            // Vanished between fetch and write: re-running re-derives from fresh state
            ApiErrorKind::NotFound | ApiErrorKind::Transient => Error::transient_with_context(
                operation,
                format!("{} {}: {}", operation, target, err),
            ),
            ApiErrorKind::Rejected => Error::internal_with_context(
                operation,
                format!("{} {} rejected: {}", operation, target, err),
            ),
        }
    }
}

/// Remote object store operations used by the reconcile engine
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get(&self, target: &ObjectRef) -> Result<Option<Value>>;

    /// Create an object; fails with [`Error::ConflictRace`] if it already exists
    async fn create(
        &self,
        target: &ObjectRef,
        object: &Value,
        options: &WriteOptions,
    ) -> Result<Value>;

    /// Apply a JSON merge patch to an existing object
    async fn patch(&self, target: &ObjectRef, patch: &Value, options: &WriteOptions)
        -> Result<Value>;
}

/// [`ObjectStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, target: &ObjectRef) -> Api<DynamicObject> {
        match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &target.resource),
            None => Api::all_with(self.client.clone(), &target.resource),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, target: &ObjectRef) -> Result<Option<Value>> {
        trace!(target = %target, "get");
        match self.api(target).get(&target.name).await {
            Ok(obj) => to_json(&obj, target).map(Some),
            Err(e) => match ApiErrorKind::classify(&e) {
                ApiErrorKind::NotFound => Ok(None),
                kind => Err(kind.into_error("get", target, &e)),
            },
        }
    }

    async fn create(
        &self,
        target: &ObjectRef,
        object: &Value,
        options: &WriteOptions,
    ) -> Result<Value> {
        trace!(target = %target, "create");
        let obj: DynamicObject = serde_json::from_value(object.clone()).map_err(|e| {
            Error::internal_with_context("create", format!("invalid {} body: {}", target, e))
        })?;
        let params = PostParams {
            dry_run: options.dry_run,
            field_manager: Some(options.field_manager.clone()),
        };
        match self.api(target).create(&params, &obj).await {
            Ok(created) => to_json(&created, target),
            Err(e) => Err(ApiErrorKind::classify(&e).into_error("create", target, &e)),
        }
    }

    async fn patch(
        &self,
        target: &ObjectRef,
        patch: &Value,
        options: &WriteOptions,
    ) -> Result<Value> {
        trace!(target = %target, patch = %patch, "patch");
        let params = PatchParams {
            dry_run: options.dry_run,
            field_manager: Some(options.field_manager.clone()),
            ..Default::default()
        };
        match self
            .api(target)
            .patch(&target.name, &params, &Patch::Merge(patch))
            .await
        {
            Ok(patched) => to_json(&patched, target),
            Err(e) => Err(ApiErrorKind::classify(&e).into_error("patch", target, &e)),
        }
    }
}

fn to_json(obj: &DynamicObject, target: &ObjectRef) -> Result<Value> {
    serde_json::to_value(obj).map_err(|e| {
        Error::internal_with_context("decode", format!("failed to encode {}: {}", target, e))
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} error", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_api_errors() {
        assert_eq!(
            ApiErrorKind::classify(&api_error(404, "NotFound")),
            ApiErrorKind::NotFound
        );
        assert_eq!(
            ApiErrorKind::classify(&api_error(409, "AlreadyExists")),
            ApiErrorKind::AlreadyExists
        );
        assert_eq!(
            ApiErrorKind::classify(&api_error(409, "Conflict")),
            ApiErrorKind::Transient
        );
        assert_eq!(
            ApiErrorKind::classify(&api_error(429, "TooManyRequests")),
            ApiErrorKind::Transient
        );
        assert_eq!(
            ApiErrorKind::classify(&api_error(503, "ServiceUnavailable")),
            ApiErrorKind::Transient
        );
        assert_eq!(
            ApiErrorKind::classify(&api_error(422, "Invalid")),
            ApiErrorKind::Rejected
        );
        assert_eq!(
            ApiErrorKind::classify(&api_error(403, "Forbidden")),
            ApiErrorKind::Rejected
        );
    }

    #[test]
    fn test_classified_errors_map_to_taxonomy() {
        let target = ObjectRef::of::<ConfigMap>(Some("ns1"), "cm");

        let e = api_error(409, "AlreadyExists");
        let err = ApiErrorKind::classify(&e).into_error("create", &target, &e);
        assert!(matches!(err, Error::ConflictRace { ref name, .. } if name == "ns1/cm"));

        let e = api_error(500, "InternalError");
        let err = ApiErrorKind::classify(&e).into_error("patch", &target, &e);
        assert!(err.is_retryable());
        assert_eq!(err.context(), Some("patch"));

        let e = api_error(422, "Invalid");
        let err = ApiErrorKind::classify(&e).into_error("patch", &target, &e);
        assert!(matches!(err, Error::Internal { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_object_ref_display() {
        let namespaced = ObjectRef::of::<ConfigMap>(Some("ns1"), "cluster-info");
        assert_eq!(namespaced.to_string(), "ConfigMap ns1/cluster-info");
        assert_eq!(namespaced.resource.api_version, "v1");

        let cluster_scoped = ObjectRef::of::<Namespace>(None, "ns1");
        assert_eq!(cluster_scoped.to_string(), "Namespace ns1");
        assert_eq!(cluster_scoped.key(), "ns1");
    }

    #[test]
    fn test_write_options_default_field_manager() {
        let opts = WriteOptions::dry_run(true);
        assert!(opts.dry_run);
        assert_eq!(opts.field_manager, DEFAULT_FIELD_MANAGER);
    }
}
