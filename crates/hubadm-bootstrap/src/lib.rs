//! Hub trust bootstrapping and idempotent resource reconciliation
//!
//! - [`trust`]: turn a bootstrap token into a CA-pinned [`descriptor`]
//! - [`reconcile`]: generic create-or-patch against an [`store::ObjectStore`]
//! - [`provision`]: persist the verified descriptor as a Secret
//! - [`cluster_info`]: snapshot cluster identity into a ConfigMap or ClusterClaim

pub mod client;
pub mod cluster_info;
pub mod crd;
pub mod descriptor;
pub mod error;
pub mod kubeconfig;
pub mod provision;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod trust;

pub use error::Error;

/// Result type for bootstrap operations
pub type Result<T> = std::result::Result<T, Error>;
