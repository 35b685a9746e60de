//! Connection descriptors for the hub
//!
//! A descriptor is the material a client needs to reach the hub: endpoint,
//! optional bearer token, pinned CA and the cluster/auth/context names that
//! tie them together in a kubeconfig.
//!
//! The trust phase is part of the type. [`ConnectionDescriptor<Unverified>`]
//! skips TLS verification and carries the bootstrap token; it can only be used
//! to open a discovery connection. [`ConnectionDescriptor<Verified>`] is the
//! only phase that can be rendered for persistence, and rendering re-checks
//! the insecure flag at runtime as well.

use std::fmt;
use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD, Engine};
use kube::Client;

use crate::client::{client_from_kubeconfig_yaml, ClientTimeouts};
use crate::kubeconfig::{
    ClusterEntry, ContextEntry, KubeconfigDoc, NamedCluster, NamedContext, NamedUser, UserEntry,
};
use crate::{Error, Result};

/// Cluster stanza name in rendered kubeconfigs
pub const HUB_CLUSTER_NAME: &str = "hub";
/// Auth stanza name in rendered kubeconfigs
pub const BOOTSTRAP_AUTH_NAME: &str = "bootstrap";
/// Context name in rendered kubeconfigs
pub const BOOTSTRAP_CONTEXT_NAME: &str = "bootstrap";
/// Default namespace of the bootstrap context
pub const BOOTSTRAP_CONTEXT_NAMESPACE: &str = "default";

mod sealed {
    pub trait Sealed {}
}

/// Trust phase of a descriptor
pub trait Phase: sealed::Sealed {}

/// Phase 1: TLS verification skipped, bootstrap token attached
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unverified {}

/// Phase 2: CA pinned (or system roots), no token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verified {}

impl sealed::Sealed for Unverified {}
impl sealed::Sealed for Verified {}
impl Phase for Unverified {}
impl Phase for Verified {}

/// A usable connection to the hub
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor<P: Phase> {
    endpoint: String,
    auth_token: Option<String>,
    ca_data: Vec<u8>,
    insecure_skip_verify: bool,
    cluster_name: String,
    auth_name: String,
    context_name: String,
    _phase: PhantomData<P>,
}

impl<P: Phase> ConnectionDescriptor<P> {
    /// API server URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bearer token, present only in the unverified phase
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Pinned CA bytes; empty means the system trust roots apply
    pub fn ca_data(&self) -> &[u8] {
        &self.ca_data
    }

    /// Whether TLS verification is skipped
    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }

    /// Cluster stanza name
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Auth stanza name
    pub fn auth_name(&self) -> &str {
        &self.auth_name
    }

    /// Context name
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    fn to_kubeconfig(&self) -> KubeconfigDoc {
        KubeconfigDoc {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: self.cluster_name.clone(),
                cluster: ClusterEntry {
                    server: self.endpoint.clone(),
                    certificate_authority_data: (!self.ca_data.is_empty())
                        .then(|| STANDARD.encode(&self.ca_data)),
                    insecure_skip_tls_verify: self.insecure_skip_verify,
                },
            }],
            users: vec![NamedUser {
                name: self.auth_name.clone(),
                user: UserEntry {
                    token: self.auth_token.clone(),
                },
            }],
            contexts: vec![NamedContext {
                name: self.context_name.clone(),
                context: ContextEntry {
                    cluster: self.cluster_name.clone(),
                    user: self.auth_name.clone(),
                    namespace: BOOTSTRAP_CONTEXT_NAMESPACE.to_string(),
                },
            }],
            current_context: self.context_name.clone(),
        }
    }
}

impl ConnectionDescriptor<Unverified> {
    /// Build the phase-1 descriptor from a bootstrap token
    pub fn bootstrap(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: Some(token.into()),
            ca_data: Vec::new(),
            insecure_skip_verify: true,
            cluster_name: HUB_CLUSTER_NAME.to_string(),
            auth_name: BOOTSTRAP_AUTH_NAME.to_string(),
            context_name: BOOTSTRAP_CONTEXT_NAME.to_string(),
            _phase: PhantomData,
        }
    }

    /// Open an unverified connection for discovery calls
    pub async fn connect(&self, timeouts: ClientTimeouts) -> Result<Client> {
        let yaml = self.to_kubeconfig().to_yaml()?;
        client_from_kubeconfig_yaml(&yaml, timeouts).await
    }

    /// Promote to the verified phase with the discovered endpoint and CA
    ///
    /// The token is dropped: the persisted descriptor only carries connection
    /// and trust material.
    pub(crate) fn verify(
        self,
        endpoint: String,
        ca_data: Vec<u8>,
    ) -> ConnectionDescriptor<Verified> {
        ConnectionDescriptor {
            endpoint,
            auth_token: None,
            ca_data,
            insecure_skip_verify: false,
            cluster_name: self.cluster_name,
            auth_name: self.auth_name,
            context_name: self.context_name,
            _phase: PhantomData,
        }
    }
}

impl ConnectionDescriptor<Verified> {
    /// Render as kubeconfig YAML for persistence
    pub fn render(&self) -> Result<String> {
        if self.insecure_skip_verify {
            return Err(Error::internal_with_context(
                "render",
                "refusing to render a descriptor that skips TLS verification",
            ));
        }
        self.to_kubeconfig().to_yaml()
    }
}

impl<P: Phase> fmt::Debug for ConnectionDescriptor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("ca_data_len", &self.ca_data.len())
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("cluster_name", &self.cluster_name)
            .field("auth_name", &self.auth_name)
            .field("context_name", &self.context_name)
            .finish()
    }
}
