use std::fmt;

use tracing::{debug, info, instrument};
use url::Url;

use super::{CaResolver, ClusterInfo, ClusterInfoSource, KubeClusterInfoSource};
use crate::client::ClientTimeouts;
use crate::descriptor::{ConnectionDescriptor, Unverified, Verified};
use crate::{Error, Result};

/// Inputs of one escalation
#[derive(Clone)]
pub struct EscalationRequest {
    /// Bootstrap token used for phase 1 only
    pub token: String,
    /// Hub API server URL as supplied by the operator
    pub external_endpoint: String,
    /// CA sources
    pub ca: CaResolver,
    /// Replace the external endpoint with the in-cluster one from cluster-info
    pub internal_endpoint_lookup: bool,
}

impl EscalationRequest {
    /// Check required inputs; runs before anything touches the network
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::validation_for_field(
                "hub-token",
                "bootstrap token is required",
            ));
        }
        validate_endpoint(&self.external_endpoint)
    }
}

impl fmt::Debug for EscalationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscalationRequest")
            .field("token", &"<redacted>")
            .field("external_endpoint", &self.external_endpoint)
            .field("ca", &self.ca)
            .field("internal_endpoint_lookup", &self.internal_endpoint_lookup)
            .finish()
    }
}

/// Hub API server URLs must be absolute http(s) URLs with a host
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.trim().is_empty() {
        return Err(Error::validation_for_field(
            "hub-apiserver",
            "hub API server URL is required",
        ));
    }
    let url = Url::parse(endpoint).map_err(|e| {
        Error::validation_for_field("hub-apiserver", format!("invalid URL {}: {}", endpoint, e))
    })?;
    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
        return Err(Error::validation_for_field(
            "hub-apiserver",
            format!("{} is not an http(s) URL", endpoint),
        ));
    }
    Ok(())
}

/// Drives `Unverified -> Verified`
///
/// No retries happen here. Any discovery failure other than "cluster-info
/// absent" aborts the escalation and no descriptor is returned.
#[derive(Debug)]
pub struct TrustEscalator {
    request: EscalationRequest,
}

impl TrustEscalator {
    /// Validate the request and prepare an escalation
    pub fn new(request: EscalationRequest) -> Result<Self> {
        request.validate()?;
        Ok(Self { request })
    }

    /// Phase 1 descriptor used for discovery calls
    pub fn bootstrap_descriptor(&self) -> ConnectionDescriptor<Unverified> {
        ConnectionDescriptor::bootstrap(&self.request.external_endpoint, &self.request.token)
    }

    /// Run discovery through `source` and build the phase 2 descriptor
    #[instrument(skip_all, fields(endpoint = %self.request.external_endpoint))]
    pub async fn escalate(
        &self,
        source: &dyn ClusterInfoSource,
    ) -> Result<ConnectionDescriptor<Verified>> {
        let phase1 = self.bootstrap_descriptor();

        let explicit_ca = self.request.ca.explicit().await?;
        let discovered = if explicit_ca.is_none() || self.request.internal_endpoint_lookup {
            source.cluster_info().await?
        } else {
            None
        };

        let ca_data = match explicit_ca {
            Some(ca) => ca,
            None => CaResolver::from_discovery(discovered.as_ref()),
        };
        let endpoint = if self.request.internal_endpoint_lookup {
            self.internal_endpoint(discovered.as_ref())
        } else {
            self.request.external_endpoint.clone()
        };

        info!(endpoint = %endpoint, ca_len = ca_data.len(), "trust established");
        Ok(phase1.verify(endpoint, ca_data))
    }

    /// Open the phase 1 connection to the hub and escalate over it
    pub async fn escalate_over_network(
        &self,
        timeouts: ClientTimeouts,
    ) -> Result<ConnectionDescriptor<Verified>> {
        let client = self
            .bootstrap_descriptor()
            .connect(timeouts)
            .await
            .map_err(|e| Error::trust_discovery(format!("cannot reach hub: {}", e)))?;
        self.escalate(&KubeClusterInfoSource::new(client)).await
    }

    fn internal_endpoint(&self, discovered: Option<&ClusterInfo>) -> String {
        match discovered {
            Some(ClusterInfo {
                server: Some(server),
                ..
            }) => {
                debug!(server = %server, "using internal endpoint");
                server.clone()
            }
            Some(_) => {
                info!("cluster-info has no server, keeping external endpoint");
                self.request.external_endpoint.clone()
            }
            None => {
                info!("no cluster-info published, keeping external endpoint");
                self.request.external_endpoint.clone()
            }
        }
    }
}
