use std::path::PathBuf;

use tracing::{debug, info};

use super::{ClusterInfo, ClusterInfoSource};
use crate::kubeconfig::decode_base64;
use crate::{Error, Result};

/// Determines the CA bytes to pin for the hub
///
/// Precedence, first match wins: explicit file, explicit base64 data, then
/// discovery through cluster-info. A hub that publishes no cluster-info
/// yields an empty CA and the verified descriptor falls back to system roots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaResolver {
    file: Option<PathBuf>,
    data_base64: Option<String>,
}

impl CaResolver {
    /// Build a resolver; empty values count as absent
    pub fn new(file: Option<PathBuf>, data_base64: Option<String>) -> Self {
        Self {
            file: file.filter(|p| !p.as_os_str().is_empty()),
            data_base64: data_base64.filter(|d| !d.trim().is_empty()),
        }
    }

    /// Whether an explicit source makes discovery unnecessary
    pub fn is_explicit(&self) -> bool {
        self.file.is_some() || self.data_base64.is_some()
    }

    /// Resolve the CA, calling `source` only when no explicit source is set
    pub async fn resolve(&self, source: &dyn ClusterInfoSource) -> Result<Vec<u8>> {
        if let Some(ca) = self.explicit().await? {
            return Ok(ca);
        }
        Ok(Self::from_discovery(source.cluster_info().await?.as_ref()))
    }

    /// CA carried by an already fetched cluster-info
    pub(crate) fn from_discovery(info: Option<&ClusterInfo>) -> Vec<u8> {
        match info {
            Some(info) => {
                debug!(ca_len = info.ca_data.len(), "resolved CA from cluster-info");
                info.ca_data.clone()
            }
            None => {
                info!("hub publishes no CA, relying on system trust roots");
                Vec::new()
            }
        }
    }

    pub(crate) async fn explicit(&self) -> Result<Option<Vec<u8>>> {
        if let Some(path) = &self.file {
            let ca = tokio::fs::read(path)
                .await
                .map_err(|e| Error::io(path.clone(), e))?;
            debug!(path = %path.display(), "read CA from file");
            return Ok(Some(ca));
        }

        if let Some(data) = &self.data_base64 {
            let ca = decode_base64(data)
                .map_err(|e| Error::encoding(format!("CA data is not valid base64: {}", e)))?;
            return Ok(Some(ca));
        }

        Ok(None)
    }
}
