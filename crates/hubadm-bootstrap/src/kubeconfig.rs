//! Minimal kubeconfig document model
//!
//! Covers the fields hub bootstrapping reads and writes: one cluster stanza
//! with server/CA/insecure flag, token auth and a context tying them together.
//! Unknown fields are ignored on parse.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A kubeconfig document (`apiVersion: v1`, `kind: Config`)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KubeconfigDoc {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context", default)]
    pub current_context: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    #[serde(default)]
    pub cluster: ClusterEntry,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    #[serde(default)]
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: UserEntry,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl std::fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserEntry")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    #[serde(default)]
    pub context: ContextEntry,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl KubeconfigDoc {
    /// Parse a kubeconfig from YAML (JSON is accepted as well)
    pub fn parse(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| Error::internal_with_context("kubeconfig", format!("invalid YAML: {}", e)))
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            Error::internal_with_context("kubeconfig", format!("failed to serialize: {}", e))
        })
    }

    /// First cluster stanza, if any
    pub fn first_cluster(&self) -> Option<&ClusterEntry> {
        self.clusters.first().map(|c| &c.cluster)
    }
}

impl ClusterEntry {
    /// Decoded `certificate-authority-data`; empty when the field is absent
    pub fn ca_bytes(&self) -> Result<Vec<u8>> {
        match self.certificate_authority_data.as_deref().map(str::trim) {
            None | Some("") => Ok(Vec::new()),
            Some(encoded) => decode_base64(encoded).map_err(|e| {
                Error::encoding(format!("certificate-authority-data is not base64: {}", e))
            }),
        }
    }
}

/// Decode standard base64, skipping line breaks and other ASCII whitespace
pub(crate) fn decode_base64(
    encoded: &str,
) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = encoded.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}
