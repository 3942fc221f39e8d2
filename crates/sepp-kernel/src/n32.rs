//! N32-c handshake wire types.
//!
//! Two gateways agree on a security capability by POSTing a
//! [`SecNegotiateReqData`] to the peer's
//! [`EXCHANGE_CAPABILITY_PATH`] and receiving a [`SecNegotiateRspData`].
//! Field names on the wire are PascalCase:
//!
//! ```json
//! {"Sender": "sepp.plmn-a.example", "SupportedSecCapabilityList": ["TLS"]}
//! {"Sender": "sepp.plmn-b.example", "SelectedSecCapability": "TLS"}
//! ```

use crate::error::{NegotiationError, SettingsError};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Path prefix of the N32-c handshake API.
pub const N32C_HANDSHAKE_PREFIX: &str = "/n32c-handshake/v1";

/// Full path of the capability exchange operation.
pub const EXCHANGE_CAPABILITY_PATH: &str = "/n32c-handshake/v1/exchange-capability";

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Fully-qualified domain name identifying a gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fqdn(String);

impl Fqdn {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whitespace-only names count as empty.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fqdn {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Fqdn {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SecurityCapability
// ─────────────────────────────────────────────────────────────────────────────

/// Security mechanism two gateways can agree on.
///
/// Any name this gateway does not know decodes to [`Unknown`](Self::Unknown)
/// instead of failing the whole request, so a peer advertising newer
/// mechanisms alongside `TLS` still negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityCapability {
    #[serde(rename = "TLS")]
    Tls,
    #[serde(rename = "ALS")]
    Als,
    #[serde(other)]
    Unknown,
}

impl SecurityCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityCapability::Tls => "TLS",
            SecurityCapability::Als => "ALS",
            SecurityCapability::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SecurityCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityCapability {
    type Err = SettingsError;

    /// Case-insensitive parse, used for the configured capability name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TLS" => Ok(SecurityCapability::Tls),
            "ALS" => Ok(SecurityCapability::Als),
            _ => Err(SettingsError::UnsupportedCapability(s.to_string())),
        }
    }
}

/// Pick the capability both sides support.
///
/// Walks `supported` (the local preference order) and returns the first entry
/// the sender also offered.  [`SecurityCapability::Unknown`] never matches.
pub fn select_capability(
    offered: &[SecurityCapability],
    supported: &[SecurityCapability],
) -> Option<SecurityCapability> {
    supported
        .iter()
        .copied()
        .filter(|c| *c != SecurityCapability::Unknown)
        .find(|c| offered.contains(c))
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /n32c-handshake/v1/exchange-capability`.
///
/// Missing or `null` fields decode to empty values so that the responder can
/// report *which* field is missing instead of a generic decode error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecNegotiateReqData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender: Fqdn,
    #[serde(default, deserialize_with = "null_as_default")]
    pub supported_sec_capability_list: Vec<SecurityCapability>,
}

impl SecNegotiateReqData {
    pub fn new(sender: impl Into<Fqdn>, supported: Vec<SecurityCapability>) -> Self {
        Self {
            sender: sender.into(),
            supported_sec_capability_list: supported,
        }
    }

    /// Structural checks, in the order the responder applies them.
    pub fn validate(&self) -> Result<(), NegotiationError> {
        if self.sender.is_empty() {
            return Err(NegotiationError::MissingSender);
        }
        if self.supported_sec_capability_list.is_empty() {
            return Err(NegotiationError::MissingCapabilityList);
        }
        Ok(())
    }
}

/// Successful (`200 OK`) answer to a capability exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecNegotiateRspData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender: Fqdn,
    pub selected_sec_capability: SecurityCapability,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
