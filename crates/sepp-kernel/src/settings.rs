//! Gateway configuration tree and startup validation.
//!
//! [`SeppConfig`] mirrors the deployment YAML:
//!
//! ```yaml
//! sepp:
//!   local:
//!     n32:
//!       fqdn: sepp.plmn-a.example
//!       host: 0.0.0.0
//!       port: 1234
//!       tls: { cert: /etc/sepp/certs/n32.crt, key: /etc/sepp/certs/n32.key, ca: /etc/sepp/certs/ca.crt }
//!     sbi:
//!       host: 0.0.0.0
//!       port: 1235
//!       tls: { cert: /etc/sepp/certs/sbi.crt, key: /etc/sepp/certs/sbi.key, ca: /etc/sepp/certs/ca.crt }
//!   remote:
//!     url: https://sepp.plmn-b.example:1234
//!     tls: { cert: /etc/sepp/certs/client.crt, key: /etc/sepp/certs/client.key, ca: /etc/sepp/certs/ca.crt }
//! ```
//!
//! Every field is optional at the serde level; [`validate()`](SeppConfig::validate)
//! decides what is actually required so errors name the missing field.

use crate::config::{self, ConfigResult, Format};
use crate::error::SettingsError;
use crate::n32::{Fqdn, SecurityCapability};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Prefix for environment overrides, e.g. `SEPP_SEPP__REMOTE__URL`.
pub const ENV_PREFIX: &str = "SEPP";

const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Tree
// ─────────────────────────────────────────────────────────────────────────────

/// Root of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeppConfig {
    #[serde(default)]
    pub sepp: SeppSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeppSection {
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Name of the single security capability this gateway negotiates.
    #[serde(default = "default_capability")]
    pub security_capability: String,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    /// Upper bound on in-flight request draining at shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SeppSection {
    fn default() -> Self {
        Self {
            local: LocalConfig::default(),
            remote: RemoteConfig::default(),
            security_capability: default_capability(),
            handshake: HandshakeConfig::default(),
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default)]
    pub n32: N32Listener,
    #[serde(default)]
    pub sbi: Listener,
    /// Dedicated Nsepp listener.  When absent the mapping API is served on
    /// the N32 listener.
    #[serde(default)]
    pub nsepp: Option<Listener>,
}

/// The N32 listener additionally carries this gateway's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct N32Listener {
    #[serde(default)]
    pub fqdn: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub tls: TlsFiles,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub tls: TlsFiles,
}

/// PEM file locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsFiles {
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub ca: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the peer's N32 endpoint.  Empty means responder-only.
    #[serde(default)]
    pub url: String,
    /// Client identity presented to the peer (handshake and forwarding).
    #[serde(default)]
    pub tls: TlsFiles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
        }
    }
}

fn default_capability() -> String {
    SecurityCapability::Tls.as_str().to_string()
}

fn default_retry_interval_secs() -> u64 {
    DEFAULT_RETRY_INTERVAL_SECS
}

fn default_shutdown_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading & validation
// ─────────────────────────────────────────────────────────────────────────────

impl SeppConfig {
    /// Load from `path` (format from the extension), apply `SEPP_*`
    /// environment overrides, then [`validate`](Self::validate).
    pub fn load(path: &str) -> ConfigResult<Self> {
        let config: SeppConfig = config::load_with_env(path, ENV_PREFIX)?;
        config.validate()?;
        debug!(path, fqdn = %config.local_fqdn(), "configuration validated");
        Ok(config)
    }

    /// Parse and validate an in-memory document.
    pub fn from_str_validated(content: &str, format: Format) -> ConfigResult<Self> {
        let config: SeppConfig = config::from_str(content, format)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every structural invariant before any listener is bound.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let n32 = &self.sepp.local.n32;
        if n32.fqdn.trim().is_empty() {
            return Err(SettingsError::MissingFqdn);
        }
        if n32.host.trim().is_empty() {
            return Err(SettingsError::MissingHost);
        }
        if n32.port == 0 {
            return Err(SettingsError::MissingPort);
        }
        if n32.tls.cert.is_empty() {
            return Err(SettingsError::MissingTlsCert);
        }
        if n32.tls.key.is_empty() {
            return Err(SettingsError::MissingTlsKey);
        }
        if n32.tls.ca.is_empty() {
            return Err(SettingsError::MissingTlsCa);
        }

        let sbi = &self.sepp.local.sbi;
        if sbi.host.trim().is_empty() {
            return Err(SettingsError::MissingSbiHost);
        }
        if sbi.port == 0 {
            return Err(SettingsError::MissingSbiPort);
        }
        if sbi.tls.cert.is_empty() {
            return Err(SettingsError::MissingSbiTls("cert"));
        }
        if sbi.tls.key.is_empty() {
            return Err(SettingsError::MissingSbiTls("key"));
        }
        if sbi.tls.ca.is_empty() {
            return Err(SettingsError::MissingSbiTls("CA"));
        }

        if let Some(nsepp) = &self.sepp.local.nsepp {
            if nsepp.host.trim().is_empty() {
                return Err(SettingsError::IncompleteNsepp("host"));
            }
            if nsepp.port == 0 {
                return Err(SettingsError::IncompleteNsepp("port"));
            }
            if nsepp.tls.cert.is_empty() {
                return Err(SettingsError::IncompleteNsepp("TLS cert"));
            }
            if nsepp.tls.key.is_empty() {
                return Err(SettingsError::IncompleteNsepp("TLS key"));
            }
        }

        if let Some(url) = self.remote_url() {
            let remote = &self.sepp.remote;
            if remote.tls.cert.is_empty() {
                return Err(SettingsError::MissingRemoteTlsCert);
            }
            if remote.tls.key.is_empty() {
                return Err(SettingsError::MissingRemoteTlsKey);
            }
            if remote.tls.ca.is_empty() {
                return Err(SettingsError::MissingRemoteTlsCa);
            }
            let authority = url
                .strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"));
            if authority.is_none_or(str::is_empty) {
                return Err(SettingsError::InvalidRemoteUrl(url.to_string()));
            }
        }

        self.sepp.security_capability.parse::<SecurityCapability>()?;

        if self.sepp.handshake.retry_interval_secs == 0 {
            return Err(SettingsError::InvalidRetryInterval);
        }
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn local_fqdn(&self) -> Fqdn {
        Fqdn::from(self.sepp.local.n32.fqdn.trim())
    }

    pub fn n32_addr(&self) -> String {
        let n32 = &self.sepp.local.n32;
        format!("{}:{}", n32.host, n32.port)
    }

    pub fn sbi_addr(&self) -> String {
        let sbi = &self.sepp.local.sbi;
        format!("{}:{}", sbi.host, sbi.port)
    }

    pub fn nsepp_addr(&self) -> Option<String> {
        self.sepp
            .local
            .nsepp
            .as_ref()
            .map(|n| format!("{}:{}", n.host, n.port))
    }

    /// Peer base URL without a trailing slash; `None` in responder-only mode.
    pub fn remote_url(&self) -> Option<&str> {
        let url = self.sepp.remote.url.trim().trim_end_matches('/');
        (!url.is_empty()).then_some(url)
    }

    /// Capabilities this gateway supports, in preference order.
    pub fn supported_capabilities(&self) -> Vec<SecurityCapability> {
        self.sepp
            .security_capability
            .parse::<SecurityCapability>()
            .into_iter()
            .collect()
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.sepp.handshake.retry_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.sepp.shutdown_grace_secs)
    }
}
