//! Process configuration
//!
//! Configuration is an explicit value built once at startup and handed to
//! constructors. It is read from TOML, secrets are overlaid from the
//! environment, and `validate` rejects anything the runtime cannot start
//! with.

use crate::{CourierError, IdentityProfile, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the hex ed25519 seed
pub const ENV_SECRET_KEY: &str = "COURIER_SECRET_KEY";
/// Environment variable holding the pinning service bearer token
pub const ENV_PIN_TOKEN: &str = "COURIER_PIN_TOKEN";
/// Environment variable overriding the directory RPC endpoint
pub const ENV_RPC_URL: &str = "COURIER_RPC_URL";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Local identity
    pub identity: IdentityConfig,
    /// Job directory endpoint
    pub directory: DirectoryConfig,
    /// Content store and gateways
    pub store: StoreConfig,
    /// Polling and relevance
    pub lifecycle: LifecycleConfig,
    /// Per-capability settings keyed by capability name
    pub capabilities: BTreeMap<String, toml::Table>,
}

/// Local identity settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Hex-encoded 32-byte ed25519 seed; normally supplied via the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// Register the identity on startup when the directory does not know it
    pub auto_register: bool,
    /// Profile published on registration
    pub profile: IdentityProfile,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            auto_register: true,
            profile: IdentityProfile {
                name: "courier-worker".to_string(),
                bio: String::new(),
                avatar: String::new(),
            },
        }
    }
}

/// Job directory endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// JSON-RPC bridge URL
    pub rpc_url: String,
    /// Upper bound on a single RPC, including confirmation waits
    pub request_timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl DirectoryConfig {
    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// How sealed envelopes are written to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeEncoding {
    /// `iv || tag || ciphertext` bytes as-is
    #[default]
    Raw,
    /// Standard base64 text of the raw blob
    Base64,
}

/// Content store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Pinning service upload URL
    pub pin_endpoint: String,
    /// Pinning service bearer token; normally supplied via the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_token: Option<String>,
    /// Ordered gateway URL templates (`<base><locator>` or containing `{locator}`)
    pub gateways: Vec<String>,
    /// Timeout for each gateway attempt
    pub gateway_timeout_ms: u64,
    /// AEAD nonce length in bytes (12 or 16)
    pub nonce_len: usize,
    /// Encoding of stored envelopes
    pub envelope_encoding: EnvelopeEncoding,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pin_endpoint: "https://api.pinata.cloud/pinning/pinFileToIPFS".to_string(),
            pin_token: None,
            gateways: vec![
                "https://gateway.pinata.cloud/ipfs/".to_string(),
                "https://ipfs.io/ipfs/".to_string(),
                "https://cloudflare-ipfs.com/ipfs/".to_string(),
            ],
            gateway_timeout_ms: 10_000,
            nonce_len: 12,
            envelope_encoding: EnvelopeEncoding::Raw,
        }
    }
}

impl StoreConfig {
    /// Per-gateway timeout as a duration
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

/// Polling and relevance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Case-insensitive keywords that make a job relevant
    pub keywords: Vec<String>,
    /// How many of the most recent jobs each discovery tick inspects
    pub recent_jobs: u64,
    /// Discovery poll interval
    pub discovery_interval_secs: u64,
    /// Active-jobs poll interval
    pub active_interval_secs: u64,
    /// Enabled capabilities, in dispatch order
    pub capabilities: Vec<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["bot".to_string()],
            recent_jobs: 20,
            discovery_interval_secs: 30,
            active_interval_secs: 20,
            capabilities: vec!["template".to_string()],
        }
    }
}

impl LifecycleConfig {
    /// Discovery interval as a duration
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    /// Active-jobs interval as a duration
    pub fn active_interval(&self) -> Duration {
        Duration::from_secs(self.active_interval_secs)
    }
}

impl CourierConfig {
    /// Default locations tried when no explicit path exists
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("courier.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".courier").join("config.toml"));
        }
        paths
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| CourierError::configuration(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CourierError::configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from `path` if it exists, else the first existing default path,
    /// else defaults. Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidates = path
            .map(|p| vec![p.to_path_buf()])
            .unwrap_or_else(Self::default_paths);

        let mut config = match candidates.iter().find(|p| p.exists()) {
            Some(found) => {
                tracing::debug!(path = %found.display(), "Loading configuration");
                Self::load_from_file(found)?
            }
            None => {
                if let Some(explicit) = path {
                    return Err(CourierError::configuration(format!(
                        "Config file {} does not exist",
                        explicit.display()
                    )));
                }
                tracing::debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.merge_with_env();
        Ok(config)
    }

    /// Overlay secrets from the process environment
    pub fn merge_with_env(&mut self) {
        self.merge_with_lookup(|key| std::env::var(key).ok());
    }

    /// Overlay secrets from an arbitrary lookup
    pub fn merge_with_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_SECRET_KEY).filter(|v| !v.trim().is_empty()) {
            self.identity.secret_key = Some(secret);
        }
        if let Some(token) = lookup(ENV_PIN_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.store.pin_token = Some(token);
        }
        if let Some(url) = lookup(ENV_RPC_URL).filter(|v| !v.trim().is_empty()) {
            self.directory.rpc_url = url;
        }
    }

    /// Reject configurations the runtime cannot start with
    pub fn validate(&self) -> Result<()> {
        match self.identity.secret_key.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(CourierError::configuration(format!(
                    "identity.secret_key is required (or set {ENV_SECRET_KEY})"
                )))
            }
            Some(_) => {}
        }
        self.validate_settings()
    }

    /// Everything `validate` checks except the secret key, for callers that
    /// supply their own signer
    pub fn validate_settings(&self) -> Result<()> {
        if self.directory.rpc_url.trim().is_empty() {
            return Err(CourierError::configuration("directory.rpc_url is empty"));
        }
        if self.directory.request_timeout_secs == 0 {
            return Err(CourierError::configuration(
                "directory.request_timeout_secs must be positive",
            ));
        }
        if self.store.gateways.iter().all(|g| g.trim().is_empty()) {
            return Err(CourierError::configuration(
                "store.gateways must list at least one gateway",
            ));
        }
        if self.store.gateway_timeout_ms == 0 {
            return Err(CourierError::configuration(
                "store.gateway_timeout_ms must be positive",
            ));
        }
        if !matches!(self.store.nonce_len, 12 | 16) {
            return Err(CourierError::configuration(format!(
                "store.nonce_len must be 12 or 16, got {}",
                self.store.nonce_len
            )));
        }
        if self.lifecycle.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(CourierError::configuration(
                "lifecycle.keywords must contain at least one keyword",
            ));
        }
        if self.lifecycle.recent_jobs == 0 {
            return Err(CourierError::configuration(
                "lifecycle.recent_jobs must be positive",
            ));
        }
        if self.lifecycle.discovery_interval_secs == 0 || self.lifecycle.active_interval_secs == 0
        {
            return Err(CourierError::configuration(
                "lifecycle poll intervals must be positive",
            ));
        }
        if self.lifecycle.capabilities.is_empty() {
            return Err(CourierError::configuration(
                "lifecycle.capabilities must enable at least one capability",
            ));
        }
        Ok(())
    }
}
