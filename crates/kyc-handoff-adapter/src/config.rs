/*
[INPUT]:  Deserialized configuration values (file or environment derived)
[OUTPUT]: Validated, read-only handoff configuration
[POS]:    Configuration layer - constants supplied by the surrounding application
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::{ClientConfig, KycError, Result};
use crate::types::VerificationLevel;

const DEFAULT_STATEMENT: &str =
    "Sign in with Ethereum to prove ownership of this wallet for identity verification.";

/// Top-level configuration for the verification handoff
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandoffConfig {
    /// Backend proxy base URL (may carry a path prefix such as `/api`)
    pub api_base_url: Url,
    /// Origin the user signs in from; its host becomes the SIWE domain
    pub origin: Url,
    /// Network the wallet must be connected to
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Vendor name for the configured network
    #[serde(default = "default_blockchain")]
    pub blockchain: String,
    /// Purpose statement embedded in every challenge
    #[serde(default = "default_statement")]
    pub statement: String,
    #[serde(default)]
    pub default_level: VerificationLevel,
    /// Recover the signer before initiating a session; disable for
    /// contract wallets whose signatures cannot be recovered
    #[serde(default = "default_verify_signatures")]
    pub verify_signatures: bool,
    /// Origins allowed to start a flow; empty allows any
    #[serde(default)]
    pub allowed_origins: Vec<Url>,
    #[serde(default)]
    pub widget: WidgetConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Present only where the process holds vendor credentials
    #[serde(default)]
    pub vendor: Option<VendorConfig>,
}

/// Embedded widget settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WidgetConfig {
    #[serde(default = "default_container_id")]
    pub container_id: String,
    #[serde(default = "default_init_retry_delay_ms")]
    pub init_retry_delay_ms: u64,
    #[serde(default = "default_init_max_attempts")]
    pub init_max_attempts: u32,
}

impl WidgetConfig {
    pub fn init_retry_delay(&self) -> Duration {
        Duration::from_millis(self.init_retry_delay_ms)
    }
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            container_id: default_container_id(),
            init_retry_delay_ms: default_init_retry_delay_ms(),
            init_max_attempts: default_init_max_attempts(),
        }
    }
}

/// HTTP timeouts in seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl From<&HttpConfig> for ClientConfig {
    fn from(config: &HttpConfig) -> Self {
        ClientConfig {
            timeout: Duration::from_secs(config.timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }
}

/// Vendor service credentials and endpoints
#[derive(Clone, Deserialize, Serialize)]
pub struct VendorConfig {
    pub base_url: Url,
    pub auth_endpoint: String,
    pub kyc_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_action_type")]
    pub action_type: String,
}

impl std::fmt::Debug for VendorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorConfig")
            .field("base_url", &self.base_url.as_str())
            .field("auth_endpoint", &self.auth_endpoint)
            .field("kyc_endpoint", &self.kyc_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("action_type", &self.action_type)
            .finish()
    }
}

impl HandoffConfig {
    /// Minimal configuration with defaults for everything else
    pub fn new(api_base_url: Url, origin: Url) -> Self {
        Self {
            api_base_url,
            origin,
            chain_id: default_chain_id(),
            blockchain: default_blockchain(),
            statement: default_statement(),
            default_level: VerificationLevel::default(),
            verify_signatures: default_verify_signatures(),
            allowed_origins: Vec::new(),
            widget: WidgetConfig::default(),
            http: HttpConfig::default(),
            vendor: None,
        }
    }

    /// SIWE `domain`: host plus explicit port of the origin
    pub fn domain(&self) -> Result<String> {
        let host = self
            .origin
            .host_str()
            .ok_or_else(|| KycError::Config(format!("origin has no host: {}", self.origin)))?;
        Ok(match self.origin.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// SIWE `uri`: the serialized origin without trailing slash
    pub fn uri(&self) -> String {
        self.origin.origin().ascii_serialization()
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(KycError::Config("chain_id must be positive".to_string()));
        }
        self.domain()?;
        if !self.allowed_origins.is_empty()
            && !self
                .allowed_origins
                .iter()
                .any(|allowed| allowed.origin() == self.origin.origin())
        {
            return Err(KycError::Config(format!(
                "origin {} is not in allowed_origins",
                self.uri()
            )));
        }
        if self.widget.init_max_attempts == 0 || self.widget.init_retry_delay_ms == 0 {
            return Err(KycError::Config(
                "widget init retry bounds must be positive".to_string(),
            ));
        }
        if self.statement.trim().is_empty() {
            return Err(KycError::Config("statement must not be empty".to_string()));
        }
        Ok(())
    }
}

fn default_chain_id() -> u64 {
    84532
}

fn default_blockchain() -> String {
    "base_sepolia".to_string()
}

fn default_statement() -> String {
    DEFAULT_STATEMENT.to_string()
}

fn default_verify_signatures() -> bool {
    true
}

fn default_container_id() -> String {
    "kyc-widget".to_string()
}

fn default_init_retry_delay_ms() -> u64 {
    100
}

fn default_init_max_attempts() -> u32 {
    50
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_action_type() -> String {
    "OCC_RULES_ENGINE_V2".to_string()
}
