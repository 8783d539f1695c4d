/*
[INPUT]:  Error sources (wallet, backend proxy, vendor, widget runtime, serialization)
[OUTPUT]: Structured error types with user-facing messages and restart hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the KYC handoff adapter
#[derive(Error, Debug)]
pub enum KycError {
    /// Malformed address, statement or level
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No wallet is connected
    #[error("Wallet not connected")]
    NotConnected,

    /// The user or the wallet rejected the signing request
    #[error("Signature denied: {0}")]
    SignatureDenied(String),

    /// A signature request is already outstanding
    #[error("A signature request is already pending")]
    SignatureRequestPending,

    /// The service credential exchange was rejected
    #[error("Authentication with verification backend failed: {0}")]
    AuthBackend(String),

    /// The backend or vendor rejected the verification request
    #[error("Verification request failed: {message}")]
    VerificationRequest {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// A session request for this address is already in flight
    #[error("Verification session already in flight for {address}")]
    SessionInFlight { address: String },

    /// The flow cannot accept the action in its current state
    #[error("Flow is busy ({state})")]
    FlowBusy { state: String },

    /// The embedded widget could not be initialized
    #[error("Widget initialization failed: {0}")]
    WidgetInit(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KycError {
    /// Only widget readiness polling is retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KycError::WidgetInit(_))
    }

    /// Check if recovering requires a brand new challenge and signature
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            KycError::SignatureDenied(_)
                | KycError::AuthBackend(_)
                | KycError::VerificationRequest { .. }
                | KycError::Http(_)
        )
    }

    /// Human readable message surfaced to the user.
    ///
    /// Vendor and wallet messages are passed through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            KycError::SignatureDenied(message) => message.clone(),
            KycError::VerificationRequest { message, .. } => message.clone(),
            KycError::AuthBackend(message) if !message.trim().is_empty() => message.clone(),
            KycError::AuthBackend(_) => "Failed to obtain access token".to_string(),
            KycError::NotConnected => "Wallet address not available".to_string(),
            other => other.to_string(),
        }
    }

    /// Create a verification error from a non-success status and message
    pub fn verification_rejected(
        status: StatusCode,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        let message = message.into();
        KycError::VerificationRequest {
            message: if message.is_empty() {
                format!("verification backend returned {status}")
            } else {
                message
            },
            details,
        }
    }
}

/// Result type alias for KYC handoff operations
pub type Result<T> = std::result::Result<T, KycError>;
