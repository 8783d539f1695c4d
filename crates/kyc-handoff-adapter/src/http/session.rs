/*
[INPUT]:  Signed challenge (or bare address) and requested verification level
[OUTPUT]: VerificationSession carrying the vendor widget payload
[POS]:    HTTP layer - session initiation contract shared by proxy and vendor clients
[UPDATE]: When adding initiator backends or changing the in-flight policy
*/

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::http::{KycError, Result};
use crate::types::{KycResponse, SignedChallenge, VerificationLevel, VerificationSession};

/// Input to one session initiation
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub wallet_address: String,
    pub level: VerificationLevel,
    /// Absent in configurations that skip SIWE
    pub signed: Option<SignedChallenge>,
}

impl SessionRequest {
    pub fn signed(signed: SignedChallenge, level: VerificationLevel) -> Self {
        Self {
            wallet_address: signed.address(),
            level,
            signed: Some(signed),
        }
    }

    pub fn bare(wallet_address: impl Into<String>, level: VerificationLevel) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            level,
            signed: None,
        }
    }
}

/// Exchanges a wallet proof for a verification session
#[async_trait]
pub trait SessionInitiator: Send + Sync {
    async fn initiate(&self, request: SessionRequest) -> Result<VerificationSession>;
}

/// Addresses with a session request currently in flight
#[derive(Debug, Clone, Default)]
pub struct InFlightAddresses {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InFlightAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an address until the returned guard drops
    pub fn claim(&self, address: &str) -> Result<InFlightGuard> {
        let key = address.trim().to_ascii_lowercase();
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| KycError::Config("in-flight registry poisoned".to_string()))?;
        if !guard.insert(key.clone()) {
            return Err(KycError::SessionInFlight { address: key });
        }
        Ok(InFlightGuard {
            inner: self.inner.clone(),
            key,
        })
    }

    pub fn contains(&self, address: &str) -> bool {
        let key = address.trim().to_ascii_lowercase();
        self.inner
            .lock()
            .map(|guard| guard.contains(&key))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().map(|guard| guard.is_empty()).unwrap_or(true)
    }
}

/// Releases its address on drop
#[derive(Debug)]
pub struct InFlightGuard {
    inner: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.remove(&self.key);
        }
    }
}

/// Turn a 2xx KYC response into a session, honouring `error_code`
pub(crate) fn session_from_response(
    request: &SessionRequest,
    response: KycResponse,
) -> Result<VerificationSession> {
    if let Some(code) = response.error_code.filter(|code| !code.is_empty()) {
        return Err(KycError::VerificationRequest {
            message: format!("verification rejected: {code}"),
            details: Some(serde_json::json!({ "error_code": code, "flow": response.flow })),
        });
    }
    if response.widget_data.is_null() {
        return Err(KycError::VerificationRequest {
            message: "verification response carried no widget data".to_string(),
            details: None,
        });
    }
    Ok(VerificationSession {
        wallet_address: request.wallet_address.clone(),
        level: request.level,
        flow: response.flow,
        widget_payload: response.widget_data,
    })
}
