/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock collaborators
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for kyc-handoff-adapter tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kyc_handoff_adapter::widget::InMemoryWidgetRuntime;
use kyc_handoff_adapter::{
    ChallengeBuilder, EvmWalletSigner, FlowController, FlowState, HandoffConfig, KycError,
    Result, SessionInitiator, SessionRequest, VerificationSession, WalletSigner,
    WidgetEventBridge,
};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::MockServer;

/// Well-known development key (account #0 of the default test mnemonic)
pub const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const TEST_CHAIN_ID: u64 = 84532;
pub const CONTAINER_ID: &str = "kyc-widget";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn test_config(api_base_url: &str) -> HandoffConfig {
    let mut config = HandoffConfig::new(
        Url::parse(api_base_url).unwrap(),
        Url::parse("https://app.example.com").unwrap(),
    );
    config.widget.init_retry_delay_ms = 5;
    config.widget.init_max_attempts = 10;
    config
}

pub fn test_wallet() -> Arc<dyn WalletSigner> {
    Arc::new(EvmWalletSigner::new(TEST_PRIVATE_KEY, TEST_CHAIN_ID).unwrap())
}

/// Controller wired to an in-memory widget and a fresh shutdown token
pub fn test_controller(
    initiator: Arc<dyn SessionInitiator>,
    runtime: &InMemoryWidgetRuntime,
    verify_signatures: bool,
) -> FlowController {
    let config = test_config("http://localhost:8080/api");
    FlowController::from_parts(
        ChallengeBuilder::from_config(&config).unwrap(),
        config.statement.clone(),
        initiator,
        WidgetEventBridge::new(Arc::new(runtime.clone()), &config.widget),
        verify_signatures,
        CancellationToken::new(),
    )
}

/// Process internal events until `done` holds for the current state
pub async fn step_until<F>(controller: &mut FlowController, done: F)
where
    F: Fn(&FlowState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(controller.state()) {
            let _ = controller.step().await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("flow stuck in {}", controller.state()));
}

/// Process whatever internal events arrive within `window`
pub async fn drain(controller: &mut FlowController, window: Duration) {
    while let Ok(Some(_)) = tokio::time::timeout(window, controller.step()).await {}
}

#[derive(Clone)]
enum Reply {
    Session(serde_json::Value),
    Reject(String),
    AuthFailure(String),
}

/// Session initiator recording every request
#[derive(Clone)]
pub struct MockSessionInitiator {
    reply: Reply,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<SessionRequest>>>,
}

impl MockSessionInitiator {
    pub fn succeeding(widget_payload: serde_json::Value) -> Self {
        Self {
            reply: Reply::Session(widget_payload),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            reply: Reply::Reject(message.to_string()),
            ..Self::succeeding(serde_json::Value::Null)
        }
    }

    /// Fails before reaching the verification endpoint, as a refused token exchange does
    pub fn auth_failing(message: &str) -> Self {
        Self {
            reply: Reply::AuthFailure(message.to_string()),
            ..Self::succeeding(serde_json::Value::Null)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionInitiator for MockSessionInitiator {
    async fn initiate(&self, request: SessionRequest) -> Result<VerificationSession> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Reply::Session(payload) => Ok(VerificationSession {
                wallet_address: request.wallet_address,
                level: request.level,
                flow: Some("kyc_flow".to_string()),
                widget_payload: payload.clone(),
            }),
            Reply::Reject(message) => Err(KycError::VerificationRequest {
                message: message.clone(),
                details: None,
            }),
            Reply::AuthFailure(message) => Err(KycError::AuthBackend(message.clone())),
        }
    }
}

/// Wallet whose signing prompt never resolves
pub struct PendingWallet {
    pub address: String,
    pub chain_id: u64,
}

#[async_trait]
impl WalletSigner for PendingWallet {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_message(&self, _message: &str) -> Result<String> {
        std::future::pending().await
    }
}
