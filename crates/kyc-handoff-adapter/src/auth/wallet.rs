/*
[INPUT]:  Message to sign and the connected wallet
[OUTPUT]: Signature string for the SIWE challenge
[POS]:    Auth layer - wallet integration abstraction
[UPDATE]: When adding new wallet types or changing signature format
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::http::{KycError, Result};

/// Trait for wallet signing operations
///
/// Implement this trait for your wallet connector. The trait is async since
/// signing waits on the wallet UI (or a hardware device).
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Network the wallet is connected to
    fn chain_id(&self) -> u64;

    /// Get the wallet address
    fn address(&self) -> &str;

    /// Sign a message (EIP-191) and return the `0x` hex signature
    ///
    /// A user rejection is reported as [`KycError::SignatureDenied`].
    async fn sign_message(&self, message: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
enum MockBehavior {
    Sign(String),
    Reject(String),
}

/// Mock wallet signer for testing
#[derive(Debug, Clone)]
pub struct MockWalletSigner {
    chain_id: u64,
    address: String,
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockWalletSigner {
    /// Create a new mock signer with predetermined signature
    pub fn new(chain_id: u64, address: &str, signature: &str) -> Self {
        Self {
            chain_id,
            address: address.to_string(),
            behavior: MockBehavior::Sign(signature.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock signer whose user rejects every request
    pub fn rejecting(chain_id: u64, address: &str, reason: &str) -> Self {
        Self {
            behavior: MockBehavior::Reject(reason.to_string()),
            ..Self::new(chain_id, address, "")
        }
    }

    /// Number of signature requests received
    pub fn sign_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for MockWalletSigner {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_message(&self, _message: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Sign(signature) => Ok(signature.clone()),
            MockBehavior::Reject(reason) => Err(KycError::SignatureDenied(reason.clone())),
        }
    }
}
