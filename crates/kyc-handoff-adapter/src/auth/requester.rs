/*
[INPUT]:  SiweChallenge and the currently connected wallet (if any)
[OUTPUT]: SignedChallenge, or NotConnected / SignatureDenied
[POS]:    Auth layer - single outstanding signature request per flow
[UPDATE]: When wallet error mapping or the pending policy changes
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::auth::WalletSigner;
use crate::http::{KycError, Result};
use crate::types::{SiweChallenge, SignedChallenge};

/// Asks the connected wallet to sign challenges, one at a time
#[derive(Debug, Clone, Default)]
pub struct SignatureRequester {
    pending: Arc<AtomicBool>,
}

impl SignatureRequester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a signature request is outstanding
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Claim the single outstanding-request slot until the returned guard drops
    pub fn reserve(&self) -> Result<SignatureSlot> {
        self.pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| KycError::SignatureRequestPending)?;
        Ok(SignatureSlot {
            flag: self.pending.clone(),
        })
    }

    /// Request a signature over the challenge's rendered message.
    ///
    /// Suspends until the wallet answers. Dropping the returned future
    /// abandons the request and frees the pending slot.
    pub async fn request(
        &self,
        wallet: Option<&dyn WalletSigner>,
        challenge: SiweChallenge,
    ) -> Result<SignedChallenge> {
        let wallet = wallet.ok_or(KycError::NotConnected)?;
        check_account(wallet, &challenge)?;
        let _slot = self.reserve()?;
        sign(wallet, challenge).await
    }

    /// Request a signature while the caller holds a slot from [`Self::reserve`].
    ///
    /// The slot stays with its owner, so releasing it never waits on this
    /// future being polled again.
    pub(crate) async fn request_reserved(
        &self,
        wallet: Option<&dyn WalletSigner>,
        challenge: SiweChallenge,
    ) -> Result<SignedChallenge> {
        let wallet = wallet.ok_or(KycError::NotConnected)?;
        check_account(wallet, &challenge)?;
        sign(wallet, challenge).await
    }
}

/// Held while a signature request is outstanding; frees the slot on drop
#[derive(Debug)]
pub struct SignatureSlot {
    flag: Arc<AtomicBool>,
}

impl Drop for SignatureSlot {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn check_account(wallet: &dyn WalletSigner, challenge: &SiweChallenge) -> Result<()> {
    if !wallet.address().eq_ignore_ascii_case(&challenge.address()) {
        return Err(KycError::InvalidInput(format!(
            "challenge for {} cannot be signed by {}",
            challenge.address(),
            wallet.address()
        )));
    }
    Ok(())
}

async fn sign(wallet: &dyn WalletSigner, challenge: SiweChallenge) -> Result<SignedChallenge> {
    let message = challenge.message();
    debug!(address = %challenge.address(), nonce = %challenge.nonce(), "requesting wallet signature");

    match wallet.sign_message(&message).await {
        Ok(signature) => {
            info!(address = %challenge.address(), "wallet signed challenge");
            Ok(SignedChallenge::new(challenge, signature))
        }
        Err(KycError::SignatureDenied(reason)) => Err(KycError::SignatureDenied(reason)),
        Err(other) => Err(KycError::SignatureDenied(other.to_string())),
    }
}
