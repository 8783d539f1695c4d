/*
[INPUT]:  EVM private key (hex string) and target chain id
[OUTPUT]: EIP-191 signed messages and the wallet address
[POS]:    Auth layer - local EVM wallet implementation
[UPDATE]: When signing logic or EVM address formatting changes
*/

use std::str::FromStr;

use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

use crate::auth::WalletSigner;
use crate::http::{KycError, Result};
use crate::types::lowercase_address;

/// Signer backed by a local secp256k1 key
pub struct EvmWalletSigner {
    signer: PrivateKeySigner,
    address: String,
    chain_id: u64,
}

impl EvmWalletSigner {
    /// Create a new EVM wallet signer from a hex-encoded private key
    ///
    /// Supports both "0x"-prefixed and non-prefixed hex strings.
    pub fn new(private_key_hex: &str, chain_id: u64) -> Result<Self> {
        let private_key_hex = private_key_hex
            .trim()
            .strip_prefix("0x")
            .unwrap_or(private_key_hex.trim());
        let signer = PrivateKeySigner::from_str(private_key_hex)
            .map_err(|e| KycError::Config(format!("Invalid EVM private key: {e}")))?;

        let address = lowercase_address(&signer.address());

        Ok(Self {
            signer,
            address,
            chain_id,
        })
    }
}

impl std::fmt::Debug for EvmWalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmWalletSigner")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

#[async_trait]
impl WalletSigner for EvmWalletSigner {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_message(&self, message: &str) -> Result<String> {
        let signature = self
            .signer
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| KycError::SignatureDenied(format!("Failed to sign EVM message: {e}")))?;

        // [r, s, v]
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}
