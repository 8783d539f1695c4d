/*
[INPUT]:  Wallet address, purpose statement, origin and chain from config
[OUTPUT]: Fresh SiweChallenge with a random single-use nonce
[POS]:    Auth layer - Sign-In-With-Ethereum challenge construction (no I/O)
[UPDATE]: When the SIWE template or nonce policy changes
*/

use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::HandoffConfig;
use crate::http::{KycError, Result};
use crate::types::{SiweChallenge, parse_address};

/// Random bytes per nonce (256 bits)
pub const NONCE_BYTES: usize = 32;

/// Builds SIWE challenges for one origin and network
#[derive(Debug, Clone)]
pub struct ChallengeBuilder {
    domain: String,
    uri: String,
    chain_id: u64,
}

impl ChallengeBuilder {
    pub fn new(domain: impl Into<String>, uri: impl Into<String>, chain_id: u64) -> Self {
        Self {
            domain: domain.into(),
            uri: uri.into(),
            chain_id,
        }
    }

    pub fn from_config(config: &HandoffConfig) -> Result<Self> {
        Ok(Self::new(config.domain()?, config.uri(), config.chain_id))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Build a challenge for `address` with a freshly generated nonce
    pub fn build(&self, address: &str, statement: &str) -> Result<SiweChallenge> {
        let address = parse_address(address)?;

        let statement = statement.trim();
        if statement.is_empty() {
            return Err(KycError::InvalidInput("statement must not be empty".to_string()));
        }
        if statement.contains('\n') || statement.contains('\r') {
            return Err(KycError::InvalidInput(
                "statement must be a single line".to_string(),
            ));
        }

        Ok(SiweChallenge::new(
            self.domain.clone(),
            address,
            statement.to_string(),
            self.uri.clone(),
            self.chain_id,
            generate_nonce(),
            Utc::now(),
        ))
    }
}

/// Hex-encoded nonce from the OS CSPRNG
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
