/*
[INPUT]:  Wallet addresses, challenge fields, signatures and vendor widget payloads
[OUTPUT]: Typed domain models for one verification attempt
[POS]:    Data layer - domain model shared by builder, requester, initiator and flow
[UPDATE]: When the challenge format or session payload changes
*/

use std::str::FromStr;

use alloy_primitives::{Address, Signature};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::enums::VerificationLevel;
use crate::http::{KycError, Result};

/// SIWE message version, fixed by EIP-4361
pub const SIWE_VERSION: &str = "1";

/// Parse an EVM account identifier.
///
/// Accepts all-lowercase or all-uppercase hex, and mixed case only when the
/// EIP-55 checksum is valid.
pub fn parse_address(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| KycError::InvalidInput(format!("address must be 0x-prefixed: {trimmed}")))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(KycError::InvalidInput(format!(
            "address must be 20 bytes of hex: {trimmed}"
        )));
    }

    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        return Address::parse_checksummed(format!("0x{hex_part}"), None).map_err(|e| {
            KycError::InvalidInput(format!("address checksum mismatch for {trimmed}: {e}"))
        });
    }

    Address::from_str(hex_part)
        .map_err(|e| KycError::InvalidInput(format!("invalid address {trimmed}: {e}")))
}

/// Lowercase `0x`-prefixed form used in every JSON payload
pub fn lowercase_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Connected wallet as reported by the wallet connector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletIdentity {
    pub address: String,
    pub chain_id: u64,
}

impl WalletIdentity {
    pub fn new(address: &str, chain_id: u64) -> Result<Self> {
        if chain_id == 0 {
            return Err(KycError::InvalidInput("chain id must be positive".to_string()));
        }
        let parsed = parse_address(address)?;
        Ok(Self {
            address: lowercase_address(&parsed),
            chain_id,
        })
    }
}

/// Sign-In-With-Ethereum challenge for one sign-in attempt.
///
/// Immutable once built; fields are only readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweChallenge {
    domain: String,
    address: Address,
    statement: String,
    uri: String,
    chain_id: u64,
    nonce: String,
    issued_at: DateTime<Utc>,
}

impl SiweChallenge {
    pub(crate) fn new(
        domain: String,
        address: Address,
        statement: String,
        uri: String,
        chain_id: u64,
        nonce: String,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            domain,
            address,
            statement,
            uri,
            chain_id,
            nonce,
            issued_at,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Lowercase `0x` address
    pub fn address(&self) -> String {
        lowercase_address(&self.address)
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> &'static str {
        SIWE_VERSION
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Render the EIP-4361 text the wallet signs.
    ///
    /// Line order is fixed; the backend and vendor re-parse this exact text.
    pub fn message(&self) -> String {
        format!(
            "{domain} wants you to sign in with your Ethereum account:\n\
             {address}\n\
             \n\
             {statement}\n\
             \n\
             URI: {uri}\n\
             Version: {version}\n\
             Chain ID: {chain_id}\n\
             Nonce: {nonce}\n\
             Issued At: {issued_at}",
            domain = self.domain,
            address = self.address.to_checksum(None),
            statement = self.statement,
            uri = self.uri,
            version = SIWE_VERSION,
            chain_id = self.chain_id,
            nonce = self.nonce,
            issued_at = self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }
}

/// Rendered challenge plus the wallet's signature over it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedChallenge {
    challenge: SiweChallenge,
    message: String,
    signature: String,
}

impl SignedChallenge {
    pub(crate) fn new(challenge: SiweChallenge, signature: String) -> Self {
        let message = challenge.message();
        Self {
            challenge,
            message,
            signature,
        }
    }

    pub fn challenge(&self) -> &SiweChallenge {
        &self.challenge
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn address(&self) -> String {
        self.challenge.address()
    }

    pub fn nonce(&self) -> &str {
        self.challenge.nonce()
    }

    /// Recover the EIP-191 signer of the rendered message
    pub fn recover_address(&self) -> Result<Address> {
        let raw = self
            .signature
            .strip_prefix("0x")
            .unwrap_or(&self.signature);
        let bytes = hex::decode(raw)
            .map_err(|e| KycError::SignatureDenied(format!("signature is not hex: {e}")))?;
        let signature = Signature::from_raw(&bytes)
            .map_err(|e| KycError::SignatureDenied(format!("malformed signature: {e}")))?;
        signature
            .recover_address_from_msg(self.message.as_bytes())
            .map_err(|e| KycError::SignatureDenied(format!("signature recovery failed: {e}")))
    }

    /// Check the signature was produced by the challenged address
    pub fn verify(&self) -> Result<()> {
        let recovered = self.recover_address()?;
        if recovered == self.challenge.address {
            Ok(())
        } else {
            Err(KycError::SignatureDenied(format!(
                "signature was produced by {}, expected {}",
                lowercase_address(&recovered),
                self.challenge.address()
            )))
        }
    }
}

/// Session handed back by the verification backend
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationSession {
    pub wallet_address: String,
    pub level: VerificationLevel,
    /// Vendor flow identifier, when reported
    pub flow: Option<String>,
    /// Opaque blob consumed by the embedded widget
    pub widget_payload: serde_json::Value,
}
