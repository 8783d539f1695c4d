/*
[INPUT]:  Domain models for a verification attempt
[OUTPUT]: Serializable request bodies for the backend proxy and the vendor
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When API schema changes or new types added
*/

use serde::{Deserialize, Serialize};

use super::enums::VerificationLevel;
use super::models::SignedChallenge;

/// Signed SIWE proof forwarded with a verification request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiweData {
    pub message: String,
    pub signature: String,
    pub address: String,
}

impl From<&SignedChallenge> for SiweData {
    fn from(signed: &SignedChallenge) -> Self {
        Self {
            message: signed.message().to_string(),
            signature: signed.signature().to_string(),
            address: signed.address(),
        }
    }
}

/// Body of `POST /kyc/verify` on the backend proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "walletAddress")]
    pub wallet_address: String,
    pub level: VerificationLevel,
    #[serde(rename = "siweData")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub siwe_data: Option<SiweData>,
}

/// Vendor client-credentials exchange body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCredentialsRequest {
    pub client_id: String,
    pub client_secret: String,
}

/// Vendor KYC initiation body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorKycRequest {
    pub action: VendorAction,
    pub customer: VendorCustomer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub level: VerificationLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorCustomer {
    pub external_id: String,
    pub wallet: VendorWallet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorWallet {
    pub blockchain: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub siwe: Option<VendorSiwe>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorSiwe {
    pub message: String,
    pub signature: String,
}

impl VendorKycRequest {
    pub fn new(
        action_type: impl Into<String>,
        level: VerificationLevel,
        blockchain: impl Into<String>,
        wallet_address: &str,
        siwe: Option<&SignedChallenge>,
    ) -> Self {
        Self {
            action: VendorAction {
                action_type: action_type.into(),
                level,
            },
            customer: VendorCustomer {
                external_id: wallet_address.to_string(),
                wallet: VendorWallet {
                    blockchain: blockchain.into(),
                    address: wallet_address.to_string(),
                    siwe: siwe.map(|signed| VendorSiwe {
                        message: signed.message().to_string(),
                        signature: signed.signature().to_string(),
                    }),
                },
            },
        }
    }
}
