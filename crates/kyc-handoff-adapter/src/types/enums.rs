/*
[INPUT]:  Verification tier definitions and serde requirements
[OUTPUT]: Typed verification level enum serialized as a bare integer
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When the vendor adds or renames assurance tiers
*/

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::http::KycError;

/// Assurance tier requested from the verification vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VerificationLevel {
    Basic,
    Intermediate,
    #[default]
    Advanced,
}

impl VerificationLevel {
    pub const ALL: [VerificationLevel; 3] = [
        VerificationLevel::Basic,
        VerificationLevel::Intermediate,
        VerificationLevel::Advanced,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            VerificationLevel::Basic => 1,
            VerificationLevel::Intermediate => 2,
            VerificationLevel::Advanced => 3,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            VerificationLevel::Basic => "Basic",
            VerificationLevel::Intermediate => "Intermediate",
            VerificationLevel::Advanced => "Advanced",
        }
    }

    /// Checks the vendor performs at this tier
    pub fn requirements(self) -> &'static [&'static str] {
        match self {
            VerificationLevel::Basic => &["Email verification"],
            VerificationLevel::Intermediate => {
                &["Email verification", "ID document verification"]
            }
            VerificationLevel::Advanced => &[
                "Email verification",
                "ID document verification",
                "Video selfie verification",
            ],
        }
    }
}

impl TryFrom<u8> for VerificationLevel {
    type Error = KycError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VerificationLevel::Basic),
            2 => Ok(VerificationLevel::Intermediate),
            3 => Ok(VerificationLevel::Advanced),
            other => Err(KycError::InvalidInput(format!(
                "unsupported verification level {other}"
            ))),
        }
    }
}

impl From<VerificationLevel> for u8 {
    fn from(level: VerificationLevel) -> Self {
        level.as_u8()
    }
}

impl fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Level {})", self.title(), self.as_u8())
    }
}
