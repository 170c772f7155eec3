//! Revocation domain types.

use crate::domain::serial::SerialNumber;
use crate::infra::error::{CaError, CaResult};
use chrono::{DateTime, Utc};
use der::Enumerated;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// RFC 5280 `CRLReason`. Value 7 is unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enumerated, Serialize, Deserialize)]
#[repr(u32)]
#[serde(rename_all = "camelCase")]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CaCompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    RemoveFromCrl = 8,
    PrivilegeWithdrawn = 9,
    AaCompromise = 10,
}

impl RevocationReason {
    #[must_use]
    pub fn code(&self) -> u32 {
        *self as u32
    }

    pub fn from_code(code: u32) -> CaResult<Self> {
        Ok(match code {
            0 => RevocationReason::Unspecified,
            1 => RevocationReason::KeyCompromise,
            2 => RevocationReason::CaCompromise,
            3 => RevocationReason::AffiliationChanged,
            4 => RevocationReason::Superseded,
            5 => RevocationReason::CessationOfOperation,
            6 => RevocationReason::CertificateHold,
            8 => RevocationReason::RemoveFromCrl,
            9 => RevocationReason::PrivilegeWithdrawn,
            10 => RevocationReason::AaCompromise,
            other => {
                return Err(CaError::InvalidRequest(format!(
                    "Unknown revocation reason code {other}"
                )))
            }
        })
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RevocationReason::Unspecified => "unspecified",
            RevocationReason::KeyCompromise => "keyCompromise",
            RevocationReason::CaCompromise => "cACompromise",
            RevocationReason::AffiliationChanged => "affiliationChanged",
            RevocationReason::Superseded => "superseded",
            RevocationReason::CessationOfOperation => "cessationOfOperation",
            RevocationReason::CertificateHold => "certificateHold",
            RevocationReason::RemoveFromCrl => "removeFromCRL",
            RevocationReason::PrivilegeWithdrawn => "privilegeWithdrawn",
            RevocationReason::AaCompromise => "aACompromise",
        };
        f.write_str(name)
    }
}

impl FromStr for RevocationReason {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u32>() {
            return Self::from_code(code);
        }
        let normalized = s.replace(['_', '-'], "").to_ascii_lowercase();
        Ok(match normalized.as_str() {
            "unspecified" => RevocationReason::Unspecified,
            "keycompromise" => RevocationReason::KeyCompromise,
            "cacompromise" => RevocationReason::CaCompromise,
            "affiliationchanged" => RevocationReason::AffiliationChanged,
            "superseded" => RevocationReason::Superseded,
            "cessationofoperation" => RevocationReason::CessationOfOperation,
            "certificatehold" => RevocationReason::CertificateHold,
            "removefromcrl" => RevocationReason::RemoveFromCrl,
            "privilegewithdrawn" => RevocationReason::PrivilegeWithdrawn,
            "aacompromise" => RevocationReason::AaCompromise,
            _ => {
                return Err(CaError::InvalidRequest(format!(
                    "Unknown revocation reason '{s}'"
                )))
            }
        })
    }
}

/// One entry of the revoked set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedCertificate {
    pub serial_number: SerialNumber,
    pub revocation_time: DateTime<Utc>,
    pub reason: RevocationReason,
}

/// Status reported to OCSP clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatus {
    Good,
    Revoked {
        revocation_time: DateTime<Utc>,
        reason: RevocationReason,
    },
    Unknown,
}
