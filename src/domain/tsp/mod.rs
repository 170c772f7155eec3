//! RFC 3161 Time-Stamp Protocol domain types.
//!
//! These are the engine-facing forms of `TimeStampReq`, `TSTInfo` and
//! `TimeStampResp`. The DER wire structures live in [`asn1`]; conversion
//! between the two is done by `services::timestamp_codec`.

pub mod asn1;

use crate::domain::audit::TimestampEntry;
use crate::domain::crypto::HashAlgorithm;
use crate::domain::serial::SerialNumber;
use chrono::{DateTime, Utc};
use der::asn1::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use x509_cert::ext::Extension;
use x509_cert::name::Name;

/// Hash algorithm and digest of the data being timestamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageImprint {
    pub hash_algorithm: HashAlgorithm,
    pub hashed_message: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampRequest {
    pub version: u8,
    pub message_imprint: MessageImprint,
    pub req_policy: Option<ObjectIdentifier>,
    /// Big-endian unsigned magnitude
    pub nonce: Option<Vec<u8>>,
    pub cert_req: bool,
    pub extensions: Vec<Extension>,
}

impl TimestampRequest {
    /// Version 1 request for an already computed digest.
    #[must_use]
    pub fn new(hash_algorithm: HashAlgorithm, hashed_message: Vec<u8>) -> Self {
        Self {
            version: crate::domain::constants::TSP_VERSION_1,
            message_imprint: MessageImprint {
                hash_algorithm,
                hashed_message,
            },
            req_policy: None,
            nonce: None,
            cert_req: false,
            extensions: Vec::new(),
        }
    }

    /// Request for `data`, hashed with `hash_algorithm`.
    #[must_use]
    pub fn for_data(hash_algorithm: HashAlgorithm, data: &[u8]) -> Self {
        Self::new(hash_algorithm, hash_algorithm.digest(data))
    }
}

/// Declared accuracy of `genTime`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Accuracy {
    pub seconds: Option<u32>,
    pub millis: Option<u16>,
    pub micros: Option<u16>,
}

/// `PKIStatus` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PkiStatus {
    Granted = 0,
    GrantedWithMods = 1,
    Rejection = 2,
    Waiting = 3,
    RevocationWarning = 4,
    RevocationNotification = 5,
}

impl PkiStatus {
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => PkiStatus::Granted,
            1 => PkiStatus::GrantedWithMods,
            2 => PkiStatus::Rejection,
            3 => PkiStatus::Waiting,
            4 => PkiStatus::RevocationWarning,
            5 => PkiStatus::RevocationNotification,
            _ => return None,
        })
    }
}

/// `PKIFailureInfo` bit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PkiFailureInfo {
    BadAlg = 0,
    BadRequest = 2,
    BadDataFormat = 5,
    TimeNotAvailable = 14,
    UnacceptedPolicy = 15,
    UnacceptedExtension = 16,
    AddInfoNotAvailable = 17,
    SystemFailure = 25,
}

impl PkiFailureInfo {
    #[must_use]
    pub fn bit(&self) -> u8 {
        *self as u8
    }

    #[must_use]
    pub fn from_bit(bit: u8) -> Option<Self> {
        Some(match bit {
            0 => PkiFailureInfo::BadAlg,
            2 => PkiFailureInfo::BadRequest,
            5 => PkiFailureInfo::BadDataFormat,
            14 => PkiFailureInfo::TimeNotAvailable,
            15 => PkiFailureInfo::UnacceptedPolicy,
            16 => PkiFailureInfo::UnacceptedExtension,
            17 => PkiFailureInfo::AddInfoNotAvailable,
            25 => PkiFailureInfo::SystemFailure,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiStatusInfo {
    pub status: PkiStatus,
    pub status_string: Option<String>,
    pub fail_info: Option<PkiFailureInfo>,
}

impl PkiStatusInfo {
    #[must_use]
    pub fn granted() -> Self {
        Self {
            status: PkiStatus::Granted,
            status_string: None,
            fail_info: None,
        }
    }

    #[must_use]
    pub fn rejection(fail_info: PkiFailureInfo, message: impl Into<String>) -> Self {
        Self {
            status: PkiStatus::Rejection,
            status_string: Some(message.into()),
            fail_info: Some(fail_info),
        }
    }
}

/// Content of a timestamp token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TstInfo {
    pub version: u8,
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprint,
    pub serial_number: SerialNumber,
    pub gen_time: DateTime<Utc>,
    pub accuracy: Option<Accuracy>,
    pub ordering: bool,
    pub nonce: Option<Vec<u8>>,
    pub tsa: Option<Name>,
    pub extensions: Vec<Extension>,
}

impl TstInfo {
    /// Audit projection of this token.
    #[must_use]
    pub fn to_entry(&self) -> TimestampEntry {
        TimestampEntry {
            serial_number: self.serial_number.clone(),
            policy: self.policy.to_string(),
            hash_algorithm: self.message_imprint.hash_algorithm.to_string(),
            message_digest: hex::encode(&self.message_imprint.hashed_message),
            gen_time: self.gen_time,
            nonce: self.nonce.as_ref().map(hex::encode),
        }
    }
}

/// Granted token: the TSTInfo and its signed CMS `ContentInfo` DER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampToken {
    pub tst_info: TstInfo,
    pub signed_data: Vec<u8>,
}

/// Result of a timestamp request; a rejection carries no token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampResponse {
    pub status: PkiStatusInfo,
    pub token: Option<TimestampToken>,
}

impl TimestampResponse {
    #[must_use]
    pub fn rejected(fail_info: PkiFailureInfo, message: impl Into<String>) -> Self {
        Self {
            status: PkiStatusInfo::rejection(fail_info, message),
            token: None,
        }
    }

    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(
            self.status.status,
            PkiStatus::Granted | PkiStatus::GrantedWithMods
        ) && self.token.is_some()
    }
}
