//! Immutable audit records produced alongside CA operations.
//!
//! The engine never stores these; callers persist them wherever their audit
//! trail lives. All records serialize to JSON.

use crate::domain::serial::SerialNumber;
use crate::infra::error::{CaError, CaResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const OP_ROOT_CA_BOOTSTRAP: &str = "root_ca_bootstrap";
pub const OP_INTERMEDIATE_CA_PROVISION: &str = "intermediate_ca_provision";
pub const OP_CERTIFICATE_ISSUANCE: &str = "certificate_issuance";

/// Record of a root bootstrap or intermediate provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub ca_name: String,
    pub serial_number: SerialNumber,
    pub subject_dn: String,
    pub issuer_dn: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub key_algorithm: String,
    pub fingerprint: String,
    pub path_len_constraint: i32,
}

/// Record of an end-entity issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub issuer_name: String,
    pub serial_number: SerialNumber,
    pub subject_dn: String,
    pub subject_alt_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub key_algorithm: String,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub profile_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject_profile: String,
}

/// Record of a granted timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampEntry {
    pub serial_number: SerialNumber,
    pub policy: String,
    pub hash_algorithm: String,
    pub message_digest: String,
    pub gen_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

macro_rules! impl_to_json {
    ($($ty:ty),*) => {
        $(impl $ty {
            pub fn to_json(&self) -> CaResult<String> {
                serde_json::to_string_pretty(self)
                    .map_err(|e| CaError::Internal(format!("Failed to serialize audit entry: {e}")))
            }
        })*
    };
}

impl_to_json!(CaAuditEntry, IssuanceAuditEntry, TimestampEntry);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuance_entry_omits_empty_profiles() {
        let now = Utc::now();
        let entry = IssuanceAuditEntry {
            timestamp: now,
            operation: OP_CERTIFICATE_ISSUANCE.into(),
            issuer_name: "Issuing".into(),
            serial_number: SerialNumber::from_hex("0a1b").unwrap(),
            subject_dn: "CN=svc.example.com".into(),
            subject_alt_names: vec!["DNS:svc.example.com".into()],
            not_before: now,
            not_after: now,
            key_algorithm: "ECDSA".into(),
            fingerprint: "00".into(),
            profile_name: String::new(),
            subject_profile: String::new(),
        };

        let json = entry.to_json().unwrap();
        assert!(json.contains("\"serial_number\": \"0a1b\""));
        assert!(!json.contains("profile_name"));

        let back: IssuanceAuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
