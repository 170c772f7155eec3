//! Policy profiles consumed by the issuer.
//!
//! The issuer only sees the [`SubjectResolver`] and [`CertificatePolicy`]
//! traits; [`SubjectProfile`] and [`CertificateProfile`] are the YAML-backed
//! implementations.

mod certificate;
mod subject;

pub use certificate::{
    extended_key_usage_extension, CertificateProfile, ExtendedKeyUsagePurpose, KeyUsageFlags,
    ValidityPolicy,
};
pub use subject::{SanConfig, SanPatterns, SubjectConstraints, SubjectProfile};

use crate::domain::subject::{ResolvedSubject, SubjectRequest};
use crate::infra::error::CaResult;

/// Resolves and validates a raw subject request.
pub trait SubjectResolver: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, request: &SubjectRequest) -> CaResult<ResolvedSubject>;
}

/// Validity and key-usage policy for issued certificates.
pub trait CertificatePolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Fails with `ValidityPolicyViolation` when the duration is out of range.
    fn validate_validity(&self, validity: chrono::Duration) -> CaResult<()>;

    fn key_usage(&self) -> KeyUsageFlags;

    fn extended_key_usage(&self) -> Vec<ExtendedKeyUsagePurpose>;
}
