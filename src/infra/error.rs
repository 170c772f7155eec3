//! Error handling types and result definitions for CA engine operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for CA engine operations
pub type CaResult<T> = Result<T, CaError>;

/// Error kinds produced by the CA engine.
///
/// Protocol rejections (RFC 3161 rejections, OCSP `unknown`) are not errors;
/// they are returned as ordinary response values.
#[derive(Error, Debug, miette::Diagnostic)]
pub enum CaError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid key size: {bits} bits (minimum {minimum})")]
    InvalidKeySize { bits: u32, minimum: u32 },

    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    #[error("Key does not support signing: {0}")]
    NotASigner(String),

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Hash function required for {0}")]
    HashRequired(String),

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Signature algorithm selection failed: {0}")]
    SignatureAlgorithmSelectionFailed(String),

    #[error("Cryptographic error: {0}")]
    CryptographicError(String),

    #[error("Validity policy violation: {0}")]
    ValidityPolicyViolation(String),

    #[error("Subject policy violation: {0}")]
    SubjectPolicyViolation(String),

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serial number is required")]
    SerialRequired,

    #[error("Certificate {0} is already revoked")]
    AlreadyRevoked(String),

    #[error("Certificate is required")]
    CertificateRequired,

    #[error("Empty {0}")]
    EmptyRequest(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    #[error("Trailing data after {0}")]
    TrailingData(String),

    #[error("Cannot serialize a nil response")]
    NilResponse,

    #[error("Token signing failed: {0}")]
    SigningFailed(String),

    #[error("ASN.1 encoding/decoding error: {0}")]
    Asn1Error(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Failed to persist {}: {message}", .path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{step}: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<CaError>,
    },
}

impl CaError {
    /// Innermost error, skipping every `Step` wrapper.
    #[must_use]
    pub fn root_cause(&self) -> &CaError {
        let mut current = self;
        while let CaError::Step { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether this error came from writing CA material to disk.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self.root_cause(), CaError::Persistence { .. })
    }
}

impl From<openssl::error::ErrorStack> for CaError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        CaError::CryptographicError(error.to_string())
    }
}

impl From<der::Error> for CaError {
    fn from(error: der::Error) -> Self {
        CaError::Asn1Error(error.to_string())
    }
}

impl From<std::io::Error> for CaError {
    fn from(error: std::io::Error) -> Self {
        CaError::IoError(error.to_string())
    }
}

/// Attach a step description to a failing result.
pub trait ResultExt<T> {
    fn step(self, step: &str) -> CaResult<T>;
}

impl<T, E: Into<CaError>> ResultExt<T> for Result<T, E> {
    fn step(self, step: &str) -> CaResult<T> {
        self.map_err(|e| CaError::Step {
            step: step.to_string(),
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_steps() {
        let err: CaResult<()> = Err(CaError::SerialRequired);
        let wrapped = err
            .step("failed to revoke")
            .step("failed to process batch")
            .unwrap_err();

        assert!(matches!(wrapped.root_cause(), CaError::SerialRequired));
        assert_eq!(
            wrapped.to_string(),
            "failed to process batch: failed to revoke: Serial number is required"
        );
    }

    #[test]
    fn test_persistence_detection() {
        let err = CaError::Step {
            step: "persist".into(),
            source: Box::new(CaError::Persistence {
                path: PathBuf::from("/tmp/ca.key"),
                message: "permission denied".into(),
            }),
        };
        assert!(err.is_persistence());
        assert!(!CaError::VerificationFailed.is_persistence());
    }
}
