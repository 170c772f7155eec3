//! Foundational cryptographic domain types.
//!
//! Provides strongly-typed wrappers for cryptographic artifacts including:
//! - Hash algorithms with their OID table
//! - Key specifications and tagged public/private key unions
//! - Signature algorithm selection results and signer options
//! - Certificate inspection, PEM and time conversion helpers

mod cert;
mod hash;
mod keys;
mod signature;

pub use cert::{
    certificate_from_pem, certificate_to_pem, chain_to_pem, chrono_to_generalized,
    chrono_to_x509_time, fingerprint_sha256, format_general_name, generalized_to_chrono,
    subject_name, subject_public_key_bits, time_to_chrono, to_asn1_time, to_x509_cert,
    CertificateDetails,
};
pub use hash::HashAlgorithm;
pub use keys::{EcCurve, KeyPair, KeySpec, PrivateKey, PublicKey};
pub use signature::{SignatureAlgorithm, SignerOpts};
