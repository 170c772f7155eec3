//! PKI CA Engine Library
//!
//! A self-contained certificate authority: root and intermediate bootstrap,
//! end-entity issuance, CRL and OCSP revocation services, and an RFC 3161
//! time-stamp authority. All cryptography goes through a [`CryptoProvider`].

pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

pub use domain::crypto::{HashAlgorithm, KeyPair, KeySpec, PrivateKey, PublicKey, SignatureAlgorithm};
pub use domain::revocation::{CertificateStatus, RevocationReason, RevokedCertificate};
pub use domain::serial::SerialNumber;
pub use domain::subject::SubjectRequest;
pub use infra::config::{ConfigManager, EngineConfiguration, ExportFormat};
pub use infra::error::{CaError, CaResult};
pub use pipelines::CaHierarchy;
pub use services::{
    CaHierarchyBuilder, CertificateIssuer, CertificateRequest, CrlService, CryptoProvider,
    OcspService, SoftwareProvider, TimestampAuthority,
};
