//! Service layer module root.
//! Contains the CA components: key provider, hierarchy bootstrap, issuance,
//! revocation and timestamping.

pub mod cert_builder;
pub mod crl;
pub mod crypto_provider;
pub mod hierarchy;
pub mod issuer;
pub mod ocsp;
pub mod persistence;
pub mod timestamp;
pub mod timestamp_codec;
pub mod token_signer;

pub use crl::{crl_der_to_pem, CrlConfig, CrlService};
pub use crypto_provider::{CryptoProvider, SoftwareProvider};
pub use hierarchy::{CaHierarchyBuilder, IntermediateCa, IntermediateCaConfig, RootCa, RootCaConfig};
pub use issuer::{
    CertificateIssuer, CertificateRequest, IssuedCertificate, IssuingCaConfig, RequestExtension,
};
pub use ocsp::{cert_id_for, OcspConfig, OcspRequest, OcspRequestBuilder, OcspService};
pub use persistence::{load_ca, save_ca, LoadedCa, PersistedCa};
pub use timestamp::{TimestampAuthority, TsaConfig};
pub use timestamp_codec::{
    parse_timestamp_request, parse_timestamp_response, serialize_timestamp_request,
    serialize_timestamp_response,
};
pub use token_signer::{CmsTokenSigner, TokenSigner};
