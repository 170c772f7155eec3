//! RFC 3161 Time-Stamp Authority.
//!
//! `create_timestamp` never fails: malformed or unacceptable requests come
//! back as rejection responses carrying a `PKIFailureInfo` and a status
//! string, exactly as they would be sent on the wire.

use crate::domain::constants::TSP_VERSION_1;
use crate::domain::crypto::{subject_name, HashAlgorithm, PrivateKey};
use crate::domain::serial::SerialNumber;
use crate::domain::tsp::{
    Accuracy, PkiFailureInfo, PkiStatusInfo, TimestampRequest, TimestampResponse, TimestampToken,
    TstInfo,
};
use crate::infra::error::{CaError, CaResult};
use crate::services::crypto_provider::CryptoProvider;
use crate::services::timestamp_codec::encode_tst_info;
use crate::services::token_signer::{CmsTokenSigner, TokenSigner};
use chrono::{SubsecRound, Utc};
use der::asn1::ObjectIdentifier;
use openssl::x509::X509;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// TSA configuration.
#[derive(Clone)]
pub struct TsaConfig {
    /// TSA certificate, normally carrying a critical `timeStamping` EKU
    pub certificate: X509,
    pub private_key: PrivateKey,
    pub provider: Arc<dyn CryptoProvider>,
    /// Default policy, used when the request names none
    pub policy: ObjectIdentifier,
    /// Empty accepts any requested policy
    pub accepted_policies: Vec<ObjectIdentifier>,
    /// Empty defaults to SHA-256 only
    pub accepted_algorithms: Vec<HashAlgorithm>,
    pub accuracy: Option<Accuracy>,
    pub ordering: bool,
    /// Embed the TSA certificate even when the request does not ask for it
    pub include_certificate: bool,
    /// Put the TSA subject into `TSTInfo.tsa`
    pub include_tsa_name: bool,
    /// Overrides the default CMS signer
    pub token_signer: Option<Arc<dyn TokenSigner>>,
}

impl TsaConfig {
    /// Configuration with defaults for everything but the signing material.
    #[must_use]
    pub fn new(
        certificate: X509,
        private_key: PrivateKey,
        provider: Arc<dyn CryptoProvider>,
        policy: ObjectIdentifier,
    ) -> Self {
        Self {
            certificate,
            private_key,
            provider,
            policy,
            accepted_policies: Vec::new(),
            accepted_algorithms: Vec::new(),
            accuracy: None,
            ordering: false,
            include_certificate: false,
            include_tsa_name: false,
            token_signer: None,
        }
    }
}

pub struct TimestampAuthority {
    policy: ObjectIdentifier,
    accepted_policies: Vec<ObjectIdentifier>,
    accepted_algorithms: Vec<HashAlgorithm>,
    accuracy: Option<Accuracy>,
    ordering: bool,
    include_certificate: bool,
    tsa_name: Option<x509_cert::name::Name>,
    signer: Arc<dyn TokenSigner>,
    serial_counter: AtomicU64,
}

impl TimestampAuthority {
    pub fn new(config: TsaConfig) -> CaResult<Self> {
        if !config.private_key.matches_certificate(&config.certificate)? {
            return Err(CaError::InvalidConfig(
                "TSA private key does not match the TSA certificate".into(),
            ));
        }

        let accepted_algorithms = if config.accepted_algorithms.is_empty() {
            vec![HashAlgorithm::Sha256]
        } else {
            config.accepted_algorithms
        };

        let tsa_name = if config.include_tsa_name {
            Some(subject_name(&config.certificate)?)
        } else {
            None
        };

        let signer: Arc<dyn TokenSigner> = match config.token_signer {
            Some(signer) => signer,
            None => Arc::new(CmsTokenSigner::new(
                config.certificate,
                config.private_key,
                config.provider,
            )),
        };

        log::info!(
            "Time-stamp authority ready: policy {}, algorithms {:?}",
            config.policy,
            accepted_algorithms
        );

        Ok(Self {
            policy: config.policy,
            accepted_policies: config.accepted_policies,
            accepted_algorithms,
            accuracy: config.accuracy,
            ordering: config.ordering,
            include_certificate: config.include_certificate,
            tsa_name,
            signer,
            serial_counter: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn policy(&self) -> ObjectIdentifier {
        self.policy
    }

    #[must_use]
    pub fn accepted_algorithms(&self) -> &[HashAlgorithm] {
        &self.accepted_algorithms
    }

    /// Answer a timestamp request. Rejections are responses, never errors.
    pub fn create_timestamp(&self, request: Option<&TimestampRequest>) -> TimestampResponse {
        let Some(request) = request else {
            log::warn!("Timestamp request rejected: request is missing");
            return TimestampResponse::rejected(PkiFailureInfo::BadRequest, "request is missing");
        };

        if let Err(reason) = self.validate_request(request) {
            log::warn!("Timestamp request rejected: {reason}");
            return TimestampResponse::rejected(PkiFailureInfo::BadRequest, reason);
        }

        match self.build_token(request) {
            Ok(token) => {
                log::debug!(
                    "Granted timestamp serial {} for {} digest",
                    token.tst_info.serial_number,
                    token.tst_info.message_imprint.hash_algorithm
                );
                TimestampResponse {
                    status: PkiStatusInfo::granted(),
                    token: Some(token),
                }
            }
            Err(e) => {
                log::warn!("Timestamp token assembly failed: {e}");
                TimestampResponse::rejected(PkiFailureInfo::SystemFailure, e.to_string())
            }
        }
    }

    fn validate_request(&self, request: &TimestampRequest) -> Result<(), String> {
        let imprint = &request.message_imprint;
        if imprint.hashed_message.is_empty() {
            return Err("message imprint is empty".into());
        }
        if !self.accepted_algorithms.contains(&imprint.hash_algorithm) {
            return Err(format!(
                "unsupported hash algorithm: {}",
                imprint.hash_algorithm
            ));
        }
        let expected = imprint.hash_algorithm.digest_size();
        if imprint.hashed_message.len() != expected {
            return Err(format!(
                "hash length mismatch: expected {expected}, got {}",
                imprint.hashed_message.len()
            ));
        }
        if let Some(policy) = &request.req_policy {
            if !self.is_accepted_policy(policy) {
                return Err(format!("unaccepted policy: {policy}"));
            }
        }
        Ok(())
    }

    fn is_accepted_policy(&self, policy: &ObjectIdentifier) -> bool {
        self.accepted_policies.is_empty() || self.accepted_policies.contains(policy)
    }

    /// `(counter << 64) | random64`: unique per instance even if the random
    /// half repeats.
    fn next_serial(&self) -> CaResult<SerialNumber> {
        let counter = self.serial_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut random = [0u8; 8];
        OsRng
            .try_fill_bytes(&mut random)
            .map_err(|e| CaError::CryptographicError(format!("Failed to generate serial: {e}")))?;
        let value = (u128::from(counter) << 64) | u128::from(u64::from_be_bytes(random));
        Ok(SerialNumber::from_u128(value))
    }

    fn build_token(&self, request: &TimestampRequest) -> CaResult<TimestampToken> {
        let tst_info = TstInfo {
            version: TSP_VERSION_1,
            policy: request.req_policy.unwrap_or(self.policy),
            message_imprint: request.message_imprint.clone(),
            serial_number: self.next_serial()?,
            // whole seconds, as encoded
            gen_time: Utc::now().trunc_subsecs(0),
            accuracy: self.accuracy,
            ordering: self.ordering,
            nonce: request.nonce.clone(),
            tsa: self.tsa_name.clone(),
            extensions: Vec::new(),
        };

        let tst_info_der = encode_tst_info(&tst_info)?;
        let include_certificate = request.cert_req || self.include_certificate;
        let signed_data = self
            .signer
            .sign_token(&tst_info_der, include_certificate)
            .map_err(|e| match e {
                CaError::SigningFailed(_) => e,
                other => CaError::SigningFailed(other.to_string()),
            })?;

        Ok(TimestampToken {
            tst_info,
            signed_data,
        })
    }
}
