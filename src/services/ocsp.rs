//! OCSP responder backed by a [`CrlService`].

use crate::domain::asn1_util::decode_strict;
use crate::domain::constants::{DEFAULT_OCSP_VALIDITY_HOURS, OID_OCSP_BASIC, OID_OCSP_NONCE, OID_SHA1, OID_SHA256};
use crate::domain::crypto::{
    chrono_to_generalized, subject_public_key_bits, to_x509_cert, CertificateDetails, HashAlgorithm,
    PrivateKey,
};
use crate::domain::ocsp::{
    BasicOcspResponse, CertId, CertStatusAsn1, OcspRequestAsn1, OcspResponseAsn1,
    OcspResponseStatus, Request, ResponderId, ResponseBytes, ResponseData, RevokedInfo,
    SingleResponse, TbsRequest,
};
use crate::domain::revocation::CertificateStatus;
use crate::domain::serial::SerialNumber;
use crate::infra::error::{CaError, CaResult};
use crate::services::crl::CrlService;
use crate::services::crypto_provider::CryptoProvider;
use chrono::{Duration, Utc};
use der::asn1::{Any, BitString, Null, OctetString};
use der::{Encode, Tag};
use openssl::x509::{X509Ref, X509};
use spki::AlgorithmIdentifierOwned;
use std::sync::Arc;
use x509_cert::ext::Extension;

pub struct OcspConfig {
    pub issuer_certificate: X509,
    /// The issuer itself or a delegated responder
    pub responder_certificate: X509,
    pub responder_key: PrivateKey,
    pub provider: Arc<dyn CryptoProvider>,
    pub validity: Duration,
}

impl OcspConfig {
    /// Responder is the issuer itself.
    #[must_use]
    pub fn new(
        issuer_certificate: X509,
        issuer_key: PrivateKey,
        provider: Arc<dyn CryptoProvider>,
    ) -> Self {
        Self {
            responder_certificate: issuer_certificate.clone(),
            issuer_certificate,
            responder_key: issuer_key,
            provider,
            validity: Duration::hours(DEFAULT_OCSP_VALIDITY_HOURS),
        }
    }
}

/// Parsed OCSP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspRequest {
    pub cert_ids: Vec<CertId>,
    /// `extnValue` of the nonce extension, echoed verbatim
    pub nonce: Option<Vec<u8>>,
}

impl OcspRequest {
    #[must_use]
    pub fn serial_numbers(&self) -> Vec<SerialNumber> {
        self.cert_ids
            .iter()
            .map(|id| SerialNumber::from_uint(&id.serial_number))
            .collect()
    }
}

/// Issuer hashes precomputed for CertID matching.
struct IssuerHashes {
    name: Vec<u8>,
    key: Vec<u8>,
}

impl IssuerHashes {
    fn compute(issuer: &X509Ref, digest: fn(&[u8]) -> Vec<u8>) -> CaResult<Self> {
        Ok(Self {
            name: digest(&issuer.subject_name().to_der()?),
            key: digest(&subject_public_key_bits(issuer)?),
        })
    }
}

fn sha1(data: &[u8]) -> Vec<u8> {
    openssl::sha::sha1(data).to_vec()
}

fn sha256(data: &[u8]) -> Vec<u8> {
    HashAlgorithm::Sha256.digest(data)
}

pub struct OcspService {
    config: OcspConfig,
    crl: Arc<CrlService>,
    embed_responder: bool,
    sha1_hashes: IssuerHashes,
    sha256_hashes: IssuerHashes,
}

impl OcspService {
    pub fn new(config: OcspConfig, crl: Arc<CrlService>) -> CaResult<Self> {
        let issuer = CertificateDetails::from_x509(&config.issuer_certificate)?;
        if !issuer.is_ca {
            return Err(CaError::InvalidConfig(format!(
                "OCSP issuer '{}' is not a CA",
                issuer.subject
            )));
        }
        if !config
            .responder_key
            .matches_certificate(&config.responder_certificate)?
        {
            return Err(CaError::InvalidConfig(
                "responder key does not match responder certificate".into(),
            ));
        }
        if config.validity <= Duration::zero() {
            return Err(CaError::InvalidConfig(
                "OCSP response validity must be positive".into(),
            ));
        }
        if Utc::now().checked_add_signed(config.validity).is_none() {
            return Err(CaError::InvalidConfig(format!(
                "OCSP response validity of {}h is out of range",
                config.validity.num_hours()
            )));
        }

        let embed_responder =
            config.responder_certificate.to_der()? != config.issuer_certificate.to_der()?;
        if embed_responder {
            log::debug!("Using delegated OCSP responder certificate");
        }

        Ok(Self {
            sha1_hashes: IssuerHashes::compute(&config.issuer_certificate, sha1)?,
            sha256_hashes: IssuerHashes::compute(&config.issuer_certificate, sha256)?,
            embed_responder,
            config,
            crl,
        })
    }

    /// Signed response for one certificate, CertID hashed with SHA-1.
    pub fn create_response(&self, certificate: Option<&X509Ref>) -> CaResult<Vec<u8>> {
        let certificate = certificate.ok_or(CaError::CertificateRequired)?;
        let cert_id = cert_id_for(certificate, &self.config.issuer_certificate)?;
        let status = if certificate.issuer_name().to_der()?
            == self.config.issuer_certificate.subject_name().to_der()?
        {
            self.crl.status_of(&SerialNumber::from_certificate(certificate)?)?
        } else {
            CertificateStatus::Unknown
        };
        self.sign_response(vec![(cert_id, status)], None)
    }

    pub fn parse_request(&self, der: &[u8]) -> CaResult<OcspRequest> {
        parse_request(der)
    }

    /// Answer a DER request. `lookup` maps a serial to the certificate the CA
    /// issued, if any.
    pub fn respond_to_request<F>(&self, der: &[u8], lookup: F) -> CaResult<Vec<u8>>
    where
        F: Fn(&SerialNumber) -> Option<X509>,
    {
        let request = parse_request(der)?;
        let mut answers = Vec::with_capacity(request.cert_ids.len());
        for cert_id in request.cert_ids {
            let serial = SerialNumber::from_uint(&cert_id.serial_number);
            let status = if !self.names_issuer(&cert_id) {
                log::warn!("OCSP request for {serial} names a different issuer");
                CertificateStatus::Unknown
            } else if lookup(&serial).is_none() {
                log::warn!("OCSP request for unknown serial {serial}");
                CertificateStatus::Unknown
            } else {
                self.crl.status_of(&serial)?
            };
            answers.push((cert_id, status));
        }
        self.sign_response(answers, request.nonce)
    }

    /// Unsigned error response such as `malformedRequest` or `internalError`.
    pub fn error_response(status: OcspResponseStatus) -> CaResult<Vec<u8>> {
        if status == OcspResponseStatus::Successful {
            return Err(CaError::InvalidRequest(
                "a successful response must carry response bytes".into(),
            ));
        }
        Ok(OcspResponseAsn1 {
            response_status: status,
            response_bytes: None,
        }
        .to_der()?)
    }

    fn names_issuer(&self, cert_id: &CertId) -> bool {
        let hashes = if cert_id.hash_algorithm.oid == OID_SHA1 {
            &self.sha1_hashes
        } else if cert_id.hash_algorithm.oid == OID_SHA256 {
            &self.sha256_hashes
        } else {
            return false;
        };
        cert_id.issuer_name_hash.as_bytes() == hashes.name.as_slice()
            && cert_id.issuer_key_hash.as_bytes() == hashes.key.as_slice()
    }

    fn sign_response(
        &self,
        answers: Vec<(CertId, CertificateStatus)>,
        nonce: Option<Vec<u8>>,
    ) -> CaResult<Vec<u8>> {
        let now = Utc::now();
        let this_update = chrono_to_generalized(now)?;
        let next_update = now
            .checked_add_signed(self.config.validity)
            .ok_or_else(|| CaError::InvalidConfig("OCSP nextUpdate is out of range".into()))?;
        let next_update = chrono_to_generalized(next_update)?;

        let responses = answers
            .into_iter()
            .map(|(cert_id, status)| {
                Ok(SingleResponse {
                    cert_id,
                    cert_status: status_to_asn1(&status)?,
                    this_update,
                    next_update: Some(next_update),
                    single_extensions: None,
                })
            })
            .collect::<CaResult<Vec<_>>>()?;

        let response_extensions = match nonce {
            Some(value) => Some(vec![Extension {
                extn_id: OID_OCSP_NONCE,
                critical: false,
                extn_value: OctetString::new(value)?,
            }]),
            None => None,
        };

        let responder_key_hash = sha1(&subject_public_key_bits(&self.config.responder_certificate)?);
        let tbs = ResponseData {
            version: 0,
            responder_id: ResponderId::ByKey(OctetString::new(responder_key_hash)?),
            produced_at: this_update,
            responses,
            response_extensions,
        };

        let responder_public_key = self.config.responder_key.public_key()?;
        let algorithm = self
            .config
            .provider
            .signature_algorithm(&responder_public_key)?;
        let signature =
            self.config
                .provider
                .sign_data(&self.config.responder_key, algorithm, &tbs.to_der()?)?;

        let certs = if self.embed_responder {
            Some(vec![to_x509_cert(&self.config.responder_certificate)?])
        } else {
            None
        };
        let basic = BasicOcspResponse {
            tbs_response_data: tbs,
            signature_algorithm: algorithm.algorithm_identifier()?,
            signature: BitString::from_bytes(&signature)?,
            certs,
        };

        let response = OcspResponseAsn1 {
            response_status: OcspResponseStatus::Successful,
            response_bytes: Some(ResponseBytes {
                response_type: OID_OCSP_BASIC,
                response: OctetString::new(basic.to_der()?)?,
            }),
        };
        Ok(response.to_der()?)
    }
}

fn status_to_asn1(status: &CertificateStatus) -> CaResult<CertStatusAsn1> {
    Ok(match status {
        CertificateStatus::Good => CertStatusAsn1::Good(Null),
        CertificateStatus::Revoked {
            revocation_time,
            reason,
        } => CertStatusAsn1::Revoked(RevokedInfo {
            revocation_time: chrono_to_generalized(*revocation_time)?,
            revocation_reason: Some(*reason),
        }),
        CertificateStatus::Unknown => CertStatusAsn1::Unknown(Null),
    })
}

fn sha1_algorithm() -> CaResult<AlgorithmIdentifierOwned> {
    Ok(AlgorithmIdentifierOwned {
        oid: OID_SHA1,
        parameters: Some(Any::new(Tag::Null, Vec::<u8>::new())?),
    })
}

/// SHA-1 CertID for `certificate` issued by `issuer`.
pub fn cert_id_for(certificate: &X509Ref, issuer: &X509Ref) -> CaResult<CertId> {
    let hashes = IssuerHashes::compute(issuer, sha1)?;
    Ok(CertId {
        hash_algorithm: sha1_algorithm()?,
        issuer_name_hash: OctetString::new(hashes.name)?,
        issuer_key_hash: OctetString::new(hashes.key)?,
        serial_number: SerialNumber::from_certificate(certificate)?.to_uint()?,
    })
}

/// Decode an OCSP request. Trailing bytes and an empty request list are
/// malformed.
pub fn parse_request(der: &[u8]) -> CaResult<OcspRequest> {
    let request: OcspRequestAsn1 = decode_strict(der, "OCSP request").map_err(|e| match e {
        CaError::TrailingData(what) => {
            CaError::MalformedRequest(format!("trailing data after {what}"))
        }
        other => other,
    })?;
    let tbs = request.tbs_request;
    if tbs.request_list.is_empty() {
        return Err(CaError::MalformedRequest(
            "OCSP request contains no certificate IDs".into(),
        ));
    }

    let nonce = tbs
        .request_extensions
        .iter()
        .flatten()
        .find(|ext| ext.extn_id == OID_OCSP_NONCE)
        .map(|ext| ext.extn_value.as_bytes().to_vec());
    Ok(OcspRequest {
        cert_ids: tbs.request_list.into_iter().map(|r| r.req_cert).collect(),
        nonce,
    })
}

/// Builds unsigned OCSP requests.
#[derive(Debug, Default)]
pub struct OcspRequestBuilder {
    cert_ids: Vec<CertId>,
    nonce: Option<Vec<u8>>,
}

impl OcspRequestBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_certificate(mut self, certificate: &X509Ref, issuer: &X509Ref) -> CaResult<Self> {
        self.cert_ids.push(cert_id_for(certificate, issuer)?);
        Ok(self)
    }

    /// Nonce octets; encoded as an OCTET STRING inside the extension.
    #[must_use]
    pub fn nonce(mut self, nonce: &[u8]) -> Self {
        self.nonce = Some(nonce.to_vec());
        self
    }

    pub fn build(self) -> CaResult<Vec<u8>> {
        if self.cert_ids.is_empty() {
            return Err(CaError::InvalidRequest(
                "an OCSP request needs at least one certificate".into(),
            ));
        }
        let request_extensions = match self.nonce {
            Some(nonce) => Some(vec![Extension {
                extn_id: OID_OCSP_NONCE,
                critical: false,
                extn_value: OctetString::new(OctetString::new(nonce)?.to_der()?)?,
            }]),
            None => None,
        };
        let request = OcspRequestAsn1 {
            tbs_request: TbsRequest {
                version: 0,
                requestor_name: None,
                request_list: self
                    .cert_ids
                    .into_iter()
                    .map(|req_cert| Request {
                        req_cert,
                        single_request_extensions: None,
                    })
                    .collect(),
                request_extensions,
            },
            optional_signature: None,
        };
        Ok(request.to_der()?)
    }
}
