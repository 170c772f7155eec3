//! CMS `SignedData` assembly for RFC 3161 timestamp tokens.
//!
//! Implements `SignedData` construction with one `SignerInfo` over an
//! `id-ct-TSTInfo` payload. The outer structure is concatenated by hand; leaf
//! values (OIDs, integers, algorithm identifiers) come from `der`.

use crate::domain::asn1_util::{der_constructed, der_tlv};
use crate::domain::constants::{
    ASN1_CONTEXT_0_CONSTRUCTED, ASN1_SEQUENCE_TAG, ASN1_SET_TAG, OID_CONTENT_TYPE,
    OID_CT_TST_INFO, OID_MESSAGE_DIGEST, OID_SIGNED_DATA, OID_SIGNING_CERTIFICATE_V2,
    OID_SIGNING_TIME,
};
use crate::domain::crypto::{chrono_to_x509_time, HashAlgorithm, PrivateKey, SignatureAlgorithm};
use crate::domain::serial::SerialNumber;
use crate::infra::error::{CaError, CaResult};
use crate::services::crypto_provider::CryptoProvider;
use chrono::Utc;
use der::asn1::{Any, ObjectIdentifier, OctetString};
use der::{Encode, Tag};
use openssl::x509::X509;
use spki::AlgorithmIdentifierOwned;
use std::sync::Arc;

const ASN1_OCTET_STRING_TAG: u8 = 0x04;
const CMS_VERSION_3: &[u8] = &[0x02, 0x01, 0x03];
const SIGNER_INFO_VERSION_1: &[u8] = &[0x02, 0x01, 0x01];

/// Signs an encoded TSTInfo into a timestamp token.
///
/// Returns the DER `ContentInfo`. Failures surface as `SigningFailed`.
pub trait TokenSigner: Send + Sync {
    fn sign_token(&self, tst_info_der: &[u8], include_certificate: bool) -> CaResult<Vec<u8>>;
}

/// Default signer: CMS `SignedData` signed through a [`CryptoProvider`].
pub struct CmsTokenSigner {
    certificate: X509,
    private_key: PrivateKey,
    provider: Arc<dyn CryptoProvider>,
}

impl CmsTokenSigner {
    #[must_use]
    pub fn new(certificate: X509, private_key: PrivateKey, provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            certificate,
            private_key,
            provider,
        }
    }

    fn signature_algorithm(&self) -> CaResult<SignatureAlgorithm> {
        let public_key = self.private_key.public_key()?;
        self.provider.signature_algorithm(&public_key)
    }

    /// Digest for `messageDigest`; pure EdDSA pairs with SHA-512 (RFC 8419).
    fn digest_algorithm(signature_algorithm: SignatureAlgorithm) -> HashAlgorithm {
        signature_algorithm.hash().unwrap_or(HashAlgorithm::Sha512)
    }

    fn build(&self, tst_info_der: &[u8], include_certificate: bool) -> CaResult<Vec<u8>> {
        let sig_alg = self.signature_algorithm()?;
        let digest_alg = Self::digest_algorithm(sig_alg);
        let digest_alg_der = AlgorithmIdentifierOwned {
            oid: digest_alg.oid(),
            parameters: Some(Any::new(Tag::Null, Vec::<u8>::new())?),
        }
        .to_der()?;

        let signed_attrs = self.build_signed_attributes(tst_info_der, digest_alg)?;
        let signature = self
            .provider
            .sign_data(&self.private_key, sig_alg, &signed_attrs)?;

        // encapContentInfo: eContentType + [0] EXPLICIT OCTET STRING
        let e_content = der_tlv(
            ASN1_CONTEXT_0_CONSTRUCTED,
            &der_tlv(ASN1_OCTET_STRING_TAG, tst_info_der),
        );
        let encap = der_constructed(
            ASN1_SEQUENCE_TAG,
            &[&OID_CT_TST_INFO.to_der()?, &e_content],
        );

        // signedAttrs travel as [0] IMPLICIT, signed as SET
        let mut implicit_attrs = signed_attrs;
        implicit_attrs[0] = ASN1_CONTEXT_0_CONSTRUCTED;

        let signer_info = der_constructed(
            ASN1_SEQUENCE_TAG,
            &[
                SIGNER_INFO_VERSION_1,
                &self.issuer_and_serial()?,
                &digest_alg_der,
                &implicit_attrs,
                &sig_alg.algorithm_identifier()?.to_der()?,
                &der_tlv(ASN1_OCTET_STRING_TAG, &signature),
            ],
        );

        let mut signed_data_parts: Vec<Vec<u8>> = vec![
            CMS_VERSION_3.to_vec(),
            der_tlv(ASN1_SET_TAG, &digest_alg_der),
            encap,
        ];
        if include_certificate {
            signed_data_parts.push(der_tlv(
                ASN1_CONTEXT_0_CONSTRUCTED,
                &self.certificate.to_der()?,
            ));
        }
        signed_data_parts.push(der_tlv(ASN1_SET_TAG, &signer_info));
        let signed_data = der_tlv(ASN1_SEQUENCE_TAG, &signed_data_parts.concat());

        Ok(der_constructed(
            ASN1_SEQUENCE_TAG,
            &[
                &OID_SIGNED_DATA.to_der()?,
                &der_tlv(ASN1_CONTEXT_0_CONSTRUCTED, &signed_data),
            ],
        ))
    }

    /// `SET OF Attribute` in DER order: contentType, signingTime,
    /// messageDigest and signingCertificateV2.
    fn build_signed_attributes(
        &self,
        tst_info_der: &[u8],
        digest_alg: HashAlgorithm,
    ) -> CaResult<Vec<u8>> {
        let content_type = OID_CT_TST_INFO.to_der()?;
        let signing_time = chrono_to_x509_time(Utc::now())?.to_der()?;
        let message_digest = OctetString::new(digest_alg.digest(tst_info_der))?.to_der()?;

        // ESSCertIDv2 with the default SHA-256 hashAlgorithm omitted
        let cert_hash = HashAlgorithm::Sha256.digest(&self.certificate.to_der()?);
        let ess_cert_id = der_tlv(ASN1_SEQUENCE_TAG, &OctetString::new(cert_hash)?.to_der()?);
        let signing_certificate = der_tlv(
            ASN1_SEQUENCE_TAG,
            &der_tlv(ASN1_SEQUENCE_TAG, &ess_cert_id),
        );

        let mut attributes = vec![
            attribute(OID_CONTENT_TYPE, &content_type)?,
            attribute(OID_SIGNING_TIME, &signing_time)?,
            attribute(OID_MESSAGE_DIGEST, &message_digest)?,
            attribute(OID_SIGNING_CERTIFICATE_V2, &signing_certificate)?,
        ];
        attributes.sort();
        Ok(der_tlv(ASN1_SET_TAG, &attributes.concat()))
    }

    fn issuer_and_serial(&self) -> CaResult<Vec<u8>> {
        let issuer = self.certificate.issuer_name().to_der()?;
        let serial = SerialNumber::from_certificate(&self.certificate)?
            .to_uint()?
            .to_der()?;
        Ok(der_constructed(ASN1_SEQUENCE_TAG, &[&issuer, &serial]))
    }
}

/// `Attribute ::= SEQUENCE { attrType OID, attrValues SET OF ANY }` with one
/// value.
fn attribute(oid: ObjectIdentifier, value_der: &[u8]) -> CaResult<Vec<u8>> {
    Ok(der_constructed(
        ASN1_SEQUENCE_TAG,
        &[&oid.to_der()?, &der_tlv(ASN1_SET_TAG, value_der)],
    ))
}

impl TokenSigner for CmsTokenSigner {
    fn sign_token(&self, tst_info_der: &[u8], include_certificate: bool) -> CaResult<Vec<u8>> {
        self.build(tst_info_der, include_certificate)
            .map_err(|e| CaError::SigningFailed(e.to_string()))
    }
}
