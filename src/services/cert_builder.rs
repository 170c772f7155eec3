//! X.509 v3 certificate assembly on top of the OpenSSL builder.
//!
//! Shared by root bootstrap, intermediate provisioning and end-entity
//! issuance so that serial, validity and key identifier handling is the same
//! everywhere.

use crate::domain::crypto::{to_asn1_time, PrivateKey, PublicKey, SignatureAlgorithm};
use crate::domain::serial::SerialNumber;
use crate::infra::error::{CaError, CaResult};
use crate::services::crypto_provider::CryptoProvider;
use chrono::{DateTime, Utc};
use der::asn1::BitString;
use der::{Decode, Encode};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::x509::extension::{AuthorityKeyIdentifier, BasicConstraints, SubjectKeyIdentifier};
use openssl::x509::{X509Builder, X509Extension, X509NameRef, X509Ref, X509v3Context, X509};
use x509_cert::Certificate;

const X509_VERSION_3: i32 = 2;

/// `BasicConstraints` for a CA; `pathlen` is always written, zero included.
pub fn ca_basic_constraints(path_len: u32) -> CaResult<X509Extension> {
    Ok(BasicConstraints::new()
        .critical()
        .ca()
        .pathlen(path_len)
        .build()?)
}

/// Critical `BasicConstraints` with `CA:FALSE`.
pub fn end_entity_basic_constraints() -> CaResult<X509Extension> {
    Ok(BasicConstraints::new().critical().build()?)
}

pub struct CertificateBuilder {
    builder: X509Builder,
    issuer: Option<X509>,
}

impl CertificateBuilder {
    /// Start a certificate. `issuer` of `None` makes it self-signed.
    pub fn new(
        subject: &X509NameRef,
        serial: &SerialNumber,
        public_key: &PublicKey,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        issuer: Option<&X509Ref>,
    ) -> CaResult<Self> {
        if not_after <= not_before {
            return Err(CaError::ValidityPolicyViolation(format!(
                "NotAfter {not_after} is not after NotBefore {not_before}"
            )));
        }

        let mut builder = X509Builder::new()?;
        builder.set_version(X509_VERSION_3)?;
        let serial = serial.to_asn1_integer()?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(subject)?;
        match issuer {
            Some(issuer) => builder.set_issuer_name(issuer.subject_name())?,
            None => builder.set_issuer_name(subject)?,
        }
        builder.set_pubkey(public_key.as_pkey())?;
        let not_before = to_asn1_time(not_before)?;
        let not_after = to_asn1_time(not_after)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;

        Ok(Self {
            builder,
            issuer: issuer.map(X509Ref::to_owned),
        })
    }

    /// Extension context bound to this certificate and its issuer.
    pub fn context(&self) -> X509v3Context<'_> {
        self.builder.x509v3_context(self.issuer.as_deref(), None)
    }

    pub fn append(&mut self, extension: X509Extension) -> CaResult<()> {
        self.builder.append_extension(extension)?;
        Ok(())
    }

    pub fn subject_key_identifier(&mut self) -> CaResult<()> {
        let ski = SubjectKeyIdentifier::new().build(&self.context())?;
        self.append(ski)
    }

    /// AKI carrying the issuer's key identifier. Only meaningful with an
    /// issuer.
    pub fn authority_key_identifier(&mut self) -> CaResult<()> {
        if self.issuer.is_none() {
            return Err(CaError::Internal(
                "Authority key identifier requires an issuer certificate".into(),
            ));
        }
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&self.context())?;
        self.append(aki)
    }

    /// Sign the TBSCertificate through `provider` and re-parse the DER so the
    /// returned certificate is exactly what relying parties will see.
    ///
    /// OpenSSL only assembles the TBS here. The throwaway Ed25519 signature
    /// it needs to serialize is replaced before anything leaves this method.
    pub fn sign(
        mut self,
        provider: &dyn CryptoProvider,
        key: &PrivateKey,
        algorithm: SignatureAlgorithm,
    ) -> CaResult<X509> {
        let placeholder = PKey::generate_ed25519()?;
        self.builder.sign(&placeholder, MessageDigest::null())?;
        let assembled = Certificate::from_der(&self.builder.build().to_der()?)?;

        let signature_algorithm = algorithm.algorithm_identifier()?;
        let mut tbs_certificate = assembled.tbs_certificate;
        tbs_certificate.signature = signature_algorithm.clone();
        let tbs_der = tbs_certificate.to_der()?;
        let signature = provider
            .sign_data(key, algorithm, &tbs_der)
            .map_err(|e| CaError::CryptographicError(format!("Failed to sign certificate: {e}")))?;

        let certificate = Certificate {
            tbs_certificate,
            signature_algorithm,
            signature: BitString::from_bytes(&signature)?,
        };
        X509::from_der(&certificate.to_der()?).map_err(|e| {
            CaError::CertificateError(format!("Failed to parse signed certificate: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::{CertificateDetails, KeyPair, KeySpec, SignerOpts};
    use crate::domain::subject::DistinguishedName;
    use crate::services::crypto_provider::{CryptoProvider, SoftwareProvider};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProvider {
        inner: SoftwareProvider,
        signatures: AtomicUsize,
    }

    impl CryptoProvider for CountingProvider {
        fn generate_key_pair(&self, spec: &KeySpec) -> CaResult<KeyPair> {
            self.inner.generate_key_pair(spec)
        }

        fn sign(&self, key: &PrivateKey, digest: &[u8], opts: SignerOpts) -> CaResult<Vec<u8>> {
            self.signatures.fetch_add(1, Ordering::SeqCst);
            self.inner.sign(key, digest, opts)
        }

        fn verify(
            &self,
            key: &PublicKey,
            digest: &[u8],
            signature: &[u8],
            opts: SignerOpts,
        ) -> CaResult<()> {
            self.inner.verify(key, digest, signature, opts)
        }

        fn signature_algorithm(&self, key: &PublicKey) -> CaResult<SignatureAlgorithm> {
            self.inner.signature_algorithm(key)
        }
    }

    #[test]
    fn test_self_signed_with_explicit_zero_pathlen() {
        let provider = SoftwareProvider::new();
        let pair = provider.generate_key_pair(&KeySpec::ed25519()).unwrap();
        let name = DistinguishedName::common_name("Leafless Root").to_x509_name().unwrap();
        let now = Utc::now();

        let mut builder = CertificateBuilder::new(
            &name,
            &SerialNumber::generate().unwrap(),
            &pair.public_key,
            now,
            now + Duration::days(1),
            None,
        )
        .unwrap();
        builder.append(ca_basic_constraints(0).unwrap()).unwrap();
        builder.subject_key_identifier().unwrap();
        assert!(builder.authority_key_identifier().is_err());

        let cert = builder
            .sign(&provider, &pair.private_key, SignatureAlgorithm::PureEd25519)
            .unwrap();
        let details = CertificateDetails::from_x509(&cert).unwrap();
        assert!(details.is_ca);
        assert!(details.max_path_len_zero());
        assert!(cert.subject_key_id().is_some());
        assert!(cert.verify(pair.private_key.as_pkey()).unwrap());
    }

    #[test]
    fn test_inverted_validity_is_rejected() {
        let provider = SoftwareProvider::new();
        let pair = provider.generate_key_pair(&KeySpec::ecdsa("P-256")).unwrap();
        let name = DistinguishedName::common_name("x").to_x509_name().unwrap();
        let now = Utc::now();
        assert!(matches!(
            CertificateBuilder::new(
                &name,
                &SerialNumber::generate().unwrap(),
                &pair.public_key,
                now,
                now - Duration::seconds(1),
                None,
            ),
            Err(CaError::ValidityPolicyViolation(_))
        ));
    }

    #[test]
    fn test_signature_comes_from_provider() {
        let provider = CountingProvider::default();
        for spec in [KeySpec::rsa(2048), KeySpec::ecdsa("P-384")] {
            let pair = provider.generate_key_pair(&spec).unwrap();
            let algorithm = provider.signature_algorithm(&pair.public_key).unwrap();
            let name = DistinguishedName::common_name("Provider Root").to_x509_name().unwrap();
            let now = Utc::now();
            let builder = CertificateBuilder::new(
                &name,
                &SerialNumber::generate().unwrap(),
                &pair.public_key,
                now,
                now + Duration::days(1),
                None,
            )
            .unwrap();

            let before = provider.signatures.load(Ordering::SeqCst);
            let cert = builder.sign(&provider, &pair.private_key, algorithm).unwrap();
            assert_eq!(provider.signatures.load(Ordering::SeqCst), before + 1);
            assert!(cert.verify(pair.private_key.as_pkey()).unwrap());
            let parsed = Certificate::from_der(&cert.to_der().unwrap()).unwrap();
            assert_eq!(parsed.signature_algorithm.oid, algorithm.oid());
            assert_eq!(parsed.tbs_certificate.signature, parsed.signature_algorithm);
        }
    }
}
