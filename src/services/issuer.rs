//! End-entity certificate issuance.

use crate::domain::audit::{IssuanceAuditEntry, OP_CERTIFICATE_ISSUANCE};
use crate::domain::constants::BACKDATE_BUFFER_SECONDS;
use crate::domain::crypto::{
    certificate_to_pem, chain_to_pem, fingerprint_sha256, CertificateDetails, PrivateKey,
    PublicKey,
};
use crate::domain::profile::{
    extended_key_usage_extension, CertificatePolicy, ExtendedKeyUsagePurpose, KeyUsageFlags,
    SubjectResolver,
};
use crate::domain::serial::SerialNumber;
use crate::domain::subject::{ResolvedSubject, SubjectRequest};
use crate::infra::error::{CaError, CaResult, ResultExt};
use crate::services::cert_builder::{end_entity_basic_constraints, CertificateBuilder};
use crate::services::crypto_provider::CryptoProvider;
use chrono::{DateTime, Duration, Utc};
use openssl::asn1::{Asn1Object, Asn1OctetString};
use openssl::x509::{X509Extension, X509Ref, X509};
use std::sync::Arc;

/// The CA that signs end-entity certificates.
pub struct IssuingCaConfig {
    pub name: String,
    pub certificate: X509,
    pub private_key: PrivateKey,
    pub provider: Arc<dyn CryptoProvider>,
    pub subject_profile: Option<Arc<dyn SubjectResolver>>,
    pub certificate_profile: Option<Arc<dyn CertificatePolicy>>,
}

/// Extra extension copied verbatim into the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestExtension {
    /// Dotted OID
    pub oid: String,
    pub critical: bool,
    /// DER of the extension value (the content of `extnValue`)
    pub value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub subject: SubjectRequest,
    pub public_key: Option<PublicKey>,
    pub validity: Duration,
    pub extensions: Vec<RequestExtension>,
}

impl CertificateRequest {
    #[must_use]
    pub fn new(subject: SubjectRequest, public_key: PublicKey, validity: Duration) -> Self {
        Self {
            subject,
            public_key: Some(public_key),
            validity,
            extensions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate: X509,
    pub pem: String,
    /// Leaf followed by the issuing CA
    pub chain_pem: String,
    pub serial_hex: String,
    /// Hex SHA-256 of the DER
    pub fingerprint: String,
    pub issued_at: DateTime<Utc>,
}

pub struct CertificateIssuer {
    config: IssuingCaConfig,
    issuer_public_key: PublicKey,
    issuer_not_after: DateTime<Utc>,
    issuer_name: String,
}

impl CertificateIssuer {
    pub fn new(config: IssuingCaConfig) -> CaResult<Self> {
        if config.name.trim().is_empty() {
            return Err(CaError::InvalidConfig("CA name is required".into()));
        }
        let details = CertificateDetails::from_x509(&config.certificate)?;
        if !details.is_ca {
            return Err(CaError::InvalidConfig(format!(
                "certificate '{}' is not a CA certificate",
                details.subject
            )));
        }
        if !config.private_key.matches_certificate(&config.certificate)? {
            return Err(CaError::InvalidConfig(
                "private key does not match CA certificate".into(),
            ));
        }

        let issuer_name = config
            .certificate
            .subject_name()
            .entries_by_nid(openssl::nid::Nid::COMMONNAME)
            .next()
            .and_then(|entry| String::from_utf8(entry.data().as_slice().to_vec()).ok())
            .unwrap_or_else(|| config.name.clone());

        Ok(Self {
            issuer_public_key: config.private_key.public_key()?,
            issuer_not_after: details.not_after,
            issuer_name,
            config,
        })
    }

    #[must_use]
    pub fn certificate(&self) -> &X509Ref {
        &self.config.certificate
    }

    pub fn issue(
        &self,
        request: &CertificateRequest,
    ) -> CaResult<(IssuedCertificate, IssuanceAuditEntry)> {
        let public_key = self.validate_request(request).step("invalid request")?;
        let subject = self
            .resolve_subject(&request.subject)
            .step("failed to resolve subject")?;
        let serial = SerialNumber::generate().step("failed to generate serial number")?;

        let now = Utc::now();
        let not_before = now - Duration::seconds(BACKDATE_BUFFER_SECONDS);
        let not_after = now
            .checked_add_signed(request.validity)
            .map_or(self.issuer_not_after, |t| t.min(self.issuer_not_after));

        let (key_usage, extended_key_usage) = match &self.config.certificate_profile {
            Some(profile) => (profile.key_usage(), profile.extended_key_usage()),
            None => (
                KeyUsageFlags::tls_server(),
                vec![ExtendedKeyUsagePurpose::ServerAuth],
            ),
        };

        let algorithm = self
            .config
            .provider
            .signature_algorithm(&self.issuer_public_key)
            .step("failed to select signature algorithm")?;

        let certificate = self
            .build_certificate(
                &subject,
                &serial,
                public_key,
                not_before,
                not_after,
                key_usage,
                &extended_key_usage,
                &request.extensions,
            )
            .and_then(|builder| {
                builder.sign(
                    self.config.provider.as_ref(),
                    &self.config.private_key,
                    algorithm,
                )
            })
            .step("failed to create certificate")?;

        let details = CertificateDetails::from_x509(&certificate).step("failed to parse certificate")?;
        let pem = certificate_to_pem(&certificate)?;
        let chain_pem = chain_to_pem(&[&*certificate, &*self.config.certificate])?;
        let fingerprint = fingerprint_sha256(&certificate)?;

        let audit = IssuanceAuditEntry {
            timestamp: now,
            operation: OP_CERTIFICATE_ISSUANCE.to_string(),
            issuer_name: self.issuer_name.clone(),
            serial_number: serial.clone(),
            subject_dn: details.subject.clone(),
            subject_alt_names: subject.alt_name_strings(),
            not_before: details.not_before,
            not_after: details.not_after,
            key_algorithm: public_key.algorithm_name().to_string(),
            fingerprint: fingerprint.clone(),
            profile_name: self
                .config
                .certificate_profile
                .as_ref()
                .map(|p| p.name().to_string())
                .unwrap_or_default(),
            subject_profile: self
                .config
                .subject_profile
                .as_ref()
                .map(|p| p.name().to_string())
                .unwrap_or_default(),
        };

        log::info!(
            "Issued certificate {} for '{}' until {}",
            serial,
            details.subject,
            details.not_after
        );

        let issued = IssuedCertificate {
            certificate,
            pem,
            chain_pem,
            serial_hex: serial.to_hex(),
            fingerprint,
            issued_at: now,
        };
        Ok((issued, audit))
    }

    fn validate_request<'r>(&self, request: &'r CertificateRequest) -> CaResult<&'r PublicKey> {
        let public_key = request
            .public_key
            .as_ref()
            .ok_or_else(|| CaError::InvalidRequest("public key is required".into()))?;
        if request.validity <= Duration::zero() {
            return Err(CaError::ValidityPolicyViolation(
                "validity must be positive".into(),
            ));
        }
        if let Some(profile) = &self.config.certificate_profile {
            profile
                .validate_validity(request.validity)
                .step("validity validation failed")?;
        }
        Ok(public_key)
    }

    fn resolve_subject(&self, request: &SubjectRequest) -> CaResult<ResolvedSubject> {
        match &self.config.subject_profile {
            Some(profile) => {
                log::debug!("Resolving subject with profile '{}'", profile.name());
                profile.resolve(request)
            }
            None => ResolvedSubject::from_request(request),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_certificate(
        &self,
        subject: &ResolvedSubject,
        serial: &SerialNumber,
        public_key: &PublicKey,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        key_usage: KeyUsageFlags,
        extended_key_usage: &[ExtendedKeyUsagePurpose],
        extra: &[RequestExtension],
    ) -> CaResult<CertificateBuilder> {
        let subject_name = subject.dn.to_x509_name()?;
        let mut builder = CertificateBuilder::new(
            &subject_name,
            serial,
            public_key,
            not_before,
            not_after,
            Some(&self.config.certificate),
        )?;

        builder.append(end_entity_basic_constraints()?)?;
        if !key_usage.is_empty() {
            builder.append(key_usage.to_extension()?)?;
        }
        if let Some(eku) = extended_key_usage_extension(extended_key_usage)? {
            builder.append(eku)?;
        }
        builder.subject_key_identifier()?;
        builder.authority_key_identifier()?;
        let san = subject.alt_name_extension(&builder.context())?;
        if let Some(san) = san {
            builder.append(san)?;
        }
        for extension in extra {
            builder.append(raw_extension(extension)?)?;
        }
        Ok(builder)
    }
}

fn raw_extension(extension: &RequestExtension) -> CaResult<X509Extension> {
    let oid = Asn1Object::from_str(&extension.oid).map_err(|e| {
        CaError::InvalidRequest(format!("Invalid extension OID {}: {e}", extension.oid))
    })?;
    let value = Asn1OctetString::new_from_bytes(&extension.value)?;
    Ok(X509Extension::new_from_der(&oid, extension.critical, &value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::KeySpec;
    use crate::domain::profile::CertificateProfile;
    use crate::services::crypto_provider::SoftwareProvider;
    use crate::services::hierarchy::{CaHierarchyBuilder, RootCaConfig};

    fn issuer_with(profile: Option<Arc<dyn CertificatePolicy>>) -> CertificateIssuer {
        let provider = Arc::new(SoftwareProvider::new());
        let mut config = RootCaConfig::new("Issuer Root");
        config.key_spec = KeySpec::ecdsa("P-256");
        config.validity = Duration::days(30);
        let (root, _) = CaHierarchyBuilder::new(provider.clone())
            .bootstrap(&config)
            .unwrap();
        CertificateIssuer::new(IssuingCaConfig {
            name: "issuer".into(),
            certificate: root.certificate().to_owned(),
            private_key: root.private_key().clone(),
            provider,
            subject_profile: None,
            certificate_profile: profile,
        })
        .unwrap()
    }

    fn subscriber_key() -> PublicKey {
        SoftwareProvider::new()
            .generate_key_pair(&KeySpec::ed25519())
            .unwrap()
            .public_key
    }

    fn request(cn: &str) -> CertificateRequest {
        let mut subject = SubjectRequest::with_common_name(cn);
        subject.dns_names = vec![cn.to_string()];
        subject.ip_addresses = vec!["10.0.0.1".into()];
        CertificateRequest::new(subject, subscriber_key(), Duration::days(7))
    }

    #[test]
    fn test_issued_leaf() {
        let issuer = issuer_with(None);
        let (issued, audit) = issuer.issue(&request("svc.example.com")).unwrap();

        let details = CertificateDetails::from_x509(&issued.certificate).unwrap();
        assert!(!details.is_ca);
        assert!(details.basic_constraints_present);
        assert_eq!(issued.serial_hex, details.serial.to_hex());
        assert_eq!(
            details.subject_alt_names,
            vec!["DNS:svc.example.com", "IP:10.0.0.1"]
        );
        assert!(issued
            .certificate
            .verify(&issuer.certificate().public_key().unwrap())
            .unwrap());
        let text = String::from_utf8(issued.certificate.to_text().unwrap()).unwrap();
        assert!(text.contains("TLS Web Server Authentication"));

        assert_eq!(audit.issuer_name, "Issuer Root");
        assert_eq!(audit.key_algorithm, "Ed25519");
        assert_eq!(audit.subject_alt_names, details.subject_alt_names);
        assert_eq!(audit.fingerprint, issued.fingerprint);
        assert_eq!(X509::stack_from_pem(issued.chain_pem.as_bytes()).unwrap().len(), 2);
    }

    #[test]
    fn test_validity_clamped_to_issuer() {
        let issuer = issuer_with(None);
        let mut req = request("long.example.com");
        req.validity = Duration::days(3650);
        let (issued, _) = issuer.issue(&req).unwrap();
        let leaf = CertificateDetails::from_x509(&issued.certificate).unwrap();
        let ca = CertificateDetails::from_x509(issuer.certificate()).unwrap();
        assert!(leaf.not_after <= ca.not_after);

        // Past the end of representable time
        req.validity = Duration::days(100_000_000);
        let (issued, _) = issuer.issue(&req).unwrap();
        let leaf = CertificateDetails::from_x509(&issued.certificate).unwrap();
        assert_eq!(leaf.not_after, ca.not_after);
    }

    #[test]
    fn test_bad_ip_fails_with_root_cause() {
        let issuer = issuer_with(None);
        let mut req = request("svc.example.com");
        req.subject.ip_addresses.push("999.1.1.1".into());
        let err = issuer.issue(&req).unwrap_err();
        assert!(err.to_string().starts_with("failed to resolve subject"));
        assert!(matches!(err.root_cause(), CaError::InvalidIpAddress(_)));
    }

    #[test]
    fn test_missing_key_and_bad_validity() {
        let issuer = issuer_with(None);
        let mut req = request("svc.example.com");
        req.public_key = None;
        assert!(matches!(
            issuer.issue(&req).unwrap_err().root_cause(),
            CaError::InvalidRequest(_)
        ));

        let mut req = request("svc.example.com");
        req.validity = Duration::zero();
        assert!(matches!(
            issuer.issue(&req).unwrap_err().root_cause(),
            CaError::ValidityPolicyViolation(_)
        ));
    }

    #[test]
    fn test_profile_limits_validity() {
        let profile = CertificateProfile::from_yaml_str(
            "name: short-lived\nvalidity:\n  max_days: 3\nextended_key_usage: [client_auth]\n",
        )
        .unwrap();
        let issuer = issuer_with(Some(Arc::new(profile)));

        let err = issuer.issue(&request("svc.example.com")).unwrap_err();
        assert!(matches!(err.root_cause(), CaError::ValidityPolicyViolation(_)));

        let mut req = request("svc.example.com");
        req.validity = Duration::days(2);
        let (issued, audit) = issuer.issue(&req).unwrap();
        assert_eq!(audit.profile_name, "short-lived");
        let text = String::from_utf8(issued.certificate.to_text().unwrap()).unwrap();
        assert!(text.contains("TLS Web Client Authentication"));
    }

    #[test]
    fn test_extra_extension_is_appended() {
        let issuer = issuer_with(None);
        let mut req = request("svc.example.com");
        // OCSP no-check, value NULL
        req.extensions.push(RequestExtension {
            oid: "1.3.6.1.5.5.7.48.1.5".into(),
            critical: false,
            value: vec![0x05, 0x00],
        });
        let (issued, _) = issuer.issue(&req).unwrap();
        let parsed = crate::domain::crypto::to_x509_cert(&issued.certificate).unwrap();
        assert!(parsed
            .tbs_certificate
            .extensions
            .unwrap()
            .iter()
            .any(|e| e.extn_id.to_string() == "1.3.6.1.5.5.7.48.1.5"));
    }

    #[test]
    fn test_non_ca_certificate_is_rejected() {
        let issuer = issuer_with(None);
        let provider = Arc::new(SoftwareProvider::new());
        let leaf_pair = provider.generate_key_pair(&KeySpec::ecdsa("P-256")).unwrap();
        let (issued, _) = issuer
            .issue(&CertificateRequest::new(
                SubjectRequest::with_common_name("leaf"),
                leaf_pair.public_key.clone(),
                Duration::days(1),
            ))
            .unwrap();
        let result = CertificateIssuer::new(IssuingCaConfig {
            name: "leaf".into(),
            certificate: issued.certificate,
            private_key: leaf_pair.private_key,
            provider,
            subject_profile: None,
            certificate_profile: None,
        });
        assert!(matches!(result, Err(CaError::InvalidConfig(_))));
    }
}
