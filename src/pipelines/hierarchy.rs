//! `CaHierarchy`: builds a complete two-tier CA from one configuration.
//!
//! Steps:
//! 1. Bootstrap the root (`CaHierarchyBuilder::bootstrap`)
//! 2. Provision the issuing intermediate under it
//! 3. Issue a TSA certificate from the intermediate (critical `timeStamping` EKU)
//! 4. Wire the issuer, CRL, OCSP and time-stamp services to the intermediate

use crate::domain::audit::{CaAuditEntry, IssuanceAuditEntry};
use crate::domain::crypto::PrivateKey;
use crate::domain::profile::{
    CertificatePolicy, CertificateProfile, ExtendedKeyUsagePurpose, KeyUsageFlags,
    SubjectResolver,
};
use crate::domain::subject::SubjectRequest;
use crate::infra::config::{ConfigManager, EngineConfiguration};
use crate::infra::error::{CaResult, ResultExt};
use crate::services::crl::CrlService;
use crate::services::crypto_provider::CryptoProvider;
use crate::services::hierarchy::{CaHierarchyBuilder, IntermediateCa, RootCa};
use crate::services::issuer::{CertificateIssuer, CertificateRequest, IssuedCertificate, IssuingCaConfig};
use crate::services::ocsp::OcspService;
use crate::services::persistence::save_ca;
use crate::services::timestamp::TimestampAuthority;
use serde::Serialize;
use std::sync::Arc;

/// Audit records of one hierarchy build, in creation order.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyAudit {
    pub root: CaAuditEntry,
    pub intermediate: CaAuditEntry,
    pub tsa: IssuanceAuditEntry,
}

pub struct CaHierarchy {
    root: RootCa,
    intermediate: IntermediateCa,
    tsa_certificate: IssuedCertificate,
    issuer: CertificateIssuer,
    crl: Arc<CrlService>,
    ocsp: OcspService,
    tsa: TimestampAuthority,
    audit: HierarchyAudit,
}

impl CaHierarchy {
    pub fn build(config: &EngineConfiguration, provider: Arc<dyn CryptoProvider>) -> CaResult<Self> {
        ConfigManager::validate_config(config)?;
        let output_dir = config.output_dir.as_deref();
        let builder = CaHierarchyBuilder::new(provider.clone());

        let root_config = config.root.to_runtime(output_dir)?;
        let (root, root_audit) = builder
            .bootstrap(&root_config)
            .step("failed to bootstrap root CA")?;

        let intermediate_config = config.intermediate.to_runtime(
            root.certificate().to_owned(),
            root.private_key().clone(),
            output_dir,
        )?;
        let (intermediate, intermediate_audit) = builder
            .provision(&intermediate_config)
            .step("failed to provision intermediate CA")?;

        let issuing = |subject_profile: Option<Arc<dyn SubjectResolver>>,
                       certificate_profile: Option<Arc<dyn CertificatePolicy>>| IssuingCaConfig {
            name: intermediate.name().to_string(),
            certificate: intermediate.certificate().to_owned(),
            private_key: intermediate.private_key().clone(),
            provider: provider.clone(),
            subject_profile,
            certificate_profile,
        };

        let tsa_issuer = CertificateIssuer::new(issuing(None, Some(tsa_profile())))?;
        let tsa_keys = provider
            .generate_key_pair(&config.tsa.key.key_spec()?)
            .step("failed to generate TSA key")?;
        let (tsa_certificate, tsa_audit) = tsa_issuer
            .issue(&CertificateRequest::new(
                SubjectRequest::with_common_name(&config.tsa.name),
                tsa_keys.public_key.clone(),
                config.tsa.validity()?,
            ))
            .step("failed to issue TSA certificate")?;

        if let Some(dir) = output_dir {
            save_ca(
                dir,
                &config.tsa.name,
                &tsa_certificate.certificate,
                &tsa_keys.private_key,
                Some(&tsa_certificate.chain_pem),
            )?;
        }

        let issuer = CertificateIssuer::new(issuing(
            config.issuance.load_subject_profile()?,
            config.issuance.load_certificate_profile()?,
        ))?;

        let crl = Arc::new(CrlService::new(config.crl.to_runtime(
            intermediate.certificate().to_owned(),
            intermediate.private_key().clone(),
            provider.clone(),
        )?)?);
        let ocsp = OcspService::new(
            config.ocsp.to_runtime(
                intermediate.certificate().to_owned(),
                intermediate.private_key().clone(),
                provider.clone(),
            )?,
            crl.clone(),
        )?;
        let tsa = TimestampAuthority::new(config.tsa.to_runtime(
            tsa_certificate.certificate.clone(),
            tsa_keys.private_key,
            provider,
        )?)?;

        log::info!(
            "CA hierarchy ready: root '{}', intermediate '{}', TSA '{}'",
            root.name(),
            intermediate.name(),
            config.tsa.name
        );

        Ok(Self {
            root,
            intermediate,
            tsa_certificate,
            issuer,
            crl,
            ocsp,
            tsa,
            audit: HierarchyAudit {
                root: root_audit,
                intermediate: intermediate_audit,
                tsa: tsa_audit,
            },
        })
    }

    #[must_use]
    pub fn root(&self) -> &RootCa {
        &self.root
    }

    #[must_use]
    pub fn intermediate(&self) -> &IntermediateCa {
        &self.intermediate
    }

    #[must_use]
    pub fn tsa_certificate(&self) -> &IssuedCertificate {
        &self.tsa_certificate
    }

    #[must_use]
    pub fn issuer(&self) -> &CertificateIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn crl(&self) -> &Arc<CrlService> {
        &self.crl
    }

    #[must_use]
    pub fn ocsp(&self) -> &OcspService {
        &self.ocsp
    }

    #[must_use]
    pub fn tsa(&self) -> &TimestampAuthority {
        &self.tsa
    }

    #[must_use]
    pub fn audit(&self) -> &HierarchyAudit {
        &self.audit
    }

    /// Intermediate signing key, for callers that persist it elsewhere.
    #[must_use]
    pub fn issuing_key(&self) -> &PrivateKey {
        self.intermediate.private_key()
    }
}

fn tsa_profile() -> Arc<dyn CertificatePolicy> {
    Arc::new(CertificateProfile {
        name: "tsa".to_string(),
        description: "RFC 3161 time-stamping unit".to_string(),
        key_usage: KeyUsageFlags {
            digital_signature: true,
            content_commitment: true,
            ..KeyUsageFlags::default()
        },
        extended_key_usage: vec![ExtendedKeyUsagePurpose::TimeStamping],
        ..CertificateProfile::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::CertificateDetails;
    use crate::infra::config::KeySection;
    use crate::services::crypto_provider::SoftwareProvider;
    use openssl::nid::Nid;

    fn fast_config() -> EngineConfiguration {
        let mut config = EngineConfiguration::default();
        config.root.key = KeySection {
            algorithm: "ECDSA".into(),
            parameter: Some("P-256".into()),
        };
        config
    }

    #[test]
    fn test_build_links_every_service_to_the_intermediate() {
        let hierarchy =
            CaHierarchy::build(&fast_config(), Arc::new(SoftwareProvider::new())).unwrap();

        let intermediate = hierarchy.intermediate().certificate();
        let tsa_cert = &hierarchy.tsa_certificate().certificate;
        assert_eq!(
            tsa_cert.issuer_name().to_der().unwrap(),
            intermediate.subject_name().to_der().unwrap()
        );
        assert!(tsa_cert
            .verify(&intermediate.public_key().unwrap())
            .unwrap());
        assert_eq!(
            hierarchy.crl().issuer_certificate().to_der().unwrap(),
            intermediate.to_der().unwrap()
        );
        assert_eq!(
            hierarchy.issuer().certificate().to_der().unwrap(),
            intermediate.to_der().unwrap()
        );

        let audit = hierarchy.audit();
        assert_eq!(audit.root.path_len_constraint, 1);
        assert_eq!(audit.intermediate.path_len_constraint, 0);
        assert_eq!(audit.tsa.profile_name, "tsa");
    }

    #[test]
    fn test_tsa_certificate_is_timestamping_only() {
        let hierarchy =
            CaHierarchy::build(&fast_config(), Arc::new(SoftwareProvider::new())).unwrap();
        let tsa_cert = &hierarchy.tsa_certificate().certificate;
        let details = CertificateDetails::from_x509(tsa_cert).unwrap();
        assert!(!details.is_ca);

        let cn = tsa_cert
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_slice()
            .to_vec();
        let cn = String::from_utf8(cn).unwrap();
        assert_eq!(cn, "tsa");

        // extendedKeyUsage: critical, timeStamping
        let text = String::from_utf8(tsa_cert.to_text().unwrap()).unwrap();
        assert!(text.contains("X509v3 Extended Key Usage: critical"));
        assert!(text.contains("Time Stamping"));
    }

    #[test]
    fn test_invalid_config_fails_before_key_generation() {
        let mut config = fast_config();
        config.intermediate.path_len = 5;
        assert!(CaHierarchy::build(&config, Arc::new(SoftwareProvider::new())).is_err());
    }

    #[test]
    fn test_build_persists_material() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.output_dir = Some(dir.path().to_path_buf());
        CaHierarchy::build(&config, Arc::new(SoftwareProvider::new())).unwrap();

        for name in ["root-ca", "issuing-ca", "tsa"] {
            assert!(dir.path().join(format!("{name}.crt")).exists(), "{name}");
            crate::services::persistence::load_ca(dir.path(), name).unwrap();
        }
    }
}
