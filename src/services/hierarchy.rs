//! Root bootstrap and intermediate provisioning.

use crate::domain::audit::{CaAuditEntry, OP_INTERMEDIATE_CA_PROVISION, OP_ROOT_CA_BOOTSTRAP};
use crate::domain::constants::{BACKDATE_BUFFER_SECONDS, DEFAULT_CA_VALIDITY_DAYS, DEFAULT_ROOT_PATH_LEN};
use crate::domain::crypto::{
    certificate_to_pem, chain_to_pem, fingerprint_sha256, CertificateDetails, KeyPair, KeySpec,
    PrivateKey, PublicKey, SignatureAlgorithm,
};
use crate::domain::profile::{KeyUsageFlags, SubjectResolver};
use crate::domain::serial::SerialNumber;
use crate::domain::subject::{DistinguishedName, SubjectRequest};
use crate::infra::error::{CaError, CaResult};
use crate::services::cert_builder::{ca_basic_constraints, CertificateBuilder};
use crate::services::crypto_provider::CryptoProvider;
use crate::services::persistence::{save_ca, validate_ca_name};
use chrono::{DateTime, Duration, Utc};
use openssl::x509::{X509Ref, X509};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RootCaConfig {
    pub name: String,
    pub key_spec: KeySpec,
    pub validity: Duration,
    pub path_len_constraint: i32,
    pub organization: Option<String>,
    pub country: Option<String>,
    /// Persist certificate and key here when set
    pub output_dir: Option<PathBuf>,
}

impl RootCaConfig {
    /// ECDSA P-384, ten years, path length 2.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key_spec: KeySpec::ecdsa("P-384"),
            validity: Duration::days(DEFAULT_CA_VALIDITY_DAYS),
            path_len_constraint: DEFAULT_ROOT_PATH_LEN,
            organization: None,
            country: None,
            output_dir: None,
        }
    }
}

pub struct IntermediateCaConfig {
    pub name: String,
    pub key_spec: KeySpec,
    pub validity: Duration,
    pub path_len_constraint: i32,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub issuer_certificate: X509,
    pub issuer_key: PrivateKey,
    /// Resolves the intermediate's DN instead of `name`/`organization`/`country`
    pub subject_profile: Option<Arc<dyn SubjectResolver>>,
    pub output_dir: Option<PathBuf>,
}

impl IntermediateCaConfig {
    /// ECDSA P-256, five years, path length 0.
    #[must_use]
    pub fn new(name: &str, issuer_certificate: X509, issuer_key: PrivateKey) -> Self {
        Self {
            name: name.to_string(),
            key_spec: KeySpec::ecdsa("P-256"),
            validity: Duration::days(DEFAULT_CA_VALIDITY_DAYS / 2),
            path_len_constraint: 0,
            organization: None,
            country: None,
            issuer_certificate,
            issuer_key,
            subject_profile: None,
            output_dir: None,
        }
    }
}

/// Self-signed trust anchor.
#[derive(Debug, Clone)]
pub struct RootCa {
    name: String,
    certificate: X509,
    private_key: PrivateKey,
    public_key: PublicKey,
    certificate_pem: String,
    created_at: DateTime<Utc>,
}

impl RootCa {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    #[must_use]
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Subordinate CA signed by a root or another intermediate.
#[derive(Debug, Clone)]
pub struct IntermediateCa {
    name: String,
    certificate: X509,
    private_key: PrivateKey,
    public_key: PublicKey,
    certificate_pem: String,
    chain_pem: String,
    created_at: DateTime<Utc>,
}

impl IntermediateCa {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    #[must_use]
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    /// Intermediate followed by its issuer.
    #[must_use]
    pub fn chain_pem(&self) -> &str {
        &self.chain_pem
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Creates root and intermediate CAs through a [`CryptoProvider`].
pub struct CaHierarchyBuilder {
    provider: Arc<dyn CryptoProvider>,
}

impl CaHierarchyBuilder {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    pub fn bootstrap(&self, config: &RootCaConfig) -> CaResult<(RootCa, CaAuditEntry)> {
        validate_common(&config.name, config.validity, config.path_len_constraint)?;
        log::debug!(
            "Bootstrapping root CA '{}' with {} key",
            config.name,
            config.key_spec
        );

        let key_pair = self.generate_key_pair(&config.key_spec)?;
        let algorithm = self.signature_algorithm(&key_pair.public_key)?;
        let subject = distinguished_name(
            &config.name,
            config.organization.as_deref(),
            config.country.as_deref(),
        );

        let now = Utc::now();
        let not_before = now - Duration::seconds(BACKDATE_BUFFER_SECONDS);
        let not_after = now.checked_add_signed(config.validity).ok_or_else(|| {
            CaError::InvalidConfig(format!(
                "validity of {} days is out of range",
                config.validity.num_days()
            ))
        })?;

        let subject_name = subject.to_x509_name()?;
        let serial = SerialNumber::generate()?;
        let mut builder = CertificateBuilder::new(
            &subject_name,
            &serial,
            &key_pair.public_key,
            not_before,
            not_after,
            None,
        )?;
        builder.append(KeyUsageFlags::ca().to_extension()?)?;
        builder.append(ca_basic_constraints(path_len(config.path_len_constraint))?)?;
        builder.subject_key_identifier()?;
        let certificate =
            builder.sign(self.provider.as_ref(), &key_pair.private_key, algorithm)?;

        let audit = audit_entry(
            OP_ROOT_CA_BOOTSTRAP,
            &config.name,
            &certificate,
            &key_pair,
            config.path_len_constraint,
        )?;

        if let Some(dir) = &config.output_dir {
            save_ca(dir, &config.name, &certificate, &key_pair.private_key, None)?;
        }

        log::info!(
            "Bootstrapped root CA '{}' (serial {}, {})",
            config.name,
            audit.serial_number,
            key_pair.algorithm
        );

        let root = RootCa {
            name: config.name.clone(),
            certificate_pem: certificate_to_pem(&certificate)?,
            certificate,
            private_key: key_pair.private_key,
            public_key: key_pair.public_key,
            created_at: now,
        };
        Ok((root, audit))
    }

    pub fn provision(
        &self,
        config: &IntermediateCaConfig,
    ) -> CaResult<(IntermediateCa, CaAuditEntry)> {
        validate_common(&config.name, config.validity, config.path_len_constraint)?;
        let issuer: &X509Ref = &config.issuer_certificate;
        let issuer_details = CertificateDetails::from_x509(issuer)?;
        validate_issuer(&issuer_details, config.path_len_constraint)?;
        if !config.issuer_key.matches_certificate(issuer)? {
            return Err(CaError::InvalidConfig(
                "issuer key does not match issuer certificate".into(),
            ));
        }

        let subject = match &config.subject_profile {
            Some(profile) => {
                let mut request = SubjectRequest::with_common_name(&config.name);
                request.organization.extend(config.organization.clone());
                request.country.extend(config.country.clone());
                log::debug!("Resolving intermediate subject with profile '{}'", profile.name());
                profile.resolve(&request)?.dn
            }
            None => distinguished_name(
                &config.name,
                config.organization.as_deref(),
                config.country.as_deref(),
            ),
        };

        let key_pair = self.generate_key_pair(&config.key_spec)?;
        let issuer_public_key = config.issuer_key.public_key()?;
        let algorithm = self.signature_algorithm(&issuer_public_key)?;

        let now = Utc::now();
        let not_before = now - Duration::seconds(BACKDATE_BUFFER_SECONDS);
        let not_after = now
            .checked_add_signed(config.validity)
            .map_or(issuer_details.not_after, |t| t.min(issuer_details.not_after));

        let subject_name = subject.to_x509_name()?;
        let serial = SerialNumber::generate()?;
        let mut builder = CertificateBuilder::new(
            &subject_name,
            &serial,
            &key_pair.public_key,
            not_before,
            not_after,
            Some(issuer),
        )?;
        builder.append(KeyUsageFlags::ca().to_extension()?)?;
        builder.append(ca_basic_constraints(path_len(config.path_len_constraint))?)?;
        builder.subject_key_identifier()?;
        builder.authority_key_identifier()?;
        let certificate = builder.sign(self.provider.as_ref(), &config.issuer_key, algorithm)?;

        let audit = audit_entry(
            OP_INTERMEDIATE_CA_PROVISION,
            &config.name,
            &certificate,
            &key_pair,
            config.path_len_constraint,
        )?;
        let chain_pem = chain_to_pem(&[&*certificate, issuer])?;

        if let Some(dir) = &config.output_dir {
            save_ca(
                dir,
                &config.name,
                &certificate,
                &key_pair.private_key,
                Some(&chain_pem),
            )?;
        }

        log::info!(
            "Provisioned intermediate CA '{}' under '{}' (serial {})",
            config.name,
            issuer_details.subject,
            audit.serial_number
        );

        let intermediate = IntermediateCa {
            name: config.name.clone(),
            certificate_pem: certificate_to_pem(&certificate)?,
            chain_pem,
            certificate,
            private_key: key_pair.private_key,
            public_key: key_pair.public_key,
            created_at: now,
        };
        Ok((intermediate, audit))
    }

    fn generate_key_pair(&self, spec: &KeySpec) -> CaResult<KeyPair> {
        self.provider.generate_key_pair(spec).map_err(|e| match e {
            CaError::KeyGenerationFailed(_) => e,
            other => CaError::KeyGenerationFailed(format!("{spec}: {other}")),
        })
    }

    fn signature_algorithm(&self, key: &PublicKey) -> CaResult<SignatureAlgorithm> {
        self.provider
            .signature_algorithm(key)
            .map_err(|e| CaError::SignatureAlgorithmSelectionFailed(e.to_string()))
    }
}

fn validate_common(name: &str, validity: Duration, path_len_constraint: i32) -> CaResult<()> {
    validate_ca_name(name)?;
    if validity <= Duration::zero() {
        return Err(CaError::InvalidConfig("validity must be positive".into()));
    }
    if path_len_constraint < 0 {
        return Err(CaError::InvalidConfig(format!(
            "path length constraint must be non-negative, got {path_len_constraint}"
        )));
    }
    Ok(())
}

fn validate_issuer(issuer: &CertificateDetails, requested: i32) -> CaResult<()> {
    if !issuer.is_ca {
        return Err(CaError::InvalidConfig(format!(
            "issuer certificate '{}' is not a CA",
            issuer.subject
        )));
    }
    match issuer.max_path_len {
        Some(0) => Err(CaError::InvalidConfig(
            "issuer has path length 0, cannot sign subordinate CAs".into(),
        )),
        Some(limit) if requested >= i32::from(limit) => Err(CaError::InvalidConfig(format!(
            "path length {requested} must be less than issuer path length {limit}"
        ))),
        _ => Ok(()),
    }
}

fn path_len(constraint: i32) -> u32 {
    u32::try_from(constraint).unwrap_or(0)
}

fn distinguished_name(
    name: &str,
    organization: Option<&str>,
    country: Option<&str>,
) -> DistinguishedName {
    let mut dn = DistinguishedName::common_name(name);
    dn.organization.extend(organization.map(str::to_string));
    dn.country.extend(country.map(str::to_string));
    dn
}

fn audit_entry(
    operation: &str,
    name: &str,
    certificate: &X509Ref,
    key_pair: &KeyPair,
    path_len_constraint: i32,
) -> CaResult<CaAuditEntry> {
    let details = CertificateDetails::from_x509(certificate)?;
    Ok(CaAuditEntry {
        timestamp: Utc::now(),
        operation: operation.to_string(),
        ca_name: name.to_string(),
        serial_number: details.serial,
        subject_dn: details.subject,
        issuer_dn: details.issuer,
        not_before: details.not_before,
        not_after: details.not_after,
        key_algorithm: key_pair.algorithm.clone(),
        fingerprint: fingerprint_sha256(certificate)?,
        path_len_constraint,
    })
}
