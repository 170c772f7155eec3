//! Certificate profiles: validity policy and key usage selection.

use super::CertificatePolicy;
use crate::infra::error::{CaError, CaResult};
use chrono::Duration;
use openssl::x509::extension::{ExtendedKeyUsage, KeyUsage};
use openssl::x509::X509Extension;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `keyUsage` bits as configuration flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyUsageFlags {
    pub digital_signature: bool,
    pub content_commitment: bool,
    pub key_encipherment: bool,
    pub data_encipherment: bool,
    pub key_agreement: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
    pub encipher_only: bool,
    pub decipher_only: bool,
}

impl KeyUsageFlags {
    /// digitalSignature | keyEncipherment
    #[must_use]
    pub fn tls_server() -> Self {
        Self {
            digital_signature: true,
            key_encipherment: true,
            ..Self::default()
        }
    }

    /// keyCertSign | cRLSign
    #[must_use]
    pub fn ca() -> Self {
        Self {
            key_cert_sign: true,
            crl_sign: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Critical `keyUsage` extension.
    pub fn to_extension(&self) -> CaResult<X509Extension> {
        let mut ku = KeyUsage::new();
        ku.critical();
        if self.digital_signature {
            ku.digital_signature();
        }
        if self.content_commitment {
            ku.non_repudiation();
        }
        if self.key_encipherment {
            ku.key_encipherment();
        }
        if self.data_encipherment {
            ku.data_encipherment();
        }
        if self.key_agreement {
            ku.key_agreement();
        }
        if self.key_cert_sign {
            ku.key_cert_sign();
        }
        if self.crl_sign {
            ku.crl_sign();
        }
        if self.encipher_only {
            ku.encipher_only();
        }
        if self.decipher_only {
            ku.decipher_only();
        }
        Ok(ku.build()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedKeyUsagePurpose {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

/// `extendedKeyUsage` extension for a set of purposes, or `None` if empty.
///
/// The extension is marked critical when it carries `timeStamping` only, as
/// RFC 3161 §2.3 requires for TSA certificates.
pub fn extended_key_usage_extension(
    purposes: &[ExtendedKeyUsagePurpose],
) -> CaResult<Option<X509Extension>> {
    if purposes.is_empty() {
        return Ok(None);
    }
    let mut eku = ExtendedKeyUsage::new();
    if matches!(purposes, [ExtendedKeyUsagePurpose::TimeStamping]) {
        eku.critical();
    }
    for purpose in purposes {
        match purpose {
            ExtendedKeyUsagePurpose::ServerAuth => eku.server_auth(),
            ExtendedKeyUsagePurpose::ClientAuth => eku.client_auth(),
            ExtendedKeyUsagePurpose::CodeSigning => eku.code_signing(),
            ExtendedKeyUsagePurpose::EmailProtection => eku.email_protection(),
            ExtendedKeyUsagePurpose::TimeStamping => eku.time_stamping(),
            ExtendedKeyUsagePurpose::OcspSigning => eku.other("OCSPSigning"),
        };
    }
    Ok(Some(eku.build()?))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidityPolicy {
    /// Zero means no lower bound
    pub min_days: i64,
    /// Zero means no upper bound
    pub max_days: i64,
}

/// Certificate profile loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateProfile {
    pub name: String,
    pub description: String,
    pub validity: ValidityPolicy,
    pub key_usage: KeyUsageFlags,
    pub extended_key_usage: Vec<ExtendedKeyUsagePurpose>,
}

impl CertificateProfile {
    pub fn load(path: &Path) -> CaResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CaError::ConfigurationError(format!("Failed to read certificate profile: {e}"))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> CaResult<Self> {
        let profile: CertificateProfile = serde_yaml::from_str(content).map_err(|e| {
            CaError::ConfigurationError(format!("Failed to parse certificate profile YAML: {e}"))
        })?;
        if profile.name.is_empty() {
            return Err(CaError::InvalidConfig("Profile name is required".into()));
        }
        let v = &profile.validity;
        if v.min_days < 0 || v.max_days < 0 || (v.max_days > 0 && v.min_days > v.max_days) {
            return Err(CaError::InvalidConfig(format!(
                "Invalid validity range for profile {}: min {} max {}",
                profile.name, v.min_days, v.max_days
            )));
        }
        Ok(profile)
    }
}

impl CertificatePolicy for CertificateProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_validity(&self, validity: Duration) -> CaResult<()> {
        let max = Duration::try_days(self.validity.max_days);
        let min = Duration::try_days(self.validity.min_days);
        if self.validity.max_days > 0 && max.is_some_and(|max| validity > max) {
            return Err(CaError::ValidityPolicyViolation(format!(
                "requested validity of {} days exceeds maximum of {} days for profile {}",
                validity.num_days(),
                self.validity.max_days,
                self.name
            )));
        }
        if self.validity.min_days > 0 && min.map_or(true, |min| validity < min) {
            return Err(CaError::ValidityPolicyViolation(format!(
                "requested validity of {} days is below minimum of {} days for profile {}",
                validity.num_days(),
                self.validity.min_days,
                self.name
            )));
        }
        Ok(())
    }

    fn key_usage(&self) -> KeyUsageFlags {
        self.key_usage
    }

    fn extended_key_usage(&self) -> Vec<ExtendedKeyUsagePurpose> {
        self.extended_key_usage.clone()
    }
}
