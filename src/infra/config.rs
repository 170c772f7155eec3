//! Configuration management infrastructure.
//!
//! One TOML file describes the whole hierarchy: root, intermediate, issuance
//! defaults, CRL, OCSP and TSA settings. Sections convert into the runtime
//! configuration structs consumed by the services.

use crate::domain::constants::MAX_VALIDITY_DAYS;
use crate::domain::crypto::{HashAlgorithm, KeySpec, PrivateKey};
use crate::domain::profile::{CertificatePolicy, CertificateProfile, SubjectProfile, SubjectResolver};
use crate::domain::tsp::Accuracy;
use crate::infra::error::{CaError, CaResult};
use crate::services::crl::CrlConfig;
use crate::services::crypto_provider::CryptoProvider;
use crate::services::hierarchy::{IntermediateCaConfig, RootCaConfig};
use crate::services::ocsp::OcspConfig;
use crate::services::persistence::validate_ca_name;
use crate::services::timestamp::TsaConfig;
use chrono::Duration;
use der::asn1::ObjectIdentifier;
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Engine configuration with one section per component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    /// Where CA material is written; nothing is persisted when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub root: RootSection,
    pub intermediate: IntermediateSection,
    pub issuance: IssuanceSection,
    pub crl: CrlSection,
    pub ocsp: OcspSection,
    pub tsa: TsaSection,
}

/// Key family and its parameter (bits for RSA, curve otherwise)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySection {
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl KeySection {
    fn new(algorithm: &str, parameter: &str) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            parameter: Some(parameter.to_string()),
        }
    }

    pub fn key_spec(&self) -> CaResult<KeySpec> {
        KeySpec::parse(&self.algorithm, self.parameter.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootSection {
    pub name: String,
    pub key: KeySection,
    pub validity_days: i64,
    pub path_len: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Default for RootSection {
    fn default() -> Self {
        Self {
            name: "root-ca".to_string(),
            key: KeySection::new("ECDSA", "P-384"),
            validity_days: 3650 * 2,
            path_len: 1,
            organization: None,
            country: None,
        }
    }
}

impl RootSection {
    pub fn to_runtime(&self, output_dir: Option<&Path>) -> CaResult<RootCaConfig> {
        Ok(RootCaConfig {
            name: self.name.clone(),
            key_spec: self.key.key_spec()?,
            validity: validity_days("root", "validity_days", self.validity_days)?,
            path_len_constraint: self.path_len,
            organization: self.organization.clone(),
            country: self.country.clone(),
            output_dir: output_dir.map(Path::to_path_buf),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntermediateSection {
    pub name: String,
    pub key: KeySection,
    pub validity_days: i64,
    pub path_len: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// YAML subject profile resolving the intermediate's DN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_profile: Option<PathBuf>,
}

impl Default for IntermediateSection {
    fn default() -> Self {
        Self {
            name: "issuing-ca".to_string(),
            key: KeySection::new("ECDSA", "P-256"),
            validity_days: 3650,
            path_len: 0,
            organization: None,
            country: None,
            subject_profile: None,
        }
    }
}

impl IntermediateSection {
    pub fn to_runtime(
        &self,
        issuer_certificate: X509,
        issuer_key: PrivateKey,
        output_dir: Option<&Path>,
    ) -> CaResult<IntermediateCaConfig> {
        let subject_profile = match &self.subject_profile {
            Some(path) => Some(Arc::new(SubjectProfile::load(path)?) as Arc<dyn SubjectResolver>),
            None => None,
        };
        Ok(IntermediateCaConfig {
            name: self.name.clone(),
            key_spec: self.key.key_spec()?,
            validity: validity_days("intermediate", "validity_days", self.validity_days)?,
            path_len_constraint: self.path_len,
            organization: self.organization.clone(),
            country: self.country.clone(),
            issuer_certificate,
            issuer_key,
            subject_profile,
            output_dir: output_dir.map(Path::to_path_buf),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuanceSection {
    pub default_validity_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_profile: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_profile: Option<PathBuf>,
}

impl Default for IssuanceSection {
    fn default() -> Self {
        Self {
            default_validity_days: 90,
            subject_profile: None,
            certificate_profile: None,
        }
    }
}

impl IssuanceSection {
    pub fn default_validity(&self) -> CaResult<Duration> {
        validity_days("issuance", "default_validity_days", self.default_validity_days)
    }

    pub fn load_subject_profile(&self) -> CaResult<Option<Arc<dyn SubjectResolver>>> {
        match &self.subject_profile {
            Some(path) => Ok(Some(Arc::new(SubjectProfile::load(path)?) as Arc<dyn SubjectResolver>)),
            None => Ok(None),
        }
    }

    pub fn load_certificate_profile(&self) -> CaResult<Option<Arc<dyn CertificatePolicy>>> {
        match &self.certificate_profile {
            Some(path) => Ok(Some(
                Arc::new(CertificateProfile::load(path)?) as Arc<dyn CertificatePolicy>
            )),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrlSection {
    pub validity_hours: i64,
    pub next_update_buffer_hours: i64,
    pub starting_crl_number: u64,
}

impl Default for CrlSection {
    fn default() -> Self {
        Self {
            validity_hours: 24 * 7,
            next_update_buffer_hours: 24,
            starting_crl_number: 1,
        }
    }
}

impl CrlSection {
    pub fn to_runtime(
        &self,
        issuer_certificate: X509,
        private_key: PrivateKey,
        provider: Arc<dyn CryptoProvider>,
    ) -> CaResult<CrlConfig> {
        let mut config = CrlConfig::new(issuer_certificate, private_key, provider);
        config.validity = validity_hours("crl", "validity_hours", self.validity_hours)?;
        config.next_update_buffer = if self.next_update_buffer_hours > 0 {
            Some(validity_hours(
                "crl",
                "next_update_buffer_hours",
                self.next_update_buffer_hours,
            )?)
        } else {
            None
        };
        config.starting_crl_number = self.starting_crl_number;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcspSection {
    pub validity_hours: i64,
}

impl Default for OcspSection {
    fn default() -> Self {
        Self { validity_hours: 24 }
    }
}

impl OcspSection {
    pub fn to_runtime(
        &self,
        issuer_certificate: X509,
        issuer_key: PrivateKey,
        provider: Arc<dyn CryptoProvider>,
    ) -> CaResult<OcspConfig> {
        let mut config = OcspConfig::new(issuer_certificate, issuer_key, provider);
        config.validity = validity_hours("ocsp", "validity_hours", self.validity_hours)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TsaSection {
    pub name: String,
    pub key: KeySection,
    pub validity_days: i64,
    /// Dotted OID of the default TSA policy
    pub policy: String,
    pub accepted_policies: Vec<String>,
    pub accepted_algorithms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_millis: Option<u16>,
    pub ordering: bool,
    pub include_certificate: bool,
    pub include_tsa_name: bool,
}

impl Default for TsaSection {
    fn default() -> Self {
        Self {
            name: "tsa".to_string(),
            key: KeySection::new("ECDSA", "P-256"),
            validity_days: 1825,
            policy: "1.3.6.1.4.1.99999.1.1".to_string(),
            accepted_policies: Vec::new(),
            accepted_algorithms: vec![
                "sha256".to_string(),
                "sha384".to_string(),
                "sha512".to_string(),
            ],
            accuracy_seconds: Some(1),
            accuracy_millis: None,
            ordering: false,
            include_certificate: false,
            include_tsa_name: false,
        }
    }
}

/// Positive day count no longer than [`MAX_VALIDITY_DAYS`].
pub fn validity_days(section: &str, field: &str, days: i64) -> CaResult<Duration> {
    if days <= 0 || days > MAX_VALIDITY_DAYS {
        return Err(CaError::ConfigurationError(format!(
            "[{section}] {field} must be between 1 and {MAX_VALIDITY_DAYS}, got {days}"
        )));
    }
    Duration::try_days(days).ok_or_else(|| {
        CaError::ConfigurationError(format!("[{section}] {field} of {days} is out of range"))
    })
}

fn validity_hours(section: &str, field: &str, hours: i64) -> CaResult<Duration> {
    let max_hours = MAX_VALIDITY_DAYS * 24;
    if hours <= 0 || hours > max_hours {
        return Err(CaError::ConfigurationError(format!(
            "[{section}] {field} must be between 1 and {max_hours}, got {hours}"
        )));
    }
    Duration::try_hours(hours).ok_or_else(|| {
        CaError::ConfigurationError(format!("[{section}] {field} of {hours} is out of range"))
    })
}

fn parse_oid(value: &str) -> CaResult<ObjectIdentifier> {
    ObjectIdentifier::from_str(value)
        .map_err(|e| CaError::ConfigurationError(format!("Invalid policy OID '{value}': {e}")))
}

impl TsaSection {
    /// Lifetime of the TSA certificate.
    pub fn validity(&self) -> CaResult<Duration> {
        validity_days("tsa", "validity_days", self.validity_days)
    }

    pub fn policy_oid(&self) -> CaResult<ObjectIdentifier> {
        parse_oid(&self.policy)
    }

    pub fn hash_algorithms(&self) -> CaResult<Vec<HashAlgorithm>> {
        self.accepted_algorithms
            .iter()
            .map(|name| name.parse::<HashAlgorithm>())
            .collect()
    }

    #[must_use]
    pub fn accuracy(&self) -> Option<Accuracy> {
        if self.accuracy_seconds.is_none() && self.accuracy_millis.is_none() {
            return None;
        }
        Some(Accuracy {
            seconds: self.accuracy_seconds,
            millis: self.accuracy_millis,
            micros: None,
        })
    }

    pub fn to_runtime(
        &self,
        certificate: X509,
        private_key: PrivateKey,
        provider: Arc<dyn CryptoProvider>,
    ) -> CaResult<TsaConfig> {
        let mut config = TsaConfig::new(certificate, private_key, provider, self.policy_oid()?);
        config.accepted_policies = self
            .accepted_policies
            .iter()
            .map(|p| parse_oid(p))
            .collect::<CaResult<_>>()?;
        config.accepted_algorithms = self.hash_algorithms()?;
        config.accuracy = self.accuracy();
        config.ordering = self.ordering;
        config.include_certificate = self.include_certificate;
        config.include_tsa_name = self.include_tsa_name;
        Ok(config)
    }
}

/// Configuration manager for handling config files
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager with default path
    pub fn new() -> CaResult<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Create a configuration manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn default_config_path() -> CaResult<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Ok(config_dir.join("pki-ca-engine").join("config.toml"))
        } else {
            Ok(PathBuf::from("pki-ca-engine.toml"))
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load_or_create_default(&self) -> CaResult<EngineConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::info!(
                "Configuration file not found, creating default: {}",
                self.config_path.display()
            );
            let default_config = EngineConfiguration::default();
            self.save(&default_config)?;
            Ok(default_config)
        }
    }

    pub fn load(&self) -> CaResult<EngineConfiguration> {
        log::info!("Loading configuration from: {}", self.config_path.display());

        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            CaError::ConfigurationError(format!(
                "Failed to read config file {}: {e}",
                self.config_path.display()
            ))
        })?;

        let config: EngineConfiguration = toml::from_str(&content)
            .map_err(|e| CaError::ConfigurationError(format!("Failed to parse config file: {e}")))?;

        Self::validate_config(&config)?;
        Ok(config)
    }

    pub fn save(&self, config: &EngineConfiguration) -> CaResult<()> {
        Self::validate_config(config)?;
        log::info!("Saving configuration to: {}", self.config_path.display());

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CaError::ConfigurationError(format!(
                    "Failed to create config directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| CaError::ConfigurationError(format!("Failed to serialize config: {e}")))?;

        fs::write(&self.config_path, content).map_err(|e| {
            CaError::ConfigurationError(format!(
                "Failed to write config file {}: {e}",
                self.config_path.display()
            ))
        })?;

        Ok(())
    }

    /// Check every section before any key is generated.
    pub fn validate_config(config: &EngineConfiguration) -> CaResult<()> {
        let invalid = |msg: String| Err(CaError::ConfigurationError(msg));

        for (section, name, key, days) in [
            ("root", &config.root.name, &config.root.key, config.root.validity_days),
            (
                "intermediate",
                &config.intermediate.name,
                &config.intermediate.key,
                config.intermediate.validity_days,
            ),
            ("tsa", &config.tsa.name, &config.tsa.key, config.tsa.validity_days),
        ] {
            validate_ca_name(name)
                .map_err(|e| CaError::ConfigurationError(format!("[{section}] {e}")))?;
            key.key_spec()
                .map_err(|e| CaError::ConfigurationError(format!("[{section}] {e}")))?;
            validity_days(section, "validity_days", days)?;
        }

        if config.root.path_len < 0 {
            return invalid("[root] path_len must not be negative".into());
        }
        if config.root.path_len == 0 {
            return invalid("[root] path_len 0 leaves no room for an intermediate".into());
        }
        if config.intermediate.path_len < 0 || config.intermediate.path_len >= config.root.path_len
        {
            return invalid(format!(
                "[intermediate] path_len must be between 0 and {}",
                config.root.path_len - 1
            ));
        }

        config.issuance.default_validity()?;

        validity_hours("crl", "validity_hours", config.crl.validity_hours)?;
        if config.crl.validity_hours <= config.crl.next_update_buffer_hours.max(0) {
            return invalid("[crl] validity_hours must exceed next_update_buffer_hours".into());
        }
        validity_hours("ocsp", "validity_hours", config.ocsp.validity_hours)?;

        config.tsa.policy_oid()?;
        for policy in &config.tsa.accepted_policies {
            parse_oid(policy)?;
        }
        config
            .tsa
            .hash_algorithms()
            .map_err(|e| CaError::ConfigurationError(format!("[tsa] {e}")))?;

        Ok(())
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Export configuration as a portable format
    pub fn export_config(&self, format: ExportFormat) -> CaResult<String> {
        let config = self.load()?;
        format.render(&config)
    }

    /// Import configuration from a string
    pub fn import_config(&self, content: &str, format: ExportFormat) -> CaResult<()> {
        let config: EngineConfiguration = match format {
            ExportFormat::Toml => toml::from_str(content)
                .map_err(|e| CaError::ConfigurationError(format!("TOML import failed: {e}")))?,
            ExportFormat::Json => serde_json::from_str(content)
                .map_err(|e| CaError::ConfigurationError(format!("JSON import failed: {e}")))?,
            ExportFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| CaError::ConfigurationError(format!("YAML import failed: {e}")))?,
        };
        self.save(&config)
    }
}

/// Configuration export/import formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Toml,
    Json,
    Yaml,
}

impl ExportFormat {
    pub fn render(self, config: &EngineConfiguration) -> CaResult<String> {
        match self {
            ExportFormat::Toml => toml::to_string_pretty(config)
                .map_err(|e| CaError::ConfigurationError(format!("TOML export failed: {e}"))),
            ExportFormat::Json => serde_json::to_string_pretty(config)
                .map_err(|e| CaError::ConfigurationError(format!("JSON export failed: {e}"))),
            ExportFormat::Yaml => serde_yaml::to_string(config)
                .map_err(|e| CaError::ConfigurationError(format!("YAML export failed: {e}"))),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "toml" => Ok(ExportFormat::Toml),
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            other => Err(CaError::ConfigurationError(format!(
                "Unknown export format: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        ConfigManager::validate_config(&EngineConfiguration::default()).unwrap();
    }

    #[test]
    fn test_toml_keeps_sections() {
        let mut config = EngineConfiguration::default();
        config.root.organization = Some("Example Corp".into());
        config.tsa.accepted_policies = vec!["1.3.6.1.4.1.99999.1.2".into()];

        let rendered = ExportFormat::Toml.render(&config).unwrap();
        assert!(rendered.contains("[root.key]"));
        assert!(rendered.contains("[tsa]"));
        let back: EngineConfiguration = toml::from_str(&rendered).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: EngineConfiguration =
            toml::from_str("[root]\nname = \"corp-root\"\npath_len = 3\n").unwrap();
        assert_eq!(config.root.name, "corp-root");
        assert_eq!(config.root.path_len, 3);
        assert_eq!(config.root.key, KeySection::new("ECDSA", "P-384"));
        assert_eq!(config.crl.starting_crl_number, 1);
    }

    #[test]
    fn test_validation_rejects_bad_sections() {
        let mut config = EngineConfiguration::default();
        config.intermediate.path_len = config.root.path_len;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = EngineConfiguration::default();
        config.crl.validity_hours = 12;
        config.crl.next_update_buffer_hours = 12;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = EngineConfiguration::default();
        config.tsa.policy = "not-an-oid".into();
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = EngineConfiguration::default();
        config.tsa.accepted_algorithms = vec!["md5".into()];
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = EngineConfiguration::default();
        config.root.name = "../escape".into();
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = EngineConfiguration::default();
        config.root.key = KeySection::new("DSA", "1024");
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_validity_bounds() {
        let mut config = EngineConfiguration::default();
        config.root.validity_days = 100_000_000_000;
        assert!(matches!(
            ConfigManager::validate_config(&config),
            Err(CaError::ConfigurationError(_))
        ));
        assert!(config.root.to_runtime(None).is_err());

        let mut config = EngineConfiguration::default();
        config.issuance.default_validity_days = MAX_VALIDITY_DAYS + 1;
        assert!(ConfigManager::validate_config(&config).is_err());
        assert!(config.issuance.default_validity().is_err());

        let mut config = EngineConfiguration::default();
        config.ocsp.validity_hours = i64::MAX;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = EngineConfiguration::default();
        config.crl.validity_hours = i64::MAX;
        config.crl.next_update_buffer_hours = i64::MAX - 1;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = EngineConfiguration::default();
        config.tsa.validity_days = MAX_VALIDITY_DAYS;
        assert!(ConfigManager::validate_config(&config).is_ok());
        assert_eq!(config.tsa.validity().unwrap(), Duration::days(MAX_VALIDITY_DAYS));

        assert!(validity_days("issue", "--days", 0).is_err());
        assert!(validity_days("issue", "--days", i64::MAX).is_err());
        assert_eq!(validity_days("issue", "--days", 90).unwrap(), Duration::days(90));
    }

    #[test]
    fn test_runtime_conversion() {
        let config = EngineConfiguration::default();
        let root = config.root.to_runtime(Some(Path::new("/tmp/pki"))).unwrap();
        assert_eq!(root.key_spec, KeySpec::ecdsa("P-384"));
        assert_eq!(root.validity, Duration::days(7300));
        assert_eq!(root.output_dir, Some(PathBuf::from("/tmp/pki")));

        assert_eq!(config.tsa.hash_algorithms().unwrap().len(), 3);
        assert_eq!(config.tsa.accuracy().unwrap().seconds, Some(1));
    }

    #[test]
    fn test_export_format_names() {
        assert_eq!("YAML".parse::<ExportFormat>().unwrap(), ExportFormat::Yaml);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
