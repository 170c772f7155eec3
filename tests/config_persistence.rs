use chrono::Duration;
use pki_ca_engine::infra::config::{ConfigManager, EngineConfiguration, ExportFormat, KeySection};
use pki_ca_engine::services::{
    load_ca, CertificateIssuer, CertificateRequest, IssuingCaConfig, SoftwareProvider,
};
use pki_ca_engine::{CaError, CaHierarchy, CryptoProvider, KeySpec, SubjectRequest};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn config_init_creates_file_and_reloads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let manager = ConfigManager::with_path(&path);

    let created = manager.load_or_create_default().unwrap();
    assert!(path.exists());
    assert_eq!(manager.load().unwrap(), created);
}

#[test]
fn config_export_import_through_yaml() {
    let dir = TempDir::new().unwrap();
    let source = ConfigManager::with_path(dir.path().join("source.toml"));
    let mut config = EngineConfiguration::default();
    config.root.name = "corp-root".into();
    config.crl.starting_crl_number = 40;
    source.save(&config).unwrap();

    let yaml = source.export_config(ExportFormat::Yaml).unwrap();
    let target = ConfigManager::with_path(dir.path().join("target.toml"));
    target.import_config(&yaml, ExportFormat::Yaml).unwrap();
    assert_eq!(target.load().unwrap(), config);

    let json = source.export_config(ExportFormat::Json).unwrap();
    assert!(json.contains("\"corp-root\""));
}

#[test]
fn invalid_file_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[ocsp]\nvalidity_hours = 0\n").unwrap();
    assert!(matches!(
        ConfigManager::with_path(&path).load(),
        Err(CaError::ConfigurationError(_))
    ));

    std::fs::write(&path, "root = 5").unwrap();
    assert!(matches!(
        ConfigManager::with_path(&path).load(),
        Err(CaError::ConfigurationError(_))
    ));
}

#[test]
fn persisted_intermediate_keeps_issuing() {
    let dir = TempDir::new().unwrap();
    let mut config = EngineConfiguration::default();
    config.root.key = KeySection {
        algorithm: "ECDSA".into(),
        parameter: Some("P-256".into()),
    };
    config.output_dir = Some(dir.path().to_path_buf());
    let hierarchy = CaHierarchy::build(&config, Arc::new(SoftwareProvider::new())).unwrap();

    let loaded = load_ca(dir.path(), "issuing-ca").unwrap();
    assert_eq!(
        loaded.certificate.to_der().unwrap(),
        hierarchy.intermediate().certificate().to_der().unwrap()
    );
    assert_eq!(loaded.chain.len(), 1);
    assert_eq!(
        loaded.chain[0].to_der().unwrap(),
        hierarchy.root().certificate().to_der().unwrap()
    );

    let provider = Arc::new(SoftwareProvider::new());
    let issuer = CertificateIssuer::new(IssuingCaConfig {
        name: "issuing-ca".into(),
        certificate: loaded.certificate,
        private_key: loaded.private_key,
        provider: provider.clone(),
        subject_profile: None,
        certificate_profile: None,
    })
    .unwrap();
    let key = provider
        .generate_key_pair(&KeySpec::rsa(2048))
        .unwrap()
        .public_key;
    let (issued, _) = issuer
        .issue(&CertificateRequest::new(
            SubjectRequest::with_common_name("reloaded.example.com"),
            key,
            Duration::days(10),
        ))
        .unwrap();
    assert!(issued
        .certificate
        .verify(&hierarchy.intermediate().certificate().public_key().unwrap())
        .unwrap());

    let key_mode = {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(dir.path().join("issuing-ca.key")).unwrap();
            Some(meta.permissions().mode() & 0o777)
        }
        #[cfg(not(unix))]
        {
            None::<u32>
        }
    };
    if let Some(mode) = key_mode {
        assert_eq!(mode, 0o600);
    }
}

#[test]
fn missing_material_is_a_persistence_error() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        load_ca(dir.path(), "absent"),
        Err(CaError::Persistence { .. })
    ));
}
