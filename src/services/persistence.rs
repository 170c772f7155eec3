//! On-disk layout for CA material.
//!
//! ```text
//! <dir>/<name>.crt        PEM certificate
//! <dir>/<name>.key        PEM PKCS#8 private key (0600 on Unix)
//! <dir>/<name>-chain.crt  PEM chain, intermediates only
//! ```

use crate::domain::crypto::{certificate_to_pem, PrivateKey};
use crate::infra::error::{CaError, CaResult};
use openssl::x509::{X509Ref, X509};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Paths written for one CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCa {
    pub certificate_path: PathBuf,
    pub key_path: PathBuf,
    pub chain_path: Option<PathBuf>,
}

/// CA material read back from disk.
pub struct LoadedCa {
    pub certificate: X509,
    pub private_key: PrivateKey,
    /// Issuer chain above `certificate`, empty for a root
    pub chain: Vec<X509>,
}

/// A CA name becomes a file stem, so it must not be able to escape the
/// output directory.
pub fn validate_ca_name(name: &str) -> CaResult<()> {
    if name.trim().is_empty() {
        return Err(CaError::InvalidConfig("CA name is required".into()));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(CaError::InvalidConfig(format!(
            "CA name '{name}' cannot be used as a file name"
        )));
    }
    Ok(())
}

#[must_use]
pub fn certificate_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.crt"))
}

#[must_use]
pub fn key_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.key"))
}

#[must_use]
pub fn chain_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}-chain.crt"))
}

fn persistence_error(path: &Path, e: impl std::fmt::Display) -> CaError {
    CaError::Persistence {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn write_file(path: &Path, contents: &[u8], private: bool) -> CaResult<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).map_err(|e| persistence_error(path, e))?;
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|e| persistence_error(path, e))
}

/// Write certificate, key and optional chain for `name` under `dir`.
pub fn save_ca(
    dir: &Path,
    name: &str,
    certificate: &X509Ref,
    private_key: &PrivateKey,
    chain_pem: Option<&str>,
) -> CaResult<PersistedCa> {
    validate_ca_name(name)?;
    fs::create_dir_all(dir).map_err(|e| persistence_error(dir, e))?;

    let cert_path = certificate_path(dir, name);
    write_file(&cert_path, certificate_to_pem(certificate)?.as_bytes(), false)?;

    let key_file = key_path(dir, name);
    write_file(&key_file, &private_key.to_pkcs8_pem()?, true)?;

    let chain_file = match chain_pem {
        Some(pem) => {
            let path = chain_path(dir, name);
            write_file(&path, pem.as_bytes(), false)?;
            Some(path)
        }
        None => None,
    };

    log::info!("Saved CA '{name}' to {}", dir.display());
    Ok(PersistedCa {
        certificate_path: cert_path,
        key_path: key_file,
        chain_path: chain_file,
    })
}

/// Load the material written by [`save_ca`]. The chain file is optional; the
/// key must match the certificate.
pub fn load_ca(dir: &Path, name: &str) -> CaResult<LoadedCa> {
    validate_ca_name(name)?;

    let cert_path = certificate_path(dir, name);
    let cert_pem = fs::read(&cert_path).map_err(|e| persistence_error(&cert_path, e))?;
    let certificate = X509::from_pem(&cert_pem).map_err(|e| persistence_error(&cert_path, e))?;

    let key_file = key_path(dir, name);
    let key_pem = fs::read(&key_file).map_err(|e| persistence_error(&key_file, e))?;
    let private_key = PrivateKey::from_pem(&key_pem)?;
    if !private_key.matches_certificate(&certificate)? {
        return Err(CaError::InvalidConfig(format!(
            "Private key {} does not match certificate {}",
            key_file.display(),
            cert_path.display()
        )));
    }

    let chain_file = chain_path(dir, name);
    let chain = if chain_file.exists() {
        let pem = fs::read(&chain_file).map_err(|e| persistence_error(&chain_file, e))?;
        let mut certs = X509::stack_from_pem(&pem).map_err(|e| persistence_error(&chain_file, e))?;
        // the chain file starts with the CA itself
        if !certs.is_empty() && certs[0].to_der()? == certificate.to_der()? {
            certs.remove(0);
        }
        certs
    } else {
        Vec::new()
    };

    log::debug!("Loaded CA '{name}' from {}", dir.display());
    Ok(LoadedCa {
        certificate,
        private_key,
        chain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_safety() {
        validate_ca_name("issuing-ca-1").unwrap();
        for bad in ["", "  ", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(
                matches!(validate_ca_name(bad), Err(CaError::InvalidConfig(_))),
                "accepted unsafe name {bad:?}"
            );
        }
    }

    #[test]
    fn test_layout() {
        let dir = Path::new("/srv/pki");
        assert_eq!(certificate_path(dir, "root"), PathBuf::from("/srv/pki/root.crt"));
        assert_eq!(key_path(dir, "root"), PathBuf::from("/srv/pki/root.key"));
        assert_eq!(chain_path(dir, "sub"), PathBuf::from("/srv/pki/sub-chain.crt"));
    }

    #[test]
    fn test_missing_files_are_persistence_errors() {
        let err = load_ca(Path::new("/nonexistent/pki-ca-engine"), "root").err().unwrap();
        assert!(err.is_persistence());
    }
}
