//! Key specifications and key material.
//!
//! Public and private keys are tagged unions over the three supported key
//! families. Code that branches on key shape matches on these enums instead of
//! inspecting the underlying `PKey` at runtime.

use crate::domain::crypto::HashAlgorithm;
use crate::infra::error::{CaError, CaResult};
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private, Public};
use openssl::x509::X509Ref;
use std::fmt;

/// Named elliptic curves usable for ECDSA keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            EcCurve::P256 => "P-256",
            EcCurve::P384 => "P-384",
            EcCurve::P521 => "P-521",
        }
    }

    #[must_use]
    pub fn nid(&self) -> Nid {
        match self {
            EcCurve::P256 => Nid::X9_62_PRIME256V1,
            EcCurve::P384 => Nid::SECP384R1,
            EcCurve::P521 => Nid::SECP521R1,
        }
    }

    /// Hash paired with the curve's security level.
    #[must_use]
    pub fn hash(&self) -> HashAlgorithm {
        match self {
            EcCurve::P256 => HashAlgorithm::Sha256,
            EcCurve::P384 => HashAlgorithm::Sha384,
            EcCurve::P521 => HashAlgorithm::Sha512,
        }
    }

    pub fn from_name(name: &str) -> CaResult<Self> {
        match name.to_ascii_uppercase().as_str() {
            "P-256" | "P256" | "PRIME256V1" | "SECP256R1" => Ok(EcCurve::P256),
            "P-384" | "P384" | "SECP384R1" => Ok(EcCurve::P384),
            "P-521" | "P521" | "SECP521R1" => Ok(EcCurve::P521),
            _ => Err(CaError::UnsupportedCurve(name.to_string())),
        }
    }

    #[must_use]
    pub fn from_nid(nid: Nid) -> Option<Self> {
        [EcCurve::P256, EcCurve::P384, EcCurve::P521]
            .into_iter()
            .find(|curve| curve.nid() == nid)
    }
}

/// Requested key algorithm and parameters.
///
/// Curve names are kept as strings so that unknown names surface as
/// `UnsupportedCurve` at generation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    Rsa { bits: u32 },
    Ecdsa { curve: String },
    EdDsa { curve: String },
}

impl KeySpec {
    #[must_use]
    pub fn rsa(bits: u32) -> Self {
        KeySpec::Rsa { bits }
    }

    #[must_use]
    pub fn ecdsa(curve: &str) -> Self {
        KeySpec::Ecdsa {
            curve: curve.to_string(),
        }
    }

    #[must_use]
    pub fn ed25519() -> Self {
        KeySpec::EdDsa {
            curve: "Ed25519".to_string(),
        }
    }

    /// Build a spec from an algorithm family name and its parameter, as found
    /// in configuration files and command-line flags.
    pub fn parse(algorithm: &str, parameter: Option<&str>) -> CaResult<Self> {
        match algorithm.to_ascii_uppercase().as_str() {
            "RSA" => {
                let bits = match parameter {
                    Some(p) => p.parse::<u32>().map_err(|e| {
                        CaError::InvalidConfig(format!("Invalid RSA key size '{p}': {e}"))
                    })?,
                    None => 3072,
                };
                Ok(KeySpec::Rsa { bits })
            }
            "ECDSA" | "EC" => Ok(KeySpec::Ecdsa {
                curve: parameter.unwrap_or("P-256").to_string(),
            }),
            "EDDSA" | "ED25519" => Ok(KeySpec::EdDsa {
                curve: parameter.unwrap_or("Ed25519").to_string(),
            }),
            other => Err(CaError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySpec::Rsa { bits } => write!(f, "RSA-{bits}"),
            KeySpec::Ecdsa { curve } => write!(f, "ECDSA-{}", curve.replace('-', "")),
            KeySpec::EdDsa { curve } => write!(f, "{curve}"),
        }
    }
}

/// Public key of one of the supported families
#[derive(Clone)]
pub enum PublicKey {
    Rsa(PKey<Public>),
    Ecdsa { key: PKey<Public>, curve: EcCurve },
    Ed25519(PKey<Public>),
}

impl PublicKey {
    #[must_use]
    pub fn as_pkey(&self) -> &PKey<Public> {
        match self {
            PublicKey::Rsa(key) | PublicKey::Ed25519(key) => key,
            PublicKey::Ecdsa { key, .. } => key,
        }
    }

    /// Family name used in audit records.
    #[must_use]
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            PublicKey::Rsa(_) => "RSA",
            PublicKey::Ecdsa { .. } => "ECDSA",
            PublicKey::Ed25519(_) => "Ed25519",
        }
    }

    #[must_use]
    pub fn bits(&self) -> u32 {
        self.as_pkey().bits()
    }

    pub fn from_pem(pem: &[u8]) -> CaResult<Self> {
        let pkey = PKey::public_key_from_pem(pem)
            .map_err(|e| CaError::UnsupportedKeyType(format!("Failed to parse public key: {e}")))?;
        Self::try_from(pkey)
    }

    pub fn from_der(der: &[u8]) -> CaResult<Self> {
        let pkey = PKey::public_key_from_der(der)
            .map_err(|e| CaError::UnsupportedKeyType(format!("Failed to parse public key: {e}")))?;
        Self::try_from(pkey)
    }

    /// Public key of a certificate.
    pub fn from_certificate(cert: &X509Ref) -> CaResult<Self> {
        Self::try_from(cert.public_key()?)
    }

    pub fn to_pem(&self) -> CaResult<Vec<u8>> {
        Ok(self.as_pkey().public_key_to_pem()?)
    }

    pub fn to_der(&self) -> CaResult<Vec<u8>> {
        Ok(self.as_pkey().public_key_to_der()?)
    }
}

impl TryFrom<PKey<Public>> for PublicKey {
    type Error = CaError;

    fn try_from(pkey: PKey<Public>) -> Result<Self, Self::Error> {
        match pkey.id() {
            Id::RSA => Ok(PublicKey::Rsa(pkey)),
            Id::EC => {
                let curve = ec_curve_of(&pkey)?;
                Ok(PublicKey::Ecdsa { key: pkey, curve })
            }
            Id::ED25519 => Ok(PublicKey::Ed25519(pkey)),
            other => Err(CaError::UnsupportedKeyType(format!("{other:?}"))),
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicKey::Rsa(key) => write!(f, "PublicKey(RSA-{})", key.bits()),
            PublicKey::Ecdsa { curve, .. } => write!(f, "PublicKey(ECDSA {})", curve.name()),
            PublicKey::Ed25519(_) => f.write_str("PublicKey(Ed25519)"),
        }
    }
}

/// Private key of one of the supported families
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(PKey<Private>),
    Ecdsa { key: PKey<Private>, curve: EcCurve },
    Ed25519(PKey<Private>),
}

impl PrivateKey {
    #[must_use]
    pub fn as_pkey(&self) -> &PKey<Private> {
        match self {
            PrivateKey::Rsa(key) | PrivateKey::Ed25519(key) => key,
            PrivateKey::Ecdsa { key, .. } => key,
        }
    }

    #[must_use]
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            PrivateKey::Rsa(_) => "RSA",
            PrivateKey::Ecdsa { .. } => "ECDSA",
            PrivateKey::Ed25519(_) => "Ed25519",
        }
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> CaResult<PublicKey> {
        let der = self.as_pkey().public_key_to_der()?;
        PublicKey::from_der(&der)
    }

    /// Whether this key belongs to the given certificate.
    pub fn matches_certificate(&self, cert: &X509Ref) -> CaResult<bool> {
        let cert_key = cert.public_key()?;
        Ok(cert_key.public_eq(self.as_pkey()))
    }

    /// PEM in PKCS#8 `PRIVATE KEY` form.
    pub fn to_pkcs8_pem(&self) -> CaResult<Vec<u8>> {
        Ok(self.as_pkey().private_key_to_pem_pkcs8()?)
    }

    pub fn from_pem(pem: &[u8]) -> CaResult<Self> {
        let pkey = PKey::private_key_from_pem(pem)
            .map_err(|e| CaError::CryptographicError(format!("Failed to parse private key: {e}")))?;
        Self::try_from(pkey)
    }
}

impl TryFrom<PKey<Private>> for PrivateKey {
    type Error = CaError;

    fn try_from(pkey: PKey<Private>) -> Result<Self, Self::Error> {
        match pkey.id() {
            Id::RSA => Ok(PrivateKey::Rsa(pkey)),
            Id::EC => {
                let curve = ec_curve_of(&pkey)?;
                Ok(PrivateKey::Ecdsa { key: pkey, curve })
            }
            Id::ED25519 => Ok(PrivateKey::Ed25519(pkey)),
            other => Err(CaError::NotASigner(format!("{other:?}"))),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKey::Rsa(key) => write!(f, "PrivateKey(RSA-{})", key.bits()),
            PrivateKey::Ecdsa { curve, .. } => write!(f, "PrivateKey(ECDSA {})", curve.name()),
            PrivateKey::Ed25519(_) => f.write_str("PrivateKey(Ed25519)"),
        }
    }
}

fn ec_curve_of<T: openssl::pkey::HasParams>(pkey: &PKey<T>) -> CaResult<EcCurve> {
    let ec = pkey.ec_key()?;
    ec.group()
        .curve_name()
        .and_then(EcCurve::from_nid)
        .ok_or_else(|| CaError::UnsupportedKeyType("EC key on an unsupported curve".into()))
}

/// Generated key material with its algorithm tag (e.g. `ECDSA-P256`)
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
    pub algorithm: String,
}
