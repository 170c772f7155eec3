//! Certificate inspection and encoding helpers.

use crate::domain::constants::{OID_BASIC_CONSTRAINTS, OID_KEY_USAGE, OID_SUBJECT_ALT_NAME};
use crate::domain::serial::SerialNumber;
use crate::infra::error::{CaError, CaResult};
use chrono::{DateTime, Utc};
use der::Decode;
use openssl::asn1::Asn1Time;
use openssl::x509::{X509Ref, X509};
use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{BasicConstraints, KeyUsage, SubjectAltName};
use x509_cert::time::Time;

/// Parsed view of the certificate fields the engine reasons about.
#[derive(Debug, Clone)]
pub struct CertificateDetails {
    pub subject: String,
    pub issuer: String,
    pub serial: SerialNumber,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    /// `None` when basic constraints carry no pathlen (unlimited)
    pub max_path_len: Option<u8>,
    pub basic_constraints_present: bool,
    pub key_usage_bits: Option<u16>,
    pub subject_alt_names: Vec<String>,
}

impl CertificateDetails {
    pub fn from_x509(cert: &X509Ref) -> CaResult<Self> {
        let der = cert.to_der()?;
        let parsed = x509_cert::Certificate::from_der(&der)
            .map_err(|e| CaError::CertificateError(format!("Failed to parse certificate: {e}")))?;
        let tbs = &parsed.tbs_certificate;

        let mut details = Self {
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            serial: SerialNumber::from_certificate(cert)?,
            not_before: time_to_chrono(&tbs.validity.not_before)?,
            not_after: time_to_chrono(&tbs.validity.not_after)?,
            is_ca: false,
            max_path_len: None,
            basic_constraints_present: false,
            key_usage_bits: None,
            subject_alt_names: Vec::new(),
        };

        for ext in tbs.extensions.iter().flatten() {
            let value = ext.extn_value.as_bytes();
            if ext.extn_id == OID_BASIC_CONSTRAINTS {
                let bc = BasicConstraints::from_der(value)?;
                details.basic_constraints_present = true;
                details.is_ca = bc.ca;
                details.max_path_len = bc.path_len_constraint;
            } else if ext.extn_id == OID_SUBJECT_ALT_NAME {
                let san = SubjectAltName::from_der(value)?;
                details.subject_alt_names = san.0.iter().filter_map(format_general_name).collect();
            } else if ext.extn_id == OID_KEY_USAGE {
                let ku = KeyUsage::from_der(value)?;
                details.key_usage_bits = Some(ku.0.bits());
            }
        }

        Ok(details)
    }

    /// Explicit `pathlen:0` present.
    #[must_use]
    pub fn max_path_len_zero(&self) -> bool {
        self.max_path_len == Some(0)
    }
}

/// Format a SAN entry as `DNS:`, `IP:`, `email:` or `URI:`.
#[must_use]
pub fn format_general_name(name: &GeneralName) -> Option<String> {
    match name {
        GeneralName::DnsName(dns) => Some(format!("DNS:{dns}")),
        GeneralName::Rfc822Name(email) => Some(format!("email:{email}")),
        GeneralName::UniformResourceIdentifier(uri) => Some(format!("URI:{uri}")),
        GeneralName::IpAddress(octets) => ip_from_octets(octets.as_bytes()).map(|ip| format!("IP:{ip}")),
        _ => None,
    }
}

fn ip_from_octets(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

pub fn time_to_chrono(time: &Time) -> CaResult<DateTime<Utc>> {
    let secs = time.to_unix_duration().as_secs();
    let secs = i64::try_from(secs)
        .map_err(|_| CaError::CertificateError("Certificate time out of range".into()))?;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| CaError::CertificateError("Certificate time out of range".into()))
}

pub fn to_asn1_time(time: DateTime<Utc>) -> CaResult<Asn1Time> {
    Ok(Asn1Time::from_unix(time.timestamp())?)
}

/// Lower-case hex SHA-256 of the DER certificate.
pub fn fingerprint_sha256(cert: &X509Ref) -> CaResult<String> {
    let der = cert.to_der()?;
    Ok(hex::encode(Sha256::digest(&der)))
}

pub fn certificate_to_pem(cert: &X509Ref) -> CaResult<String> {
    let pem = cert.to_pem()?;
    String::from_utf8(pem).map_err(|e| CaError::CertificateError(format!("PEM is not UTF-8: {e}")))
}

/// Concatenated PEM for a chain, leaf first.
pub fn chain_to_pem(chain: &[&X509Ref]) -> CaResult<String> {
    let mut out = String::new();
    for cert in chain {
        out.push_str(&certificate_to_pem(cert)?);
    }
    Ok(out)
}

/// Parse the first `CERTIFICATE` PEM block.
pub fn certificate_from_pem(pem: &[u8]) -> CaResult<X509> {
    X509::from_pem(pem)
        .map_err(|e| CaError::CertificateError(format!("Failed to parse certificate PEM: {e}")))
}

/// Convert a chrono timestamp into an `x509-cert` time, UTCTime before 2050
/// and GeneralizedTime after (RFC 5280 §4.1.2.5).
pub fn chrono_to_x509_time(time: DateTime<Utc>) -> CaResult<Time> {
    let secs = u64::try_from(time.timestamp())
        .map_err(|_| CaError::Asn1Error("Time before the Unix epoch".into()))?;
    let duration = std::time::Duration::from_secs(secs);
    if time.timestamp() < UTC_TIME_LIMIT {
        Ok(Time::UtcTime(der::asn1::UtcTime::from_unix_duration(duration)?))
    } else {
        Ok(Time::GeneralTime(der::asn1::GeneralizedTime::from_unix_duration(duration)?))
    }
}

pub fn chrono_to_generalized(time: DateTime<Utc>) -> CaResult<der::asn1::GeneralizedTime> {
    let secs = u64::try_from(time.timestamp())
        .map_err(|_| CaError::Asn1Error("Time before the Unix epoch".into()))?;
    Ok(der::asn1::GeneralizedTime::from_unix_duration(
        std::time::Duration::from_secs(secs),
    )?)
}

pub fn generalized_to_chrono(time: &der::asn1::GeneralizedTime) -> CaResult<DateTime<Utc>> {
    let secs = i64::try_from(time.to_unix_duration().as_secs())
        .map_err(|_| CaError::Asn1Error("Time out of range".into()))?;
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| CaError::Asn1Error("Time out of range".into()))
}

/// 2050-01-01T00:00:00Z
const UTC_TIME_LIMIT: i64 = 2_524_608_000;

/// DER of an existing certificate's subject, parsed for `x509-cert` use.
pub fn subject_name(cert: &X509Ref) -> CaResult<x509_cert::name::Name> {
    let der = cert.subject_name().to_der()?;
    Ok(x509_cert::name::Name::from_der(&der)?)
}

/// Raw `subjectPublicKey` bits, as hashed for key identifiers and OCSP.
pub fn subject_public_key_bits(cert: &X509Ref) -> CaResult<Vec<u8>> {
    let der = cert.to_der()?;
    let parsed = x509_cert::Certificate::from_der(&der)?;
    Ok(parsed
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes()
        .to_vec())
}

/// Re-encode an OpenSSL certificate as an `x509-cert` structure.
pub fn to_x509_cert(cert: &X509Ref) -> CaResult<x509_cert::Certificate> {
    let der = cert.to_der()?;
    Ok(x509_cert::Certificate::from_der(&der)?)
}
