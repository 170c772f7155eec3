//! Revoked-set bookkeeping and X.509 v2 CRL generation.

use crate::domain::constants::{
    DEFAULT_CRL_NEXT_UPDATE_BUFFER_HOURS, DEFAULT_CRL_VALIDITY_HOURS, OID_AUTHORITY_KEY_IDENTIFIER,
    OID_CRL_NUMBER, OID_CRL_REASON, SERIAL_NUMBER_LENGTH,
};
use crate::domain::crypto::{
    chrono_to_x509_time, subject_name, subject_public_key_bits, CertificateDetails, PrivateKey,
};
use crate::domain::revocation::{CertificateStatus, RevocationReason, RevokedCertificate};
use crate::domain::serial::SerialNumber;
use crate::infra::error::{CaError, CaResult};
use crate::services::crypto_provider::CryptoProvider;
use base64::Engine;
use chrono::{Duration, Utc};
use der::asn1::{BitString, OctetString};
use der::{Decode, Encode};
use openssl::x509::X509;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::AuthorityKeyIdentifier;
use x509_cert::ext::Extension;

const PEM_LINE_WIDTH: usize = 64;

pub struct CrlConfig {
    pub issuer_certificate: X509,
    pub private_key: PrivateKey,
    pub provider: Arc<dyn CryptoProvider>,
    /// Distance from `thisUpdate` to `nextUpdate` before the buffer
    pub validity: Duration,
    /// Subtracted from `validity` so relying parties refresh early
    pub next_update_buffer: Option<Duration>,
    /// Number used by the next generated CRL
    pub starting_crl_number: u64,
}

impl CrlConfig {
    #[must_use]
    pub fn new(
        issuer_certificate: X509,
        private_key: PrivateKey,
        provider: Arc<dyn CryptoProvider>,
    ) -> Self {
        Self {
            issuer_certificate,
            private_key,
            provider,
            validity: Duration::hours(DEFAULT_CRL_VALIDITY_HOURS),
            next_update_buffer: Some(Duration::hours(DEFAULT_CRL_NEXT_UPDATE_BUFFER_HOURS)),
            starting_crl_number: 1,
        }
    }
}

#[derive(Default)]
struct RevocationState {
    /// Revocation order
    entries: Vec<RevokedCertificate>,
    /// serial -> position in `entries`
    index: HashMap<SerialNumber, usize>,
    next_crl_number: u64,
}

/// Tracks revoked serials for one issuer and signs CRLs over them.
pub struct CrlService {
    config: CrlConfig,
    state: RwLock<RevocationState>,
}

impl CrlService {
    pub fn new(config: CrlConfig) -> CaResult<Self> {
        let details = CertificateDetails::from_x509(&config.issuer_certificate)?;
        if !details.is_ca {
            return Err(CaError::InvalidConfig(format!(
                "CRL issuer '{}' is not a CA",
                details.subject
            )));
        }
        if !config
            .private_key
            .matches_certificate(&config.issuer_certificate)?
        {
            return Err(CaError::InvalidConfig(
                "CRL signing key does not match issuer certificate".into(),
            ));
        }
        let buffer = config.next_update_buffer.unwrap_or_else(Duration::zero);
        if config.validity - buffer <= Duration::zero() {
            return Err(CaError::InvalidConfig(format!(
                "CRL validity of {}h leaves no window after a {}h buffer",
                config.validity.num_hours(),
                buffer.num_hours()
            )));
        }
        if Utc::now().checked_add_signed(config.validity).is_none() {
            return Err(CaError::InvalidConfig(format!(
                "CRL validity of {}h is out of range",
                config.validity.num_hours()
            )));
        }

        let state = RevocationState {
            next_crl_number: config.starting_crl_number,
            ..RevocationState::default()
        };
        Ok(Self {
            config,
            state: RwLock::new(state),
        })
    }

    fn read(&self) -> CaResult<RwLockReadGuard<'_, RevocationState>> {
        self.state
            .read()
            .map_err(|_| CaError::Internal("revocation state lock poisoned".into()))
    }

    fn write(&self) -> CaResult<RwLockWriteGuard<'_, RevocationState>> {
        self.state
            .write()
            .map_err(|_| CaError::Internal("revocation state lock poisoned".into()))
    }

    #[must_use]
    pub fn issuer_certificate(&self) -> &X509 {
        &self.config.issuer_certificate
    }

    /// Record a revocation at the current time.
    pub fn revoke(
        &self,
        serial: &SerialNumber,
        reason: RevocationReason,
    ) -> CaResult<RevokedCertificate> {
        if serial.is_zero() {
            return Err(CaError::SerialRequired);
        }
        // DER content octets, sign byte included (RFC 5280 §4.1.2.2)
        let bytes = serial.as_bytes();
        let sign_octet = bytes.first().is_some_and(|b| b & 0x80 != 0);
        let encoded_len = bytes.len() + usize::from(sign_octet);
        if encoded_len > SERIAL_NUMBER_LENGTH {
            return Err(CaError::InvalidRequest(format!(
                "serial number is {encoded_len} octets, at most {SERIAL_NUMBER_LENGTH} allowed"
            )));
        }
        let mut state = self.write()?;
        if state.index.contains_key(serial) {
            return Err(CaError::AlreadyRevoked(serial.to_hex()));
        }

        let entry = RevokedCertificate {
            serial_number: serial.clone(),
            revocation_time: Utc::now(),
            reason,
        };
        let position = state.entries.len();
        state.entries.push(entry.clone());
        state.index.insert(serial.clone(), position);

        log::info!("Revoked certificate {serial} ({reason})");
        Ok(entry)
    }

    pub fn is_revoked(&self, serial: &SerialNumber) -> CaResult<Option<RevokedCertificate>> {
        let state = self.read()?;
        Ok(state.index.get(serial).map(|&i| state.entries[i].clone()))
    }

    pub fn status_of(&self, serial: &SerialNumber) -> CaResult<CertificateStatus> {
        Ok(match self.is_revoked(serial)? {
            Some(entry) => CertificateStatus::Revoked {
                revocation_time: entry.revocation_time,
                reason: entry.reason,
            },
            None => CertificateStatus::Good,
        })
    }

    pub fn revoked_certificates(&self) -> CaResult<Vec<RevokedCertificate>> {
        Ok(self.read()?.entries.clone())
    }

    /// Number the next CRL will carry.
    pub fn current_crl_number(&self) -> CaResult<u64> {
        Ok(self.read()?.next_crl_number)
    }

    /// Sign a DER CRL over the current revoked set. The CRL number advances
    /// only when signing succeeds.
    pub fn generate_crl(&self) -> CaResult<Vec<u8>> {
        let mut state = self.write()?;
        let crl_number = state.next_crl_number;
        let der = self.build_crl(&state.entries, crl_number)?;
        state.next_crl_number = crl_number
            .checked_add(1)
            .ok_or_else(|| CaError::Internal("CRL number overflow".into()))?;

        log::info!(
            "Generated CRL #{crl_number} with {} entries",
            state.entries.len()
        );
        Ok(der)
    }

    pub fn generate_crl_pem(&self) -> CaResult<String> {
        Ok(crl_der_to_pem(&self.generate_crl()?))
    }

    fn build_crl(&self, entries: &[RevokedCertificate], crl_number: u64) -> CaResult<Vec<u8>> {
        let issuer = &self.config.issuer_certificate;
        let issuer_public_key = self.config.private_key.public_key()?;
        let algorithm = self
            .config
            .provider
            .signature_algorithm(&issuer_public_key)?;
        let signature_algorithm = algorithm.algorithm_identifier()?;

        let now = Utc::now();
        let buffer = self.config.next_update_buffer.unwrap_or_else(Duration::zero);
        let next_update = now
            .checked_add_signed(self.config.validity - buffer)
            .ok_or_else(|| CaError::InvalidConfig("CRL nextUpdate is out of range".into()))?;

        let revoked = entries
            .iter()
            .map(revoked_entry)
            .collect::<CaResult<Vec<_>>>()?;

        let tbs = TbsCertList {
            version: x509_cert::Version::V2,
            signature: signature_algorithm.clone(),
            issuer: subject_name(issuer)?,
            this_update: chrono_to_x509_time(now)?,
            next_update: Some(chrono_to_x509_time(next_update)?),
            revoked_certificates: (!revoked.is_empty()).then_some(revoked),
            crl_extensions: Some(vec![
                Extension {
                    extn_id: OID_CRL_NUMBER,
                    critical: false,
                    extn_value: OctetString::new(crl_number.to_der()?)?,
                },
                Extension {
                    extn_id: OID_AUTHORITY_KEY_IDENTIFIER,
                    critical: false,
                    extn_value: OctetString::new(authority_key_identifier(issuer)?.to_der()?)?,
                },
            ]),
        };

        let tbs_der = tbs.to_der()?;
        let signature =
            self.config
                .provider
                .sign_data(&self.config.private_key, algorithm, &tbs_der)?;

        let crl = CertificateList {
            tbs_cert_list: tbs,
            signature_algorithm,
            signature: BitString::from_bytes(&signature)?,
        };
        Ok(crl.to_der()?)
    }
}

fn revoked_entry(entry: &RevokedCertificate) -> CaResult<RevokedCert> {
    let serial_der = entry.serial_number.to_uint()?.to_der()?;
    // unspecified is conveyed by omitting the reason (RFC 5280 §5.3.1)
    let extensions = match entry.reason {
        RevocationReason::Unspecified => None,
        reason => Some(vec![Extension {
            extn_id: OID_CRL_REASON,
            critical: false,
            extn_value: OctetString::new(reason.to_der()?)?,
        }]),
    };
    Ok(RevokedCert {
        serial_number: x509_cert::serial_number::SerialNumber::from_der(&serial_der)?,
        revocation_date: chrono_to_x509_time(entry.revocation_time)?,
        crl_entry_extensions: extensions,
    })
}

/// AKI with the issuer's SKI, or SHA-1 of its public key when it has none.
fn authority_key_identifier(issuer: &X509) -> CaResult<AuthorityKeyIdentifier> {
    let key_id = match issuer.subject_key_id() {
        Some(ski) => ski.as_slice().to_vec(),
        None => openssl::sha::sha1(&subject_public_key_bits(issuer)?).to_vec(),
    };
    Ok(AuthorityKeyIdentifier {
        key_identifier: Some(OctetString::new(key_id)?),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    })
}

#[must_use]
pub fn crl_der_to_pem(der: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN X509 CRL-----\n");
    for line in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END X509 CRL-----\n");
    pem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::KeySpec;
    use crate::services::crypto_provider::SoftwareProvider;
    use crate::services::hierarchy::{CaHierarchyBuilder, RootCaConfig};
    use openssl::x509::X509Crl;

    fn service() -> CrlService {
        let provider = Arc::new(SoftwareProvider::new());
        let mut config = RootCaConfig::new("CRL Root");
        config.key_spec = KeySpec::ecdsa("P-256");
        let (root, _) = CaHierarchyBuilder::new(provider.clone())
            .bootstrap(&config)
            .unwrap();
        CrlService::new(CrlConfig::new(
            root.certificate().to_owned(),
            root.private_key().clone(),
            provider,
        ))
        .unwrap()
    }

    #[test]
    fn test_revoke_once() {
        let crl = service();
        let serial = SerialNumber::from_hex("0badcafe").unwrap();
        crl.revoke(&serial, RevocationReason::KeyCompromise).unwrap();
        assert!(matches!(
            crl.revoke(&serial, RevocationReason::Superseded),
            Err(CaError::AlreadyRevoked(_))
        ));
        assert!(matches!(
            crl.revoke(&SerialNumber::from_bytes(&[]), RevocationReason::Unspecified),
            Err(CaError::SerialRequired)
        ));

        let entry = crl.is_revoked(&serial).unwrap().unwrap();
        assert_eq!(entry.reason, RevocationReason::KeyCompromise);
        assert!(crl
            .is_revoked(&SerialNumber::from_u128(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_revocation_order_is_kept() {
        let crl = service();
        for n in [5u128, 3, 9] {
            crl.revoke(&SerialNumber::from_u128(n), RevocationReason::CessationOfOperation)
                .unwrap();
        }
        let serials: Vec<String> = crl
            .revoked_certificates()
            .unwrap()
            .iter()
            .map(|e| e.serial_number.to_hex())
            .collect();
        assert_eq!(serials, vec!["05", "03", "09"]);
    }

    #[test]
    fn test_crl_parses_and_verifies() {
        let crl = service();
        crl.revoke(&SerialNumber::from_u128(0x1001), RevocationReason::KeyCompromise)
            .unwrap();
        crl.revoke(&SerialNumber::from_u128(0x1002), RevocationReason::Unspecified)
            .unwrap();

        let der = crl.generate_crl().unwrap();
        let parsed = X509Crl::from_der(&der).unwrap();
        let issuer_key = crl.issuer_certificate().public_key().unwrap();
        assert!(parsed.verify(&issuer_key).unwrap());
        assert_eq!(parsed.get_revoked().unwrap().len(), 2);
        assert!(parsed.next_update().is_some());

        let decoded = CertificateList::from_der(&der).unwrap();
        assert_eq!(decoded.tbs_cert_list.version, x509_cert::Version::V2);
    }

    #[test]
    fn test_crl_number_increases() {
        let crl = service();
        assert_eq!(crl.current_crl_number().unwrap(), 1);

        let numbers: Vec<u64> = (0..3)
            .map(|_| {
                let der = crl.generate_crl().unwrap();
                let decoded = CertificateList::from_der(&der).unwrap();
                let ext = decoded
                    .tbs_cert_list
                    .crl_extensions
                    .unwrap()
                    .into_iter()
                    .find(|e| e.extn_id == OID_CRL_NUMBER)
                    .unwrap();
                u64::from_der(ext.extn_value.as_bytes()).unwrap()
            })
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(crl.current_crl_number().unwrap(), 4);
    }

    #[test]
    fn test_pem_armor() {
        let crl = service();
        let pem = crl.generate_crl_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN X509 CRL-----\n"));
        assert!(pem.lines().all(|l| l.len() <= PEM_LINE_WIDTH));
        X509Crl::from_pem(pem.as_bytes()).unwrap();
    }

    #[test]
    fn test_buffer_must_leave_a_window() {
        let crl = service();
        let mut config = CrlConfig::new(
            crl.issuer_certificate().clone(),
            crl.config.private_key.clone(),
            Arc::new(SoftwareProvider::new()),
        );
        config.validity = Duration::hours(2);
        config.next_update_buffer = Some(Duration::hours(2));
        assert!(matches!(CrlService::new(config), Err(CaError::InvalidConfig(_))));
    }

    #[test]
    fn test_oversized_serial_is_refused() {
        let crl = service();
        assert!(matches!(
            crl.revoke(&SerialNumber::from_bytes(&[0x42; 24]), RevocationReason::KeyCompromise),
            Err(CaError::InvalidRequest(_))
        ));
        // 20 magnitude octets plus a sign byte
        assert!(matches!(
            crl.revoke(&SerialNumber::from_bytes(&[0xff; 20]), RevocationReason::KeyCompromise),
            Err(CaError::InvalidRequest(_))
        ));
        assert!(crl.revoked_certificates().unwrap().is_empty());

        crl.revoke(&SerialNumber::generate().unwrap(), RevocationReason::KeyCompromise)
            .unwrap();
        let parsed = X509Crl::from_der(&crl.generate_crl().unwrap()).unwrap();
        assert_eq!(parsed.get_revoked().unwrap().len(), 1);
    }

    #[test]
    fn test_entry_reason_codes() {
        let crl = service();
        crl.revoke(&SerialNumber::from_u128(0x2001), RevocationReason::KeyCompromise)
            .unwrap();
        crl.revoke(&SerialNumber::from_u128(0x2002), RevocationReason::Unspecified)
            .unwrap();

        let decoded = CertificateList::from_der(&crl.generate_crl().unwrap()).unwrap();
        let entries = decoded.tbs_cert_list.revoked_certificates.unwrap();
        assert_eq!(entries.len(), 2);

        let reason = entries[0]
            .crl_entry_extensions
            .as_ref()
            .unwrap()
            .iter()
            .find(|e| e.extn_id == OID_CRL_REASON)
            .unwrap();
        assert_eq!(
            RevocationReason::from_der(reason.extn_value.as_bytes()).unwrap(),
            RevocationReason::KeyCompromise
        );
        assert!(entries[1].crl_entry_extensions.is_none());
    }

    #[test]
    fn test_out_of_range_validity_is_rejected() {
        let crl = service();
        let mut config = CrlConfig::new(
            crl.issuer_certificate().clone(),
            crl.config.private_key.clone(),
            Arc::new(SoftwareProvider::new()),
        );
        config.validity = Duration::days(100_000_000);
        assert!(matches!(CrlService::new(config), Err(CaError::InvalidConfig(_))));
    }

    #[test]
    fn test_concurrent_revoke_and_generate() {
        let crl = &service();
        let threads: u128 = 8;
        let per_thread: u128 = 5;

        let mut numbers: Vec<u64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    scope.spawn(move || {
                        let mut seen = Vec::new();
                        for n in 0..per_thread {
                            let serial = SerialNumber::from_u128(0x10_000 + t * 100 + n);
                            crl.revoke(&serial, RevocationReason::Superseded).unwrap();
                            let der = crl.generate_crl().unwrap();
                            let decoded = CertificateList::from_der(&der).unwrap();
                            let ext = decoded
                                .tbs_cert_list
                                .crl_extensions
                                .unwrap()
                                .into_iter()
                                .find(|e| e.extn_id == OID_CRL_NUMBER)
                                .unwrap();
                            seen.push(u64::from_der(ext.extn_value.as_bytes()).unwrap());
                        }
                        // each thread observes strictly increasing numbers
                        assert!(seen.windows(2).all(|w| w[0] < w[1]));
                        seen
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let total = usize::try_from(threads * per_thread).unwrap();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), total);
        assert_eq!(numbers, (1..=total as u64).collect::<Vec<_>>());
        assert_eq!(crl.revoked_certificates().unwrap().len(), total);

        let last = CertificateList::from_der(&crl.generate_crl().unwrap()).unwrap();
        assert_eq!(last.tbs_cert_list.revoked_certificates.unwrap().len(), total);
    }
}
