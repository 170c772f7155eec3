//! Certificate serial numbers.
//!
//! Serials are kept as big-endian unsigned magnitudes without leading zero
//! bytes, so two serials compare equal exactly when their integer values do.

use crate::domain::constants::SERIAL_NUMBER_LENGTH;
use crate::infra::error::{CaError, CaResult};
use openssl::asn1::Asn1Integer;
use openssl::bn::BigNum;
use openssl::x509::X509Ref;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SerialNumber(Vec<u8>);

impl SerialNumber {
    /// Random 160-bit serial: top bit cleared so the DER INTEGER stays
    /// positive, leading byte non-zero so the value is never zero and always
    /// occupies the full length.
    pub fn generate() -> CaResult<Self> {
        let mut bytes = [0u8; SERIAL_NUMBER_LENGTH];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CaError::CryptographicError(format!("Failed to generate serial: {e}")))?;
        bytes[0] &= 0x7f;
        if bytes[0] == 0 {
            bytes[0] = 0x01;
        }
        Ok(Self(bytes.to_vec()))
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        Self(bytes[start..].to_vec())
    }

    #[must_use]
    pub fn from_u128(value: u128) -> Self {
        Self::from_bytes(&value.to_be_bytes())
    }

    pub fn from_hex(hex_str: &str) -> CaResult<Self> {
        let cleaned: String = hex_str.chars().filter(|c| *c != ':').collect();
        let padded = if cleaned.len() % 2 == 1 {
            format!("0{cleaned}")
        } else {
            cleaned
        };
        let bytes = hex::decode(&padded)
            .map_err(|e| CaError::InvalidRequest(format!("Invalid serial '{hex_str}': {e}")))?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn from_certificate(cert: &X509Ref) -> CaResult<Self> {
        let bn = cert.serial_number().to_bn()?;
        Ok(Self::from_bytes(&bn.to_vec()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True for the zero value (and for an empty input).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        if self.0.is_empty() {
            "00".to_string()
        } else {
            hex::encode(&self.0)
        }
    }

    pub fn to_bignum(&self) -> CaResult<BigNum> {
        Ok(BigNum::from_slice(&self.0)?)
    }

    pub fn to_asn1_integer(&self) -> CaResult<Asn1Integer> {
        Ok(self.to_bignum()?.to_asn1_integer()?)
    }

    /// DER `INTEGER` usable inside `der`-derived structures.
    pub fn to_uint(&self) -> CaResult<der::asn1::Uint> {
        let bytes: &[u8] = if self.0.is_empty() { &[0] } else { &self.0 };
        Ok(der::asn1::Uint::new(bytes)?)
    }

    #[must_use]
    pub fn from_uint(value: &der::asn1::Uint) -> Self {
        Self::from_bytes(value.as_bytes())
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({})", self.to_hex())
    }
}

impl Serialize for SerialNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SerialNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SerialNumber::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_serials_are_positive_and_full_length() {
        for _ in 0..256 {
            let serial = SerialNumber::generate().unwrap();
            let bytes = serial.as_bytes();
            assert_eq!(bytes.len(), SERIAL_NUMBER_LENGTH);
            assert_eq!(bytes[0] & 0x80, 0);
            assert_ne!(bytes[0], 0);
        }
    }

    #[test]
    fn test_generated_serials_are_unique() {
        let serials: HashSet<SerialNumber> = (0..1000)
            .map(|_| SerialNumber::generate().unwrap())
            .collect();
        assert_eq!(serials.len(), 1000);
    }

    #[test]
    fn test_leading_zero_normalization() {
        let a = SerialNumber::from_bytes(&[0x00, 0x00, 0x12, 0x34]);
        let b = SerialNumber::from_hex("1234").unwrap();
        let c = SerialNumber::from_hex("0:12:34").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.to_hex(), "1234");
        assert!(SerialNumber::from_bytes(&[0, 0]).is_zero());
    }

    #[test]
    fn test_uint_keeps_high_bit_values_positive() {
        let serial = SerialNumber::from_bytes(&[0xff, 0x01]);
        let uint = serial.to_uint().unwrap();
        assert_eq!(SerialNumber::from_uint(&uint), serial);
    }
}
