use std::fmt;

use der::asn1::{Any, ObjectIdentifier};
use der::Tag;
use openssl::hash::MessageDigest;
use spki::AlgorithmIdentifierOwned;

use super::HashAlgorithm;
use crate::domain::constants::{
    OID_ECDSA_WITH_SHA256, OID_ECDSA_WITH_SHA384, OID_ECDSA_WITH_SHA512, OID_ED25519,
    OID_SHA256_WITH_RSA, OID_SHA384_WITH_RSA, OID_SHA512_WITH_RSA,
};
use crate::infra::error::CaResult;

/// Signature scheme chosen for a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha256WithRsa,
    Sha384WithRsa,
    Sha512WithRsa,
    EcdsaWithSha256,
    EcdsaWithSha384,
    EcdsaWithSha512,
    PureEd25519,
}

impl SignatureAlgorithm {
    /// Digest applied before signing; `None` for pure EdDSA.
    #[must_use]
    pub fn hash(&self) -> Option<HashAlgorithm> {
        match self {
            SignatureAlgorithm::Sha256WithRsa | SignatureAlgorithm::EcdsaWithSha256 => {
                Some(HashAlgorithm::Sha256)
            }
            SignatureAlgorithm::Sha384WithRsa | SignatureAlgorithm::EcdsaWithSha384 => {
                Some(HashAlgorithm::Sha384)
            }
            SignatureAlgorithm::Sha512WithRsa | SignatureAlgorithm::EcdsaWithSha512 => {
                Some(HashAlgorithm::Sha512)
            }
            SignatureAlgorithm::PureEd25519 => None,
        }
    }

    #[must_use]
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            SignatureAlgorithm::Sha256WithRsa => OID_SHA256_WITH_RSA,
            SignatureAlgorithm::Sha384WithRsa => OID_SHA384_WITH_RSA,
            SignatureAlgorithm::Sha512WithRsa => OID_SHA512_WITH_RSA,
            SignatureAlgorithm::EcdsaWithSha256 => OID_ECDSA_WITH_SHA256,
            SignatureAlgorithm::EcdsaWithSha384 => OID_ECDSA_WITH_SHA384,
            SignatureAlgorithm::EcdsaWithSha512 => OID_ECDSA_WITH_SHA512,
            SignatureAlgorithm::PureEd25519 => OID_ED25519,
        }
    }

    /// Digest handed to the OpenSSL certificate builder.
    #[must_use]
    pub fn message_digest(&self) -> MessageDigest {
        self.hash()
            .map_or_else(MessageDigest::null, |h| h.message_digest())
    }

    /// `AlgorithmIdentifier` for the `signatureAlgorithm` fields of CRLs,
    /// OCSP responses and CMS signer infos. RSA carries explicit NULL
    /// parameters, ECDSA and EdDSA carry none (RFC 5758, RFC 8410).
    pub fn algorithm_identifier(&self) -> CaResult<AlgorithmIdentifierOwned> {
        let parameters = match self {
            SignatureAlgorithm::Sha256WithRsa
            | SignatureAlgorithm::Sha384WithRsa
            | SignatureAlgorithm::Sha512WithRsa => Some(Any::new(Tag::Null, Vec::<u8>::new())?),
            _ => None,
        };
        Ok(AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters,
        })
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureAlgorithm::Sha256WithRsa => "SHA256-RSA",
            SignatureAlgorithm::Sha384WithRsa => "SHA384-RSA",
            SignatureAlgorithm::Sha512WithRsa => "SHA512-RSA",
            SignatureAlgorithm::EcdsaWithSha256 => "ECDSA-SHA256",
            SignatureAlgorithm::EcdsaWithSha384 => "ECDSA-SHA384",
            SignatureAlgorithm::EcdsaWithSha512 => "ECDSA-SHA512",
            SignatureAlgorithm::PureEd25519 => "Ed25519",
        };
        f.write_str(name)
    }
}

/// Options passed to `sign`/`verify`: the hash the digest was produced with.
///
/// `hash: None` means the input is the raw message (pure EdDSA).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignerOpts {
    pub hash: Option<HashAlgorithm>,
}

impl SignerOpts {
    #[must_use]
    pub fn with_hash(hash: HashAlgorithm) -> Self {
        Self { hash: Some(hash) }
    }

    #[must_use]
    pub fn pure() -> Self {
        Self { hash: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Encode;

    #[test]
    fn test_rsa_identifier_has_null_parameters() {
        let id = SignatureAlgorithm::Sha256WithRsa.algorithm_identifier().unwrap();
        let der = id.to_der().unwrap();
        assert!(der.ends_with(&[0x05, 0x00]));

        let ec = SignatureAlgorithm::EcdsaWithSha384.algorithm_identifier().unwrap();
        assert!(ec.parameters.is_none());
    }

    #[test]
    fn test_hash_pairing() {
        assert_eq!(SignatureAlgorithm::EcdsaWithSha512.hash(), Some(HashAlgorithm::Sha512));
        assert_eq!(SignatureAlgorithm::PureEd25519.hash(), None);
        assert_eq!(SignatureAlgorithm::Sha384WithRsa.to_string(), "SHA384-RSA");
    }
}
