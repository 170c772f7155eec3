//! Cryptographic provider seam.
//!
//! Every signature produced by the engine (certificates, CRLs, OCSP responses
//! and timestamp tokens) goes through a [`CryptoProvider`]. [`SoftwareProvider`] implements
//! it with in-process OpenSSL keys; a hardware-backed implementation can be
//! substituted without touching the services.

use crate::domain::constants::MIN_RSA_KEY_BITS;
use crate::domain::crypto::{
    EcCurve, HashAlgorithm, KeyPair, KeySpec, PrivateKey, PublicKey, SignatureAlgorithm,
    SignerOpts,
};
use crate::infra::error::{CaError, CaResult};
use openssl::ec::{EcGroup, EcKey};
use openssl::md::Md;
use openssl::pkey::{PKey, PKeyRef};
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{Signer, Verifier};

/// Key generation, signing and verification capability set.
pub trait CryptoProvider: Send + Sync {
    fn generate_key_pair(&self, spec: &KeySpec) -> CaResult<KeyPair>;

    /// Sign a digest (or, for pure EdDSA, the message itself).
    fn sign(&self, key: &PrivateKey, digest: &[u8], opts: SignerOpts) -> CaResult<Vec<u8>>;

    fn verify(
        &self,
        key: &PublicKey,
        digest: &[u8],
        signature: &[u8],
        opts: SignerOpts,
    ) -> CaResult<()>;

    fn signature_algorithm(&self, key: &PublicKey) -> CaResult<SignatureAlgorithm>;

    /// Hash `message` as the algorithm requires, then sign.
    fn sign_data(
        &self,
        key: &PrivateKey,
        algorithm: SignatureAlgorithm,
        message: &[u8],
    ) -> CaResult<Vec<u8>> {
        match algorithm.hash() {
            Some(hash) => self.sign(key, &hash.digest(message), SignerOpts::with_hash(hash)),
            None => self.sign(key, message, SignerOpts::pure()),
        }
    }

    fn verify_data(
        &self,
        key: &PublicKey,
        algorithm: SignatureAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> CaResult<()> {
        match algorithm.hash() {
            Some(hash) => self.verify(
                key,
                &hash.digest(message),
                signature,
                SignerOpts::with_hash(hash),
            ),
            None => self.verify(key, message, signature, SignerOpts::pure()),
        }
    }
}

/// In-process provider backed by OpenSSL.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareProvider;

impl SoftwareProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn md_for(hash: HashAlgorithm) -> &'static openssl::md::MdRef {
    match hash {
        HashAlgorithm::Sha256 => Md::sha256(),
        HashAlgorithm::Sha384 => Md::sha384(),
        HashAlgorithm::Sha512 => Md::sha512(),
    }
}

fn check_digest_len(digest: &[u8], hash: HashAlgorithm) -> CaResult<()> {
    if digest.len() != hash.digest_size() {
        return Err(CaError::CryptographicError(format!(
            "Digest length {} does not match {hash} ({} bytes)",
            digest.len(),
            hash.digest_size()
        )));
    }
    Ok(())
}

fn sign_prehashed<T: openssl::pkey::HasPrivate>(
    key: &PKeyRef<T>,
    digest: &[u8],
    hash: HashAlgorithm,
    rsa: bool,
) -> CaResult<Vec<u8>> {
    let mut ctx = PkeyCtx::new(key)?;
    ctx.sign_init()?;
    if rsa {
        ctx.set_rsa_padding(Padding::PKCS1)?;
    }
    ctx.set_signature_md(md_for(hash))?;
    let mut signature = Vec::new();
    ctx.sign_to_vec(digest, &mut signature)?;
    Ok(signature)
}

fn verify_prehashed<T: openssl::pkey::HasPublic>(
    key: &PKeyRef<T>,
    digest: &[u8],
    signature: &[u8],
    hash: HashAlgorithm,
    rsa: bool,
) -> CaResult<()> {
    let mut ctx = PkeyCtx::new(key)?;
    ctx.verify_init()?;
    if rsa {
        ctx.set_rsa_padding(Padding::PKCS1)?;
    }
    ctx.set_signature_md(md_for(hash))?;
    // OpenSSL reports malformed signatures as errors rather than `false`
    match ctx.verify(digest, signature) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(CaError::VerificationFailed),
    }
}

impl CryptoProvider for SoftwareProvider {
    fn generate_key_pair(&self, spec: &KeySpec) -> CaResult<KeyPair> {
        let private_key = match spec {
            KeySpec::Rsa { bits } => {
                if *bits < MIN_RSA_KEY_BITS {
                    return Err(CaError::InvalidKeySize {
                        bits: *bits,
                        minimum: MIN_RSA_KEY_BITS,
                    });
                }
                let rsa = Rsa::generate(*bits)
                    .map_err(|e| CaError::KeyGenerationFailed(format!("RSA-{bits}: {e}")))?;
                PrivateKey::Rsa(PKey::from_rsa(rsa)?)
            }
            KeySpec::Ecdsa { curve } => {
                let curve = EcCurve::from_name(curve)?;
                let group = EcGroup::from_curve_name(curve.nid())?;
                let ec = EcKey::generate(&group).map_err(|e| {
                    CaError::KeyGenerationFailed(format!("ECDSA {}: {e}", curve.name()))
                })?;
                PrivateKey::Ecdsa {
                    key: PKey::from_ec_key(ec)?,
                    curve,
                }
            }
            KeySpec::EdDsa { curve } => {
                if !curve.eq_ignore_ascii_case("Ed25519") {
                    return Err(CaError::UnsupportedCurve(curve.clone()));
                }
                let pkey = PKey::generate_ed25519()
                    .map_err(|e| CaError::KeyGenerationFailed(format!("Ed25519: {e}")))?;
                PrivateKey::Ed25519(pkey)
            }
        };

        let public_key = private_key.public_key()?;
        log::debug!("Generated {spec} key pair");
        Ok(KeyPair {
            public_key,
            private_key,
            algorithm: spec.to_string(),
        })
    }

    fn sign(&self, key: &PrivateKey, digest: &[u8], opts: SignerOpts) -> CaResult<Vec<u8>> {
        match key {
            PrivateKey::Rsa(pkey) => {
                let hash = opts
                    .hash
                    .ok_or_else(|| CaError::HashRequired("RSA PKCS#1 v1.5 signing".into()))?;
                check_digest_len(digest, hash)?;
                sign_prehashed(pkey, digest, hash, true)
            }
            PrivateKey::Ecdsa { key: pkey, curve } => {
                let hash = opts.hash.unwrap_or_else(|| curve.hash());
                check_digest_len(digest, hash)?;
                sign_prehashed(pkey, digest, hash, false)
            }
            PrivateKey::Ed25519(pkey) => {
                let mut signer = Signer::new_without_digest(pkey)?;
                Ok(signer.sign_oneshot_to_vec(digest)?)
            }
        }
    }

    fn verify(
        &self,
        key: &PublicKey,
        digest: &[u8],
        signature: &[u8],
        opts: SignerOpts,
    ) -> CaResult<()> {
        match key {
            PublicKey::Rsa(pkey) => {
                let hash = opts
                    .hash
                    .ok_or_else(|| CaError::HashRequired("RSA verification".into()))?;
                verify_prehashed(pkey, digest, signature, hash, true)
            }
            PublicKey::Ecdsa { key: pkey, curve } => {
                let hash = opts.hash.unwrap_or_else(|| curve.hash());
                verify_prehashed(pkey, digest, signature, hash, false)
            }
            PublicKey::Ed25519(pkey) => {
                let mut verifier = Verifier::new_without_digest(pkey)?;
                match verifier.verify_oneshot(signature, digest) {
                    Ok(true) => Ok(()),
                    Ok(false) | Err(_) => Err(CaError::VerificationFailed),
                }
            }
        }
    }

    fn signature_algorithm(&self, key: &PublicKey) -> CaResult<SignatureAlgorithm> {
        Ok(match key {
            PublicKey::Rsa(pkey) => match pkey.bits() {
                bits if bits < 3072 => SignatureAlgorithm::Sha256WithRsa,
                bits if bits < 4096 => SignatureAlgorithm::Sha384WithRsa,
                _ => SignatureAlgorithm::Sha512WithRsa,
            },
            PublicKey::Ecdsa { curve, .. } => match curve {
                EcCurve::P256 => SignatureAlgorithm::EcdsaWithSha256,
                EcCurve::P384 => SignatureAlgorithm::EcdsaWithSha384,
                EcCurve::P521 => SignatureAlgorithm::EcdsaWithSha512,
            },
            PublicKey::Ed25519(_) => SignatureAlgorithm::PureEd25519,
        })
    }
}
