//! Key I/O: loads PEM private keys and DER public keys, and frames them as
//! the [`bpak_core::signer::Signer`] / [`Verifier`] trait objects C5
//! consumes. The core never sees raw key material or an ASN.1 parser;
//! those live here, the one place the spec calls out as an external
//! collaborator (spec.md §1).

use anyhow::{bail, Context, Result};
use bpak_core::constants::SignatureKind;
use bpak_core::signer::{backends, Signer, Verifier};
use std::fs;
use std::path::Path;

/// Load a PEM-encoded private key matching `kind` and wrap it as a
/// [`Signer`].
pub fn load_signer(path: &Path, kind: SignatureKind) -> Result<Box<dyn Signer>> {
    let pem = fs::read_to_string(path)
        .with_context(|| format!("failed to read private key: {}", path.display()))?;

    match kind {
        SignatureKind::Ed25519 => {
            use ed25519_dalek::pkcs8::DecodePrivateKey;
            let key = ed25519_dalek::SigningKey::from_pkcs8_pem(&pem)
                .context("not a valid Ed25519 PKCS#8 PEM private key")?;
            Ok(Box::new(backends::Ed25519Signer(key)))
        }
        SignatureKind::Prime256v1 => {
            use p256::pkcs8::DecodePrivateKey;
            let key = p256::ecdsa::SigningKey::from_pkcs8_pem(&pem)
                .context("not a valid P-256 PKCS#8 PEM private key")?;
            Ok(Box::new(backends::P256Signer(key)))
        }
        SignatureKind::Secp384r1 => {
            use p384::pkcs8::DecodePrivateKey;
            let key = p384::ecdsa::SigningKey::from_pkcs8_pem(&pem)
                .context("not a valid P-384 PKCS#8 PEM private key")?;
            Ok(Box::new(backends::P384Signer(key)))
        }
        SignatureKind::Secp521r1 => {
            use p521::pkcs8::DecodePrivateKey;
            let key = p521::ecdsa::SigningKey::from_pkcs8_pem(&pem)
                .context("not a valid P-521 PKCS#8 PEM private key")?;
            Ok(Box::new(backends::P521Signer(key)))
        }
        SignatureKind::Rsa4096 => {
            use rsa::pkcs8::DecodePrivateKey;
            let key = rsa::RsaPrivateKey::from_pkcs8_pem(&pem)
                .context("not a valid RSA PKCS#8 PEM private key")?;
            Ok(Box::new(backends::RsaSigner(key)))
        }
    }
}

/// Load a DER-encoded public key matching `kind` and wrap it as a
/// [`Verifier`].
pub fn load_verifier(path: &Path, kind: SignatureKind) -> Result<Box<dyn Verifier>> {
    let der = fs::read(path)
        .with_context(|| format!("failed to read public key: {}", path.display()))?;

    match kind {
        SignatureKind::Ed25519 => {
            use ed25519_dalek::pkcs8::DecodePublicKey;
            let key = ed25519_dalek::VerifyingKey::from_public_key_der(&der)
                .context("not a valid Ed25519 SubjectPublicKeyInfo DER public key")?;
            Ok(Box::new(backends::Ed25519Verifier(key)))
        }
        SignatureKind::Prime256v1 => {
            use p256::pkcs8::DecodePublicKey;
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(&der)
                .context("not a valid P-256 SubjectPublicKeyInfo DER public key")?;
            Ok(Box::new(backends::P256Verifier(key)))
        }
        SignatureKind::Secp384r1 => {
            use p384::pkcs8::DecodePublicKey;
            let key = p384::ecdsa::VerifyingKey::from_public_key_der(&der)
                .context("not a valid P-384 SubjectPublicKeyInfo DER public key")?;
            Ok(Box::new(backends::P384Verifier(key)))
        }
        SignatureKind::Secp521r1 => {
            use p521::pkcs8::DecodePublicKey;
            let key = p521::ecdsa::VerifyingKey::from_public_key_der(&der)
                .context("not a valid P-521 SubjectPublicKeyInfo DER public key")?;
            Ok(Box::new(backends::P521Verifier(key)))
        }
        SignatureKind::Rsa4096 => {
            use rsa::pkcs8::DecodePublicKey;
            let key = rsa::RsaPublicKey::from_public_key_der(&der)
                .context("not a valid RSA SubjectPublicKeyInfo DER public key")?;
            Ok(Box::new(backends::RsaVerifier(key)))
        }
    }
}

/// Parse a `--hash-kind` CLI value.
pub fn parse_hash_kind(s: &str) -> Result<bpak_core::constants::HashKind> {
    use bpak_core::constants::HashKind;
    match s.to_ascii_lowercase().as_str() {
        "sha256" => Ok(HashKind::Sha256),
        "sha384" => Ok(HashKind::Sha384),
        "sha512" => Ok(HashKind::Sha512),
        other => bail!("unknown hash kind '{other}' (expected sha256, sha384, or sha512)"),
    }
}

/// Parse a `--signature-kind` CLI value.
pub fn parse_signature_kind(s: &str) -> Result<SignatureKind> {
    match s.to_ascii_lowercase().as_str() {
        "prime256v1" | "secp256r1" | "p256" => Ok(SignatureKind::Prime256v1),
        "secp384r1" | "p384" => Ok(SignatureKind::Secp384r1),
        "secp521r1" | "p521" => Ok(SignatureKind::Secp521r1),
        "rsa4096" | "rsa" => Ok(SignatureKind::Rsa4096),
        "ed25519" => Ok(SignatureKind::Ed25519),
        other => bail!(
            "unknown signature kind '{other}' (expected prime256v1, secp384r1, secp521r1, \
             rsa4096, or ed25519)"
        ),
    }
}
