//! C5: signature framing and signer/verifier back-ends.
//!
//! The core itself never touches raw key material; it frames signature
//! bytes into the header and calls out to whatever implements [`Signer`] /
//! [`Verifier`] for the archive's `signature_kind`. Concrete back-ends for
//! the five kinds the format recognizes live behind the `crypto` feature.

use alloc::vec::Vec;

use crate::constants::SIGNATURE_SIZE;
use crate::error::BpakError;
use crate::header::Header;
use crate::Result;

/// An external signer: produces raw signature bytes over a header digest.
pub trait Signer {
    /// Sign `header_digest`, returning the scheme's raw signature bytes.
    fn sign(&self, header_digest: &[u8]) -> Result<Vec<u8>>;
}

/// An external verifier: checks raw signature bytes over a header digest.
pub trait Verifier {
    /// Verify `signature` over `header_digest`.
    ///
    /// Returns [`BpakError::InvalidSignature`] on rejection.
    fn verify(&self, header_digest: &[u8], signature: &[u8]) -> Result<()>;
}

/// Copy `bytes` into `header.signature` (left-aligned, zero-padded) and set
/// `signature_sz`.
///
/// Does not write the header back to a stream; callers (the package
/// façade) do that once the in-memory mutation succeeds.
pub fn write_signature(header: &mut Header, bytes: &[u8]) -> Result<()> {
    if bytes.len() > SIGNATURE_SIZE {
        return Err(BpakError::SizeError(alloc::format!(
            "signature of {} bytes exceeds {SIGNATURE_SIZE}",
            bytes.len()
        )));
    }
    header.signature = [0u8; SIGNATURE_SIZE];
    header.signature[..bytes.len()].copy_from_slice(bytes);
    header.signature_sz = bytes.len() as u16;
    Ok(())
}

/// Verify a header's signature given the freshly recomputed payload digest.
///
/// Compares `computed_payload_hash` against the header's stored
/// `payload_hash` first ([`BpakError::PayloadHashMismatch`] on mismatch),
/// then computes the header hash and delegates to `verifier`.
pub fn verify_signature(
    header: &Header,
    computed_payload_hash: &[u8],
    verifier: &dyn Verifier,
) -> Result<()> {
    if &header.payload_hash[..computed_payload_hash.len()] != computed_payload_hash {
        return Err(BpakError::PayloadHashMismatch);
    }
    let digest = crate::digest::header_hash(header);
    let sig = &header.signature[..header.signature_sz as usize];
    verifier.verify(&digest, sig)
}

#[cfg(feature = "crypto")]
pub mod backends {
    //! Concrete [`Signer`]/[`Verifier`] implementations for the five
    //! signature kinds the header format recognizes.

    use super::*;
    use ed25519_dalek::{Signature as Ed25519Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
    use p256::ecdsa::{
        signature::Signer as _, signature::Verifier as _, Signature as P256Signature,
        SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey,
    };
    use p384::ecdsa::{
        Signature as P384Signature, SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey,
    };
    use p521::ecdsa::{
        Signature as P521Signature, SigningKey as P521SigningKey, VerifyingKey as P521VerifyingKey,
    };
    use rsa::{
        pkcs1v15::{Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey},
        signature::{RandomizedSigner, Signature as _, Verifier as RsaVerifierTrait},
        RsaPrivateKey, RsaPublicKey,
    };

    /// Ed25519 signer over a [`SigningKey`].
    pub struct Ed25519Signer(pub SigningKey);

    impl Signer for Ed25519Signer {
        fn sign(&self, header_digest: &[u8]) -> Result<Vec<u8>> {
            let sig: Ed25519Signature = self.0.sign(header_digest);
            Ok(sig.to_bytes().to_vec())
        }
    }

    /// Ed25519 verifier over a [`VerifyingKey`].
    pub struct Ed25519Verifier(pub VerifyingKey);

    impl Verifier for Ed25519Verifier {
        fn verify(&self, header_digest: &[u8], signature: &[u8]) -> Result<()> {
            let sig = Ed25519Signature::from_slice(signature)
                .map_err(|_| BpakError::InvalidSignature)?;
            self.0
                .verify(header_digest, &sig)
                .map_err(|_| BpakError::InvalidSignature)
        }
    }

    /// NIST P-256 (prime256v1) ECDSA signer.
    pub struct P256Signer(pub P256SigningKey);

    impl Signer for P256Signer {
        fn sign(&self, header_digest: &[u8]) -> Result<Vec<u8>> {
            let sig: P256Signature = self.0.sign(header_digest);
            Ok(sig.to_der().as_bytes().to_vec())
        }
    }

    /// NIST P-256 ECDSA verifier.
    pub struct P256Verifier(pub P256VerifyingKey);

    impl Verifier for P256Verifier {
        fn verify(&self, header_digest: &[u8], signature: &[u8]) -> Result<()> {
            let sig = P256Signature::from_der(signature).map_err(|_| BpakError::InvalidSignature)?;
            self.0
                .verify(header_digest, &sig)
                .map_err(|_| BpakError::InvalidSignature)
        }
    }

    /// NIST P-384 (secp384r1) ECDSA signer.
    pub struct P384Signer(pub P384SigningKey);

    impl Signer for P384Signer {
        fn sign(&self, header_digest: &[u8]) -> Result<Vec<u8>> {
            use p384::ecdsa::signature::Signer as _;
            let sig: P384Signature = self.0.sign(header_digest);
            Ok(sig.to_der().as_bytes().to_vec())
        }
    }

    /// NIST P-384 ECDSA verifier.
    pub struct P384Verifier(pub P384VerifyingKey);

    impl Verifier for P384Verifier {
        fn verify(&self, header_digest: &[u8], signature: &[u8]) -> Result<()> {
            use p384::ecdsa::signature::Verifier as _;
            let sig = P384Signature::from_der(signature).map_err(|_| BpakError::InvalidSignature)?;
            self.0
                .verify(header_digest, &sig)
                .map_err(|_| BpakError::InvalidSignature)
        }
    }

    /// NIST P-521 (secp521r1) ECDSA signer.
    pub struct P521Signer(pub P521SigningKey);

    impl Signer for P521Signer {
        fn sign(&self, header_digest: &[u8]) -> Result<Vec<u8>> {
            use p521::ecdsa::signature::Signer as _;
            let sig: P521Signature = self.0.sign(header_digest);
            Ok(sig.to_der().as_bytes().to_vec())
        }
    }

    /// NIST P-521 ECDSA verifier.
    pub struct P521Verifier(pub P521VerifyingKey);

    impl Verifier for P521Verifier {
        fn verify(&self, header_digest: &[u8], signature: &[u8]) -> Result<()> {
            use p521::ecdsa::signature::Verifier as _;
            let sig = P521Signature::from_der(signature).map_err(|_| BpakError::InvalidSignature)?;
            self.0
                .verify(header_digest, &sig)
                .map_err(|_| BpakError::InvalidSignature)
        }
    }

    /// RSA-4096, PKCS#1 v1.5 padding over SHA-256.
    pub struct RsaSigner(pub RsaPrivateKey);

    impl Signer for RsaSigner {
        fn sign(&self, header_digest: &[u8]) -> Result<Vec<u8>> {
            let signing_key = RsaSigningKey::<sha2::Sha256>::new(self.0.clone());
            let mut rng = rand::thread_rng();
            let sig = signing_key.sign_with_rng(&mut rng, header_digest);
            Ok(sig.as_bytes().to_vec())
        }
    }

    /// RSA-4096, PKCS#1 v1.5 verifier.
    pub struct RsaVerifier(pub RsaPublicKey);

    impl Verifier for RsaVerifier {
        fn verify(&self, header_digest: &[u8], signature: &[u8]) -> Result<()> {
            let verifying_key = RsaVerifyingKey::<sha2::Sha256>::new(self.0.clone());
            let sig = RsaSignature::try_from(signature).map_err(|_| BpakError::InvalidSignature)?;
            verifying_key
                .verify(header_digest, &sig)
                .map_err(|_| BpakError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{HashKind, SignatureKind};

    struct AcceptAll;
    impl Verifier for AcceptAll {
        fn verify(&self, _: &[u8], _: &[u8]) -> Result<()> {
            Ok(())
        }
    }
    struct RejectAll;
    impl Verifier for RejectAll {
        fn verify(&self, _: &[u8], _: &[u8]) -> Result<()> {
            Err(BpakError::InvalidSignature)
        }
    }

    #[test]
    fn write_signature_sets_size_and_bytes() {
        let mut h = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        write_signature(&mut h, &[1, 2, 3]).unwrap();
        assert_eq!(h.signature_sz, 3);
        assert_eq!(&h.signature[..3], &[1, 2, 3]);
        assert!(h.signature[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_signature_is_rejected() {
        let mut h = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        let big = alloc::vec![0u8; SIGNATURE_SIZE + 1];
        assert!(write_signature(&mut h, &big).is_err());
    }

    #[test]
    fn payload_hash_mismatch_is_checked_before_signature() {
        let h = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        let wrong = [0xAAu8; 32];
        assert!(matches!(
            verify_signature(&h, &wrong, &AcceptAll),
            Err(BpakError::PayloadHashMismatch)
        ));
    }

    #[test]
    fn matching_payload_hash_defers_to_verifier() {
        let h = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        let matching = &h.payload_hash[..32];
        assert!(verify_signature(&h, matching, &AcceptAll).is_ok());
        assert!(matches!(
            verify_signature(&h, matching, &RejectAll),
            Err(BpakError::InvalidSignature)
        ));
    }
}
