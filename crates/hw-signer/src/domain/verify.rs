//! # ECDSA Verification (NIST P-256, P-384, P-521)
//!
//! Pure, stateless verification of signatures produced by a hardware
//! signer or its helper process.
//!
//! 1. Decode the base64 public key and parse it as SubjectPublicKeyInfo;
//!    it must be an elliptic-curve key on a supported curve.
//! 2. Decode the base64 signature and parse it as a DER (r, s) pair for
//!    that curve.
//! 3. Hash the message with SHA-256.
//! 4. Verify the prehash against the key.
//!
//! Decoding problems are errors. A signature that simply does not match is
//! `Ok(false)`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ecdsa::signature::hazmat::PrehashVerifier;
use ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::der::Decode;
use p256::pkcs8::spki::SubjectPublicKeyInfoRef;
use p256::pkcs8::ObjectIdentifier;
use p256::NistP256;
use p384::NistP384;
use p521::NistP521;
use sha2::{Digest, Sha256};

use super::errors::VerifyError;

/// id-ecPublicKey (RFC 5480)
const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// secp256r1 / prime256v1 / NIST P-256
const SECP256R1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// secp384r1 / NIST P-384
const SECP384R1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// secp521r1 / NIST P-521
const SECP521R1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");

/// Scalar field width of P-521 in bytes.
const P521_FIELD_BYTES: usize = 66;

/// An elliptic-curve public key on one of the supported NIST curves.
#[derive(Clone, Debug)]
pub enum EcVerifyingKey {
    P256(VerifyingKey<NistP256>),
    P384(VerifyingKey<NistP384>),
    P521(VerifyingKey<NistP521>),
}

impl EcVerifyingKey {
    pub fn curve_name(&self) -> &'static str {
        match self {
            EcVerifyingKey::P256(_) => "P-256",
            EcVerifyingKey::P384(_) => "P-384",
            EcVerifyingKey::P521(_) => "P-521",
        }
    }

    /// Verify a DER signature over a SHA-256 digest.
    ///
    /// A digest narrower than the curve is read as a big-endian integer,
    /// so it is left-padded rather than rejected.
    pub fn verify_digest(
        &self,
        signature_der: &[u8],
        digest: &[u8; 32],
    ) -> Result<bool, VerifyError> {
        match self {
            EcVerifyingKey::P256(key) => {
                check(key, Signature::<NistP256>::from_der(signature_der), digest)
            }
            EcVerifyingKey::P384(key) => {
                check(key, Signature::<NistP384>::from_der(signature_der), digest)
            }
            EcVerifyingKey::P521(key) => check(
                key,
                Signature::<NistP521>::from_der(signature_der),
                &widen(digest, P521_FIELD_BYTES),
            ),
        }
    }
}

/// Verify a base64 DER ECDSA signature over `message` with a base64 SPKI key.
pub fn verify_signature(
    public_key_base64: &str,
    signature_base64: &str,
    message: &[u8],
) -> Result<bool, VerifyError> {
    let verifying_key = decode_public_key(public_key_base64)?;
    let signature = decode_signature(signature_base64)?;

    verifying_key.verify_digest(&signature, &sha256(message))
}

/// Decode a base64 SPKI public key on P-256, P-384 or P-521.
pub fn decode_public_key(public_key_base64: &str) -> Result<EcVerifyingKey, VerifyError> {
    let der = STANDARD
        .decode(public_key_base64)
        .map_err(|e| VerifyError::PublicKeyEncoding(e.to_string()))?;

    let spki = SubjectPublicKeyInfoRef::from_der(&der)
        .map_err(|e| VerifyError::PublicKeyStructure(e.to_string()))?;

    if spki.algorithm.oid != EC_PUBLIC_KEY_OID {
        return Err(VerifyError::NotEllipticCurve);
    }

    let curve = spki
        .algorithm
        .parameters_oid()
        .map_err(|e| VerifyError::PublicKeyStructure(e.to_string()))?;
    let point = spki.subject_public_key.as_bytes().ok_or_else(|| {
        VerifyError::PublicKeyStructure("public key bit string is not octet-aligned".to_string())
    })?;

    let key = if curve == SECP256R1_OID {
        VerifyingKey::from_sec1_bytes(point).map(EcVerifyingKey::P256)
    } else if curve == SECP384R1_OID {
        VerifyingKey::from_sec1_bytes(point).map(EcVerifyingKey::P384)
    } else if curve == SECP521R1_OID {
        VerifyingKey::from_sec1_bytes(point).map(EcVerifyingKey::P521)
    } else {
        return Err(VerifyError::UnsupportedCurve(curve.to_string()));
    };
    key.map_err(|e| VerifyError::PublicKeyStructure(e.to_string()))
}

/// Decode a base64 DER signature.
///
/// The (r, s) structure is parsed against the key's curve during
/// verification.
pub fn decode_signature(signature_base64: &str) -> Result<Vec<u8>, VerifyError> {
    STANDARD
        .decode(signature_base64)
        .map_err(|e| VerifyError::SignatureEncoding(e.to_string()))
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn check<S>(
    key: &impl PrehashVerifier<S>,
    signature: Result<S, ecdsa::Error>,
    prehash: &[u8],
) -> Result<bool, VerifyError> {
    let signature = signature.map_err(|e| VerifyError::SignatureStructure(e.to_string()))?;
    Ok(key.verify_prehash(prehash, &signature).is_ok())
}

/// Left-pad `digest` with zeros to `width` bytes.
fn widen(digest: &[u8], width: usize) -> Vec<u8> {
    let mut padded = vec![0u8; width.saturating_sub(digest.len())];
    padded.extend_from_slice(digest);
    padded
}

// =============================================================================
// TEST HELPERS
// =============================================================================


// =============================================================================
// UNIT TESTS
// =============================================================================
