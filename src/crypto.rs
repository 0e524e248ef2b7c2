//! Low-level cryptographic operations.
//!
//! This is the only module that imports `ring`. All other modules encrypt,
//! decrypt, wrap and unwrap exclusively through the functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **KDF**: PBKDF2-HMAC-SHA256, iteration count carried per account
//! - **Key size**: 256 bits (32 bytes)
//!
//! # Envelope layout
//! ```text
//! base64( [ nonce (12 bytes) ][ ciphertext ][ GCM tag (16 bytes) ] )
//! ```

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;
use crate::keys::{DataKey, WrappingKey};

/// The AEAD algorithm used throughout fieldvault.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Size of a DEK or wrapping key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of a freshly generated password salt in bytes.
pub const SALT_LEN: usize = 16;

/// Smallest decoded envelope: nonce plus tag around an empty plaintext.
/// Anything shorter cannot be ciphertext.
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN + TAG_LEN;

/// Fill a buffer from the system CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| CryptoError::RandomnessFailure)
}

/// Generate `len` cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; len];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a fresh random salt for password key derivation.
pub fn generate_salt() -> Result<Vec<u8>, CryptoError> {
    random_bytes(SALT_LEN)
}

/// Generate a new random Data Encryption Key.
///
/// This is the only function in the crate that produces DEK material from
/// scratch. Called once per account, at signup or first migration.
pub fn generate_key() -> Result<DataKey, CryptoError> {
    let mut bytes = [0u8; KEY_LEN];
    fill_random(&mut bytes)?;
    Ok(DataKey::from_bytes(bytes))
}

/// Derive a wrapping key from a password with PBKDF2-HMAC-SHA256.
///
/// The iteration count comes from the account, not from a global
/// constant, so accounts created under an older count stay recoverable.
pub fn derive_key_from_password(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<WrappingKey, CryptoError> {
    let iterations = NonZeroU32::new(iterations).ok_or(CryptoError::KeyDerivationFailure)?;
    if salt.is_empty() {
        return Err(CryptoError::KeyDerivationFailure);
    }

    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, salt, password.as_bytes(), &mut out);
    Ok(WrappingKey::from_bytes(out))
}

/// Encrypt raw bytes under a raw key. Returns `nonce ‖ ciphertext ‖ tag`.
pub(crate) fn seal(key_bytes: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| CryptoError::InvalidKey)?;
    let key = LessSafeKey::new(unbound);

    // A fresh nonce for every call. There is no counter and no caching.
    let mut nonce_bytes = [0u8; NONCE_LEN];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::EncryptionFailure)?;

    let mut output = Vec::with_capacity(NONCE_LEN + in_out.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&in_out);
    Ok(output)
}

/// Decrypt `nonce ‖ ciphertext ‖ tag` under a raw key.
///
/// If the key is wrong or the bytes were tampered with, the GCM check fails
/// and no partial plaintext is returned.
pub(crate) fn open(
    key_bytes: &[u8; KEY_LEN],
    envelope: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(CryptoError::MalformedEnvelope);
    }

    let (nonce_bytes, sealed) = envelope.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| CryptoError::MalformedEnvelope)?;

    let unbound = UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| CryptoError::InvalidKey)?;
    let key = LessSafeKey::new(unbound);

    // Wiped on drop, including the tag bytes left in capacity.
    let mut payload = Zeroizing::new(sealed.to_vec());
    let plaintext_len = key
        .open_in_place(nonce, Aad::empty(), payload.as_mut_slice())
        .map_err(|_| CryptoError::DecryptionFailure)?
        .len();
    payload.truncate(plaintext_len);
    Ok(payload)
}

/// Decode a base64 envelope, rejecting anything too short to be one.
fn decode_envelope(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|_| CryptoError::MalformedEnvelope)?;
    if bytes.len() < MIN_ENVELOPE_LEN {
        return Err(CryptoError::MalformedEnvelope);
    }
    Ok(bytes)
}

/// Encrypt bytes under the DEK into a base64 envelope.
pub fn encrypt_bytes(plaintext: &[u8], key: &DataKey) -> Result<String, CryptoError> {
    let sealed = seal(key.as_bytes(), plaintext)?;
    Ok(STANDARD.encode(sealed))
}

/// Decrypt a base64 envelope produced by [`encrypt_bytes`].
pub fn decrypt_bytes(encoded: &str, key: &DataKey) -> Result<Vec<u8>, CryptoError> {
    let envelope = decode_envelope(encoded)?;
    let plaintext = open(key.as_bytes(), &envelope)?;
    Ok(plaintext.to_vec())
}

/// Encrypt a UTF-8 string into a base64 envelope.
pub fn encrypt_str(plaintext: &str, key: &DataKey) -> Result<String, CryptoError> {
    encrypt_bytes(plaintext.as_bytes(), key)
}

/// Decrypt a base64 envelope into a UTF-8 string.
///
/// Non-UTF-8 plaintext is reported as a decryption failure.
pub fn decrypt_str(encoded: &str, key: &DataKey) -> Result<String, CryptoError> {
    let bytes = decrypt_bytes(encoded, key)?;
    String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionFailure)
}

/// Wrap a DEK under a wrapping key (password- or session-derived).
pub fn wrap_key(target: &DataKey, wrapping_key: &WrappingKey) -> Result<String, CryptoError> {
    let sealed = seal(wrapping_key.as_bytes(), target.as_bytes())?;
    Ok(STANDARD.encode(sealed))
}

/// Unwrap a DEK previously wrapped with [`wrap_key`].
pub fn unwrap_key(wrapped: &str, wrapping_key: &WrappingKey) -> Result<DataKey, CryptoError> {
    let envelope = decode_envelope(wrapped)?;
    let raw = open(wrapping_key.as_bytes(), &envelope)?;

    let mut bytes =
        <[u8; KEY_LEN]>::try_from(raw.as_slice()).map_err(|_| CryptoError::InvalidKey)?;
    let key = DataKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Cheap structural check: does this string even look like an envelope?
///
/// True when it is valid base64 whose decoded length is at least
/// [`MIN_ENVELOPE_LEN`]. This is a heuristic, not proof of encryption;
/// callers that need certainty must also try to decrypt.
pub fn looks_like_envelope(value: &str) -> bool {
    decode_envelope(value).is_ok()
}
