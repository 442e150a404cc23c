//! Crypto policy handed to an SRTP transform.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Cipher used to encrypt SRTP payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    /// No encryption.
    Null = 0,
    /// AES in counter mode.
    AesCm = 1,
    /// AES in f8 mode.
    AesF8 = 2,
    /// Twofish in counter mode.
    Twofish = 3,
    /// Twofish in f8 mode.
    TwofishF8 = 4,
}

/// Algorithm used to authenticate SRTP packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthAlgorithm {
    /// No authentication.
    Null = 0,
    /// HMAC-SHA1.
    HmacSha1 = 1,
    /// Skein MAC.
    Skein = 2,
}

/// Cipher and authentication parameters of one SRTP crypto context.
///
/// Lengths are in bytes. The value is immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SrtpPolicy {
    encryption: EncryptionAlgorithm,
    encryption_key_len: usize,
    auth: AuthAlgorithm,
    auth_key_len: usize,
    auth_tag_len: usize,
    salt_key_len: usize,
}

impl SrtpPolicy {
    /// Policy from all six parameters.
    pub const fn new(
        encryption: EncryptionAlgorithm,
        encryption_key_len: usize,
        auth: AuthAlgorithm,
        auth_key_len: usize,
        auth_tag_len: usize,
        salt_key_len: usize,
    ) -> Self {
        SrtpPolicy {
            encryption,
            encryption_key_len,
            auth,
            auth_key_len,
            auth_tag_len,
            salt_key_len,
        }
    }

    /// `AES_CM_128_HMAC_SHA1_80` (RFC 4568).
    pub const fn aes_cm_128_hmac_sha1_80() -> Self {
        Self::new(
            EncryptionAlgorithm::AesCm,
            16,
            AuthAlgorithm::HmacSha1,
            20,
            10,
            14,
        )
    }

    /// `AES_CM_128_HMAC_SHA1_32` (RFC 4568).
    pub const fn aes_cm_128_hmac_sha1_32() -> Self {
        Self::new(
            EncryptionAlgorithm::AesCm,
            16,
            AuthAlgorithm::HmacSha1,
            20,
            4,
            14,
        )
    }

    /// `F8_128_HMAC_SHA1_80` (RFC 4568).
    pub const fn f8_128_hmac_sha1_80() -> Self {
        Self::new(
            EncryptionAlgorithm::AesF8,
            16,
            AuthAlgorithm::HmacSha1,
            20,
            10,
            14,
        )
    }

    /// Neither encryption nor authentication.
    pub const fn null() -> Self {
        Self::new(EncryptionAlgorithm::Null, 0, AuthAlgorithm::Null, 0, 0, 0)
    }

    /// Cipher.
    pub fn encryption(&self) -> EncryptionAlgorithm {
        self.encryption
    }

    /// Cipher key length.
    pub fn encryption_key_len(&self) -> usize {
        self.encryption_key_len
    }

    /// Authentication algorithm.
    pub fn auth(&self) -> AuthAlgorithm {
        self.auth
    }

    /// Authentication key length.
    pub fn auth_key_len(&self) -> usize {
        self.auth_key_len
    }

    /// Length of the authentication tag appended to each packet.
    pub fn auth_tag_len(&self) -> usize {
        self.auth_tag_len
    }

    /// Session salt length.
    pub fn salt_key_len(&self) -> usize {
        self.salt_key_len
    }
}

impl fmt::Display for SrtpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{} {:?}/{} tag {} salt {}",
            self.encryption,
            self.encryption_key_len * 8,
            self.auth,
            self.auth_key_len * 8,
            self.auth_tag_len * 8,
            self.salt_key_len * 8
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accessors() {
        let p = SrtpPolicy::aes_cm_128_hmac_sha1_80();
        assert_eq!(p.encryption(), EncryptionAlgorithm::AesCm);
        assert_eq!(p.encryption_key_len(), 16);
        assert_eq!(p.auth(), AuthAlgorithm::HmacSha1);
        assert_eq!(p.auth_key_len(), 20);
        assert_eq!(p.auth_tag_len(), 10);
        assert_eq!(p.salt_key_len(), 14);
        assert_eq!(EncryptionAlgorithm::TwofishF8 as u8, 4);
        assert_eq!(AuthAlgorithm::Skein as u8, 2);
    }

    #[test]
    fn serde_roundtrip() {
        let p = SrtpPolicy::aes_cm_128_hmac_sha1_32();
        let json = serde_json::to_string(&p).unwrap();
        let back: SrtpPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert_eq!(p.to_string(), "AesCm/128 HmacSha1/160 tag 32 salt 112");
    }
}
