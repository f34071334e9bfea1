//! Key material handed out by key management.

use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

/// Errors raised when key material has the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyFormatError {
    /// The key (or a part of it) was empty.
    #[error("key material is empty")]
    Empty,

    /// The textual form was not hex encoded.
    #[error("key material is not valid hex")]
    InvalidHex,

    /// The textual form had more than a key and an IV.
    #[error("expected `key` or `key:iv`, found {parts} parts")]
    TooManyParts {
        /// Number of `:`-separated parts found.
        parts: usize,
    },

    /// The key length does not fit the configured cipher.
    #[error("{algorithm} requires a {expected}-byte key, got {actual}")]
    KeyLength {
        /// Cipher algorithm name.
        algorithm: &'static str,
        /// Required key length in bytes.
        expected: usize,
        /// Supplied key length in bytes.
        actual: usize,
    },

    /// The IV length does not fit the configured cipher.
    #[error("{algorithm} requires a {expected}-byte iv, got {actual}")]
    IvLength {
        /// Cipher algorithm name.
        algorithm: &'static str,
        /// Required IV length in bytes.
        expected: usize,
        /// Supplied IV length in bytes.
        actual: usize,
    },

    /// A key source could not produce key material for the request.
    #[error("key source failed: {0}")]
    Source(String),
}

/// A secret key, optionally paired with an explicit initialization vector.
///
/// Both buffers are wiped when the value is dropped. `Debug` never prints
/// the secret.
///
/// # Example
///
/// ```
/// use mnemosyne_core::KeyMaterial;
///
/// let single = KeyMaterial::parse("000102030405060708090a0b0c0d0e0f").unwrap();
/// assert!(single.iv().is_none());
///
/// let pair = KeyMaterial::parse("000102030405060708090a0b0c0d0e0f:ffff").unwrap();
/// assert_eq!(pair.iv(), Some(&[0xff, 0xff][..]));
/// ```
#[derive(Clone)]
pub struct KeyMaterial {
    key: Zeroizing<Vec<u8>>,
    iv: Option<Zeroizing<Vec<u8>>>,
}

impl KeyMaterial {
    /// Creates key material with no explicit IV.
    pub fn key(key: impl Into<Vec<u8>>) -> Result<Self, KeyFormatError> {
        let key = key.into();
        if key.is_empty() {
            return Err(KeyFormatError::Empty);
        }
        Ok(Self {
            key: Zeroizing::new(key),
            iv: None,
        })
    }

    /// Creates a (key, iv) pair.
    pub fn key_and_iv(
        key: impl Into<Vec<u8>>,
        iv: impl Into<Vec<u8>>,
    ) -> Result<Self, KeyFormatError> {
        let iv = iv.into();
        if iv.is_empty() {
            return Err(KeyFormatError::Empty);
        }
        let mut material = Self::key(key)?;
        material.iv = Some(Zeroizing::new(iv));
        Ok(material)
    }

    /// Parses the textual form `hexkey` or `hexkey:hexiv`.
    pub fn parse(text: &str) -> Result<Self, KeyFormatError> {
        let parts: Vec<&str> = text.trim().split(':').collect();
        match parts.as_slice() {
            [key] => Self::key(decode(key)?),
            [key, iv] => Self::key_and_iv(decode(key)?, decode(iv)?),
            _ => Err(KeyFormatError::TooManyParts { parts: parts.len() }),
        }
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Returns the explicit IV, if one was supplied.
    #[must_use]
    pub fn iv(&self) -> Option<&[u8]> {
        self.iv.as_deref().map(Vec::as_slice)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_len", &self.key.len())
            .field("has_iv", &self.iv.is_some())
            .finish()
    }
}

fn decode(part: &str) -> Result<Vec<u8>, KeyFormatError> {
    if part.is_empty() {
        return Err(KeyFormatError::Empty);
    }
    hex::decode(part).map_err(|_| KeyFormatError::InvalidHex)
}
