//! Byte-stream cipher adapter.
//!
//! A [`CipherConfig`] is resolved once when the encryption stage is built.
//! For each request it hands out a [`Keystream`], and [`transform_body`]
//! binds that keystream to a streaming body.
//!
//! Only counter-like modes are supported: AES in CTR mode and ChaCha20.
//! Their keystream at any byte offset can be computed directly, which is
//! what makes range reads decryptable. Encryption and decryption are the
//! same operation, so no chunk buffering or block alignment is needed and
//! the producer's chunk cadence is preserved.

use aes::{Aes128, Aes192, Aes256};
use bytes::{Bytes, BytesMut};
use chacha20::ChaCha20;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use futures_util::future;
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, BodyStream, StreamBody};
use mnemosyne_core::{GatewayError, KeyFormatError, KeyMaterial};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::Body;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes192Ctr = ctr::Ctr128BE<Aes192>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Errors raised by the cipher adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// The algorithm and mode pair does not name a supported cipher.
    #[error("unsupported cipher {algorithm}/{mode}")]
    Unsupported {
        /// Requested algorithm name.
        algorithm: String,
        /// Requested mode name.
        mode: String,
    },

    /// The key material does not fit the cipher.
    #[error(transparent)]
    Key(#[from] KeyFormatError),

    /// The keystream cannot be positioned at the requested offset.
    #[error("cannot seek keystream to offset {offset}")]
    Seek {
        /// Requested byte offset.
        offset: u64,
    },
}

impl From<CipherError> for GatewayError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Unsupported { .. } => Self::configuration(err.to_string()),
            CipherError::Key(key) => Self::KeyFormat(key),
            CipherError::Seek { .. } => Self::range_not_satisfiable(err.to_string()),
        }
    }
}

/// A supported cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// AES-128 in CTR mode.
    Aes128Ctr,
    /// AES-192 in CTR mode.
    Aes192Ctr,
    /// AES-256 in CTR mode.
    Aes256Ctr,
    /// ChaCha20 stream cipher (IETF, 96-bit nonce).
    ChaCha20,
}

impl CipherAlgorithm {
    /// Resolves an algorithm name and mode name.
    ///
    /// Names are case-insensitive. AES accepts `aes-128`, `aes-192` and
    /// `aes-256` (or `aes128` etc.) with mode `ctr`. ChaCha20 accepts mode
    /// `stream` or `ctr`.
    pub fn resolve(algorithm: &str, mode: &str) -> Result<Self, CipherError> {
        let algo = algorithm.trim().to_ascii_lowercase().replace('_', "-");
        let mode_name = mode.trim().to_ascii_lowercase();

        let resolved = match (algo.as_str(), mode_name.as_str()) {
            ("aes-128" | "aes128", "ctr") => Some(Self::Aes128Ctr),
            ("aes-192" | "aes192", "ctr") => Some(Self::Aes192Ctr),
            ("aes-256" | "aes256", "ctr") => Some(Self::Aes256Ctr),
            ("chacha20", "stream" | "ctr") => Some(Self::ChaCha20),
            _ => None,
        };

        resolved.ok_or_else(|| CipherError::Unsupported {
            algorithm: algorithm.to_string(),
            mode: mode.to_string(),
        })
    }

    /// Returns the canonical algorithm name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aes128Ctr => "aes-128",
            Self::Aes192Ctr => "aes-192",
            Self::Aes256Ctr => "aes-256",
            Self::ChaCha20 => "chacha20",
        }
    }

    /// Returns the canonical mode name.
    pub const fn mode(self) -> &'static str {
        match self {
            Self::Aes128Ctr | Self::Aes192Ctr | Self::Aes256Ctr => "ctr",
            Self::ChaCha20 => "stream",
        }
    }

    /// Required key length in bytes.
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Ctr => 16,
            Self::Aes192Ctr => 24,
            Self::Aes256Ctr | Self::ChaCha20 => 32,
        }
    }

    /// Required IV length in bytes.
    pub const fn iv_len(self) -> usize {
        match self {
            Self::Aes128Ctr | Self::Aes192Ctr | Self::Aes256Ctr => 16,
            Self::ChaCha20 => 12,
        }
    }
}

/// Process-wide cipher configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherConfig {
    algorithm: CipherAlgorithm,
}

impl CipherConfig {
    /// Resolves the configured algorithm and mode.
    pub fn new(algorithm: &str, mode: &str) -> Result<Self, CipherError> {
        CipherAlgorithm::resolve(algorithm, mode).map(|algorithm| Self { algorithm })
    }

    /// Returns the resolved algorithm.
    pub const fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Creates the keystream for one object.
    ///
    /// Without an explicit IV, the IV is derived from `object_path`, so the
    /// same key yields a distinct keystream for every object.
    pub fn keystream(
        &self,
        material: &KeyMaterial,
        object_path: &str,
    ) -> Result<Keystream, CipherError> {
        let algorithm = self.algorithm;
        let key = material.key_bytes();
        if key.len() != algorithm.key_len() {
            return Err(KeyFormatError::KeyLength {
                algorithm: algorithm.name(),
                expected: algorithm.key_len(),
                actual: key.len(),
            }
            .into());
        }

        let derived;
        let iv = match material.iv() {
            Some(iv) => iv,
            None => {
                derived = Sha256::digest(object_path.as_bytes());
                &derived[..algorithm.iv_len()]
            }
        };
        if iv.len() != algorithm.iv_len() {
            return Err(KeyFormatError::IvLength {
                algorithm: algorithm.name(),
                expected: algorithm.iv_len(),
                actual: iv.len(),
            }
            .into());
        }

        let invalid = |_| KeyFormatError::Source("cipher rejected key material".to_string());
        let inner = match algorithm {
            CipherAlgorithm::Aes128Ctr => {
                KeystreamInner::Aes128(Aes128Ctr::new_from_slices(key, iv).map_err(invalid)?)
            }
            CipherAlgorithm::Aes192Ctr => {
                KeystreamInner::Aes192(Aes192Ctr::new_from_slices(key, iv).map_err(invalid)?)
            }
            CipherAlgorithm::Aes256Ctr => {
                KeystreamInner::Aes256(Aes256Ctr::new_from_slices(key, iv).map_err(invalid)?)
            }
            CipherAlgorithm::ChaCha20 => {
                KeystreamInner::ChaCha20(ChaCha20::new_from_slices(key, iv).map_err(invalid)?)
            }
        };

        Ok(Keystream { inner })
    }
}

enum KeystreamInner {
    Aes128(Aes128Ctr),
    Aes192(Aes192Ctr),
    Aes256(Aes256Ctr),
    ChaCha20(ChaCha20),
}

/// Keyed cipher state for one body.
pub struct Keystream {
    inner: KeystreamInner,
}

impl Keystream {
    /// XORs the keystream into `chunk`, advancing the stream position.
    pub fn apply(&mut self, chunk: &Bytes) -> Bytes {
        let mut buf = BytesMut::from(&chunk[..]);
        match &mut self.inner {
            KeystreamInner::Aes128(c) => c.apply_keystream(&mut buf),
            KeystreamInner::Aes192(c) => c.apply_keystream(&mut buf),
            KeystreamInner::Aes256(c) => c.apply_keystream(&mut buf),
            KeystreamInner::ChaCha20(c) => c.apply_keystream(&mut buf),
        }
        buf.freeze()
    }

    /// Positions the keystream at byte `offset` of the object.
    pub fn seek(&mut self, offset: u64) -> Result<(), CipherError> {
        let result = match &mut self.inner {
            KeystreamInner::Aes128(c) => c.try_seek(offset),
            KeystreamInner::Aes192(c) => c.try_seek(offset),
            KeystreamInner::Aes256(c) => c.try_seek(offset),
            KeystreamInner::ChaCha20(c) => c.try_seek(offset),
        };
        result.map_err(|_| CipherError::Seek { offset })
    }
}

impl std::fmt::Debug for Keystream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.inner {
            KeystreamInner::Aes128(_) => "aes-128-ctr",
            KeystreamInner::Aes192(_) => "aes-192-ctr",
            KeystreamInner::Aes256(_) => "aes-256-ctr",
            KeystreamInner::ChaCha20(_) => "chacha20",
        };
        f.debug_struct("Keystream").field("cipher", &name).finish()
    }
}

/// Binds `keystream` to `body`.
///
/// Each data frame is transformed as it is pulled, so nothing is read ahead
/// of the consumer. Empty data frames are dropped, trailers pass through.
pub fn transform_body(body: Body, mut keystream: Keystream) -> Body {
    let frames = BodyStream::new(body).try_filter_map(move |frame| {
        let out = match frame.into_data() {
            Ok(data) if data.is_empty() => None,
            Ok(data) => Some(http_body::Frame::data(keystream.apply(&data))),
            Err(frame) => Some(frame),
        };
        future::ready(Ok(out))
    });
    StreamBody::new(frames).boxed_unsync()
}
