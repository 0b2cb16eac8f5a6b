//! Encrypting wrapper around another backend.
//!
//! Every frame body is sealed with AES-256-GCM under a fresh random nonce
//! before it reaches the inner backend:
//!
//! ```text
//! | nonce (12) | ciphertext | tag (16) |
//! ```

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::frame::{DamagedFrame, Frame, FrameScan};
use aes_gcm::aead::{generic_array::GenericArray, Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const KEY_INFO: &[u8] = b"fieldsync-journal-key-v1";

/// Journal encryption key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not exactly [`KEY_SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StorageError::encryption(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Derives a key from a high-entropy passphrase with HKDF-SHA256.
    ///
    /// # Errors
    ///
    /// Returns an error if HKDF expansion fails.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> StorageResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(KEY_INFO, &mut bytes)
            .map_err(|_| StorageError::encryption("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(GenericArray::from_slice(&self.bytes))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A backend that encrypts frames before handing them to `B`.
pub struct EncryptedBackend<B: StorageBackend> {
    inner: B,
    cipher: Aes256Gcm,
}

impl<B: StorageBackend> EncryptedBackend<B> {
    /// Wraps `inner`, sealing frames with `key`.
    #[must_use]
    pub fn new(inner: B, key: &EncryptionKey) -> Self {
        Self {
            inner,
            cipher: key.cipher(),
        }
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn seal(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| StorageError::encryption("encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend(sealed);
        Ok(out)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, &'static str> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err("ciphertext too short");
        }
        let (nonce, body) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| "authentication failed")
    }
}

impl<B: StorageBackend> StorageBackend for EncryptedBackend<B> {
    fn append_frame(&mut self, frame: &[u8]) -> StorageResult<u64> {
        let sealed = self.seal(frame)?;
        self.inner.append_frame(&sealed)
    }

    fn scan(&self) -> StorageResult<FrameScan> {
        let raw = self.inner.scan()?;
        let mut scan = FrameScan {
            frames: Vec::with_capacity(raw.frames.len()),
            damaged: raw.damaged,
        };
        let sealed_count = raw.frames.len();

        for frame in raw.frames {
            match self.open(&frame.body) {
                Ok(body) => scan.frames.push(Frame {
                    index: frame.index,
                    body,
                }),
                Err(reason) => scan.damaged.push(DamagedFrame {
                    index: frame.index,
                    reason: reason.to_string(),
                }),
            }
        }

        // Nothing decrypting at all means the key is wrong, not that the
        // journal is damaged.
        if sealed_count > 0 && scan.frames.is_empty() {
            return Err(StorageError::encryption(
                "no frame could be decrypted; wrong key?",
            ));
        }
        scan.damaged.sort_by_key(|d| d.index);
        Ok(scan)
    }

    fn rewrite(&mut self, frames: &[Vec<u8>]) -> StorageResult<()> {
        let sealed = frames
            .iter()
            .map(|f| self.seal(f))
            .collect::<StorageResult<Vec<_>>>()?;
        self.inner.rewrite(&sealed)
    }

    fn frame_count(&self) -> u64 {
        self.inner.frame_count()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }
}

impl<B: StorageBackend + std::fmt::Debug> std::fmt::Debug for EncryptedBackend<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBackend")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}
