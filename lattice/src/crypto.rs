//! Packet scrambling. The cipher contract is a pair of in-place byte
//! transformations that invert each other for buffers of any length; the
//! reference implementation is a rotating-key XOR. It hides payloads from
//! casual inspection only and is not a confidentiality mechanism.

use crate::error::{Error, Result};
use crate::serialize::ByteBuffer;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::RwLock;

/// Default key length for generated keys.
pub const DEFAULT_KEY_SIZE: usize = 32;

/// In-place encrypt/decrypt over a byte buffer. `decrypt(encrypt(b)) == b`
/// must hold for every buffer.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, data: &mut ByteBuffer);

    fn decrypt(&self, data: &mut ByteBuffer);
}

/// Fills the buffer with bytes from an entropy-seeded generator.
#[inline]
pub fn random_bytes(out: &mut [u8]) {
    StdRng::from_entropy().fill_bytes(out);
}

/// XOR cipher with a rotating key. The key sits behind a reader/writer lock
/// so encryption on several channels can proceed concurrently while key
/// rotation takes the exclusive side.
#[derive(Debug)]
pub struct XorCipher {
    key: RwLock<Vec<u8>>,
}

impl XorCipher {
    /// Constructs the cipher from raw key bytes.
    ///
    /// Panics if the key is empty; an empty key cannot rotate.
    #[inline]
    pub fn new(key: Vec<u8>) -> XorCipher {
        if key.is_empty() {
            panic!("XorCipher requires a non-empty key");
        }

        XorCipher { key: RwLock::new(key) }
    }

    /// Constructs the cipher with a freshly generated key of the given size.
    #[inline]
    pub fn random(size: usize) -> XorCipher {
        let mut key = vec![0u8; size.max(1)];
        random_bytes(&mut key);
        XorCipher::new(key)
    }

    /// Constructs the cipher from a base64-encoded key, the form keys take
    /// in configuration files.
    pub fn from_base64(encoded: &str) -> Result<XorCipher> {
        let key = base64::decode(encoded).map_err(|_| Error::InvalidKey)?;

        if key.is_empty() {
            return Err(Error::InvalidKey);
        }

        Ok(XorCipher::new(key))
    }

    /// Snapshot of the current key.
    pub fn key(&self) -> Vec<u8> {
        self.key.read().expect("cipher key lock poisoned").clone()
    }

    /// The current key in its configuration encoding.
    pub fn key_base64(&self) -> String {
        base64::encode(&*self.key.read().expect("cipher key lock poisoned"))
    }

    /// Replaces the key. Panics on an empty key, like `new`.
    pub fn set_key(&self, key: Vec<u8>) {
        if key.is_empty() {
            panic!("XorCipher requires a non-empty key");
        }

        *self.key.write().expect("cipher key lock poisoned") = key;
    }
}

impl Default for XorCipher {
    #[inline]
    fn default() -> XorCipher {
        XorCipher::random(DEFAULT_KEY_SIZE)
    }
}

fn apply_xor(data: &mut [u8], key: &[u8]) {
    for (index, byte) in data.iter_mut().enumerate() {
        *byte ^= key[index % key.len()];
    }
}

impl Cipher for XorCipher {
    fn encrypt(&self, data: &mut ByteBuffer) {
        let key = self.key.read().expect("cipher key lock poisoned");
        apply_xor(data, &key);
    }

    fn decrypt(&self, data: &mut ByteBuffer) {
        let key = self.key.read().expect("cipher key lock poisoned");
        apply_xor(data, &key);
    }
}
