//! AES in counter mode
//!
//! The counter is the full 128-bit IV incremented big-endian. Every call
//! starts again from the IV, so each NAL unit is an independent stream.

use std::fmt;

use aes::{Aes128, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};

use super::{CryptoMode, PayloadCipher};
use crate::error::{Error, Result};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

#[derive(Clone, Copy)]
enum AesKey {
    Aes128([u8; 16]),
    Aes256([u8; 32]),
}

/// AES-CTR keyed with a 16 or 32 byte key
#[derive(Clone)]
pub struct AesCtrCipher {
    key: AesKey,
    iv: [u8; 16],
}

impl AesCtrCipher {
    /// Create a cipher; the key selects AES-128 or AES-256
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        let iv: [u8; 16] = iv
            .try_into()
            .map_err(|_| Error::invalid_crypto("aes", format!("iv must be 16 bytes, got {}", iv.len())))?;
        let key = if let Ok(key) = <[u8; 32]>::try_from(key) {
            AesKey::Aes256(key)
        } else if let Ok(key) = <[u8; 16]>::try_from(key) {
            AesKey::Aes128(key)
        } else {
            return Err(Error::invalid_crypto(
                "aes",
                format!("key must be 16 or 32 bytes, got {}", key.len()),
            ));
        };
        Ok(Self { key, iv })
    }

    /// Key size in bits
    pub fn key_bits(&self) -> u32 {
        match self.key {
            AesKey::Aes128(_) => 128,
            AesKey::Aes256(_) => 256,
        }
    }

    fn apply(&self, data: &mut [u8]) {
        match self.key {
            AesKey::Aes128(key) => Aes128Ctr::new(&key.into(), &self.iv.into()).apply_keystream(data),
            AesKey::Aes256(key) => Aes256Ctr::new(&key.into(), &self.iv.into()).apply_keystream(data),
        }
    }
}

impl fmt::Debug for AesCtrCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCtrCipher")
            .field("key_bits", &self.key_bits())
            .finish_non_exhaustive()
    }
}

impl PayloadCipher for AesCtrCipher {
    fn mode(&self) -> CryptoMode {
        CryptoMode::Aes
    }

    fn decrypt(&self, data: &mut [u8]) {
        self.apply(data);
    }

    fn encrypt(&self, data: &mut [u8]) {
        self.apply(data);
    }
}
