//! Repeating-key XOR

use std::fmt;

use super::{CryptoMode, PayloadCipher};
use crate::error::{Error, Result};

/// XOR with a key repeated from its first byte on every call
#[derive(Clone)]
pub struct XorCipher {
    key: Vec<u8>,
}

impl XorCipher {
    /// Create a cipher from a non-empty key
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::invalid_crypto("xor", "key is empty"));
        }
        Ok(Self { key: key.to_vec() })
    }

    fn apply(&self, data: &mut [u8]) {
        for (byte, k) in data.iter_mut().zip(self.key.iter().cycle()) {
            *byte ^= k;
        }
    }
}

impl fmt::Debug for XorCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XorCipher")
            .field("key_len", &self.key.len())
            .finish()
    }
}

impl PayloadCipher for XorCipher {
    fn mode(&self) -> CryptoMode {
        CryptoMode::Xor
    }

    fn decrypt(&self, data: &mut [u8]) {
        self.apply(data);
    }

    fn encrypt(&self, data: &mut [u8]) {
        self.apply(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_repeats() {
        let cipher = XorCipher::new(&[0x01, 0x02, 0x03]).unwrap();
        let mut data = vec![0u8; 7];
        cipher.encrypt(&mut data);
        assert_eq!(data, vec![1, 2, 3, 1, 2, 3, 1]);
        cipher.decrypt(&mut data);
        assert_eq!(data, vec![0; 7]);
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(XorCipher::new(&[]).is_err());
    }
}
