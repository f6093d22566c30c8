//! SM4 block cipher (GB/T 32907-2016) in ECB mode
//!
//! Only whole 16-byte blocks are transformed; a trailing partial block is
//! left in the clear.

use std::fmt;

use super::{CryptoMode, PayloadCipher};
use crate::error::{Error, Result};

/// Block size in bytes
pub const BLOCK_SIZE: usize = 16;

const ROUNDS: usize = 32;

#[rustfmt::skip]
const SBOX: [u8; 256] = [
    0xd6, 0x90, 0xe9, 0xfe, 0xcc, 0xe1, 0x3d, 0xb7, 0x16, 0xb6, 0x14, 0xc2, 0x28, 0xfb, 0x2c, 0x05,
    0x2b, 0x67, 0x9a, 0x76, 0x2a, 0xbe, 0x04, 0xc3, 0xaa, 0x44, 0x13, 0x26, 0x49, 0x86, 0x06, 0x99,
    0x9c, 0x42, 0x50, 0xf4, 0x91, 0xef, 0x98, 0x7a, 0x33, 0x54, 0x0b, 0x43, 0xed, 0xcf, 0xac, 0x62,
    0xe4, 0xb3, 0x1c, 0xa9, 0xc9, 0x08, 0xe8, 0x95, 0x80, 0xdf, 0x94, 0xfa, 0x75, 0x8f, 0x3f, 0xa6,
    0x47, 0x07, 0xa7, 0xfc, 0xf3, 0x73, 0x17, 0xba, 0x83, 0x59, 0x3c, 0x19, 0xe6, 0x85, 0x4f, 0xa8,
    0x68, 0x6b, 0x81, 0xb2, 0x71, 0x64, 0xda, 0x8b, 0xf8, 0xeb, 0x0f, 0x4b, 0x70, 0x56, 0x9d, 0x35,
    0x1e, 0x24, 0x0e, 0x5e, 0x63, 0x58, 0xd1, 0xa2, 0x25, 0x22, 0x7c, 0x3b, 0x01, 0x21, 0x78, 0x87,
    0xd4, 0x00, 0x46, 0x57, 0x9f, 0xd3, 0x27, 0x52, 0x4c, 0x36, 0x02, 0xe7, 0xa0, 0xc4, 0xc8, 0x9e,
    0xea, 0xbf, 0x8a, 0xd2, 0x40, 0xc7, 0x38, 0xb5, 0xa3, 0xf7, 0xf2, 0xce, 0xf9, 0x61, 0x15, 0xa1,
    0xe0, 0xae, 0x5d, 0xa4, 0x9b, 0x34, 0x1a, 0x55, 0xad, 0x93, 0x32, 0x30, 0xf5, 0x8c, 0xb1, 0xe3,
    0x1d, 0xf6, 0xe2, 0x2e, 0x82, 0x66, 0xca, 0x60, 0xc0, 0x29, 0x23, 0xab, 0x0d, 0x53, 0x4e, 0x6f,
    0xd5, 0xdb, 0x37, 0x45, 0xde, 0xfd, 0x8e, 0x2f, 0x03, 0xff, 0x6a, 0x72, 0x6d, 0x6c, 0x5b, 0x51,
    0x8d, 0x1b, 0xaf, 0x92, 0xbb, 0xdd, 0xbc, 0x7f, 0x11, 0xd9, 0x5c, 0x41, 0x1f, 0x10, 0x5a, 0xd8,
    0x0a, 0xc1, 0x31, 0x88, 0xa5, 0xcd, 0x7b, 0xbd, 0x2d, 0x74, 0xd0, 0x12, 0xb8, 0xe5, 0xb4, 0xb0,
    0x89, 0x69, 0x97, 0x4a, 0x0c, 0x96, 0x77, 0x7e, 0x65, 0xb9, 0xf1, 0x09, 0xc5, 0x6e, 0xc6, 0x84,
    0x18, 0xf0, 0x7d, 0xec, 0x3a, 0xdc, 0x4d, 0x20, 0x79, 0xee, 0x5f, 0x3e, 0xd7, 0xcb, 0x39, 0x48,
];

const FK: [u32; 4] = [0xa3b1_bac6, 0x56aa_3350, 0x677d_9197, 0xb270_22dc];

/// CK[i] byte j is (4i + j) * 7 mod 256
const CK: [u32; ROUNDS] = {
    let mut ck = [0u32; ROUNDS];
    let mut i = 0;
    while i < ROUNDS {
        let mut word = 0u32;
        let mut j = 0;
        while j < 4 {
            word = (word << 8) | (((4 * i + j) * 7) & 0xff) as u32;
            j += 1;
        }
        ck[i] = word;
        i += 1;
    }
    ck
};

/// Non-linear byte substitution applied to each byte of a word
fn tau(word: u32) -> u32 {
    let b = word.to_be_bytes();
    u32::from_be_bytes([
        SBOX[b[0] as usize],
        SBOX[b[1] as usize],
        SBOX[b[2] as usize],
        SBOX[b[3] as usize],
    ])
}

/// Round transform T
fn round_t(word: u32) -> u32 {
    let b = tau(word);
    b ^ b.rotate_left(2) ^ b.rotate_left(10) ^ b.rotate_left(18) ^ b.rotate_left(24)
}

/// Key schedule transform T'
fn key_t(word: u32) -> u32 {
    let b = tau(word);
    b ^ b.rotate_left(13) ^ b.rotate_left(23)
}

fn load(block: &[u8]) -> [u32; 4] {
    let mut words = [0u32; 4];
    for (word, bytes) in words.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    words
}

/// SM4-ECB with a 128-bit key
#[derive(Clone)]
pub struct Sm4Cipher {
    round_keys: [u32; ROUNDS],
}

impl Sm4Cipher {
    /// Expand a 16-byte key
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != BLOCK_SIZE {
            return Err(Error::invalid_crypto(
                "sm4",
                format!("key must be 16 bytes, got {}", key.len()),
            ));
        }
        let mk = load(key);
        let mut k = [mk[0] ^ FK[0], mk[1] ^ FK[1], mk[2] ^ FK[2], mk[3] ^ FK[3]];
        let mut round_keys = [0u32; ROUNDS];
        for (i, rk) in round_keys.iter_mut().enumerate() {
            let next = k[0] ^ key_t(k[1] ^ k[2] ^ k[3] ^ CK[i]);
            k = [k[1], k[2], k[3], next];
            *rk = next;
        }
        Ok(Self { round_keys })
    }

    /// Encrypt one 16-byte block in place
    pub fn encrypt_block(&self, block: &mut [u8]) {
        self.crypt_block(block, self.round_keys.iter());
    }

    /// Decrypt one 16-byte block in place
    pub fn decrypt_block(&self, block: &mut [u8]) {
        self.crypt_block(block, self.round_keys.iter().rev());
    }

    fn crypt_block<'a>(&self, block: &mut [u8], keys: impl Iterator<Item = &'a u32>) {
        debug_assert_eq!(block.len(), BLOCK_SIZE);
        let mut x = load(block);
        for rk in keys {
            let next = x[0] ^ round_t(x[1] ^ x[2] ^ x[3] ^ rk);
            x = [x[1], x[2], x[3], next];
        }
        for (bytes, word) in block.chunks_exact_mut(4).zip(x.iter().rev()) {
            bytes.copy_from_slice(&word.to_be_bytes());
        }
    }
}

impl fmt::Debug for Sm4Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sm4Cipher").finish_non_exhaustive()
    }
}

impl PayloadCipher for Sm4Cipher {
    fn mode(&self) -> CryptoMode {
        CryptoMode::Sm4
    }

    fn decrypt(&self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            self.decrypt_block(block);
        }
    }

    fn encrypt(&self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            self.encrypt_block(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_vector() {
        let key = hex::decode("0123456789abcdeffedcba9876543210").unwrap();
        let cipher = Sm4Cipher::new(&key).unwrap();
        let mut block = key.clone();
        cipher.encrypt_block(&mut block);
        assert_eq!(hex::encode(&block), "681edf34d206965e86b3e94f536e4246");
        cipher.decrypt_block(&mut block);
        assert_eq!(block, key);
    }

    #[test]
    fn test_two_block_ecb() {
        let key: Vec<u8> = (0..16).collect();
        let cipher = Sm4Cipher::new(&key).unwrap();
        let mut data: Vec<u8> = (0x10..0x30).collect();
        cipher.encrypt(&mut data);
        assert_eq!(
            hex::encode(&data),
            "a73851aa4341e968c71dd8a3a0c8497c07d2bcd4b059dc764cf8da28e17de9e8"
        );
    }

    #[test]
    fn test_partial_tail_stays_clear() {
        let cipher = Sm4Cipher::new(&[0x42; 16]).unwrap();
        let plain: Vec<u8> = (0..40).collect();
        let mut data = plain.clone();
        cipher.encrypt(&mut data);
        assert_ne!(&data[..32], &plain[..32]);
        assert_eq!(&data[32..], &plain[32..]);
        cipher.decrypt(&mut data);
        assert_eq!(data, plain);
    }

    #[test]
    fn test_key_length() {
        assert!(Sm4Cipher::new(&[0; 32]).is_err());
        assert!(Sm4Cipher::new(&[]).is_err());
    }
}
