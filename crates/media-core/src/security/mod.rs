//! Payload decryption
//!
//! Three mutually exclusive ciphers can be selected per session: AES-CTR,
//! SM4-ECB and a repeating-key XOR. The [`Decryptor`] applies the selected
//! cipher to the encrypted regions of each demultiplexed frame, in place and
//! without changing its length.

pub mod aes_ctr;
pub mod decryptor;
pub mod sm4;
pub mod xor;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use aes_ctr::AesCtrCipher;
pub use decryptor::{Decryptor, AUDIO_CLEAR_BYTES, VIDEO_CLEAR_BYTES};
pub use sm4::Sm4Cipher;
pub use xor::XorCipher;

/// Cipher selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoMode {
    /// Payloads are in the clear
    #[default]
    None,
    /// AES in counter mode (256-bit, or 128-bit with a 16-byte key)
    Aes,
    /// SM4 in ECB mode over whole blocks
    Sm4,
    /// Repeating-key XOR
    Xor,
}

impl CryptoMode {
    /// Configuration name of the mode
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Aes => "aes",
            Self::Sm4 => "sm4",
            Self::Xor => "xor",
        }
    }
}

impl fmt::Display for CryptoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CryptoMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "aes" | "aes-ctr" => Ok(Self::Aes),
            "sm4" => Ok(Self::Sm4),
            "xor" => Ok(Self::Xor),
            other => Err(Error::invalid_config(format!("unknown crypto mode '{other}'"))),
        }
    }
}

/// Symmetric transform over a byte region
pub trait PayloadCipher: Send + Sync + fmt::Debug {
    /// Mode implemented by this cipher
    fn mode(&self) -> CryptoMode;

    /// Decrypt `data` in place
    fn decrypt(&self, data: &mut [u8]);

    /// Encrypt `data` in place
    fn encrypt(&self, data: &mut [u8]);
}

/// Cipher selection and key material
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Selected cipher
    pub mode: CryptoMode,
    /// Key, hex encoded in configuration files
    #[serde(with = "hex_bytes")]
    pub key: Option<Vec<u8>>,
    /// Initialization vector (AES only), hex encoded
    #[serde(with = "hex_bytes")]
    pub iv: Option<Vec<u8>>,
}

impl fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("mode", &self.mode)
            .field("key_len", &self.key.as_ref().map(Vec::len))
            .field("iv_len", &self.iv.as_ref().map(Vec::len))
            .finish()
    }
}

impl CryptoConfig {
    /// AES-CTR with the given key and IV
    pub fn aes(key: impl Into<Vec<u8>>, iv: impl Into<Vec<u8>>) -> Self {
        Self {
            mode: CryptoMode::Aes,
            key: Some(key.into()),
            iv: Some(iv.into()),
        }
    }

    /// SM4-ECB with the given key
    pub fn sm4(key: impl Into<Vec<u8>>) -> Self {
        Self {
            mode: CryptoMode::Sm4,
            key: Some(key.into()),
            iv: None,
        }
    }

    /// Repeating-key XOR
    pub fn xor(key: impl Into<Vec<u8>>) -> Self {
        Self {
            mode: CryptoMode::Xor,
            key: Some(key.into()),
            iv: None,
        }
    }

    /// Build the cipher; `None` when decryption is disabled
    pub fn build(&self) -> Result<Option<Box<dyn PayloadCipher>>> {
        let key = || {
            self.key
                .as_deref()
                .ok_or_else(|| Error::invalid_crypto(self.mode.name(), "missing key"))
        };
        let cipher: Box<dyn PayloadCipher> = match self.mode {
            CryptoMode::None => return Ok(None),
            CryptoMode::Aes => {
                let iv = self
                    .iv
                    .as_deref()
                    .ok_or_else(|| Error::invalid_crypto("aes", "missing iv"))?;
                Box::new(AesCtrCipher::new(key()?, iv)?)
            }
            CryptoMode::Sm4 => Box::new(Sm4Cipher::new(key()?)?),
            CryptoMode::Xor => Box::new(XorCipher::new(key()?)?),
        };
        Ok(Some(cipher))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .filter(|text| !text.is_empty())
            .map(|text| hex::decode(text.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_per_mode() {
        assert!(CryptoConfig::default().build().unwrap().is_none());
        let aes = CryptoConfig::aes([7u8; 32], [1u8; 16]).build().unwrap().unwrap();
        assert_eq!(aes.mode(), CryptoMode::Aes);
        let sm4 = CryptoConfig::sm4([7u8; 16]).build().unwrap().unwrap();
        assert_eq!(sm4.mode(), CryptoMode::Sm4);
        let xor = CryptoConfig::xor(vec![0x5A]).build().unwrap().unwrap();
        assert_eq!(xor.mode(), CryptoMode::Xor);
    }

    #[test]
    fn test_missing_material() {
        let config = CryptoConfig {
            mode: CryptoMode::Aes,
            key: Some(vec![0; 32]),
            iv: None,
        };
        assert!(matches!(config.build(), Err(Error::InvalidCrypto { mode: "aes", .. })));
        let config = CryptoConfig {
            mode: CryptoMode::Sm4,
            ..Default::default()
        };
        assert!(config.build().is_err());
    }

    #[test]
    fn test_deserialize_hex() {
        let config: CryptoConfig =
            serde_json::from_str(r#"{"mode": "xor", "key": "a1b2"}"#).unwrap();
        assert_eq!(config.mode, CryptoMode::Xor);
        assert_eq!(config.key, Some(vec![0xA1, 0xB2]));
        assert_eq!(config.iv, None);
        assert!(serde_json::from_str::<CryptoConfig>(r#"{"key": "zz"}"#).is_err());
        assert_eq!("AES".parse::<CryptoMode>().unwrap(), CryptoMode::Aes);
    }

    #[test]
    fn test_debug_hides_key() {
        let text = format!("{:?}", CryptoConfig::xor(vec![0xAB, 0xCD]));
        assert!(!text.contains("171"));
        assert!(text.contains("key_len: Some(2)"));
    }
}
