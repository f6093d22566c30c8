//! Frame-level decryption

use bytes::BytesMut;
use rplay_codec_core::{CodecId, EncodedFrame, NalKind, VideoCodec};
use tracing::{debug, warn};

use super::{CryptoConfig, CryptoMode, PayloadCipher};

/// Leading bytes of a slice NAL unit left in the clear (NAL header plus one)
pub const VIDEO_CLEAR_BYTES: usize = 2;

/// Leading bytes of an audio frame left in the clear
pub const AUDIO_CLEAR_BYTES: usize = 30 + 2;

const LENGTH_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Decrypt,
    Encrypt,
}

/// Applies the session cipher to demultiplexed frames.
///
/// Video payloads must be 4-byte length-prefixed; only slice NAL units are
/// transformed. Audio is transformed in AES mode only.
#[derive(Debug)]
pub struct Decryptor {
    cipher: Option<Box<dyn PayloadCipher>>,
    misconfiguration: Option<String>,
    reported: bool,
}

impl Decryptor {
    /// Build from configuration. Bad key material disables decryption and is
    /// reported once through [`Decryptor::take_misconfiguration`].
    pub fn new(config: &CryptoConfig) -> Self {
        match config.build() {
            Ok(cipher) => {
                if let Some(cipher) = &cipher {
                    debug!("Payload decryption enabled: {}", cipher.mode());
                }
                Self {
                    cipher,
                    misconfiguration: None,
                    reported: false,
                }
            }
            Err(e) => {
                warn!("Decryption disabled: {}", e);
                Self {
                    cipher: None,
                    misconfiguration: Some(e.to_string()),
                    reported: false,
                }
            }
        }
    }

    /// A decryptor that never touches payloads
    pub fn disabled() -> Self {
        Self {
            cipher: None,
            misconfiguration: None,
            reported: false,
        }
    }

    /// Active cipher mode
    pub fn mode(&self) -> CryptoMode {
        self.cipher.as_ref().map_or(CryptoMode::None, |c| c.mode())
    }

    /// The configuration problem, returned only on the first call
    pub fn take_misconfiguration(&mut self) -> Option<String> {
        if self.reported {
            return None;
        }
        self.reported = true;
        self.misconfiguration.clone()
    }

    /// Decrypt the encrypted regions of `frame` in place
    pub fn decrypt_frame(&self, frame: &mut EncodedFrame) {
        self.process(frame, Direction::Decrypt);
    }

    /// Encrypt the regions [`Decryptor::decrypt_frame`] would decrypt
    pub fn encrypt_frame(&self, frame: &mut EncodedFrame) {
        self.process(frame, Direction::Encrypt);
    }

    fn process(&self, frame: &mut EncodedFrame, direction: Direction) {
        let Some(cipher) = self.cipher.as_deref() else {
            return;
        };
        let apply = |region: &mut [u8]| match direction {
            Direction::Decrypt => cipher.decrypt(region),
            Direction::Encrypt => cipher.encrypt(region),
        };
        match frame.codec {
            CodecId::Video(codec @ (VideoCodec::H264 | VideoCodec::H265)) => {
                let mut data = BytesMut::from(&frame.payload[..]);
                if for_each_slice(codec, &mut data, apply) > 0 {
                    frame.payload = data.freeze();
                }
            }
            CodecId::Audio(_) if cipher.mode() == CryptoMode::Aes => {
                if frame.payload.len() > AUDIO_CLEAR_BYTES {
                    let mut data = BytesMut::from(&frame.payload[..]);
                    apply(&mut data[AUDIO_CLEAR_BYTES..]);
                    frame.payload = data.freeze();
                }
            }
            _ => {}
        }
    }
}

/// Run `f` over the encrypted region of every slice NAL unit; returns how
/// many regions were visited. A truncated length prefix ends the walk.
fn for_each_slice(codec: VideoCodec, data: &mut [u8], mut f: impl FnMut(&mut [u8])) -> usize {
    let mut visited = 0;
    let mut pos = 0;
    while pos + LENGTH_SIZE <= data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let start = pos + LENGTH_SIZE;
        let Some(end) = start.checked_add(len).filter(|&end| end <= data.len()) else {
            break;
        };
        let nal = &mut data[start..end];
        if NalKind::classify(codec, nal).is_slice() && nal.len() > VIDEO_CLEAR_BYTES {
            f(&mut nal[VIDEO_CLEAR_BYTES..]);
            visited += 1;
        }
        pos = end;
    }
    visited
}
