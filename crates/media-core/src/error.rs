//! Error handling for the playback pipeline

use rplay_codec_core::CodecError;
use rplay_demux_core::DemuxError;
use thiserror::Error;

/// Result type alias for media operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sessions, ciphers and the scheduler
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is out of range or malformed
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Key or IV material does not fit the selected cipher
    #[error("Invalid crypto parameters for {mode}: {reason}")]
    InvalidCrypto { mode: &'static str, reason: String },

    /// Container parsing failed
    #[error(transparent)]
    Demux(#[from] DemuxError),

    /// Codec framing conversion failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The session was closed
    #[error("Session is closed")]
    SessionClosed,

    /// The session task is no longer running
    #[error("Session task stopped")]
    TaskStopped,
}

impl Error {
    /// Create a new invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a new invalid crypto error
    pub fn invalid_crypto(mode: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidCrypto {
            mode,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::invalid_crypto("aes", "iv must be 16 bytes");
        assert_eq!(err.to_string(), "Invalid crypto parameters for aes: iv must be 16 bytes");
        let err: Error = DemuxError::invalid_config("frame rate 0").into();
        assert!(matches!(err, Error::Demux(_)));
    }
}
