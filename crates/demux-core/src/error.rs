//! Error handling for the demultiplexers
//!
//! Most malformed input is recoverable: the offending unit is skipped and
//! reported as a [`DemuxEvent::Warning`](crate::DemuxEvent::Warning). The
//! errors below surface only through parser internals and through
//! [`Demuxer::feed`](crate::Demuxer::feed) when a stream cannot be read at all.

use rplay_codec_core::{BitstreamError, CodecError};
use thiserror::Error;

/// Result type alias for demultiplexer operations
pub type Result<T> = std::result::Result<T, DemuxError>;

/// Error type for container parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    /// Codec parameter or record parsing failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A fixed-width field ran past the end of its unit
    #[error("Truncated unit: {0}")]
    Bitstream(#[from] BitstreamError),

    /// The stream does not start with a valid container header
    #[error("Invalid {container} header: {details}")]
    InvalidHeader {
        container: &'static str,
        details: String,
    },

    /// A container unit is internally inconsistent
    #[error("Malformed {container} unit: {details}")]
    Malformed {
        container: &'static str,
        details: String,
    },

    /// A container feature outside what the demuxer handles
    #[error("Unsupported {container} feature: {feature}")]
    Unsupported {
        container: &'static str,
        feature: String,
    },

    /// Carry-over bytes grew past the configured bound
    #[error("Pending buffer overflow: {size} bytes exceeds limit of {limit}")]
    BufferOverflow { size: usize, limit: usize },

    /// Demuxer construction options are invalid
    #[error("Invalid demuxer configuration: {details}")]
    InvalidConfig { details: String },
}

impl DemuxError {
    /// Create a new invalid header error
    pub fn invalid_header(container: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidHeader {
            container,
            details: details.into(),
        }
    }

    /// Create a new malformed unit error
    pub fn malformed(container: &'static str, details: impl Into<String>) -> Self {
        Self::Malformed {
            container,
            details: details.into(),
        }
    }

    /// Create a new unsupported feature error
    pub fn unsupported(container: &'static str, feature: impl Into<String>) -> Self {
        Self::Unsupported {
            container,
            feature: feature.into(),
        }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DemuxError::malformed("flv", "tag body shorter than header");
        assert_eq!(err.to_string(), "Malformed flv unit: tag body shorter than header");

        let err: DemuxError = BitstreamError::Truncated {
            needed: 4,
            available: 1,
        }
        .into();
        assert!(err.to_string().contains("needed 4 bytes"));
    }
}
