//! Error handling for the codec library
//!
//! Bitstream exhaustion is kept apart from semantic parse failures so callers
//! can tell "need more bytes" from "these bytes are wrong".

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised by the low level bit and byte readers
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitstreamError {
    /// The reader ran out of input before the requested field was complete
    #[error("Bitstream exhausted: needed {needed} bits, {available} available")]
    Exhausted { needed: usize, available: usize },

    /// A fixed-width byte read ran past the end of the buffer
    #[error("Byte stream truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// An Exp-Golomb code had more leading zeros than fit in 32 bits
    #[error("Exp-Golomb code too long ({leading_zeros} leading zeros)")]
    ExpGolombOverflow { leading_zeros: u32 },
}

/// Error type for codec parameter parsing and record building
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Underlying bit or byte reader failure
    #[error(transparent)]
    Bitstream(#[from] BitstreamError),

    /// Unsupported codec or codec feature
    #[error("Unsupported codec: {codec_type}")]
    UnsupportedCodec { codec_type: String },

    /// A syntax element held a value the parser cannot accept
    #[error("Invalid {element}: {details}")]
    InvalidSyntax { element: &'static str, details: String },

    /// A NAL unit of the wrong kind was handed to a parser
    #[error("Unexpected NAL unit type {nal_type} (expected {expected})")]
    UnexpectedNalType { nal_type: u8, expected: &'static str },

    /// A decoder configuration record could not be built or read
    #[error("Invalid decoder configuration record: {details}")]
    InvalidRecord { details: String },

    /// NAL length prefix size outside 1..=4
    #[error("Unsupported NAL length size: {size}")]
    UnsupportedNalLengthSize { size: u8 },
}

impl CodecError {
    /// Create a new invalid syntax error
    pub fn invalid_syntax(element: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            element,
            details: details.into(),
        }
    }

    /// Create a new invalid record error
    pub fn invalid_record(details: impl Into<String>) -> Self {
        Self::InvalidRecord {
            details: details.into(),
        }
    }

    /// Create a new unsupported codec error
    pub fn unsupported_codec(codec_type: impl Into<String>) -> Self {
        Self::UnsupportedCodec {
            codec_type: codec_type.into(),
        }
    }

    /// Whether the failure is only caused by missing input
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            Self::Bitstream(BitstreamError::Exhausted { .. } | BitstreamError::Truncated { .. })
        )
    }
}
