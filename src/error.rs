//! Error types for compress-advisor

use thiserror::Error;

/// Failures reported by a codec backend.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid or unsupported codec options")]
    Options,

    #[error("input is not in a recognized stream format")]
    Format,

    #[error("compressed data is corrupt")]
    Data,

    #[error("memory allocation failed")]
    Memory,

    #[error("memory usage limit reached")]
    MemLimit,

    #[error("unsupported integrity check")]
    UnsupportedCheck,

    #[error("codec programming error")]
    Program,

    #[error("stream ended before the codec reached its end marker")]
    Truncated,
}

impl CodecError {
    /// Resource exhaustion is kept apart from ordinary data errors.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, CodecError::Memory | CodecError::MemLimit)
    }
}

impl From<xz2::stream::Error> for CodecError {
    fn from(err: xz2::stream::Error) -> Self {
        use xz2::stream::Error;
        match err {
            Error::Data => CodecError::Data,
            Error::Options => CodecError::Options,
            Error::Format => CodecError::Format,
            Error::MemLimit => CodecError::MemLimit,
            Error::Mem => CodecError::Memory,
            Error::NoCheck | Error::UnsupportedCheck => CodecError::UnsupportedCheck,
            Error::Program => CodecError::Program,
            #[allow(unreachable_patterns)]
            _ => CodecError::Program,
        }
    }
}

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("empty input")]
    EmptyInput,

    #[error("preset {0} is outside 1..=9")]
    InvalidPreset(u32),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for AdvisorError {
    fn from(err: serde_json::Error) -> Self {
        AdvisorError::SerializationError(err.to_string())
    }
}
