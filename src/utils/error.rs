use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Failed to read {source_name}: {error}")]
    SourceUnavailable {
        source_name: String,
        #[source]
        error: io::Error,
    },

    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    #[error("Invalid frame {index}: {reason}")]
    InvalidFrame { index: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PlayerError {
    pub fn decode(msg: impl Into<String>) -> Self {
        PlayerError::DecodeFailure(msg.into())
    }

    pub fn invalid_frame(index: usize, reason: impl Into<String>) -> Self {
        PlayerError::InvalidFrame {
            index,
            reason: reason.into(),
        }
    }
}

impl From<png::DecodingError> for PlayerError {
    fn from(error: png::DecodingError) -> Self {
        PlayerError::DecodeFailure(error.to_string())
    }
}

// Result type alias for player operations
pub type PlayerResult<T> = Result<T, PlayerError>;
