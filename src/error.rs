use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the idiom embedding pipeline.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file name in {} is not valid UTF-8", .0.display())]
    InvalidFileName(PathBuf),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error(transparent)]
    Torch(#[from] tch::TchError),

    #[error(transparent)]
    RustBert(#[from] rust_bert::RustBertError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode idiom vectors: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("failed to decode idiom vectors: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("tensor `{0}` not found in checkpoint")]
    MissingTensor(String),

    #[error("token `{0}` not found in tokenizer vocabulary")]
    MissingToken(String),

    #[error("vector dimension {actual} does not match model hidden size {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("tokenizer assigned id {actual} to `{token}` but the embedding table has {expected} rows")]
    VocabMismatch {
        token: String,
        expected: i64,
        actual: i64,
    },

    #[error("no example sentence for `{0}` contains the idiom")]
    NoUsableContext(String),

    #[error("device `{0}` is not available")]
    DeviceUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EmbedError {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EmbedError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn tokenizer(err: impl std::fmt::Display) -> Self {
        EmbedError::Tokenizer(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EmbedError>;
