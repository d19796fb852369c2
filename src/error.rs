//! Typed failures surfaced by the retrieval and answering pipeline.
//!
//! Plumbing code propagates [`anyhow::Error`]; these variants travel inside
//! it where callers need to tell failure kinds apart (see
//! [`RagError::from_anyhow`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid or missing configuration (including credentials). Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding service failed after exhausting its retries.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The generation service failed after exhausting its retries.
    #[error("generation service unavailable: {0}")]
    GenerationUnavailable(String),

    /// A vector's length disagrees with the dimensionality recorded for the collection.
    #[error("embedding dimensionality mismatch: collection holds {expected}-d vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The vector index could not be read or written.
    #[error("vector index error: {0}")]
    Index(String),
}

impl RagError {
    /// Recover a typed error from an `anyhow` chain, falling back to
    /// [`RagError::Index`] for untyped failures.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<RagError>() {
            Ok(typed) => typed,
            Err(other) => RagError::Index(format!("{:#}", other)),
        }
    }

    /// Short machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Configuration(_) => "configuration",
            RagError::EmbeddingUnavailable(_) => "embedding_unavailable",
            RagError::GenerationUnavailable(_) => "generation_unavailable",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::Index(_) => "index_error",
        }
    }
}

/// Shorthand for bailing out with a [`RagError::Configuration`].
macro_rules! config_bail {
    ($($arg:tt)*) => {
        return Err($crate::error::RagError::Configuration(format!($($arg)*)).into())
    };
}

pub(crate) use config_bail;
