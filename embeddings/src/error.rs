use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingError>;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No API key was supplied to the provider.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// The provider answered with a non-success status.
    #[error("embedding request rejected: {0}")]
    ApiRequest(String),

    #[error("malformed embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding provider rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Two vectors compared for similarity have different lengths.
    #[error("cannot compare a {left}-dimensional vector with a {right}-dimensional one")]
    DimensionMismatch { left: usize, right: usize },

    /// Threshold outside of `0.0..=1.0`.
    #[error("similarity threshold {0} is outside 0..=1")]
    InvalidThreshold(f32),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
