//! Error types for the shared store.

use thiserror::Error;

use choo_core::TokenId;
use choo_state::PromotionPreconditionError;

/// Failure talking to, or reading from, the key-value backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The PostgreSQL backend returned an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A value could not be serialized before writing.
    #[error("failed to encode value for {key}: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },

    /// A stored value does not have the expected shape.
    #[error("malformed value at {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },

    /// An optimistic write kept losing to concurrent writers.
    #[error("write to {key} still contended after {attempts} attempts")]
    Contended { key: String, attempts: u32 },
}

/// Failure in a staging-store operation that is not a plain store error.
#[derive(Error, Debug)]
pub enum StagingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Promotion was requested for a record that cannot be promoted.
    /// Always a caller bug; never retried.
    #[error("promotion precondition violated: {0}")]
    PromotionPrecondition(#[from] PromotionPreconditionError),

    /// Promotion was requested but no staging record exists. Usually a
    /// concurrent promoter already finished it; when the minted id differs
    /// from the staging key only the caller can tell, by looking up the
    /// durable record under the minted id.
    #[error("no staging record for token {0}")]
    NotFound(TokenId),

    /// Promotion kept losing its guards to concurrent writers.
    #[error("promotion of token {0} contended; staging record kept changing")]
    Contended(TokenId),
}

impl StagingError {
    /// Whether this error indicates a logic error rather than an
    /// infrastructure failure or a lost race.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PromotionPrecondition(_))
    }
}
