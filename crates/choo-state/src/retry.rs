//! Pending on-chain metadata writes that failed after commitment.

use serde::{Deserialize, Serialize};

use choo_core::{OperationKind, Timestamp, TokenId};

/// One token whose metadata write needs repeating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRetryEntry {
    pub token_id: TokenId,
    pub token_uri: String,
    pub image_hash: String,
    pub operation_kind: OperationKind,
    /// When the write first failed. Never overwritten once set.
    pub first_failed_at: Timestamp,
    pub last_updated_at: Timestamp,
    #[serde(default = "one")]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

fn one() -> u32 {
    1
}

impl MetadataRetryEntry {
    /// A fresh entry for a write that just failed.
    pub fn new(
        token_id: TokenId,
        token_uri: impl Into<String>,
        image_hash: impl Into<String>,
        operation_kind: OperationKind,
        error: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            token_id,
            token_uri: token_uri.into(),
            image_hash: image_hash.into(),
            operation_kind,
            first_failed_at: now,
            last_updated_at: now,
            attempts: 1,
            last_error: error,
        }
    }

    /// URI of the ticket image.
    pub fn image_uri(&self) -> String {
        format!("ipfs://{}", self.image_hash)
    }

    /// Fold `self` over an already-stored entry for the same token.
    ///
    /// Keeps the stored `first_failed_at` and counts this failure on top of
    /// the stored attempts; everything else comes from `self`.
    pub fn merged_over(mut self, existing: &MetadataRetryEntry) -> Self {
        self.first_failed_at = existing.first_failed_at;
        self.attempts = existing.attempts.saturating_add(1);
        self
    }
}
