//! Persisted key layout.
//!
//! | Key                         | Holds                         | TTL       |
//! |-----------------------------|-------------------------------|-----------|
//! | `staging:{id}`              | `StagingMovement`             | staging   |
//! | `pending-artifact:{id}`     | `ArtifactRefs`                | artifact  |
//! | `metadata-retry:{id}`       | `MetadataRetryEntry`          | retention |
//! | `metadata-retry:pending`    | set of token ids              | none      |
//! | `lock:{scope}`              | owner token                   | lock      |
//! | `token:{id}`                | `TokenRecord`                 | none      |
//! | `train:current-holder`      | `CurrentHolder`               | none      |
//! | `train:last-moved-at`       | `Timestamp`                   | none      |
//! | `train:workflow-state`      | `WorkflowState`               | none      |

use choo_core::TokenId;

pub const STAGING_PREFIX: &str = "staging:";
pub const PENDING_ARTIFACT_PREFIX: &str = "pending-artifact:";
pub const METADATA_RETRY_PREFIX: &str = "metadata-retry:";
pub const METADATA_RETRY_PENDING: &str = "metadata-retry:pending";
pub const LOCK_PREFIX: &str = "lock:";
pub const TOKEN_PREFIX: &str = "token:";
pub const CURRENT_HOLDER: &str = "train:current-holder";
pub const LAST_MOVED_AT: &str = "train:last-moved-at";
pub const WORKFLOW_STATE: &str = "train:workflow-state";

pub fn staging(id: TokenId) -> String {
    format!("{STAGING_PREFIX}{id}")
}

pub fn pending_artifact(id: TokenId) -> String {
    format!("{PENDING_ARTIFACT_PREFIX}{id}")
}

pub fn metadata_retry(id: TokenId) -> String {
    format!("{METADATA_RETRY_PREFIX}{id}")
}

pub fn token(id: TokenId) -> String {
    format!("{TOKEN_PREFIX}{id}")
}

pub fn lock(scope: &str) -> String {
    format!("{LOCK_PREFIX}{scope}")
}

/// Token id encoded in a `staging:{id}` key.
pub fn staging_token_id(key: &str) -> Option<TokenId> {
    key.strip_prefix(STAGING_PREFIX)?.parse().ok()
}
