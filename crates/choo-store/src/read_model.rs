//! Read-only views over promoted state.

use std::sync::Arc;

use choo_core::{Timestamp, TokenId};
use choo_state::{CurrentHolder, TokenRecord};

use crate::error::StoreError;
use crate::keys;
use crate::kv::KvStore;

/// Who holds the train and what each movement left behind. Written only by
/// [`crate::StagingStore::promote`].
#[derive(Clone)]
pub struct ReadModel {
    store: Arc<dyn KvStore>,
}

impl ReadModel {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// The current-holder pointer. `None` until the first promotion.
    pub async fn current_holder(&self) -> Result<Option<CurrentHolder>, StoreError> {
        match self.store.get(keys::CURRENT_HOLDER).await? {
            Some(v) => Ok(Some(v.decode(keys::CURRENT_HOLDER)?)),
            None => Ok(None),
        }
    }

    pub async fn last_moved_at(&self) -> Result<Option<Timestamp>, StoreError> {
        match self.store.get(keys::LAST_MOVED_AT).await? {
            Some(v) => Ok(Some(v.decode(keys::LAST_MOVED_AT)?)),
            None => Ok(None),
        }
    }

    /// The durable record for `token_id`.
    pub async fn token(&self, token_id: TokenId) -> Result<Option<TokenRecord>, StoreError> {
        let key = keys::token(token_id);
        match self.store.get(&key).await? {
            Some(v) => Ok(Some(v.decode(&key)?)),
            None => Ok(None),
        }
    }
}
