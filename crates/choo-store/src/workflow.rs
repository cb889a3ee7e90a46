//! The external workflow-state flag.

use std::sync::Arc;

use choo_state::WorkflowState;

use crate::error::StoreError;
use crate::keys;
use crate::kv::{encode, KvStore};

#[derive(Clone)]
pub struct WorkflowFlag {
    store: Arc<dyn KvStore>,
}

impl WorkflowFlag {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Current value; `not_casted` when never set.
    pub async fn get(&self) -> Result<WorkflowState, StoreError> {
        match self.store.get(keys::WORKFLOW_STATE).await? {
            Some(v) => v.decode(keys::WORKFLOW_STATE),
            None => Ok(WorkflowState::default()),
        }
    }

    pub async fn set(&self, state: WorkflowState) -> Result<(), StoreError> {
        self.store
            .put(keys::WORKFLOW_STATE, encode(keys::WORKFLOW_STATE, &state)?, None)
            .await?;
        tracing::debug!(workflow_state = %state, "workflow state set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn defaults_then_roundtrips() {
        let flag = WorkflowFlag::new(Arc::new(MemoryStore::new()));
        assert_eq!(flag.get().await.unwrap(), WorkflowState::NotCasted);
        flag.set(WorkflowState::ChanceActive).await.unwrap();
        assert_eq!(flag.get().await.unwrap(), WorkflowState::ChanceActive);
    }
}
