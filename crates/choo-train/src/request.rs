//! What a caller asks the orchestrator to do.

use choo_core::{OperationKind, UserId};
use choo_store::LockScope;

/// Move the train to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub to: UserId,
    pub kind: OperationKind,
    /// Lock taken for the duration of the movement.
    pub scope: LockScope,
}

impl MovementRequest {
    /// A request serialized against every other movement of the train.
    pub fn new(to: UserId, kind: OperationKind) -> Self {
        Self {
            to,
            kind,
            scope: LockScope::Train,
        }
    }

    pub fn with_scope(mut self, scope: LockScope) -> Self {
        self.scope = scope;
        self
    }
}
