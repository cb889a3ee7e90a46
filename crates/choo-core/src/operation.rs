//! # Operation Kinds
//!
//! Tags identifying which caller initiated a movement. Retained on the
//! staging record and the durable token record for audit, and used to pick
//! announcement wording.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Which entry point initiated a train movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// The current holder picked the next passenger.
    ManualSend,
    /// The next passenger was drawn at random from eligible repliers.
    ChanceSend,
    /// An operator moved the train.
    AdminSend,
    /// A participant reclaimed a train that sat idle too long.
    Yoink,
}

impl OperationKind {
    /// All kinds, in declaration order.
    pub const ALL: [OperationKind; 4] = [
        Self::ManualSend,
        Self::ChanceSend,
        Self::AdminSend,
        Self::Yoink,
    ];

    /// The canonical snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualSend => "manual_send",
            Self::ChanceSend => "chance_send",
            Self::AdminSend => "admin_send",
            Self::Yoink => "yoink",
        }
    }

    /// Parse a canonical name. Dashes are accepted in place of underscores.
    pub fn from_name(name: &str) -> Result<Self, ValidationError> {
        let normalized = name.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownOperationKind(name.to_string()))
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}
