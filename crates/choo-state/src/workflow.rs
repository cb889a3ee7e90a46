use serde::{Deserialize, Serialize};

/// External workflow flag that gates which movement path the front end
/// offers (manual send, chance round, and so on).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// No announcement out for the current holder yet.
    #[default]
    NotCasted,
    /// Holder has announced; waiting for replies.
    Casted,
    /// Chance round open.
    ChanceActive,
    /// Chance round closed without a pick.
    ChanceExpired,
    /// Holder chose to send manually.
    ManualSend,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 5] = [
        Self::NotCasted,
        Self::Casted,
        Self::ChanceActive,
        Self::ChanceExpired,
        Self::ManualSend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotCasted => "not_casted",
            Self::Casted => "casted",
            Self::ChanceActive => "chance_active",
            Self::ChanceExpired => "chance_expired",
            Self::ManualSend => "manual_send",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
