//! Values exchanged with collaborator services.

use serde::{Deserialize, Serialize};

use choo_core::{Address, OperationKind, ParticipantSnapshot, TokenId, TxHash, UserId};
use choo_state::{ArtifactRefs, TicketAttribute};

/// Confirmation of an on-chain train transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// A generated and pinned ticket artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub image_hash: String,
    pub metadata_hash: String,
    pub token_uri: String,
    #[serde(default)]
    pub attributes: Vec<GeneratedAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAttribute {
    pub trait_type: String,
    pub value: String,
}

impl From<GeneratedArtifact> for ArtifactRefs {
    fn from(a: GeneratedArtifact) -> Self {
        ArtifactRefs {
            image_hash: a.image_hash,
            metadata_hash: a.metadata_hash,
            token_uri: a.token_uri,
            attributes: a
                .attributes
                .into_iter()
                .map(|t| TicketAttribute {
                    trait_type: t.trait_type,
                    value: t.value,
                })
                .collect(),
        }
    }
}

/// A social-network user resolved to a settlement address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    pub user_id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub address: Address,
}

impl ResolvedUser {
    pub fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            user_id: Some(self.user_id),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            address: self.address.clone(),
        }
    }
}

/// Public post announcing a completed movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub token_id: TokenId,
    pub operation_kind: OperationKind,
    pub new_holder: ParticipantSnapshot,
    pub departing_passenger: ParticipantSnapshot,
    pub tx_hash: TxHash,
}

impl Announcement {
    /// Post text; wording depends on how the movement was initiated.
    pub fn text(&self) -> String {
        let new = self.new_holder.label();
        let old = self.departing_passenger.label();
        let id = self.token_id;
        match self.operation_kind {
            OperationKind::ManualSend => {
                format!("{old} passed the train to {new}. {old} keeps ticket #{id} as a souvenir.")
            }
            OperationKind::ChanceSend => {
                format!("{new} won the chance draw and boards the train. Ticket #{id} goes to {old}.")
            }
            OperationKind::AdminSend => {
                format!("The train was moved to {new}. Ticket #{id} goes to {old}.")
            }
            OperationKind::Yoink => {
                format!("{new} yoinked the train from {old}! Ticket #{id} goes to {old}.")
            }
        }
    }
}
