//! # Participant Snapshots
//!
//! A participant's identity as captured when a movement is staged. Later
//! steps read the snapshot instead of re-resolving identity from a social
//! profile that may have changed in the meantime.

use serde::{Deserialize, Serialize};

use crate::identity::{Address, UserId};

/// Identity, display fields, and settlement address of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    /// Social-network user id. Absent when the participant is only known by
    /// address (e.g. the very first holder read from the contract).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Handle without the leading `@`.
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Address that receives the train or the ticket.
    pub address: Address,
}

impl ParticipantSnapshot {
    /// A snapshot for a participant known only by settlement address.
    pub fn from_address(address: Address) -> Self {
        Self {
            user_id: None,
            username: short_address(&address),
            display_name: None,
            avatar_url: None,
            address,
        }
    }

    /// Label used when generating the ticket artwork and announcements:
    /// `@username` when known, otherwise a shortened address.
    pub fn label(&self) -> String {
        if self.user_id.is_some() {
            format!("@{}", self.username)
        } else {
            self.username.clone()
        }
    }
}

fn short_address(address: &Address) -> String {
    let s = address.as_str();
    // Address is validated as 0x + 40 hex, so slicing is in bounds.
    format!("{}…{}", &s[..6], &s[s.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Address {
        Address::new("0x1234567890abcdef1234567890abcdef12345678").unwrap()
    }

    #[test]
    fn address_only_snapshot_uses_short_label() {
        let p = ParticipantSnapshot::from_address(addr());
        assert_eq!(p.label(), "0x1234…5678");
        assert!(p.user_id.is_none());
    }

    #[test]
    fn known_user_label_has_handle() {
        let p = ParticipantSnapshot {
            user_id: Some(UserId::new(7)),
            username: "conductor".into(),
            display_name: Some("The Conductor".into()),
            avatar_url: None,
            address: addr(),
        };
        assert_eq!(p.label(), "@conductor");
    }

    #[test]
    fn optional_fields_omitted_from_json() {
        let p = ParticipantSnapshot::from_address(addr());
        let json = serde_json::to_value(&p).unwrap();
        assert!(json.get("user_id").is_none());
        assert!(json.get("display_name").is_none());
    }
}
