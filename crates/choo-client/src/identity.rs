//! Social identity lookup.

use async_trait::async_trait;
use serde::Deserialize;

use choo_core::{Address, UserId};

use crate::error::ClientError;
use crate::http::{join, read_json, transport};
use crate::types::ResolvedUser;

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve `user_id` to display fields and a settlement address.
    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedUser, ClientError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    fid: u64,
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    pfp_url: Option<String>,
    #[serde(default)]
    verified_addresses: Vec<String>,
    #[serde(default)]
    custody_address: Option<String>,
}

impl UserResponse {
    /// First verified address, else the custody address.
    fn settlement_address(&self) -> Option<&str> {
        self.verified_addresses
            .first()
            .map(String::as_str)
            .or(self.custody_address.as_deref())
    }
}

/// Client for the identity service (`GET /v1/users/{fid}`).
#[derive(Debug, Clone)]
pub struct HttpIdentityResolver {
    http: reqwest::Client,
    base_url: url::Url,
}

impl HttpIdentityResolver {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedUser, ClientError> {
        let endpoint = format!("GET /v1/users/{user_id}");
        let url = join(&self.base_url, &format!("v1/users/{user_id}"));
        let resp = crate::retry::retry_send(&endpoint, || self.http.get(&url).send())
            .await
            .map_err(transport(&endpoint))?;
        let user: UserResponse = read_json(resp, &endpoint).await?;

        let raw = user
            .settlement_address()
            .ok_or_else(|| ClientError::InvalidResponse {
                endpoint: endpoint.clone(),
                reason: format!("user {} has no settlement address", user.fid),
            })?;
        let address = Address::new(raw).map_err(|e| ClientError::InvalidResponse {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        Ok(ResolvedUser {
            user_id: UserId::new(user.fid),
            username: user.username,
            display_name: user.display_name,
            avatar_url: user.pfp_url,
            address,
        })
    }
}
