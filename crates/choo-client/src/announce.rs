//! Movement announcements.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ClientError;
use crate::http::{check_status, join, transport};
use crate::types::Announcement;

/// Publishes movement announcements. Callers treat failures as
/// non-fatal and never resend inline.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, announcement: &Announcement) -> Result<(), ClientError>;
}

#[derive(Debug, Serialize)]
struct CastRequest<'a> {
    text: &'a str,
}

/// Client for the announcement service (`POST /v1/casts`).
#[derive(Debug, Clone)]
pub struct HttpAnnouncer {
    http: reqwest::Client,
    base_url: url::Url,
}

impl HttpAnnouncer {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl Announcer for HttpAnnouncer {
    async fn announce(&self, announcement: &Announcement) -> Result<(), ClientError> {
        let endpoint = "POST /v1/casts";
        let url = join(&self.base_url, "v1/casts");
        let text = announcement.text();
        let resp = self
            .http
            .post(&url)
            .json(&CastRequest { text: &text })
            .send()
            .await
            .map_err(transport(endpoint))?;
        check_status(resp, endpoint).await?;
        tracing::info!(token_id = %announcement.token_id, "movement announced");
        Ok(())
    }
}
