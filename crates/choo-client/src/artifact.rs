//! Ticket artwork generation and pinning.

use async_trait::async_trait;
use serde::Serialize;

use choo_core::TokenId;

use crate::error::ClientError;
use crate::http::{join, read_json, transport};
use crate::types::GeneratedArtifact;

#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    /// Generate and pin the ticket for `token_id`, labelled for the
    /// departing passenger.
    async fn generate(
        &self,
        token_id: TokenId,
        passenger_label: &str,
    ) -> Result<GeneratedArtifact, ClientError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    token_id: u64,
    passenger_username: &'a str,
}

/// Client for the generator service (`POST /v1/tickets/generate`).
///
/// Generation is slow and pins content, so a failed request is not resent
/// here; the pending-generation cache absorbs retries one level up.
#[derive(Debug, Clone)]
pub struct HttpArtifactGenerator {
    http: reqwest::Client,
    base_url: url::Url,
}

impl HttpArtifactGenerator {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl ArtifactGenerator for HttpArtifactGenerator {
    async fn generate(
        &self,
        token_id: TokenId,
        passenger_label: &str,
    ) -> Result<GeneratedArtifact, ClientError> {
        let endpoint = "POST /v1/tickets/generate";
        let url = join(&self.base_url, "v1/tickets/generate");
        let resp = self
            .http
            .post(&url)
            .json(&GenerateRequest {
                token_id: token_id.get(),
                passenger_username: passenger_label,
            })
            .send()
            .await
            .map_err(transport(endpoint))?;
        let artifact: GeneratedArtifact = read_json(resp, endpoint).await?;
        tracing::info!(
            token_id = %token_id,
            image_hash = %artifact.image_hash,
            metadata_hash = %artifact.metadata_hash,
            "ticket artifact generated"
        );
        Ok(artifact)
    }
}
