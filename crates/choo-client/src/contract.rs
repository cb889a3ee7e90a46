//! # Contract Service
//!
//! The on-chain side of a movement, reached through a contract gateway.
//!
//! ## Endpoints
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/v1/tickets/next-id` | Predicted id of the next ticket |
//! | POST   | `/v1/train/transfer` | Move the train; mints the ticket |
//! | GET    | `/v1/transactions/{txHash}/minted-token` | Ticket id minted by a transaction |
//! | POST   | `/v1/tickets/{id}/metadata` | Write ticket metadata |
//! | GET    | `/v1/train/holder` | Current on-chain holder |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use choo_core::{Address, TokenId, TxHash};

use crate::error::ClientError;
use crate::http::{check_status, join, read_json, transport};
use crate::types::TransferReceipt;

#[async_trait]
pub trait ContractService: Send + Sync {
    /// The id the next minted ticket is expected to get.
    async fn next_ticket_id(&self) -> Result<TokenId, ClientError>;

    /// Transfer the train to `recipient`. The departing holder receives a
    /// ticket pointing at `token_uri`.
    async fn execute_transfer(
        &self,
        recipient: &Address,
        token_uri: &str,
    ) -> Result<TransferReceipt, ClientError>;

    /// The ticket id actually minted by `tx_hash`.
    async fn minted_token_id(&self, tx_hash: &TxHash) -> Result<TokenId, ClientError>;

    async fn set_ticket_metadata(
        &self,
        token_id: TokenId,
        token_uri: &str,
        image_uri: &str,
    ) -> Result<(), ClientError>;

    /// Holder according to the contract itself.
    async fn current_holder(&self) -> Result<Address, ClientError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextIdResponse {
    next_ticket_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest<'a> {
    recipient: &'a str,
    token_uri: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintedTokenResponse {
    token_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataRequest<'a> {
    token_uri: &'a str,
    image_uri: &'a str,
}

#[derive(Debug, Deserialize)]
struct HolderResponse {
    address: String,
}

/// Client for the contract gateway.
#[derive(Debug, Clone)]
pub struct HttpContractService {
    http: reqwest::Client,
    base_url: url::Url,
}

impl HttpContractService {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl ContractService for HttpContractService {
    async fn next_ticket_id(&self) -> Result<TokenId, ClientError> {
        let endpoint = "GET /v1/tickets/next-id";
        let url = join(&self.base_url, "v1/tickets/next-id");
        let resp = crate::retry::retry_send(endpoint, || self.http.get(&url).send())
            .await
            .map_err(transport(endpoint))?;
        let body: NextIdResponse = read_json(resp, endpoint).await?;
        Ok(TokenId::new(body.next_ticket_id))
    }

    async fn execute_transfer(
        &self,
        recipient: &Address,
        token_uri: &str,
    ) -> Result<TransferReceipt, ClientError> {
        let endpoint = "POST /v1/train/transfer";
        let url = join(&self.base_url, "v1/train/transfer");
        let req = TransferRequest {
            recipient: recipient.as_str(),
            token_uri,
        };
        let resp = self
            .http
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(transport(endpoint))?;
        let receipt: TransferReceipt = read_json(resp, endpoint).await?;
        tracing::info!(
            recipient = %recipient,
            tx_hash = %receipt.tx_hash,
            block_number = receipt.block_number,
            "train transfer confirmed"
        );
        Ok(receipt)
    }

    async fn minted_token_id(&self, tx_hash: &TxHash) -> Result<TokenId, ClientError> {
        let endpoint = format!("GET /v1/transactions/{tx_hash}/minted-token");
        let url = join(&self.base_url, &format!("v1/transactions/{tx_hash}/minted-token"));
        let resp = crate::retry::retry_send(&endpoint, || self.http.get(&url).send())
            .await
            .map_err(transport(&endpoint))?;
        let body: MintedTokenResponse = read_json(resp, &endpoint).await?;
        Ok(TokenId::new(body.token_id))
    }

    async fn set_ticket_metadata(
        &self,
        token_id: TokenId,
        token_uri: &str,
        image_uri: &str,
    ) -> Result<(), ClientError> {
        let endpoint = format!("POST /v1/tickets/{token_id}/metadata");
        let url = join(&self.base_url, &format!("v1/tickets/{token_id}/metadata"));
        let resp = self
            .http
            .post(&url)
            .json(&MetadataRequest {
                token_uri,
                image_uri,
            })
            .send()
            .await
            .map_err(transport(&endpoint))?;
        check_status(resp, &endpoint).await?;
        Ok(())
    }

    async fn current_holder(&self) -> Result<Address, ClientError> {
        let endpoint = "GET /v1/train/holder";
        let url = join(&self.base_url, "v1/train/holder");
        let resp = crate::retry::retry_send(endpoint, || self.http.get(&url).send())
            .await
            .map_err(transport(endpoint))?;
        let body: HolderResponse = read_json(resp, endpoint).await?;
        Address::new(&body.address).map_err(|e| ClientError::InvalidResponse {
            endpoint: endpoint.into(),
            reason: e.to_string(),
        })
    }
}
