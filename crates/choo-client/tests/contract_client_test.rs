//! Contract tests for the contract gateway adapter.
//!
//! ## Endpoints Tested
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | GET    | `/v1/tickets/next-id` | `next_ticket_id_*` |
//! | POST   | `/v1/train/transfer` | `execute_transfer_*` |
//! | GET    | `/v1/transactions/{txHash}/minted-token` | `minted_token_id_*` |
//! | POST   | `/v1/tickets/{id}/metadata` | `set_ticket_metadata_*` |
//! | GET    | `/v1/train/holder` | `current_holder_*` |

use choo_client::{ChooClient, ClientConfig, ClientError, ContractService};
use choo_core::{Address, TokenId, TxHash};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(mock_server: &MockServer) -> ChooClient {
    let config = ClientConfig::single_host(&mock_server.uri(), "test-token").unwrap();
    ChooClient::new(config).unwrap()
}

fn tx_hash() -> String {
    format!("0x{}", "ab".repeat(32))
}

fn recipient() -> Address {
    Address::new(format!("0x{}", "12".repeat(20))).unwrap()
}

// ── GET /v1/tickets/next-id ─────────────────────────────────────────

#[tokio::test]
async fn next_ticket_id_parses_and_sends_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/tickets/next-id"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nextTicketId": 42
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let id = client.contract().next_ticket_id().await.unwrap();
    assert_eq!(id, TokenId::new(42));
}

#[tokio::test]
async fn next_ticket_id_surfaces_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/tickets/next-id"))
        .respond_with(ResponseTemplate::new(503).set_body_string("rpc down"))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client.contract().next_ticket_id().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(err.to_string().contains("rpc down"));
}

// ── POST /v1/train/transfer ─────────────────────────────────────────

#[tokio::test]
async fn execute_transfer_sends_recipient_and_uri() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/train/transfer"))
        .and(body_json(serde_json::json!({
            "recipient": recipient().as_str(),
            "tokenUri": "ipfs://QmMeta"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "txHash": tx_hash(),
            "blockNumber": 1234
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let receipt = client
        .contract()
        .execute_transfer(&recipient(), "ipfs://QmMeta")
        .await
        .unwrap();
    assert_eq!(receipt.tx_hash.as_str(), tx_hash());
    assert_eq!(receipt.block_number, 1234);
}

#[tokio::test]
async fn execute_transfer_is_not_retried_on_revert() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/train/transfer"))
        .respond_with(ResponseTemplate::new(500).set_body_string("execution reverted"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client
        .contract()
        .execute_transfer(&recipient(), "ipfs://QmMeta")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 500, .. }));
}

#[tokio::test]
async fn execute_transfer_rejects_malformed_hash() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/train/transfer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "txHash": "0x1234",
            "blockNumber": 1
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client
        .contract()
        .execute_transfer(&recipient(), "ipfs://QmMeta")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Deserialization { .. }));
}

// ── GET /v1/transactions/{txHash}/minted-token ──────────────────────

#[tokio::test]
async fn minted_token_id_reads_receipt() {
    let mock_server = MockServer::start().await;
    let hash = TxHash::new(tx_hash()).unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/v1/transactions/{}/minted-token", tx_hash())))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tokenId": 43
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let id = client.contract().minted_token_id(&hash).await.unwrap();
    assert_eq!(id, TokenId::new(43));
}

// ── POST /v1/tickets/{id}/metadata ──────────────────────────────────

#[tokio::test]
async fn set_ticket_metadata_posts_uris() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/tickets/42/metadata"))
        .and(body_json(serde_json::json!({
            "tokenUri": "ipfs://QmMeta",
            "imageUri": "ipfs://QmImg"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    client
        .contract()
        .set_ticket_metadata(TokenId::new(42), "ipfs://QmMeta", "ipfs://QmImg")
        .await
        .unwrap();
}

#[tokio::test]
async fn set_ticket_metadata_failure_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/tickets/42/metadata"))
        .respond_with(ResponseTemplate::new(409).set_body_string("not owner"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client
        .contract()
        .set_ticket_metadata(TokenId::new(42), "ipfs://QmMeta", "ipfs://QmImg")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(409));
}

// ── GET /v1/train/holder ────────────────────────────────────────────

#[tokio::test]
async fn current_holder_normalizes_address() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/train/holder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "address": format!("0x{}", "AB".repeat(20))
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let holder = client.contract().current_holder().await.unwrap();
    assert_eq!(holder.as_str(), format!("0x{}", "ab".repeat(20)));
}

#[tokio::test]
async fn current_holder_rejects_garbage_address() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/train/holder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "address": "vitalik.eth"
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client.contract().current_holder().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidResponse { .. }));
}
