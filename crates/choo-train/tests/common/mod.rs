//! In-process collaborators and a harness for orchestrator tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use choo_client::{
    Announcement, Announcer, ArtifactGenerator, ClientError, ContractService, GeneratedArtifact,
    GeneratedAttribute, IdentityResolver, ResolvedUser, TransferReceipt,
};
use choo_core::{Address, OperationKind, ParticipantSnapshot, Timestamp, TokenId, TxHash, UserId};
use choo_state::{ArtifactRefs, Commitment, MovementStatus, StagingMovement, StagingPatch, TokenIdSource};
use choo_store::{
    keys, KvStore, MemoryStore, ScanPage, StagingStore, StoreError, Transaction, UpdateOutcome,
    Versioned,
};
use choo_train::{Collaborators, MovementRequest, TrainConfig, TrainOrchestrator};

pub fn address(n: u64) -> Address {
    Address::new(format!("0x{n:040x}")).unwrap()
}

pub fn tx_hash(n: u64) -> TxHash {
    TxHash::new(format!("0x{n:064x}")).unwrap()
}

fn failure(endpoint: &str, status: u16, body: &str) -> ClientError {
    ClientError::Api {
        endpoint: endpoint.to_string(),
        status,
        body: body.to_string(),
    }
}

// ── Contract ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ContractState {
    pub next_id: u64,
    pub holder: Address,
    pub transfers: Vec<(Address, String)>,
    pub minted: HashMap<TxHash, TokenId>,
    pub metadata_writes: Vec<(TokenId, String, String)>,
    pub fail_transfer: bool,
    pub fail_receipt: bool,
    pub fail_metadata: bool,
    /// Skip the counter bump on transfer, as a lagging node would.
    pub stale_counter: bool,
}

pub struct FakeContract {
    pub state: Mutex<ContractState>,
}

impl FakeContract {
    pub fn new(next_id: u64, holder: Address) -> Self {
        Self {
            state: Mutex::new(ContractState {
                next_id,
                holder,
                transfers: Vec::new(),
                minted: HashMap::new(),
                metadata_writes: Vec::new(),
                fail_transfer: false,
                fail_receipt: false,
                fail_metadata: false,
                stale_counter: false,
            }),
        }
    }

    pub fn transfer_count(&self) -> usize {
        self.state.lock().transfers.len()
    }

    pub fn metadata_writes(&self) -> Vec<(TokenId, String, String)> {
        self.state.lock().metadata_writes.clone()
    }
}

#[async_trait]
impl ContractService for FakeContract {
    async fn next_ticket_id(&self) -> Result<TokenId, ClientError> {
        Ok(TokenId::new(self.state.lock().next_id))
    }

    async fn execute_transfer(
        &self,
        recipient: &Address,
        token_uri: &str,
    ) -> Result<TransferReceipt, ClientError> {
        let mut s = self.state.lock();
        if s.fail_transfer {
            return Err(failure("POST /v1/train/transfer", 500, "execution reverted"));
        }
        let minted = TokenId::new(s.next_id);
        if !s.stale_counter {
            s.next_id += 1;
        }
        s.transfers.push((recipient.clone(), token_uri.to_string()));
        let hash = tx_hash(1000 + s.transfers.len() as u64);
        s.minted.insert(hash.clone(), minted);
        s.holder = recipient.clone();
        Ok(TransferReceipt {
            tx_hash: hash,
            block_number: 500 + s.transfers.len() as u64,
        })
    }

    async fn minted_token_id(&self, tx_hash: &TxHash) -> Result<TokenId, ClientError> {
        let s = self.state.lock();
        if s.fail_receipt {
            return Err(failure("GET /v1/transactions/minted-token", 503, "receipt unavailable"));
        }
        s.minted
            .get(tx_hash)
            .copied()
            .ok_or_else(|| failure("GET /v1/transactions/minted-token", 404, "unknown tx"))
    }

    async fn set_ticket_metadata(
        &self,
        token_id: TokenId,
        token_uri: &str,
        image_uri: &str,
    ) -> Result<(), ClientError> {
        let mut s = self.state.lock();
        if s.fail_metadata {
            return Err(failure("POST /v1/tickets/metadata", 500, "metadata write reverted"));
        }
        s.metadata_writes
            .push((token_id, token_uri.to_string(), image_uri.to_string()));
        Ok(())
    }

    async fn current_holder(&self) -> Result<Address, ClientError> {
        Ok(self.state.lock().holder.clone())
    }
}

// ── Generator ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeGenerator {
    pub calls: Mutex<Vec<(TokenId, String)>>,
    pub fail: Mutex<bool>,
    /// How long each generation takes.
    pub delay: Mutex<Option<Duration>>,
}

impl FakeGenerator {
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ArtifactGenerator for FakeGenerator {
    async fn generate(
        &self,
        token_id: TokenId,
        passenger_label: &str,
    ) -> Result<GeneratedArtifact, ClientError> {
        self.calls.lock().push((token_id, passenger_label.to_string()));
        // Let a concurrent movement run between staging and transfer.
        tokio::task::yield_now().await;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail.lock() {
            return Err(failure("POST /v1/tickets/generate", 502, "pinning gateway down"));
        }
        Ok(GeneratedArtifact {
            image_hash: format!("QmImg{token_id}"),
            metadata_hash: format!("QmMeta{token_id}"),
            token_uri: format!("ipfs://QmMeta{token_id}"),
            attributes: vec![GeneratedAttribute {
                trait_type: "Passenger".into(),
                value: passenger_label.to_string(),
            }],
        })
    }
}

// ── Identity ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeIdentity;

pub fn user_snapshot(n: u64) -> ParticipantSnapshot {
    ParticipantSnapshot {
        user_id: Some(UserId::new(n)),
        username: format!("rider{n}"),
        display_name: Some(format!("Rider {n}")),
        avatar_url: None,
        address: address(n),
    }
}

#[async_trait]
impl IdentityResolver for FakeIdentity {
    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedUser, ClientError> {
        if user_id.get() == 0 {
            return Err(failure("GET /v1/users/0", 404, "no such user"));
        }
        let snap = user_snapshot(user_id.get());
        Ok(ResolvedUser {
            user_id,
            username: snap.username,
            display_name: snap.display_name,
            avatar_url: snap.avatar_url,
            address: snap.address,
        })
    }
}

// ── Announcer ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeAnnouncer {
    pub posts: Mutex<Vec<Announcement>>,
}

#[async_trait]
impl Announcer for FakeAnnouncer {
    async fn announce(&self, announcement: &Announcement) -> Result<(), ClientError> {
        self.posts.lock().push(announcement.clone());
        Ok(())
    }
}

impl FakeAnnouncer {
    /// Wait for the detached announcement task to run.
    pub async fn wait_for(&self, count: usize) -> Vec<Announcement> {
        for _ in 0..100 {
            if self.posts.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.posts.lock().clone()
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// A [`MemoryStore`] that fails or stalls selected writes on request.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    staging_swaps: AtomicU32,
    /// 1-based numbers of the staging compare-and-swaps that error out.
    pub failing_swaps: Mutex<Vec<u32>>,
    /// How many of the next guarded commits report a failed guard.
    pub lost_commits: AtomicU32,
    /// How many of the next guarded commits never return.
    pub stalled_commits: AtomicU32,
}

impl FlakyStore {
    pub fn fail_staging_swaps(&self, numbers: impl IntoIterator<Item = u32>) {
        self.failing_swaps.lock().extend(numbers);
    }

    pub fn heal(&self) {
        self.failing_swaps.lock().clear();
        self.lost_commits.store(0, Ordering::SeqCst);
        self.stalled_commits.store(0, Ordering::SeqCst);
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Versioned>>, StoreError> {
        self.inner.get_many(keys).await
    }

    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<u64, StoreError> {
        self.inner.put(key, value, ttl).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.inner.put_if_absent(key, value, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        if key.starts_with(keys::STAGING_PREFIX) {
            let n = self.staging_swaps.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing_swaps.lock().contains(&n) {
                return Err(StoreError::Contended {
                    key: key.to_string(),
                    attempts: 0,
                });
            }
        }
        self.inner
            .compare_and_swap(key, expected_revision, value, ttl)
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn delete_if_value(&self, key: &str, expected: &Value) -> Result<bool, StoreError> {
        self.inner.delete_if_value(key, expected).await
    }

    async fn commit(&self, txn: Transaction) -> Result<bool, StoreError> {
        if take_one(&self.stalled_commits) {
            std::future::pending::<()>().await;
        }
        if take_one(&self.lost_commits) {
            return Ok(false);
        }
        self.inner.commit(txn).await
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        self.inner.scan_prefix(prefix, cursor, limit).await
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_add(set, member).await
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_remove(set, member).await
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        self.inner.set_members(set).await
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.inner.purge_expired().await
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<dyn KvStore>,
    pub contract: Arc<FakeContract>,
    pub generator: Arc<FakeGenerator>,
    pub identity: Arc<FakeIdentity>,
    pub announcer: Arc<FakeAnnouncer>,
    pub orchestrator: TrainOrchestrator,
}

/// Genesis holder is address 1; the contract will mint `next_id` next.
pub fn harness(next_id: u64) -> Harness {
    harness_with(next_id, Arc::new(MemoryStore::new()), TrainConfig::default())
}

pub fn harness_with(next_id: u64, store: Arc<dyn KvStore>, config: TrainConfig) -> Harness {
    let contract = Arc::new(FakeContract::new(next_id, address(1)));
    let generator = Arc::new(FakeGenerator::default());
    let identity = Arc::new(FakeIdentity);
    let announcer = Arc::new(FakeAnnouncer::default());
    let services = Collaborators {
        contract: contract.clone(),
        generator: generator.clone(),
        identity: identity.clone(),
        announcer: announcer.clone(),
    };
    let orchestrator = TrainOrchestrator::new(store.clone(), services, config);
    Harness {
        store,
        contract,
        generator,
        identity,
        announcer,
        orchestrator,
    }
}

pub fn send_to(user: u64) -> MovementRequest {
    MovementRequest::new(UserId::new(user), OperationKind::ManualSend)
}

pub fn artifact(id: u64) -> ArtifactRefs {
    ArtifactRefs {
        image_hash: format!("QmImg{id}"),
        metadata_hash: format!("QmMeta{id}"),
        token_uri: format!("ipfs://QmMeta{id}"),
        attributes: Vec::new(),
    }
}

/// Stage a record for `id` created `age` ago and walk it to `status`.
pub async fn seed_staging(
    staging: &StagingStore,
    id: u64,
    status: MovementStatus,
    age: chrono::Duration,
) -> StagingMovement {
    let created = Timestamp::now().saturating_sub(age);
    let record = StagingMovement::new(
        TokenId::new(id),
        OperationKind::ManualSend,
        user_snapshot(2),
        user_snapshot(1),
        created,
    );
    assert!(staging.create(&record).await.unwrap());

    let mut path: Vec<StagingPatch> = Vec::new();
    if status == MovementStatus::Failed {
        path.push(StagingPatch::abandoned("seeded failure"));
    }
    if status.has_reached(MovementStatus::PinataUploaded) {
        path.push(StagingPatch::uploaded(artifact(id)));
    }
    if status.has_reached(MovementStatus::Minted) {
        path.push(StagingPatch::minted(Commitment {
            tx_hash: tx_hash(id),
            block_number: 77,
            minted_token_id: TokenId::new(id),
            token_id_source: TokenIdSource::Receipt,
        }));
    }
    if status.has_reached(MovementStatus::MetadataSet) {
        path.push(StagingPatch::status(MovementStatus::MetadataSet));
    }
    if status.has_reached(MovementStatus::Completed) {
        path.push(StagingPatch::status(MovementStatus::Completed));
    }

    let mut latest = record;
    for patch in path {
        match staging.update(TokenId::new(id), &patch, 3).await.unwrap() {
            UpdateOutcome::Applied(r) => latest = r,
            other => panic!("seeding {id} to {status}: {other:?}"),
        }
    }
    latest
}

/// Backdate the staging record for `id` by `age`, as if it had been created
/// that long ago.
pub async fn age_staging(store: &Arc<dyn KvStore>, staging: &StagingStore, id: u64, age: chrono::Duration) {
    let mut record = staging.get(TokenId::new(id)).await.unwrap().unwrap();
    record.created_at = Timestamp::now().saturating_sub(age);
    store
        .put(
            &keys::staging(TokenId::new(id)),
            serde_json::to_value(&record).unwrap(),
            None,
        )
        .await
        .unwrap();
}
