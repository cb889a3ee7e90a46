//! # choo-client — Collaborator Services for the choo Train
//!
//! The train depends on four outside services. Each is an object-safe async
//! trait with a typed HTTP adapter:
//! - **Contract** (`contract.rs`): ticket id prediction, the train transfer,
//!   receipt lookup, ticket metadata writes, on-chain holder
//! - **Artifact generator** (`artifact.rs`): ticket artwork generation and
//!   pinning
//! - **Identity** (`identity.rs`): user id to display fields and address
//! - **Announcer** (`announce.rs`): public movement posts
//!
//! ## Architecture
//!
//! Orchestration code depends only on the traits, so tests substitute
//! in-process fakes and deployments plug in the HTTP adapters built by
//! [`ChooClient`].
//!
//! ## Retry Policy
//!
//! Idempotent GETs retry transport failures with exponential backoff
//! (`retry.rs`). State-changing POSTs are sent exactly once.

pub mod announce;
pub mod artifact;
pub mod config;
pub mod contract;
pub mod error;
pub(crate) mod http;
pub mod identity;
pub(crate) mod retry;
pub mod types;

pub use announce::{Announcer, HttpAnnouncer};
pub use artifact::{ArtifactGenerator, HttpArtifactGenerator};
pub use config::{ClientConfig, ConfigError};
pub use contract::{ContractService, HttpContractService};
pub use error::ClientError;
pub use identity::{HttpIdentityResolver, IdentityResolver};
pub use types::{Announcement, GeneratedArtifact, GeneratedAttribute, ResolvedUser, TransferReceipt};

/// Top-level client. Holds one HTTP adapter per collaborator, all sharing a
/// single connection pool.
#[derive(Debug, Clone)]
pub struct ChooClient {
    contract: HttpContractService,
    generator: HttpArtifactGenerator,
    identity: HttpIdentityResolver,
    announcer: HttpAnnouncer,
}

impl ChooClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = http::build_http(&config)?;
        Ok(Self {
            contract: HttpContractService::new(http.clone(), config.contract_url),
            generator: HttpArtifactGenerator::new(http.clone(), config.generator_url),
            identity: HttpIdentityResolver::new(http.clone(), config.identity_url),
            announcer: HttpAnnouncer::new(http, config.announcer_url),
        })
    }

    pub fn contract(&self) -> &HttpContractService {
        &self.contract
    }

    pub fn generator(&self) -> &HttpArtifactGenerator {
        &self.generator
    }

    pub fn identity(&self) -> &HttpIdentityResolver {
        &self.identity
    }

    pub fn announcer(&self) -> &HttpAnnouncer {
        &self.announcer
    }
}
