//! Read contracts for the platform's activity stores and the write contract
//! for proposer level rows, with Postgres and in-memory backends.

use std::sync::Arc;

use async_trait::async_trait;
use rale_core::{
    ActivitySignal, InvalidLevel, Level, LevelRecord, NeighborhoodKey, ProposerId, VisitRecord,
    Window,
};
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "rale-storage";

/// Terminal payment state that counts as a funding participation.
pub const PAYMENT_STATUS_DONE: &str = "DONE";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("level row {id} holds an invalid level: {source}")]
    InvalidLevel {
        id: i64,
        #[source]
        source: InvalidLevel,
    },
    #[error("level row {0} not found")]
    MissingLevel(i64),
}

#[async_trait]
pub trait ProposerDirectory: Send + Sync {
    /// All proposer ids, or only those in `only` that exist.
    async fn proposer_ids(
        &self,
        only: Option<&[ProposerId]>,
    ) -> Result<Vec<ProposerId>, StorageError>;
}

#[async_trait]
pub trait VisitRepository: Send + Sync {
    async fn visits_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<VisitRecord>, StorageError>;
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn authored_proposals_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError>;
}

#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// False when like rows carry no creation timestamp; such likes cannot
    /// be attributed to a window and are never counted.
    fn supports_window_filter(&self) -> bool;

    /// Likes placed inside the window, addressed through the liked item.
    async fn likes_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Payments in [`PAYMENT_STATUS_DONE`] approved inside the window,
    /// addressed through the funded proposal.
    async fn completed_payments_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError>;
}

#[async_trait]
pub trait LevelRepository: Send + Sync {
    /// Most recently created row for the pair, if any.
    async fn find_latest(
        &self,
        proposer: &str,
        neighborhood: &NeighborhoodKey,
    ) -> Result<Option<LevelRecord>, StorageError>;

    async fn create(
        &self,
        proposer: &str,
        neighborhood: &NeighborhoodKey,
        level: Level,
    ) -> Result<LevelRecord, StorageError>;

    async fn update_level(&self, id: i64, level: Level) -> Result<(), StorageError>;
}

/// The collaborators the leveling engine is constructed with.
#[derive(Clone)]
pub struct Repositories {
    pub proposers: Arc<dyn ProposerDirectory>,
    pub visits: Arc<dyn VisitRepository>,
    pub proposals: Arc<dyn ProposalRepository>,
    pub likes: Arc<dyn LikeRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub levels: Arc<dyn LevelRepository>,
}

impl Repositories {
    /// Wires every contract to one backend.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ProposerDirectory
            + VisitRepository
            + ProposalRepository
            + LikeRepository
            + PaymentRepository
            + LevelRepository
            + 'static,
    {
        Self {
            proposers: store.clone(),
            visits: store.clone(),
            proposals: store.clone(),
            likes: store.clone(),
            payments: store.clone(),
            levels: store,
        }
    }

    pub fn with_levels(mut self, levels: Arc<dyn LevelRepository>) -> Self {
        self.levels = levels;
        self
    }
}
