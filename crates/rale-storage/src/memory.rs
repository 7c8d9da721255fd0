use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rale_core::{
    ActivitySignal, Level, LevelRecord, NeighborhoodKey, ProposerId, VisitRecord, Window,
};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::{
    LevelRepository, LikeRepository, PaymentRepository, ProposalRepository, ProposerDirectory,
    StorageError, VisitRepository, PAYMENT_STATUS_DONE,
};

#[derive(Debug, Clone)]
struct ProposalRow {
    author: ProposerId,
    created_at: DateTime<Utc>,
    address: JsonValue,
}

#[derive(Debug, Clone)]
struct LikeRow {
    proposer: ProposerId,
    proposal_id: i64,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct PaymentRow {
    proposer: ProposerId,
    funding_id: i64,
    status: String,
    approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    proposers: Vec<ProposerId>,
    visits: Vec<(ProposerId, VisitRecord)>,
    proposals: BTreeMap<i64, ProposalRow>,
    likes: Vec<LikeRow>,
    /// funding id -> proposal id
    fundings: BTreeMap<i64, i64>,
    payments: Vec<PaymentRow>,
    levels: Vec<LevelRecord>,
    next_id: i64,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn proposal_address(&self, proposal_id: i64) -> JsonValue {
        self.proposals
            .get(&proposal_id)
            .map(|p| p.address.clone())
            .unwrap_or(JsonValue::Null)
    }
}

/// Process-local backend mirroring the Postgres relations, including
/// transitive address resolution and an optional like timestamp column.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    like_timestamps: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            like_timestamps: true,
        }
    }

    /// A store whose like rows have no timestamp column.
    pub fn without_like_timestamps() -> Self {
        Self {
            like_timestamps: false,
            ..Self::new()
        }
    }

    pub async fn add_proposer(&self, id: impl Into<ProposerId>) {
        self.state.lock().await.proposers.push(id.into());
    }

    pub async fn record_visit(&self, proposer: &str, at: DateTime<Utc>, address: JsonValue) {
        self.state
            .lock()
            .await
            .visits
            .push((proposer.to_string(), VisitRecord { at, address }));
    }

    /// Returns the new proposal id.
    pub async fn add_proposal(
        &self,
        author: &str,
        created_at: DateTime<Utc>,
        address: JsonValue,
    ) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        state.proposals.insert(
            id,
            ProposalRow {
                author: author.to_string(),
                created_at,
                address,
            },
        );
        id
    }

    pub async fn add_like(
        &self,
        proposer: &str,
        proposal_id: i64,
        created_at: Option<DateTime<Utc>>,
    ) {
        self.state.lock().await.likes.push(LikeRow {
            proposer: proposer.to_string(),
            proposal_id,
            created_at,
        });
    }

    /// Returns the new funding id.
    pub async fn add_funding(&self, proposal_id: i64) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        state.fundings.insert(id, proposal_id);
        id
    }

    pub async fn add_payment(
        &self,
        proposer: &str,
        funding_id: i64,
        status: &str,
        approved_at: Option<DateTime<Utc>>,
    ) {
        self.state.lock().await.payments.push(PaymentRow {
            proposer: proposer.to_string(),
            funding_id,
            status: status.to_string(),
            approved_at,
        });
    }

    /// Snapshot of every level row, oldest first.
    pub async fn levels(&self) -> Vec<LevelRecord> {
        self.state.lock().await.levels.clone()
    }
}

fn in_window(window: &Window, at: Option<DateTime<Utc>>) -> bool {
    at.is_some_and(|at| window.contains(at))
}

#[async_trait]
impl ProposerDirectory for MemoryStore {
    async fn proposer_ids(
        &self,
        only: Option<&[ProposerId]>,
    ) -> Result<Vec<ProposerId>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .proposers
            .iter()
            .filter(|id| only.map_or(true, |ids| ids.contains(*id)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl VisitRepository for MemoryStore {
    async fn visits_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<VisitRecord>, StorageError> {
        let state = self.state.lock().await;
        let mut out: Vec<VisitRecord> = state
            .visits
            .iter()
            .filter(|(owner, visit)| owner == proposer && window.contains(visit.at))
            .map(|(_, visit)| visit.clone())
            .collect();
        out.sort_by_key(|v| v.at);
        Ok(out)
    }
}

#[async_trait]
impl ProposalRepository for MemoryStore {
    async fn authored_proposals_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .proposals
            .values()
            .filter(|p| p.author == proposer && window.contains(p.created_at))
            .map(|p| ActivitySignal::new(p.address.clone()))
            .collect())
    }
}

#[async_trait]
impl LikeRepository for MemoryStore {
    fn supports_window_filter(&self) -> bool {
        self.like_timestamps
    }

    async fn likes_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError> {
        if !self.like_timestamps {
            return Ok(Vec::new());
        }
        let state = self.state.lock().await;
        Ok(state
            .likes
            .iter()
            .filter(|l| l.proposer == proposer && in_window(window, l.created_at))
            .map(|l| ActivitySignal::new(state.proposal_address(l.proposal_id)))
            .collect())
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn completed_payments_in_window(
        &self,
        proposer: &str,
        window: &Window,
    ) -> Result<Vec<ActivitySignal>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| {
                p.proposer == proposer
                    && p.status == PAYMENT_STATUS_DONE
                    && in_window(window, p.approved_at)
            })
            .map(|p| {
                let address = state
                    .fundings
                    .get(&p.funding_id)
                    .map(|proposal_id| state.proposal_address(*proposal_id))
                    .unwrap_or(JsonValue::Null);
                ActivitySignal::new(address)
            })
            .collect())
    }
}

#[async_trait]
impl LevelRepository for MemoryStore {
    async fn find_latest(
        &self,
        proposer: &str,
        neighborhood: &NeighborhoodKey,
    ) -> Result<Option<LevelRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .levels
            .iter()
            .filter(|r| r.proposer_id == proposer && &r.neighborhood == neighborhood)
            .max_by_key(|r| r.id)
            .cloned())
    }

    async fn create(
        &self,
        proposer: &str,
        neighborhood: &NeighborhoodKey,
        level: Level,
    ) -> Result<LevelRecord, StorageError> {
        let mut state = self.state.lock().await;
        let record = LevelRecord {
            id: state.allocate_id(),
            proposer_id: proposer.to_string(),
            neighborhood: neighborhood.clone(),
            level,
        };
        state.levels.push(record.clone());
        Ok(record)
    }

    async fn update_level(&self, id: i64, level: Level) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let row = state
            .levels
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StorageError::MissingLevel(id))?;
        row.level = level;
        Ok(())
    }
}
