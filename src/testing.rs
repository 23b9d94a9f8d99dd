//! In-memory doubles for the capability traits, used by unit tests only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use crate::bus::{MessageBus, OutboxJob, OutboxQueue, MAX_DELIVERY_RETRIES};
use crate::error::{Result, SettlementError};
use crate::scores::ScoreSource;
use crate::solana::{ConfirmationLevel, LedgerGateway, SubmissionRequest};
use crate::store::SettlementStore;
use crate::types::{AnnouncementEvent, RankedScore, SettlementRecord, SettlementStatus};

/// Settlement store over a mutex-guarded map, enforcing the same
/// expected-source-status guards as the Postgres implementation.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Uuid, SettlementRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&self, record: SettlementRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.league_id, record);
    }

    fn transition<F>(&self, league_id: Uuid, from: SettlementStatus, apply: F) -> bool
    where
        F: FnOnce(&mut SettlementRecord),
    {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&league_id) {
            Some(record) if record.status == from => {
                apply(record);
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn create(&self, record: &SettlementRecord) -> Result<bool> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.league_id) {
            return Ok(false);
        }
        records.insert(record.league_id, record.clone());
        Ok(true)
    }

    async fn by_league(&self, league_id: Uuid) -> Result<Option<SettlementRecord>> {
        Ok(self.records.lock().unwrap().get(&league_id).cloned())
    }

    async fn by_tx_ref(&self, tx_ref: &str) -> Result<Option<SettlementRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.ledger_tx_ref.as_deref() == Some(tx_ref))
            .cloned())
    }

    async fn by_winner(&self, winner_id: Uuid) -> Result<Vec<SettlementRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.winner_id == winner_id)
            .cloned()
            .collect())
    }

    async fn with_status(&self, statuses: &[SettlementStatus]) -> Result<Vec<SettlementRecord>> {
        let mut records: Vec<SettlementRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn mark_submitted(&self, league_id: Uuid, tx_ref: &str) -> Result<bool> {
        Ok(self.transition(league_id, SettlementStatus::Pending, |r| {
            r.status = SettlementStatus::Submitted;
            r.ledger_tx_ref = Some(tx_ref.to_string());
            r.error_message = None;
        }))
    }

    async fn mark_failed(
        &self,
        league_id: Uuid,
        from: SettlementStatus,
        message: &str,
    ) -> Result<bool> {
        if !from.can_transition_to(SettlementStatus::Failed) {
            return Err(SettlementError::InvalidTransition {
                from,
                to: SettlementStatus::Failed,
            });
        }
        Ok(self.transition(league_id, from, |r| {
            r.status = SettlementStatus::Failed;
            r.error_message = Some(message.to_string());
        }))
    }

    async fn mark_confirmed(&self, league_id: Uuid, confirmed_at: DateTime<Utc>) -> Result<bool> {
        Ok(self.transition(league_id, SettlementStatus::Submitted, |r| {
            r.status = SettlementStatus::Confirmed;
            r.confirmed_at = Some(confirmed_at);
            r.error_message = None;
        }))
    }

    async fn mark_rejected(&self, league_id: Uuid, message: &str) -> Result<bool> {
        Ok(self.transition(league_id, SettlementStatus::Submitted, |r| {
            r.status = SettlementStatus::Rejected;
            r.error_message = Some(message.to_string());
        }))
    }

    async fn reset_for_retry(&self, league_id: Uuid) -> Result<bool> {
        Ok(self.transition(league_id, SettlementStatus::Failed, |r| {
            r.status = SettlementStatus::Pending;
            r.ledger_tx_ref = None;
            r.error_message = None;
        }))
    }
}

/// Bus that records published events in memory. `fail_next_publish` makes the
/// next publish error, for exercising delivery-retry paths.
#[derive(Default)]
pub struct MemoryBus {
    pub published: Mutex<Vec<(String, AnnouncementEvent)>>,
    fail_next: Mutex<bool>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnnouncementEvent> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn fail_next_publish(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, event: &AnnouncementEvent) -> Result<()> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(SettlementError::Internal("bus unavailable".to_string()));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}

/// Outbox double over a vec of jobs, mirroring the row-status bookkeeping of
/// the Postgres outbox.
#[derive(Default)]
pub struct MemoryOutbox {
    jobs: Mutex<Vec<QueuedJob>>,
}

struct QueuedJob {
    id: Uuid,
    payload: serde_json::Value,
    retries: i32,
    status: &'static str,
    last_error: Option<String>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: &AnnouncementEvent) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.lock().unwrap().push(QueuedJob {
            id,
            payload: serde_json::to_value(event).unwrap(),
            retries: 0,
            status: "PENDING",
            last_error: None,
        });
        id
    }

    pub fn push_raw(&self, payload: serde_json::Value) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.lock().unwrap().push(QueuedJob {
            id,
            payload,
            retries: 0,
            status: "PENDING",
            last_error: None,
        });
        id
    }

    pub fn status_of(&self, job_id: Uuid) -> &'static str {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .map(|j| j.status)
            .unwrap()
    }

    pub fn retries_of(&self, job_id: Uuid) -> i32 {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .map(|j| j.retries)
            .unwrap()
    }
}

#[async_trait]
impl OutboxQueue for MemoryOutbox {
    async fn fetch_batch(&self, limit: i64) -> Result<Vec<OutboxJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == "PENDING")
            .take(limit as usize)
            .map(|j| OutboxJob {
                id: j.id,
                payload: j.payload.clone(),
                retries: j.retries,
            })
            .collect())
    }

    async fn mark_sent(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = "SENT";
            job.last_error = None;
        }
        Ok(())
    }

    async fn mark_undeliverable(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = "FAILED";
            job.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn record_delivery_failure(
        &self,
        job_id: Uuid,
        retries: i32,
        error: &str,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.retries = retries + 1;
            job.status = if job.retries > MAX_DELIVERY_RETRIES {
                "FAILED"
            } else {
                "PENDING"
            };
            job.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

/// Score source serving fixed lists.
#[derive(Default)]
pub struct StaticScores {
    scores: Mutex<HashMap<Uuid, Vec<RankedScore>>>,
}

impl StaticScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, league_id: Uuid, scores: Vec<RankedScore>) {
        self.scores.lock().unwrap().insert(league_id, scores);
    }
}

#[async_trait]
impl ScoreSource for StaticScores {
    async fn ranked_scores(&self, league_id: Uuid) -> Result<Vec<RankedScore>> {
        Ok(self
            .scores
            .lock()
            .unwrap()
            .get(&league_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn active_leagues(&self) -> Result<Vec<Uuid>> {
        let mut leagues: Vec<Uuid> = self.scores.lock().unwrap().keys().copied().collect();
        leagues.sort();
        Ok(leagues)
    }
}

/// Gateway with scripted submit responses and a settable confirmation level.
pub struct FakeGateway {
    pub submissions: Mutex<Vec<SubmissionRequest>>,
    submit_responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    confirmation: Mutex<ConfirmationLevel>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            submit_responses: Mutex::new(VecDeque::new()),
            confirmation: Mutex::new(ConfirmationLevel::NotVisible),
        }
    }

    pub fn queue_success(&self, tx_ref: &str) {
        self.submit_responses
            .lock()
            .unwrap()
            .push_back(Ok(tx_ref.to_string()));
    }

    pub fn queue_failure(&self, message: &str) {
        self.submit_responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn set_confirmation(&self, level: ConfirmationLevel) {
        *self.confirmation.lock().unwrap() = level;
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl LedgerGateway for FakeGateway {
    async fn submit(&self, request: &SubmissionRequest) -> Result<String> {
        self.submissions.lock().unwrap().push(request.clone());
        match self.submit_responses.lock().unwrap().pop_front() {
            Some(Ok(tx_ref)) => Ok(tx_ref),
            Some(Err(message)) => Err(SettlementError::GatewaySubmissionFailed(message)),
            None => Ok("unscripted-tx-ref".to_string()),
        }
    }

    async fn confirmation(&self, _tx_ref: &str) -> Result<ConfirmationLevel> {
        Ok(self.confirmation.lock().unwrap().clone())
    }
}

/// A valid-looking base58 payout address for tests.
pub fn test_address(seed: u8) -> String {
    bs58::encode([seed; 32]).into_string()
}
