use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{SettlementRecord, SettlementStatus};

/// Single source of truth for settlement state.
///
/// Every mutation is an optimistic compare-and-set: the update only applies
/// while the record is still in the expected source status, and the `bool`
/// return says whether this caller won. A redelivered announcement and a
/// concurrent poll sweep can therefore never both advance the same record.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Insert a fresh record. Returns false when a settlement already exists
    /// for the league; the unique `league_id` is the pipeline's idempotency
    /// gate.
    async fn create(&self, record: &SettlementRecord) -> Result<bool>;

    async fn by_league(&self, league_id: Uuid) -> Result<Option<SettlementRecord>>;
    async fn by_tx_ref(&self, tx_ref: &str) -> Result<Option<SettlementRecord>>;
    async fn by_winner(&self, winner_id: Uuid) -> Result<Vec<SettlementRecord>>;
    async fn with_status(&self, statuses: &[SettlementStatus]) -> Result<Vec<SettlementRecord>>;

    /// Pending -> Submitted, stamping the ledger reference.
    async fn mark_submitted(&self, league_id: Uuid, tx_ref: &str) -> Result<bool>;
    /// `from` (Pending or Submitted) -> Failed with an error message.
    async fn mark_failed(&self, league_id: Uuid, from: SettlementStatus, message: &str)
        -> Result<bool>;
    /// Submitted -> Confirmed, stamping `confirmed_at`.
    async fn mark_confirmed(&self, league_id: Uuid, confirmed_at: DateTime<Utc>) -> Result<bool>;
    /// Submitted -> Rejected on an explicit, permanent ledger rejection.
    async fn mark_rejected(&self, league_id: Uuid, message: &str) -> Result<bool>;
    /// Failed -> Pending, clearing the stale reference and error. Operator
    /// retry path; invalid from any other status.
    async fn reset_for_retry(&self, league_id: Uuid) -> Result<bool>;
}

const RECORD_COLUMNS: &str = "id, league_id, winner_id, final_score, \"rank\", payout_address, \
     ledger_tx_ref, status, announced_at, confirmed_at, error_message, created_at, updated_at";

pub struct PgSettlementStore {
    pool: PgPool,
}

impl PgSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    async fn create(&self, record: &SettlementRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO league_winners
            (id, league_id, winner_id, final_score, "rank", payout_address,
             status, announced_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (league_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.league_id)
        .bind(record.winner_id)
        .bind(record.final_score)
        .bind(record.rank)
        .bind(&record.payout_address)
        .bind(record.status)
        .bind(record.announced_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn by_league(&self, league_id: Uuid) -> Result<Option<SettlementRecord>> {
        let record = sqlx::query_as::<_, SettlementRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM league_winners WHERE league_id = $1"
        ))
        .bind(league_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn by_tx_ref(&self, tx_ref: &str) -> Result<Option<SettlementRecord>> {
        let record = sqlx::query_as::<_, SettlementRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM league_winners WHERE ledger_tx_ref = $1"
        ))
        .bind(tx_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn by_winner(&self, winner_id: Uuid) -> Result<Vec<SettlementRecord>> {
        let records = sqlx::query_as::<_, SettlementRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM league_winners
             WHERE winner_id = $1
             ORDER BY announced_at DESC"
        ))
        .bind(winner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn with_status(&self, statuses: &[SettlementStatus]) -> Result<Vec<SettlementRecord>> {
        let records = sqlx::query_as::<_, SettlementRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM league_winners
             WHERE status = ANY($1)
             ORDER BY created_at ASC"
        ))
        .bind(statuses.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn mark_submitted(&self, league_id: Uuid, tx_ref: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE league_winners
            SET status = $1,
                ledger_tx_ref = $2,
                error_message = NULL,
                updated_at = now()
            WHERE league_id = $3 AND status = $4
            "#,
        )
        .bind(SettlementStatus::Submitted)
        .bind(tx_ref)
        .bind(league_id)
        .bind(SettlementStatus::Pending)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(
        &self,
        league_id: Uuid,
        from: SettlementStatus,
        message: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE league_winners
            SET status = $1,
                error_message = $2,
                updated_at = now()
            WHERE league_id = $3 AND status = $4
            "#,
        )
        .bind(SettlementStatus::Failed)
        .bind(message)
        .bind(league_id)
        .bind(from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_confirmed(&self, league_id: Uuid, confirmed_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE league_winners
            SET status = $1,
                confirmed_at = $2,
                error_message = NULL,
                updated_at = now()
            WHERE league_id = $3 AND status = $4
            "#,
        )
        .bind(SettlementStatus::Confirmed)
        .bind(confirmed_at)
        .bind(league_id)
        .bind(SettlementStatus::Submitted)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_rejected(&self, league_id: Uuid, message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE league_winners
            SET status = $1,
                error_message = $2,
                updated_at = now()
            WHERE league_id = $3 AND status = $4
            "#,
        )
        .bind(SettlementStatus::Rejected)
        .bind(message)
        .bind(league_id)
        .bind(SettlementStatus::Submitted)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_for_retry(&self, league_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE league_winners
            SET status = $1,
                ledger_tx_ref = NULL,
                error_message = NULL,
                updated_at = now()
            WHERE league_id = $2 AND status = $3
            "#,
        )
        .bind(SettlementStatus::Pending)
        .bind(league_id)
        .bind(SettlementStatus::Failed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
