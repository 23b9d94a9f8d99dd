use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a league settlement on the external ledger.
///
/// `Confirmed` and `Rejected` are terminal. The only backward move is the
/// explicit operator retry, `Failed` -> `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
    Rejected,
}

impl sqlx::postgres::PgHasArrayType for SettlementStatus {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("_settlement_status")
    }
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::Submitted => "SUBMITTED",
            SettlementStatus::Confirmed => "CONFIRMED",
            SettlementStatus::Failed => "FAILED",
            SettlementStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementStatus::Confirmed | SettlementStatus::Rejected)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SettlementStatus) -> bool {
        use SettlementStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Failed)
                | (Submitted, Confirmed)
                | (Submitted, Failed)
                | (Submitted, Rejected)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One settlement per league, created once by the winner determiner and then
/// advanced by the announcement consumer and the confirmation poller. The
/// unique `league_id` is the idempotency gate for the whole pipeline.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub league_id: Uuid,
    pub winner_id: Uuid,
    pub final_score: f64,
    pub rank: i32,
    pub payout_address: String,
    pub ledger_tx_ref: Option<String>,
    pub status: SettlementStatus,
    pub announced_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementRecord {
    /// Factory for a freshly determined winner. Timestamps are set here, not
    /// by the store.
    pub fn new_pending(
        league_id: Uuid,
        winner_id: Uuid,
        final_score: f64,
        payout_address: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            league_id,
            winner_id,
            final_score,
            rank: 1,
            payout_address,
            ledger_tx_ref: None,
            status: SettlementStatus::Pending,
            announced_at: now,
            confirmed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Event types carried on the announcement topic.
pub const EVENT_WINNER_ANNOUNCED: &str = "LEAGUE_WINNER_ANNOUNCED";
pub const EVENT_TX_SUBMITTED: &str = "TRANSACTION_SUBMITTED";
pub const EVENT_TX_CONFIRMED: &str = "TRANSACTION_CONFIRMED";
pub const EVENT_TX_FAILED: &str = "TRANSACTION_FAILED";
pub const EVENT_TX_REJECTED: &str = "TRANSACTION_REJECTED";

/// Immutable announcement message. Published on the initial announcement and
/// on every later status transition, so the topic doubles as a lifecycle log
/// of the settlement record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncementEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub league_id: Uuid,
    pub winner_id: Uuid,
    pub payout_address: String,
    pub final_score: f64,
    pub rank: i32,
    pub total_participants: Option<i32>,
    pub status: SettlementStatus,
    pub ledger_tx_ref: Option<String>,
    pub error_message: Option<String>,
    pub announced_at: DateTime<Utc>,
}

impl AnnouncementEvent {
    /// Build an event mirroring the record's state at emission time.
    pub fn from_record(
        record: &SettlementRecord,
        event_type: &str,
        total_participants: Option<i32>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            league_id: record.league_id,
            winner_id: record.winner_id,
            payout_address: record.payout_address.clone(),
            final_score: record.final_score,
            rank: record.rank,
            total_participants,
            status: record.status,
            ledger_tx_ref: record.ledger_tx_ref.clone(),
            error_message: record.error_message.clone(),
            announced_at: Utc::now(),
        }
    }
}

/// Ranked input from the external scoring collaborator, highest score first.
/// Ties keep the order they arrived in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedScore {
    pub user_id: Uuid,
    pub payout_address: String,
    pub total_score: f64,
}
