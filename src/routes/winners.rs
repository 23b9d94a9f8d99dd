use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, SettlementError};
use crate::state::AppState;
use crate::types::{
    AnnouncementEvent, SettlementRecord, SettlementStatus, EVENT_WINNER_ANNOUNCED,
};
use crate::winner::DeterminationOutcome;

#[derive(Serialize)]
pub struct AnnounceResponse {
    pub already_settled: bool,
    pub settlement: SettlementRecord,
}

pub async fn get_league_winner(
    State(state): State<AppState>,
    Path(league_id): Path<Uuid>,
) -> Result<Json<SettlementRecord>> {
    let record = state
        .store
        .by_league(league_id)
        .await?
        .ok_or_else(|| SettlementError::NotFound(format!("no winner for league {league_id}")))?;

    Ok(Json(record))
}

pub async fn get_user_wins(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<SettlementRecord>>> {
    Ok(Json(state.store.by_winner(user_id).await?))
}

pub async fn get_by_tx_ref(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
) -> Result<Json<SettlementRecord>> {
    let record = state
        .store
        .by_tx_ref(&tx_ref)
        .await?
        .ok_or_else(|| SettlementError::NotFound(format!("no settlement for reference {tx_ref}")))?;

    Ok(Json(record))
}

/// Settlements that have not reached a terminal state yet.
pub async fn list_outstanding(
    State(state): State<AppState>,
) -> Result<Json<Vec<SettlementRecord>>> {
    let records = state
        .store
        .with_status(&[SettlementStatus::Pending, SettlementStatus::Submitted])
        .await?;
    Ok(Json(records))
}

pub async fn list_failed(State(state): State<AppState>) -> Result<Json<Vec<SettlementRecord>>> {
    let records = state
        .store
        .with_status(&[SettlementStatus::Failed])
        .await?;
    Ok(Json(records))
}

/// Manual announcement trigger. Goes through the same determiner as the
/// scheduler, so an already-settled league is a clean no-op.
pub async fn announce_winner(
    State(state): State<AppState>,
    Path(league_id): Path<Uuid>,
) -> Result<Json<AnnounceResponse>> {
    let outcome = state.determiner.determine(league_id).await?;

    let response = match outcome {
        DeterminationOutcome::Announced(settlement) => AnnounceResponse {
            already_settled: false,
            settlement,
        },
        DeterminationOutcome::AlreadySettled(settlement) => AnnounceResponse {
            already_settled: true,
            settlement,
        },
    };
    Ok(Json(response))
}

/// Operator retry of a failed settlement: Failed -> Pending, then a fresh
/// announcement event re-enters the pipeline.
pub async fn retry_settlement(
    State(state): State<AppState>,
    Path(league_id): Path<Uuid>,
) -> Result<Json<SettlementRecord>> {
    let existing = state
        .store
        .by_league(league_id)
        .await?
        .ok_or_else(|| SettlementError::NotFound(format!("no winner for league {league_id}")))?;

    if !state.store.reset_for_retry(league_id).await? {
        return Err(SettlementError::InvalidTransition {
            from: existing.status,
            to: SettlementStatus::Pending,
        });
    }

    let record = state
        .store
        .by_league(league_id)
        .await?
        .ok_or_else(|| SettlementError::Internal("settlement vanished during retry".into()))?;

    let event = AnnouncementEvent::from_record(&record, EVENT_WINNER_ANNOUNCED, None);
    state.bus.publish(&state.winners_topic, &event).await?;

    tracing::info!(league_id = %league_id, "settlement queued for retry");
    Ok(Json(record))
}
