use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::MessageBus;
use crate::error::Result;
use crate::solana::{ConfirmationLevel, LedgerGateway};
use crate::store::SettlementStore;
use crate::types::{
    AnnouncementEvent, SettlementRecord, SettlementStatus, EVENT_TX_CONFIRMED, EVENT_TX_FAILED,
    EVENT_TX_REJECTED,
};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub rejected: usize,
}

/// Periodically resolves `Submitted` settlements against the ledger. Each
/// record is its own unit of work: one bad reference never blocks the sweep.
pub struct ConfirmationPoller {
    store: Arc<dyn SettlementStore>,
    gateway: Arc<dyn LedgerGateway>,
    bus: Arc<dyn MessageBus>,
    topic: String,
    deadline: chrono::Duration,
    interval: Duration,
}

impl ConfirmationPoller {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        gateway: Arc<dyn LedgerGateway>,
        bus: Arc<dyn MessageBus>,
        topic: String,
        deadline: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            bus,
            topic,
            deadline,
            interval,
        }
    }

    /// One sweep over all outstanding submissions. Exposed separately from
    /// the loop so tests drive sweeps without waiting on the wall clock.
    pub async fn poll_once(&self) -> Result<SweepStats> {
        let outstanding = self
            .store
            .with_status(&[SettlementStatus::Submitted])
            .await?;

        let mut stats = SweepStats::default();
        if outstanding.is_empty() {
            return Ok(stats);
        }

        tracing::debug!(count = outstanding.len(), "polling outstanding submissions");

        for record in outstanding {
            stats.checked += 1;
            let league_id = record.league_id;
            if let Err(e) = self.check_record(record, &mut stats).await {
                tracing::error!(
                    league_id = %league_id,
                    error = %e,
                    "confirmation check failed"
                );
            }
        }

        tracing::info!(
            checked = stats.checked,
            confirmed = stats.confirmed,
            failed = stats.failed,
            rejected = stats.rejected,
            "confirmation sweep complete"
        );
        Ok(stats)
    }

    async fn check_record(&self, record: SettlementRecord, stats: &mut SweepStats) -> Result<()> {
        let Some(tx_ref) = record.ledger_tx_ref.clone() else {
            // Should not happen for Submitted records.
            tracing::warn!(league_id = %record.league_id, "submitted record has no ledger reference");
            return Ok(());
        };

        // A transport error is indistinguishable from "not yet visible"; the
        // deadline below still applies either way.
        let level = match self.gateway.confirmation(&tx_ref).await {
            Ok(level) => level,
            Err(e) => {
                tracing::warn!(
                    league_id = %record.league_id,
                    tx_ref = %tx_ref,
                    error = %e,
                    "confirmation query failed, treating as unconfirmed"
                );
                ConfirmationLevel::NotVisible
            }
        };

        if level.is_confirmed() {
            if self
                .store
                .mark_confirmed(record.league_id, Utc::now())
                .await?
            {
                stats.confirmed += 1;
                tracing::info!(
                    league_id = %record.league_id,
                    tx_ref = %tx_ref,
                    "settlement confirmed on ledger"
                );
                self.publish_followup(&record, EVENT_TX_CONFIRMED).await?;
            }
            return Ok(());
        }

        if let ConfirmationLevel::Rejected(reason) = level {
            let message = format!("ledger rejected transaction: {reason}");
            if self.store.mark_rejected(record.league_id, &message).await? {
                stats.rejected += 1;
                tracing::warn!(
                    league_id = %record.league_id,
                    tx_ref = %tx_ref,
                    reason = %reason,
                    "settlement rejected by ledger"
                );
                self.publish_followup(&record, EVENT_TX_REJECTED).await?;
            }
            return Ok(());
        }

        // Unconfirmed: fail once the deadline since creation has elapsed,
        // otherwise leave the record for the next sweep.
        let elapsed = Utc::now().signed_duration_since(record.created_at);
        if elapsed > self.deadline {
            let message = format!(
                "Transaction confirmation timeout after {} seconds",
                self.deadline.num_seconds()
            );
            if self
                .store
                .mark_failed(record.league_id, SettlementStatus::Submitted, &message)
                .await?
            {
                stats.failed += 1;
                tracing::warn!(
                    league_id = %record.league_id,
                    tx_ref = %tx_ref,
                    elapsed_secs = elapsed.num_seconds(),
                    "confirmation timed out"
                );
                self.publish_followup(&record, EVENT_TX_FAILED).await?;
            }
        }

        Ok(())
    }

    async fn publish_followup(&self, record: &SettlementRecord, event_type: &str) -> Result<()> {
        if let Some(updated) = self.store.by_league(record.league_id).await? {
            let event = AnnouncementEvent::from_record(&updated, event_type, None);
            self.bus.publish(&self.topic, &event).await?;
        }
        Ok(())
    }

    /// Long-running poll loop on the configured interval.
    pub async fn run(self: Arc<Self>) {
        loop {
            if let Err(e) = self.poll_once().await {
                tracing::error!(error = %e, "confirmation sweep failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
