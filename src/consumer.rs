use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::{MessageBus, OutboxQueue};
use crate::error::Result;
use crate::solana::{LedgerGateway, SubmissionRequest};
use crate::store::SettlementStore;
use crate::types::{
    AnnouncementEvent, SettlementStatus, EVENT_TX_FAILED, EVENT_TX_SUBMITTED,
};

const DRAIN_BATCH_SIZE: i64 = 10;
const DRAIN_INTERVAL: Duration = Duration::from_secs(5);

/// Consumes announcement events: a `Pending` announcement drives exactly one
/// gateway submission, later lifecycle events are delivery-only. Redelivered
/// announcements are discarded once the record has left `Pending`.
pub struct AnnouncementConsumer {
    store: Arc<dyn SettlementStore>,
    gateway: Arc<dyn LedgerGateway>,
    bus: Arc<dyn MessageBus>,
    topic: String,
}

impl AnnouncementConsumer {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        gateway: Arc<dyn LedgerGateway>,
        bus: Arc<dyn MessageBus>,
        topic: String,
    ) -> Self {
        Self {
            store,
            gateway,
            bus,
            topic,
        }
    }

    /// Process one delivered event. Gateway failures are recorded on the
    /// settlement record, not returned, so delivery still succeeds; an `Err`
    /// here means the delivery itself should be retried.
    pub async fn handle_event(&self, event: &AnnouncementEvent) -> Result<()> {
        if event.status != SettlementStatus::Pending {
            tracing::debug!(
                league_id = %event.league_id,
                event_type = %event.event_type,
                "lifecycle event, nothing to submit"
            );
            return Ok(());
        }

        let Some(record) = self.store.by_league(event.league_id).await? else {
            tracing::warn!(
                league_id = %event.league_id,
                "announcement for unknown settlement record, discarding"
            );
            return Ok(());
        };

        if record.status != SettlementStatus::Pending {
            tracing::debug!(
                league_id = %record.league_id,
                status = %record.status,
                "record already advanced, discarding redelivery"
            );
            return Ok(());
        }

        let request = SubmissionRequest {
            league_id: record.league_id,
            winner_id: record.winner_id,
            payout_address: record.payout_address.clone(),
            final_score: record.final_score,
            announced_at: record.announced_at,
        };

        match self.gateway.submit(&request).await {
            Ok(tx_ref) => {
                if self.store.mark_submitted(record.league_id, &tx_ref).await? {
                    tracing::info!(
                        league_id = %record.league_id,
                        tx_ref = %tx_ref,
                        "settlement submitted to ledger"
                    );
                    self.publish_followup(record.league_id, EVENT_TX_SUBMITTED)
                        .await?;
                } else {
                    tracing::warn!(
                        league_id = %record.league_id,
                        "record advanced concurrently, submission result dropped"
                    );
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(
                    league_id = %record.league_id,
                    error = %message,
                    "gateway submission failed"
                );
                if self
                    .store
                    .mark_failed(record.league_id, SettlementStatus::Pending, &message)
                    .await?
                {
                    self.publish_followup(record.league_id, EVENT_TX_FAILED)
                        .await?;
                }
            }
        }

        Ok(())
    }

    async fn publish_followup(&self, league_id: uuid::Uuid, event_type: &str) -> Result<()> {
        if let Some(record) = self.store.by_league(league_id).await? {
            let event = AnnouncementEvent::from_record(&record, event_type, None);
            self.bus.publish(&self.topic, &event).await?;
        }
        Ok(())
    }

    /// Drain one batch from the outbox, oldest first. A bad payload is
    /// parked, a transient failure stays queued for redelivery. Once a
    /// league's delivery fails, its remaining jobs in the batch are held so
    /// the retried event is never overtaken by a younger one.
    pub async fn drain_once(&self, outbox: &dyn OutboxQueue) -> Result<usize> {
        let jobs = outbox.fetch_batch(DRAIN_BATCH_SIZE).await?;
        let count = jobs.len();
        let mut stalled: HashSet<uuid::Uuid> = HashSet::new();

        for job in jobs {
            let event: AnnouncementEvent = match serde_json::from_value(job.payload) {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "undeliverable payload");
                    outbox
                        .mark_undeliverable(job.id, &format!("bad payload json: {e}"))
                        .await?;
                    continue;
                }
            };

            if stalled.contains(&event.league_id) {
                tracing::debug!(
                    job_id = %job.id,
                    league_id = %event.league_id,
                    "earlier delivery for this league failed, holding job"
                );
                continue;
            }

            match self.handle_event(&event).await {
                Ok(()) => outbox.mark_sent(job.id).await?,
                Err(e) => {
                    tracing::error!(
                        job_id = %job.id,
                        league_id = %event.league_id,
                        error = %e,
                        "delivery failed, will retry"
                    );
                    stalled.insert(event.league_id);
                    outbox
                        .record_delivery_failure(job.id, job.retries, &e.to_string())
                        .await?;
                }
            }
        }

        Ok(count)
    }

    /// Long-running drain loop.
    pub async fn run(self: Arc<Self>, outbox: Arc<dyn OutboxQueue>) {
        loop {
            if let Err(e) = self.drain_once(outbox.as_ref()).await {
                tracing::error!(error = %e, "outbox drain failed");
            }
            tokio::time::sleep(DRAIN_INTERVAL).await;
        }
    }
}
