use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::error::{Result, SettlementError};
use crate::scores::ScoreSource;
use crate::solana::validate_payout_address;
use crate::store::SettlementStore;
use crate::types::{AnnouncementEvent, SettlementRecord, EVENT_WINNER_ANNOUNCED};

/// Result of one determination. `AlreadySettled` is the idempotent skip, not
/// an error: a double-fired scheduler or a manual trigger after the scheduled
/// run both land here.
#[derive(Debug)]
pub enum DeterminationOutcome {
    Announced(SettlementRecord),
    AlreadySettled(SettlementRecord),
}

impl DeterminationOutcome {
    pub fn record(&self) -> &SettlementRecord {
        match self {
            DeterminationOutcome::Announced(r) => r,
            DeterminationOutcome::AlreadySettled(r) => r,
        }
    }
}

/// Picks the league winner from the ranked scores, persists the settlement
/// record and publishes the announcement.
pub struct WinnerDeterminer {
    store: Arc<dyn SettlementStore>,
    scores: Arc<dyn ScoreSource>,
    bus: Arc<dyn MessageBus>,
    topic: String,
}

impl WinnerDeterminer {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        scores: Arc<dyn ScoreSource>,
        bus: Arc<dyn MessageBus>,
        topic: String,
    ) -> Self {
        Self {
            store,
            scores,
            bus,
            topic,
        }
    }

    pub async fn determine(&self, league_id: Uuid) -> Result<DeterminationOutcome> {
        if let Some(existing) = self.store.by_league(league_id).await? {
            tracing::debug!(league_id = %league_id, "winner already announced, skipping");
            return Ok(DeterminationOutcome::AlreadySettled(existing));
        }

        let mut scores = self.scores.ranked_scores(league_id).await?;
        if scores.is_empty() {
            return Err(SettlementError::NoScoresAvailable);
        }

        // Stable sort: tied scores keep the order the scoring collaborator
        // delivered them in, so the first tied entry wins.
        scores.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(Ordering::Equal)
        });
        let winner = &scores[0];

        // Aborts before any record exists, so a corrected address can retry
        // cleanly on a later trigger.
        validate_payout_address(&winner.payout_address)?;

        let record = SettlementRecord::new_pending(
            league_id,
            winner.user_id,
            winner.total_score,
            winner.payout_address.clone(),
        );

        if !self.store.create(&record).await? {
            // Lost a race against a concurrent trigger for the same league.
            let existing = self
                .store
                .by_league(league_id)
                .await?
                .ok_or_else(|| SettlementError::Internal("settlement vanished after conflict".into()))?;
            return Ok(DeterminationOutcome::AlreadySettled(existing));
        }

        let event = AnnouncementEvent::from_record(
            &record,
            EVENT_WINNER_ANNOUNCED,
            Some(scores.len() as i32),
        );
        self.bus.publish(&self.topic, &event).await?;

        tracing::info!(
            league_id = %league_id,
            winner_id = %record.winner_id,
            final_score = record.final_score,
            "announced league winner"
        );
        Ok(DeterminationOutcome::Announced(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_address, MemoryBus, MemoryStore, StaticScores};
    use crate::types::{RankedScore, SettlementStatus};

    fn score(user: Uuid, address: &str, total: f64) -> RankedScore {
        RankedScore {
            user_id: user,
            payout_address: address.to_string(),
            total_score: total,
        }
    }

    fn determiner() -> (
        Arc<MemoryStore>,
        Arc<StaticScores>,
        Arc<MemoryBus>,
        WinnerDeterminer,
    ) {
        let store = Arc::new(MemoryStore::new());
        let scores = Arc::new(StaticScores::new());
        let bus = Arc::new(MemoryBus::new());
        let determiner = WinnerDeterminer::new(
            store.clone(),
            scores.clone(),
            bus.clone(),
            "league-winners-announced".to_string(),
        );
        (store, scores, bus, determiner)
    }

    #[tokio::test]
    async fn highest_score_wins_and_first_tied_entry_breaks_ties() {
        let (_, scores, _, determiner) = determiner();
        let league = Uuid::new_v4();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        scores.set(
            league,
            vec![
                score(a, &test_address(1), 100.0),
                score(b, &test_address(2), 120.0),
                score(c, &test_address(3), 120.0),
            ],
        );

        let outcome = determiner.determine(league).await.unwrap();
        let record = outcome.record();
        assert_eq!(record.winner_id, b);
        assert_eq!(record.rank, 1);
        assert_eq!(record.final_score, 120.0);
        assert_eq!(record.status, SettlementStatus::Pending);
    }

    #[tokio::test]
    async fn second_determination_is_a_noop() {
        let (store, scores, bus, determiner) = determiner();
        let league = Uuid::new_v4();
        scores.set(league, vec![score(Uuid::new_v4(), &test_address(1), 50.0)]);

        let first = determiner.determine(league).await.unwrap();
        assert!(matches!(first, DeterminationOutcome::Announced(_)));

        let second = determiner.determine(league).await.unwrap();
        assert!(matches!(second, DeterminationOutcome::AlreadySettled(_)));

        // Exactly one record and one announcement.
        assert!(store.by_league(league).await.unwrap().is_some());
        assert_eq!(bus.events().len(), 1);
    }

    #[tokio::test]
    async fn empty_scores_is_an_error() {
        let (_, scores, bus, determiner) = determiner();
        let league = Uuid::new_v4();
        scores.set(league, vec![]);

        let err = determiner.determine(league).await.unwrap_err();
        assert!(matches!(err, SettlementError::NoScoresAvailable));
        assert!(bus.events().is_empty());
    }

    #[tokio::test]
    async fn invalid_address_creates_no_record_and_corrected_address_succeeds() {
        let (store, scores, bus, determiner) = determiner();
        let league = Uuid::new_v4();
        let winner = Uuid::new_v4();
        scores.set(league, vec![score(winner, "not-a-real-address", 99.0)]);

        let err = determiner.determine(league).await.unwrap_err();
        assert!(matches!(err, SettlementError::InvalidPayoutAddress(_)));
        assert!(store.by_league(league).await.unwrap().is_none());
        assert!(bus.events().is_empty());

        // Corrected address, same league: determination now goes through.
        scores.set(league, vec![score(winner, &test_address(4), 99.0)]);
        let outcome = determiner.determine(league).await.unwrap();
        assert!(matches!(outcome, DeterminationOutcome::Announced(_)));
    }

    #[tokio::test]
    async fn announcement_event_mirrors_the_record() {
        let (_, scores, bus, determiner) = determiner();
        let league = Uuid::new_v4();
        let winner = Uuid::new_v4();
        scores.set(
            league,
            vec![
                score(winner, &test_address(5), 88.0),
                score(Uuid::new_v4(), &test_address(6), 70.0),
            ],
        );

        determiner.determine(league).await.unwrap();

        let events = bus.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, EVENT_WINNER_ANNOUNCED);
        assert_eq!(event.league_id, league);
        assert_eq!(event.winner_id, winner);
        assert_eq!(event.total_participants, Some(2));
        assert_eq!(event.status, SettlementStatus::Pending);
    }
}
