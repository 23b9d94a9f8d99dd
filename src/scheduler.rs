use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::error::SettlementError;
use crate::scores::ScoreSource;
use crate::winner::{DeterminationOutcome, WinnerDeterminer};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub announced: usize,
    pub skipped: usize,
    pub failures: usize,
}

/// Fires winner determination for every active league once a year on the
/// configured date (June 7, 00:00 UTC by default).
pub struct SettlementScheduler {
    determiner: Arc<WinnerDeterminer>,
    scores: Arc<dyn ScoreSource>,
    month: u32,
    day: u32,
    hour: u32,
}

impl SettlementScheduler {
    pub fn new(
        determiner: Arc<WinnerDeterminer>,
        scores: Arc<dyn ScoreSource>,
        month: u32,
        day: u32,
        hour: u32,
    ) -> Self {
        Self {
            determiner,
            scores,
            month,
            day,
            hour,
        }
    }

    /// Next occurrence of `month/day hour:00 UTC` strictly after `now`.
    pub fn next_occurrence(
        now: DateTime<Utc>,
        month: u32,
        day: u32,
        hour: u32,
    ) -> Option<DateTime<Utc>> {
        let this_year = Utc
            .with_ymd_and_hms(now.year(), month, day, hour, 0, 0)
            .single()?;
        if this_year > now {
            Some(this_year)
        } else {
            Utc.with_ymd_and_hms(now.year() + 1, month, day, hour, 0, 0)
                .single()
        }
    }

    /// One scheduled run over all active leagues. A failing league never
    /// aborts the others.
    pub async fn run_all(&self) -> Result<RunStats, SettlementError> {
        let leagues = self.scores.active_leagues().await?;
        tracing::info!(count = leagues.len(), "starting scheduled winner announcement");

        let mut stats = RunStats::default();
        for league_id in leagues {
            match self.determiner.determine(league_id).await {
                Ok(DeterminationOutcome::Announced(_)) => stats.announced += 1,
                Ok(DeterminationOutcome::AlreadySettled(_)) => stats.skipped += 1,
                Err(e) => {
                    stats.failures += 1;
                    tracing::error!(
                        league_id = %league_id,
                        error = %e,
                        "winner announcement failed for league"
                    );
                }
            }
        }

        tracing::info!(
            announced = stats.announced,
            skipped = stats.skipped,
            failures = stats.failures,
            "scheduled winner announcement complete"
        );
        Ok(stats)
    }

    /// Spawn the annual loop.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = Self::next_occurrence(now, self.month, self.day, self.hour)
                else {
                    tracing::error!(
                        month = self.month,
                        day = self.day,
                        "announcement date does not exist, retrying in a day"
                    );
                    tokio::time::sleep(Duration::from_secs(86_400)).await;
                    continue;
                };

                let wait = next.signed_duration_since(now);
                tracing::info!(next = %next, "next winner announcement scheduled");
                tokio::time::sleep(Duration::from_secs(wait.num_seconds().max(0) as u64)).await;

                if let Err(e) = self.run_all().await {
                    tracing::error!(error = %e, "scheduled announcement run failed");
                }
            }
        })
    }
}
