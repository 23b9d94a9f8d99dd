use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::types::RankedScore;

/// Read side of the external scoring collaborator.
///
/// The score tables are owned and written by the scoring service; this crate
/// only ever reads them.
#[async_trait]
pub trait ScoreSource: Send + Sync {
    /// Latest ranked scores for a league, highest first. An empty list means
    /// "league has no scores yet", which is distinct from "league not found".
    async fn ranked_scores(&self, league_id: Uuid) -> Result<Vec<RankedScore>>;

    /// Leagues eligible for the scheduled settlement run.
    async fn active_leagues(&self) -> Result<Vec<Uuid>>;
}

pub struct DbScoreSource {
    pool: PgPool,
}

impl DbScoreSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreSource for DbScoreSource {
    async fn ranked_scores(&self, league_id: Uuid) -> Result<Vec<RankedScore>> {
        // calculated_at ASC inside each score group keeps ties in insertion
        // order, which winner determination relies on.
        let scores = sqlx::query_as::<_, RankedScoreRow>(
            r#"
            SELECT user_id, payout_address, total_score
            FROM league_scores
            WHERE league_id = $1
            ORDER BY total_score DESC, calculated_at ASC
            "#,
        )
        .bind(league_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(scores.into_iter().map(Into::into).collect())
    }

    async fn active_leagues(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM leagues
            WHERE status = 'ACTIVE'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[derive(sqlx::FromRow)]
struct RankedScoreRow {
    user_id: Uuid,
    payout_address: String,
    total_score: f64,
}

impl From<RankedScoreRow> for RankedScore {
    fn from(row: RankedScoreRow) -> Self {
        RankedScore {
            user_id: row.user_id,
            payout_address: row.payout_address,
            total_score: row.total_score,
        }
    }
}
