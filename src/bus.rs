use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::types::AnnouncementEvent;

/// At-least-once publication of announcement events, keyed by league so all
/// events for one league stay ordered relative to each other.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, event: &AnnouncementEvent) -> Result<()>;
}

/// One undelivered announcement, as drained by the consumer.
#[derive(Debug)]
pub struct OutboxJob {
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub retries: i32,
}

/// Drain side of the outbox: fetch undelivered jobs and settle their fate.
#[async_trait]
pub trait OutboxQueue: Send + Sync {
    /// Oldest undelivered events, in publication order.
    async fn fetch_batch(&self, limit: i64) -> Result<Vec<OutboxJob>>;

    async fn mark_sent(&self, job_id: Uuid) -> Result<()>;

    /// A payload that can never be delivered (e.g. does not deserialize).
    async fn mark_undeliverable(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Transient delivery failure. The row stays queued for redelivery until
    /// the retries run out.
    async fn record_delivery_failure(&self, job_id: Uuid, retries: i32, error: &str)
        -> Result<()>;
}

pub const MAX_DELIVERY_RETRIES: i32 = 5;

/// Transactional-outbox bus: publishing is a durable insert, delivery is a
/// separate drain. Rows are consumed in `created_at` order, which preserves
/// per-league ordering.
pub struct OutboxBus {
    pool: PgPool,
}

impl OutboxBus {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxQueue for OutboxBus {
    async fn fetch_batch(&self, limit: i64) -> Result<Vec<OutboxJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, retries
            FROM announcement_outbox
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OutboxJob {
                id: row.get("id"),
                payload: row.get("payload"),
                retries: row.get("retries"),
            })
            .collect())
    }

    async fn mark_sent(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE announcement_outbox
            SET status = 'SENT',
                last_error = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_undeliverable(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE announcement_outbox
            SET status = 'FAILED',
                last_error = $1,
                updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_delivery_failure(
        &self,
        job_id: Uuid,
        retries: i32,
        error: &str,
    ) -> Result<()> {
        let next_retries = retries + 1;
        let next_status = if next_retries > MAX_DELIVERY_RETRIES {
            "FAILED"
        } else {
            "PENDING"
        };

        sqlx::query(
            r#"
            UPDATE announcement_outbox
            SET retries = $1,
                last_error = $2,
                status = $3,
                updated_at = now()
            WHERE id = $4
            "#,
        )
        .bind(next_retries)
        .bind(error)
        .bind(next_status)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBus for OutboxBus {
    async fn publish(&self, topic: &str, event: &AnnouncementEvent) -> Result<()> {
        let payload = serde_json::to_value(event)?;

        sqlx::query(
            r#"
            INSERT INTO announcement_outbox
            (id, topic, league_id, payload, status, retries, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'PENDING', 0, now(), now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(topic)
        .bind(event.league_id)
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            topic,
            league_id = %event.league_id,
            event_type = %event.event_type,
            "published announcement event"
        );
        Ok(())
    }
}
