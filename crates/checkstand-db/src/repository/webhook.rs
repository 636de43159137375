//! # Webhook Event Ledger
//!
//! At-most-once side effects for at-least-once deliveries.
//!
//! ## Claim Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  claim(provider, event_id)                                              │
//! │                                                                         │
//! │  INSERT .. ON CONFLICT (provider, external_event_id) DO NOTHING         │
//! │       │                                                                 │
//! │       ├── 1 row  ─────────────────────────────► Claimed (first sight)  │
//! │       │                                                                 │
//! │       ▼ 0 rows (seen before)                                            │
//! │  UPDATE .. SET claimed_at = now                                         │
//! │  WHERE processed = 0                                                    │
//! │    AND (claimed_at IS NULL OR claimed_at < now - lease)                 │
//! │       │                                                                 │
//! │       ├── 1 row  ─────────────────────────────► Claimed (retry)        │
//! │       │                                                                 │
//! │       ▼ 0 rows                                                          │
//! │  processed = 1 ? ──► AlreadyProcessed (2xx, no side effect)             │
//! │                 └──► InFlight         (another delivery holds it)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both steps are single statements, so two concurrent deliveries of the
//! same event can never both come away with `Claimed`. A holder that
//! crashes without releasing loses the claim after the lease expires.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::retry::{with_retry, RetryPolicy};
use checkstand_core::PaymentProvider;

/// Result of trying to claim an event for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This delivery owns the event. `attempts` counts deliveries that
    /// claimed it, including this one.
    Claimed { attempts: i64 },
    /// Side effects already applied; acknowledge without doing anything.
    AlreadyProcessed,
    /// Another delivery holds a live claim; ask the provider to retry.
    InFlight,
}

/// A ledger row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WebhookEvent {
    pub id: String,
    pub provider: PaymentProvider,
    pub external_event_id: String,
    pub event_type: String,
    pub payload: String,
    pub processed: bool,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Repository for the webhook idempotency ledger.
#[derive(Debug, Clone)]
pub struct WebhookEventRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl WebhookEventRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        WebhookEventRepository { pool, retry }
    }

    /// Atomically claims an event. See the module docs for the protocol.
    ///
    /// `lease` bounds how long an unreleased claim blocks redelivery.
    pub async fn claim(
        &self,
        provider: PaymentProvider,
        event_id: &str,
        event_type: &str,
        payload: &str,
        lease: Duration,
    ) -> DbResult<ClaimOutcome> {
        let outcome = with_retry(&self.retry, "claim_webhook_event", || {
            self.claim_once(provider, event_id, event_type, payload, lease)
        })
        .await?;

        debug!(provider = %provider, event_id, ?outcome, "Webhook event claim");
        Ok(outcome)
    }

    async fn claim_once(
        &self,
        provider: PaymentProvider,
        event_id: &str,
        event_type: &str,
        payload: &str,
        lease: Duration,
    ) -> DbResult<ClaimOutcome> {
        let now = Utc::now();

        let inserted = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id, provider, external_event_id, event_type, payload,
                processed, attempts, received_at, claimed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, ?6, ?6)
            ON CONFLICT (provider, external_event_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(provider)
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed { attempts: 1 });
        }

        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| DbError::Internal(format!("invalid claim lease: {}", e)))?;
        let expired_before = now - lease;

        let reclaimed: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE webhook_events
            SET claimed_at = ?3, attempts = attempts + 1
            WHERE provider = ?1 AND external_event_id = ?2
              AND processed = 0
              AND (claimed_at IS NULL OR claimed_at < ?4)
            RETURNING attempts
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .bind(now)
        .bind(expired_before)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(attempts) = reclaimed {
            if attempts > 1 {
                debug!(provider = %provider, event_id, attempts, "Reclaimed webhook event");
            }
            return Ok(ClaimOutcome::Claimed { attempts });
        }

        let processed: Option<bool> = sqlx::query_scalar(
            "SELECT processed FROM webhook_events WHERE provider = ?1 AND external_event_id = ?2",
        )
        .bind(provider)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        match processed {
            Some(true) => Ok(ClaimOutcome::AlreadyProcessed),
            Some(false) => Ok(ClaimOutcome::InFlight),
            None => Err(DbError::not_found("WebhookEvent", event_id)),
        }
    }

    /// Marks a claimed event as done. Call only after the order write
    /// committed.
    pub async fn mark_processed(&self, provider: PaymentProvider, event_id: &str) -> DbResult<()> {
        let affected = with_retry(&self.retry, "mark_webhook_processed", || async move {
            let result = sqlx::query(
                r#"
                UPDATE webhook_events
                SET processed = 1, processed_at = ?3, last_error = NULL
                WHERE provider = ?1 AND external_event_id = ?2
                "#,
            )
            .bind(provider)
            .bind(event_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
            Ok::<_, DbError>(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            return Err(DbError::not_found("WebhookEvent", event_id));
        }

        Ok(())
    }

    /// Gives up a claim after a failed attempt so the next delivery can
    /// retry immediately instead of waiting out the lease.
    pub async fn release(&self, provider: PaymentProvider, event_id: &str, error: &str) -> DbResult<()> {
        warn!(provider = %provider, event_id, error, "Releasing webhook event claim");

        with_retry(&self.retry, "release_webhook_event", || async move {
            sqlx::query(
                r#"
                UPDATE webhook_events
                SET claimed_at = NULL, last_error = ?3
                WHERE provider = ?1 AND external_event_id = ?2 AND processed = 0
                "#,
            )
            .bind(provider)
            .bind(event_id)
            .bind(error)
            .execute(&self.pool)
            .await?;
            Ok::<_, DbError>(())
        })
        .await
    }

    /// Gets a ledger row.
    pub async fn get(&self, provider: PaymentProvider, event_id: &str) -> DbResult<Option<WebhookEvent>> {
        let event = sqlx::query_as::<_, WebhookEvent>(
            r#"
            SELECT id, provider, external_event_id, event_type, payload, processed,
                   attempts, last_error, received_at, claimed_at, processed_at
            FROM webhook_events
            WHERE provider = ?1 AND external_event_id = ?2
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    const LEASE: Duration = Duration::from_secs(60);

    async fn ledger() -> WebhookEventRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().webhook_events()
    }

    async fn claim(repo: &WebhookEventRepository, event_id: &str, lease: Duration) -> ClaimOutcome {
        repo.claim(PaymentProvider::Stripe, event_id, "payment_intent.succeeded", "{}", lease)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_claim_wins_second_is_in_flight() {
        let repo = ledger().await;

        assert_eq!(claim(&repo, "evt_1", LEASE).await, ClaimOutcome::Claimed { attempts: 1 });
        assert_eq!(claim(&repo, "evt_1", LEASE).await, ClaimOutcome::InFlight);
    }

    #[tokio::test]
    async fn test_processed_event_is_not_reclaimed() {
        let repo = ledger().await;

        claim(&repo, "evt_1", LEASE).await;
        repo.mark_processed(PaymentProvider::Stripe, "evt_1").await.unwrap();

        assert_eq!(claim(&repo, "evt_1", LEASE).await, ClaimOutcome::AlreadyProcessed);
        // Even with an expired lease
        assert_eq!(claim(&repo, "evt_1", Duration::ZERO).await, ClaimOutcome::AlreadyProcessed);

        let row = repo.get(PaymentProvider::Stripe, "evt_1").await.unwrap().unwrap();
        assert!(row.processed);
        assert!(row.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_released_claim_can_be_retried() {
        let repo = ledger().await;

        claim(&repo, "evt_1", LEASE).await;
        repo.release(PaymentProvider::Stripe, "evt_1", "database is locked")
            .await
            .unwrap();

        assert_eq!(claim(&repo, "evt_1", LEASE).await, ClaimOutcome::Claimed { attempts: 2 });

        let row = repo.get(PaymentProvider::Stripe, "evt_1").await.unwrap().unwrap();
        assert_eq!(row.last_error.as_deref(), Some("database is locked"));
        assert!(!row.processed);
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimed() {
        let repo = ledger().await;

        claim(&repo, "evt_1", LEASE).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(
            claim(&repo, "evt_1", Duration::from_millis(1)).await,
            ClaimOutcome::Claimed { attempts: 2 }
        );
    }

    #[tokio::test]
    async fn test_event_ids_are_scoped_per_provider() {
        let repo = ledger().await;

        claim(&repo, "shared-id", LEASE).await;
        let outcome = repo
            .claim(PaymentProvider::Paypal, "shared-id", "PAYMENT.CAPTURE.COMPLETED", "{}", LEASE)
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::Claimed { attempts: 1 });
    }
}
