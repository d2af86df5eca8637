//! Webhook delivery worker.
//!
//! A single background loop polls the queue at 1 Hz, POSTs due deliveries
//! through a transport port, and records the outcome: delivered on 2xx,
//! retry with exponential backoff otherwise, dead-lettered once the attempt
//! cap is reached. Each attempt is bounded by the transport timeout and each
//! poll iteration by [`POLL_DEADLINE`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::ports::{DispatchStore, StoreError};
use crate::models::{AttemptFailure, WebhookDelivery};
use crate::webhooks::signature;

/// Queue poll cadence.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound for one poll iteration.
const POLL_DEADLINE: Duration = Duration::from_secs(10);
/// Per-request timeout for outbound POSTs.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default attempt cap before dead-lettering.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Deliveries fetched per poll.
const BATCH_SIZE: usize = 50;

/// Exponential backoff: `min(1h, 2^clamp(attempts, 0, 10))` seconds.
pub fn backoff(attempts: u32) -> Duration {
    let exponent = attempts.min(10);
    Duration::from_secs((1u64 << exponent).min(3600))
}

/// Outcome of one POST attempt.
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub response_code: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl DeliveryAttempt {
    /// A 2xx response within the timeout.
    pub fn succeeded(&self) -> bool {
        self.response_code
            .is_some_and(|code| (200..300).contains(&code))
    }
}

/// Transport port for delivery attempts, so tests can script outcomes.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn post(&self, delivery: &WebhookDelivery) -> DeliveryAttempt;
}

/// Reqwest-backed transport. Owns request shaping only: JSON content type,
/// event-type header and, when a secret exists, the HMAC signature header.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn post(&self, delivery: &WebhookDelivery) -> DeliveryAttempt {
        let mut request = self
            .client
            .post(&delivery.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-Event-Type", delivery.event_type.as_str())
            .body(delivery.payload.clone());
        if let Some(secret) = delivery.secret.as_deref() {
            if !secret.is_empty() {
                request = request.header("X-Signature", signature::sign(secret, &delivery.payload));
            }
        }

        let started = Instant::now();
        let outcome = request.send().await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(response) => DeliveryAttempt {
                response_code: Some(response.status().as_u16()),
                error: None,
                latency_ms,
            },
            Err(error) => DeliveryAttempt {
                response_code: None,
                error: Some(error.to_string()),
                latency_ms,
            },
        }
    }
}

/// Background delivery loop.
pub struct WebhookWorker {
    store: Arc<dyn DispatchStore>,
    transport: Arc<dyn DeliveryTransport>,
    max_attempts: u32,
    batch_size: usize,
}

impl WebhookWorker {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        transport: Arc<dyn DeliveryTransport>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            transport,
            max_attempts: max_attempts.max(1),
            batch_size: BATCH_SIZE,
        }
    }

    /// Run until the cancellation token fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        info!(max_attempts = self.max_attempts, "webhook worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("webhook worker stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match tokio::time::timeout(POLL_DEADLINE, self.process_once()).await {
                        Ok(Err(error)) => warn!(%error, "webhook poll failed"),
                        Err(_) => warn!("webhook poll exceeded its deadline"),
                        Ok(Ok(())) => {}
                    }
                }
            }
        }
    }

    /// One poll iteration: fetch due deliveries and attempt each in turn.
    pub async fn process_once(&self) -> Result<(), StoreError> {
        let due = self
            .store
            .due_deliveries(Utc::now(), self.batch_size)
            .await?;
        for delivery in due {
            self.attempt(&delivery).await?;
        }
        Ok(())
    }

    async fn attempt(&self, delivery: &WebhookDelivery) -> Result<(), StoreError> {
        let attempt = self.transport.post(delivery).await;
        if attempt.succeeded() {
            let code = attempt.response_code.unwrap_or_default();
            debug!(id = %delivery.id, code, latency_ms = attempt.latency_ms, "delivered");
            return self
                .store
                .mark_delivered(&delivery.id, code, attempt.latency_ms)
                .await;
        }

        let failure = AttemptFailure {
            last_error: attempt.error.clone(),
            response_code: attempt.response_code,
            latency_ms: attempt.latency_ms,
        };
        let attempts_after = delivery.attempts + 1;
        if attempts_after >= self.max_attempts {
            warn!(id = %delivery.id, attempts = attempts_after, "delivery dead-lettered");
            return self.store.fail_delivery(&delivery.id, failure).await;
        }
        let next_attempt_at = Utc::now()
            + chrono::Duration::from_std(backoff(attempts_after))
                .unwrap_or_else(|_| chrono::Duration::zero());
        debug!(
            id = %delivery.id,
            attempts = attempts_after,
            next_attempt_at = %next_attempt_at,
            "delivery scheduled for retry"
        );
        self.store
            .mark_retry(&delivery.id, next_attempt_at, failure)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(3, 8)]
    #[case(10, 1024)]
    #[case(30, 1024)]
    fn backoff_doubles_and_clamps(#[case] attempts: u32, #[case] expected_secs: u64) {
        assert_eq!(backoff(attempts), Duration::from_secs(expected_secs));
    }

    #[rstest]
    #[case(Some(200), true)]
    #[case(Some(204), true)]
    #[case(Some(299), true)]
    #[case(Some(300), false)]
    #[case(Some(500), false)]
    #[case(None, false)]
    fn success_is_any_2xx(#[case] code: Option<u16>, #[case] expected: bool) {
        let attempt = DeliveryAttempt {
            response_code: code,
            error: None,
            latency_ms: 1,
        };
        assert_eq!(attempt.succeeded(), expected);
    }
}
