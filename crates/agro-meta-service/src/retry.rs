//! Transaction runner: bounded retries with exponential back-off and an
//! overall deadline per operation.
//!
//! Only `CONFLICT` and `TOO_OLD` are retried, since the substrate guarantees
//! such a transaction was not applied. `MAYBE_COMMITTED` is surfaced as is.
//! A deadline that expires while the body runs fails cleanly with
//! `OPERATION_TIMEOUT`; one that expires during commit leaves the outcome
//! unknown and is reported as `MAYBE_COMMITTED`.

use std::future::Future;
use std::time::Duration;

use agro_kv::{KvEngine, ReadWriteTransaction};
use agro_types::{make_error_msg, MetaCode, Result, Status, TransactionCode};
use rand::Rng;
use tokio::time::{timeout_at, Instant};

use crate::config::MetadataConfig;

/// Tracks exponential back-off state for a sequence of retries.
///
/// Each call to `next_wait` doubles the wait time (capped at `max_wait`)
/// and returns `None` once `max_attempts` waits have been handed out.
#[derive(Debug)]
pub struct ExponentialBackoff {
    max_wait: Duration,
    max_attempts: u32,
    current_wait: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(init_wait: Duration, max_wait: Duration, max_attempts: u32) -> Self {
        Self {
            max_wait,
            max_attempts,
            current_wait: init_wait,
            attempts: 0,
        }
    }

    pub fn from_config(config: &MetadataConfig) -> Self {
        Self::new(
            config.retry_init_wait(),
            config.retry_max_wait(),
            config.max_retries,
        )
    }

    /// Return the next wait duration, or `None` if no retries are left.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let wait = self.current_wait;
        self.current_wait = (self.current_wait * 2).min(self.max_wait);
        self.attempts += 1;
        Some(wait)
    }

    /// Like `next_wait`, with up to 50% random jitter added so that
    /// conflicting writers spread out.
    pub fn next_wait_jittered(&mut self) -> Option<Duration> {
        let wait = self.next_wait()?;
        let jitter_ms = wait.as_millis() as u64 / 2;
        if jitter_ms == 0 {
            return Some(wait);
        }
        Some(wait + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms)))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

fn is_retryable_conflict(status: &Status) -> bool {
    matches!(
        status.code(),
        TransactionCode::CONFLICT | TransactionCode::TOO_OLD
    )
}

fn timed_out(op: &str) -> Status {
    Status::with_message(
        MetaCode::OPERATION_TIMEOUT,
        format!("{}: operation timed out", op),
    )
}

/// Run `body` in a fresh read-write transaction, commit it, and retry on
/// conflicts. `body` stages its writes and hands the transaction back
/// together with its result; it is invoked once per attempt.
pub async fn run_readwrite<E, F, Fut, T>(
    engine: &E,
    config: &MetadataConfig,
    op: &'static str,
    mut body: F,
) -> Result<T>
where
    E: KvEngine,
    F: FnMut(E::RwTxn) -> Fut,
    Fut: Future<Output = Result<(E::RwTxn, T)>>,
{
    let deadline = Instant::now() + config.operation_timeout();
    let mut backoff = ExponentialBackoff::from_config(config);

    loop {
        let txn = engine.create_readwrite_transaction();
        let staged = timeout_at(deadline, body(txn))
            .await
            .map_err(|_| timed_out(op))?;

        let err = match staged {
            Ok((mut txn, value)) => match timeout_at(deadline, txn.commit()).await {
                Ok(Ok(())) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => Status::with_message(
                    TransactionCode::MAYBE_COMMITTED,
                    format!("{}: timed out during commit", op),
                ),
            },
            Err(e) => e,
        };

        if err.code() == TransactionCode::MAYBE_COMMITTED {
            tracing::warn!(op, error = %err, "commit outcome unknown");
            return Err(err);
        }
        if !is_retryable_conflict(&err) {
            return Err(err);
        }

        let Some(wait) = backoff.next_wait_jittered() else {
            tracing::warn!(op, attempts = backoff.attempts(), "giving up after conflicts");
            return Err(err);
        };
        if Instant::now() + wait >= deadline {
            return Err(timed_out(op));
        }
        tracing::debug!(op, attempt = backoff.attempts(), ?wait, "retrying after conflict");
        tokio::time::sleep(wait).await;
    }
}

/// Run a read-only body under the operation deadline.
pub async fn run_readonly<E, F, Fut, T>(
    engine: &E,
    config: &MetadataConfig,
    op: &'static str,
    body: F,
) -> Result<T>
where
    E: KvEngine,
    F: FnOnce(E::RoTxn) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let txn = engine.create_readonly_transaction();
    match timeout_at(Instant::now() + config.operation_timeout(), body(txn)).await {
        Ok(result) => result,
        Err(_) => make_error_msg(MetaCode::OPERATION_TIMEOUT, format!("{}: operation timed out", op)),
    }
}
