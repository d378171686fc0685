// ============================================================================
// Transaction Runner
// ============================================================================
//
// Drives the user's work function through bounded optimistic retries:
//
//   for each attempt:
//     backoff (not before the first attempt)
//     begin (previous handle as retry hint)   -- failure propagates as-is
//     work(txn) -> commit
//     on failure: rollback, then retry or fail depending on the status code
//
// Attempts never overlap: attempt i+1 starts only after attempt i has been
// rolled back.
//
// ============================================================================

use super::backoff::{Backoff, ExponentialBackoff};
use super::session::Transaction;
use crate::connection::Connection;
use crate::connection::config::DEFAULT_MAX_TRANSACTION_ATTEMPTS;
use crate::core::{Code, Error, RequestTag, Result, TransactionId};
use log::{debug, warn};
use std::future::Future;
use tracing::{Instrument, info_span};

/// Per-call transaction options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Overrides the client's default number of attempts
    pub max_attempts: Option<usize>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// How one attempt ended
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Committed(T),
    /// Either the work function or the commit failed
    Failed(Error),
}

/// What the runner does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Fail,
}

/// Decide whether a failed attempt is worth re-running.
pub fn classify(error: &Error) -> RetryDecision {
    if error.is_retryable() {
        RetryDecision::Retry
    } else {
        RetryDecision::Fail
    }
}

/// Bookkeeping for one `run` call
#[derive(Debug)]
struct AttemptRecord {
    index: usize,
    max_attempts: usize,
    last_error: Option<Error>,
}

impl AttemptRecord {
    fn new(max_attempts: usize) -> Self {
        Self {
            index: 0,
            max_attempts,
            last_error: None,
        }
    }

    fn has_attempts_left(&self) -> bool {
        self.index < self.max_attempts
    }
}

/// Runs a unit of work as a retried transaction
///
/// # Examples
///
/// ```
/// use docdb_client::{Connection, DocumentReference, InMemoryRpc, TransactionRunner};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> docdb_client::Result<()> {
/// let rpc = InMemoryRpc::new();
/// let connection = Connection::new(Arc::new(rpc), "projects/demo/databases/(default)");
/// let counter = DocumentReference::new("counters/visits")?;
///
/// let existed = TransactionRunner::new(connection)
///     .max_attempts(3)
///     .run(|txn| {
///         let counter = counter.clone();
///         async move {
///             let snapshot = txn.get(&counter).await?;
///             txn.set(&counter, Default::default())?;
///             Ok(snapshot.exists())
///         }
///     })
///     .await?;
/// assert!(!existed);
/// # Ok(())
/// # }
/// ```
///
/// The work function has to return a future; a plain value is rejected at
/// compile time:
///
/// ```compile_fail
/// use docdb_client::{Connection, InMemoryRpc, TransactionRunner};
/// use std::sync::Arc;
///
/// # async fn demo() {
/// let connection = Connection::new(Arc::new(InMemoryRpc::new()), "projects/p/databases/d");
/// let _ = TransactionRunner::new(connection)
///     .run(|_txn| Ok::<_, docdb_client::Error>(42))
///     .await;
/// # }
/// ```
pub struct TransactionRunner {
    connection: Connection,
    max_attempts: usize,
    backoff: Box<dyn Backoff>,
}

impl TransactionRunner {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            max_attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS,
            backoff: Box::new(ExponentialBackoff::default()),
        }
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    /// Run `work` until it commits, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// Returns the work function's value from the committed attempt, or the
    /// error that ended the run. After exhaustion that is the last retryable
    /// error.
    pub async fn run<T, F, Fut>(mut self, work: F) -> Result<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.max_attempts == 0 {
            return Err(Error::invalid_argument(format!(
                "Value for argument \"maxAttempts\" must be within [1, Infinity] inclusive, but was: {}",
                self.max_attempts
            )));
        }

        let request_tag = RequestTag::generate();
        let span = info_span!(
            "run_transaction",
            request_tag = %request_tag,
            max_attempts = self.max_attempts
        );
        self.run_attempts(&request_tag, work).instrument(span).await
    }

    async fn run_attempts<T, F, Fut>(&mut self, request_tag: &RequestTag, mut work: F) -> Result<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut record = AttemptRecord::new(self.max_attempts);
        let mut previous: Option<TransactionId> = None;

        while record.has_attempts_left() {
            if let Some(last_error) = &record.last_error {
                self.wait_before_retry(request_tag, &record, last_error).await;
            }
            record.index += 1;

            let txn = Transaction::begin(&self.connection, request_tag, previous.as_ref()).await?;
            previous = txn.transaction_id()?;

            let error = match attempt(&txn, &mut work).await {
                AttemptOutcome::Committed(value) => {
                    debug!(
                        "[{}] Transaction committed on attempt {} of {}",
                        request_tag, record.index, record.max_attempts
                    );
                    return Ok(value);
                }
                AttemptOutcome::Failed(error) => error,
            };

            debug!(
                "[{}] Rolling back transaction after error: {}",
                request_tag, error
            );
            if let Err(rollback_error) = txn.rollback().await {
                warn!(
                    "[{}] Rollback failed (ignored, original error kept): {}",
                    request_tag, rollback_error
                );
            }

            match classify(&error) {
                RetryDecision::Retry => record.last_error = Some(error),
                RetryDecision::Fail => return Err(error),
            }
        }

        match record.last_error {
            Some(error) => Err(error),
            None => Err(Error::invalid_argument(
                "Transaction ran no attempts; maxAttempts must be at least 1",
            )),
        }
    }

    async fn wait_before_retry(
        &mut self,
        request_tag: &RequestTag,
        record: &AttemptRecord,
        last_error: &Error,
    ) {
        if last_error.code() == Some(Code::ResourceExhausted) {
            self.backoff.reset_to_max();
        }
        let waited = self.backoff.backoff_and_wait().await;
        warn!(
            "[{}] Transaction retry after error (attempt {} of {}): {} (backoff={}ms)",
            request_tag,
            record.index + 1,
            record.max_attempts,
            last_error,
            waited.as_millis()
        );
    }
}

/// Run the work function, then commit.
async fn attempt<T, F, Fut>(txn: &Transaction, work: &mut F) -> AttemptOutcome<T>
where
    F: FnMut(Transaction) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let value = match work(txn.clone()).await {
        Ok(value) => value,
        Err(error) => return AttemptOutcome::Failed(error),
    };

    match txn.commit().await {
        Ok(_) => AttemptOutcome::Committed(value),
        Err(error) => AttemptOutcome::Failed(error),
    }
}
