// ============================================================================
// Transaction Module
// ============================================================================
//
// Client-side optimistic transactions against the remote database:
//
// - backoff:     delay curve between attempts
// - write_batch: ordered buffer of pending writes
// - read_args:   `get_all` argument parsing
// - session:     one attempt's handle, read gate and begin/commit/rollback
// - runner:      bounded retry loop around the user's work function
//
// ============================================================================

pub mod backoff;
pub mod read_args;
pub mod runner;
pub mod session;
pub mod write_batch;

pub use backoff::{Backoff, ExponentialBackoff};
pub use read_args::{GetAllArg, ParsedGetAll, ReadOptions, parse_get_all_args};
pub use runner::{AttemptOutcome, RetryDecision, TransactionOptions, TransactionRunner, classify};
pub use session::{AttemptState, ReadTarget, Transaction};
pub use write_batch::{SetOptions, WriteBatch};
