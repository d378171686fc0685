// ============================================================================
// docdb-client Library
// ============================================================================

pub mod core;
pub mod connection;
pub mod rpc;
pub mod transaction;

// Re-export main types for convenience
pub use crate::core::{
    Code, CollectionReference, DocumentData, DocumentReference, DocumentSnapshot, Error,
    FieldPath, FieldPathInput, Precondition, Query, QuerySnapshot, Result, Status,
    TransactionId, Value,
};
pub use crate::connection::{
    Connection,
    config::{BackoffSettings, ClientConfig},
};
pub use crate::rpc::{DocumentRpc, InMemoryRpc};
pub use crate::transaction::{
    Backoff, ExponentialBackoff, GetAllArg, ReadOptions, SetOptions, Transaction,
    TransactionOptions, TransactionRunner,
};

use crate::transaction::ReadTarget;
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// High-level Client API
// ============================================================================

/// Database client
///
/// Entry point for references, plain reads and retried transactions against
/// one database.
///
/// # Examples
///
/// ```
/// use docdb_client::{Client, ClientConfig, InMemoryRpc, Value};
///
/// # tokio_test::block_on(async {
/// let client = Client::with_rpc(InMemoryRpc::new(), ClientConfig::new("demo"))?;
/// let alice = client.doc("users/alice")?;
///
/// client
///     .run_transaction(|txn| {
///         let alice = alice.clone();
///         async move {
///             let snapshot = txn.get(&alice).await?;
///             if !snapshot.exists() {
///                 txn.create(&alice, [("visits".to_string(), Value::Integer(1))].into())?;
///             }
///             Ok(())
///         }
///     })
///     .await?;
///
/// assert!(client.get(&alice).await?.exists());
/// # Ok::<(), docdb_client::Error>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct Client {
    connection: Connection,
    config: ClientConfig,
}

impl Client {
    /// Create a client over an RPC backend
    pub fn new(rpc: Arc<dyn DocumentRpc>, config: ClientConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidArgument)?;
        let connection = Connection::new(rpc, config.database_name());
        Ok(Self { connection, config })
    }

    /// Create a client over an owned RPC backend
    pub fn with_rpc(rpc: impl DocumentRpc + 'static, config: ClientConfig) -> Result<Self> {
        Self::new(Arc::new(rpc), config)
    }

    /// Create a client from a database resource name
    ///
    /// Format: "projects/{project_id}/databases/{database_id}"
    pub fn connect_database(rpc: Arc<dyn DocumentRpc>, database_name: &str) -> Result<Self> {
        let config = ClientConfig::from_database_name(database_name).map_err(Error::InvalidArgument)?;
        Self::new(rpc, config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Reference a document by relative path, e.g. `users/alice`
    pub fn doc(&self, path: &str) -> Result<DocumentReference> {
        DocumentReference::new(path)
    }

    /// Reference a collection by relative path, e.g. `users`
    pub fn collection(&self, path: &str) -> Result<CollectionReference> {
        CollectionReference::new(path)
    }

    /// Read a document outside of any transaction
    pub async fn get(&self, document: &DocumentReference) -> Result<DocumentSnapshot> {
        document.read_in(&self.connection, None).await
    }

    /// Run `work` as a transaction with the configured defaults
    ///
    /// See [`TransactionRunner::run`] for the retry semantics.
    pub async fn run_transaction<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_transaction_with(TransactionOptions::default(), work)
            .await
    }

    /// Run `work` as a transaction, overriding defaults with `options`
    pub async fn run_transaction_with<T, F, Fut>(
        &self,
        options: TransactionOptions,
        work: F,
    ) -> Result<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.runner(&options).run(work).await
    }

    /// Build the runner `run_transaction_with` uses for `options`
    pub fn runner(&self, options: &TransactionOptions) -> TransactionRunner {
        TransactionRunner::new(self.connection.clone())
            .max_attempts(options.max_attempts.unwrap_or(self.config.max_attempts))
            .backoff(ExponentialBackoff::new(self.config.backoff.clone()))
    }
}
