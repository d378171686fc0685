// ============================================================================
// Transaction Session
// ============================================================================
//
// One `Transaction` value exists per attempt. It owns the server-issued
// handle for that attempt and the writes buffered so far, and it is the
// handle user code receives inside `run_transaction`.
//
// State transitions:
//
//   Idle ──begin──> Begun ──commit──> Committed
//                     │
//                     └──rollback──> RolledBack
//
// Reads are gated: once a write is buffered, every read fails with
// `OrderingViolation` before any RPC is issued.
//
// ============================================================================

use super::read_args::{GetAllArg, ReadOptions, parse_get_all_args};
use super::write_batch::{SetOptions, WriteBatch};
use crate::connection::Connection;
use crate::core::{
    Code, DocumentData, DocumentReference, DocumentSnapshot, Error, FieldPath, Precondition,
    Query, QuerySnapshot, RequestTag, Result, Status, TransactionId, Value,
};
use crate::rpc::CommitResponse;
use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Lifecycle of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Begun,
    Committed,
    RolledBack,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Committed | AttemptState::RolledBack)
    }
}

#[derive(Debug)]
struct AttemptInner {
    transaction_id: Option<TransactionId>,
    writes: WriteBatch,
    state: AttemptState,
}

/// Something a transaction can read: a single document or a query
///
/// Lets `Transaction::get` accept either shape while keeping the snapshot
/// type precise.
#[async_trait]
pub trait ReadTarget: Send + Sync {
    type Snapshot: Send;

    async fn read_in(
        &self,
        connection: &Connection,
        transaction: Option<&TransactionId>,
    ) -> Result<Self::Snapshot>;
}

#[async_trait]
impl ReadTarget for DocumentReference {
    type Snapshot = DocumentSnapshot;

    async fn read_in(
        &self,
        connection: &Connection,
        transaction: Option<&TransactionId>,
    ) -> Result<DocumentSnapshot> {
        connection
            .batch_get(vec![self.clone()], None, transaction)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::Rpc(Status::new(
                    Code::Internal,
                    format!("BatchGetDocuments returned no result for {}", self),
                ))
            })
    }
}

#[async_trait]
impl ReadTarget for Query {
    type Snapshot = QuerySnapshot;

    async fn read_in(
        &self,
        connection: &Connection,
        transaction: Option<&TransactionId>,
    ) -> Result<QuerySnapshot> {
        connection.run_query(self.clone(), transaction).await
    }
}

/// Handle to the current transaction attempt
///
/// Cloning is cheap; clones share the same attempt, so independent reads may
/// run concurrently. A handle must not outlive the work function it was
/// passed to: once its attempt commits or rolls back every operation on it
/// fails.
#[derive(Clone)]
pub struct Transaction {
    connection: Connection,
    request_tag: RequestTag,
    inner: Arc<Mutex<AttemptInner>>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("database", &self.connection.database())
            .field("request_tag", &self.request_tag)
            .field("inner", &self.inner)
            .finish()
    }
}

impl Transaction {
    /// Start a new attempt.
    ///
    /// `retry_of` is the handle of the previous attempt, if any; it is sent as
    /// the retry hint and never reused as this attempt's handle.
    pub async fn begin(
        connection: &Connection,
        request_tag: &RequestTag,
        retry_of: Option<&TransactionId>,
    ) -> Result<Self> {
        let transaction_id = connection.begin_transaction(retry_of).await?;
        Ok(Self {
            connection: connection.clone(),
            request_tag: request_tag.clone(),
            inner: Arc::new(Mutex::new(AttemptInner {
                transaction_id: Some(transaction_id),
                writes: WriteBatch::new(),
                state: AttemptState::Begun,
            })),
        })
    }

    pub fn request_tag(&self) -> &RequestTag {
        &self.request_tag
    }

    pub fn transaction_id(&self) -> Result<Option<TransactionId>> {
        Ok(self.inner.lock()?.transaction_id.clone())
    }

    pub fn state(&self) -> Result<AttemptState> {
        Ok(self.inner.lock()?.state)
    }

    pub fn pending_write_count(&self) -> Result<usize> {
        Ok(self.inner.lock()?.writes.len())
    }

    /// True once a write was buffered; reads are rejected from then on.
    pub fn has_pending_writes(&self) -> Result<bool> {
        Ok(!self.inner.lock()?.writes.is_empty())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Gate every read goes through: runs synchronously, before any await.
    fn read_handle(&self) -> Result<Option<TransactionId>> {
        let inner = self.inner.lock()?;
        ensure_active(inner.state)?;
        if !inner.writes.is_empty() {
            return Err(Error::OrderingViolation);
        }
        Ok(inner.transaction_id.clone())
    }

    /// Read a document or run a query at the transaction's snapshot.
    ///
    /// The read-after-write check happens when `get` is called, not when the
    /// returned future is first polled.
    pub fn get<'a, R: ReadTarget>(
        &'a self,
        target: &'a R,
    ) -> impl Future<Output = Result<R::Snapshot>> + Send + 'a {
        let handle = self.read_handle();
        async move {
            let handle = handle?;
            target.read_in(&self.connection, handle.as_ref()).await
        }
    }

    /// Run a query at the transaction's snapshot.
    pub fn get_query<'a>(
        &'a self,
        query: &'a Query,
    ) -> impl Future<Output = Result<QuerySnapshot>> + Send + 'a {
        self.get(query)
    }

    /// Read several documents at the transaction's snapshot.
    ///
    /// `args` holds one or more document references optionally followed by
    /// `ReadOptions`. Snapshots come back in argument order.
    pub fn get_all(
        &self,
        args: Vec<GetAllArg>,
    ) -> impl Future<Output = Result<Vec<DocumentSnapshot>>> + Send + '_ {
        let prepared = self
            .read_handle()
            .and_then(|handle| Ok((handle, parse_get_all_args(args)?)));
        async move {
            let (handle, parsed) = prepared?;
            self.connection
                .batch_get(parsed.documents, parsed.field_mask, handle.as_ref())
                .await
        }
    }

    /// Typed form of `get_all`.
    pub fn get_all_with(
        &self,
        documents: &[DocumentReference],
        options: Option<ReadOptions>,
    ) -> impl Future<Output = Result<Vec<DocumentSnapshot>>> + Send + '_ {
        let mut args: Vec<GetAllArg> = documents.iter().map(GetAllArg::from).collect();
        args.extend(options.map(GetAllArg::Options));
        self.get_all(args)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    fn with_writes<F>(&self, record: F) -> Result<&Self>
    where
        F: FnOnce(&mut WriteBatch) -> Result<()>,
    {
        let mut inner = self.inner.lock()?;
        ensure_active(inner.state)?;
        record(&mut inner.writes)?;
        Ok(self)
    }

    /// Create a document; the commit fails if it already exists.
    pub fn create(&self, document: &DocumentReference, data: DocumentData) -> Result<&Self> {
        self.with_writes(|writes| {
            writes.create(document, data);
            Ok(())
        })
    }

    /// Overwrite a document.
    pub fn set(&self, document: &DocumentReference, data: DocumentData) -> Result<&Self> {
        self.set_with_options(document, data, SetOptions::default())
    }

    pub fn set_with_options(
        &self,
        document: &DocumentReference,
        data: DocumentData,
        options: SetOptions,
    ) -> Result<&Self> {
        self.with_writes(|writes| {
            writes.set(document, data, options);
            Ok(())
        })
    }

    /// Update fields of an existing document.
    pub fn update(
        &self,
        document: &DocumentReference,
        fields: Vec<(FieldPath, Value)>,
    ) -> Result<&Self> {
        self.update_with_precondition(document, fields, None)
    }

    pub fn update_with_precondition(
        &self,
        document: &DocumentReference,
        fields: Vec<(FieldPath, Value)>,
        precondition: Option<Precondition>,
    ) -> Result<&Self> {
        self.with_writes(|writes| {
            writes.update(document, fields, precondition)?;
            Ok(())
        })
    }

    pub fn delete(&self, document: &DocumentReference) -> Result<&Self> {
        self.delete_with_precondition(document, None)
    }

    pub fn delete_with_precondition(
        &self,
        document: &DocumentReference,
        precondition: Option<Precondition>,
    ) -> Result<&Self> {
        self.with_writes(|writes| {
            writes.delete(document, precondition);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Clear buffered writes, keeping the transaction handle.
    pub fn reset(&self) -> Result<()> {
        self.inner.lock()?.writes.reset();
        Ok(())
    }

    /// Commit every buffered write under this attempt's handle.
    pub async fn commit(&self) -> Result<CommitResponse> {
        let (transaction_id, writes) = {
            let mut inner = self.inner.lock()?;
            ensure_active(inner.state)?;
            (inner.transaction_id.clone(), inner.writes.take_writes())
        };

        let response = self
            .connection
            .commit(transaction_id.as_ref(), writes, &self.request_tag)
            .await?;

        self.inner.lock()?.state = AttemptState::Committed;
        Ok(response)
    }

    /// Release the attempt on the server.
    ///
    /// The attempt is closed locally even when the RPC fails. Without a
    /// handle no RPC is issued.
    pub async fn rollback(&self) -> Result<()> {
        let transaction_id = {
            let mut inner = self.inner.lock()?;
            inner.writes.reset();
            inner.state = AttemptState::RolledBack;
            inner.transaction_id.clone()
        };

        match transaction_id {
            Some(id) => self.connection.rollback(&id).await,
            None => Ok(()),
        }
    }
}

fn ensure_active(state: AttemptState) -> Result<()> {
    if state.is_terminal() {
        return Err(Error::invalid_argument(
            "Transaction attempt is no longer active; use the handle passed to the current attempt.",
        ));
    }
    Ok(())
}
