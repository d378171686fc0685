// ============================================================================
// In-Memory RPC Backend
// ============================================================================
//
// Process-local stand-in for the remote database. Issues transaction handles,
// applies committed writes atomically and serves reads, while recording every
// request so callers can assert on exactly which RPCs a transaction issued.
//
// No concurrency control is performed: the backend never aborts a
// transaction on its own. Failures are scripted per method with `fail_next`.
//
// ============================================================================

use super::{
    BatchGetDocumentsRequest, BeginTransactionRequest, BeginTransactionResponse, CommitRequest,
    CommitResponse, DocumentRpc, RollbackRequest, RpcResult, RunQueryRequest, Write,
    WriteOperation,
};
use crate::core::{
    Code, DocumentData, DocumentReference, DocumentSnapshot, FieldPath, Precondition,
    QuerySnapshot, Status, TransactionId, Value, WriteResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// RPC method selector used for failure scripting and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    BeginTransaction,
    Commit,
    Rollback,
    BatchGetDocuments,
    RunQuery,
}

/// One recorded request
#[derive(Debug, Clone, PartialEq)]
pub enum RpcCall {
    BeginTransaction(BeginTransactionRequest),
    Commit(CommitRequest),
    Rollback(RollbackRequest),
    BatchGetDocuments(BatchGetDocumentsRequest),
    RunQuery(RunQueryRequest),
}

impl RpcCall {
    pub fn method(&self) -> RpcMethod {
        match self {
            Self::BeginTransaction(_) => RpcMethod::BeginTransaction,
            Self::Commit(_) => RpcMethod::Commit,
            Self::Rollback(_) => RpcMethod::Rollback,
            Self::BatchGetDocuments(_) => RpcMethod::BatchGetDocuments,
            Self::RunQuery(_) => RpcMethod::RunQuery,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    data: DocumentData,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    documents: BTreeMap<DocumentReference, StoredDocument>,
    active_transactions: HashSet<TransactionId>,
    next_transaction: u64,
    calls: Vec<RpcCall>,
    failures: HashMap<RpcMethod, VecDeque<Status>>,
}

impl MemoryState {
    fn record(&mut self, call: RpcCall) -> RpcResult<()> {
        let method = call.method();
        self.calls.push(call);
        match self.failures.get_mut(&method).and_then(VecDeque::pop_front) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn check_transaction(&self, transaction: Option<&TransactionId>) -> RpcResult<()> {
        match transaction {
            Some(id) if !self.active_transactions.contains(id) => Err(Status::invalid_argument(
                "The referenced transaction has expired or is no longer valid.",
            )),
            _ => Ok(()),
        }
    }

    fn snapshot(&self, reference: &DocumentReference, read_time: DateTime<Utc>) -> DocumentSnapshot {
        match self.documents.get(reference) {
            Some(stored) => DocumentSnapshot::found(
                reference.clone(),
                stored.data.clone(),
                stored.create_time,
                stored.update_time,
                read_time,
            ),
            None => DocumentSnapshot::missing(reference.clone(), read_time),
        }
    }
}

/// In-process `DocumentRpc` implementation
///
/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct InMemoryRpc {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document outside of any transaction.
    pub async fn insert_document(&self, reference: DocumentReference, data: DocumentData) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.documents.insert(
            reference,
            StoredDocument {
                data,
                create_time: now,
                update_time: now,
            },
        );
    }

    pub async fn document(&self, reference: &DocumentReference) -> Option<DocumentData> {
        let state = self.state.lock().await;
        state.documents.get(reference).map(|stored| stored.data.clone())
    }

    pub async fn document_count(&self) -> usize {
        self.state.lock().await.documents.len()
    }

    /// Make the next call to `method` fail with `status`.
    ///
    /// Repeated calls queue up; each scripted failure is consumed once.
    pub async fn fail_next(&self, method: RpcMethod, status: Status) {
        let mut state = self.state.lock().await;
        state.failures.entry(method).or_default().push_back(status);
    }

    pub async fn calls(&self) -> Vec<RpcCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn call_count(&self, method: RpcMethod) -> usize {
        let state = self.state.lock().await;
        state.calls.iter().filter(|call| call.method() == method).count()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Begun transactions that were neither committed nor rolled back.
    pub async fn active_transaction_count(&self) -> usize {
        self.state.lock().await.active_transactions.len()
    }
}

#[async_trait]
impl DocumentRpc for InMemoryRpc {
    async fn begin_transaction(
        &self,
        request: BeginTransactionRequest,
    ) -> RpcResult<BeginTransactionResponse> {
        let mut state = self.state.lock().await;
        state.record(RpcCall::BeginTransaction(request))?;

        state.next_transaction += 1;
        let transaction = TransactionId::new(state.next_transaction.to_be_bytes().to_vec());
        state.active_transactions.insert(transaction.clone());

        Ok(BeginTransactionResponse { transaction })
    }

    async fn commit(&self, request: CommitRequest) -> RpcResult<CommitResponse> {
        let mut state = self.state.lock().await;
        state.record(RpcCall::Commit(request.clone()))?;
        state.check_transaction(request.transaction.as_ref())?;

        let commit_time = Utc::now();
        let mut staged = state.documents.clone();
        let mut write_results = Vec::with_capacity(request.writes.len());
        for write in &request.writes {
            apply_write(&mut staged, write, commit_time)?;
            write_results.push(WriteResult {
                update_time: Some(commit_time),
            });
        }

        state.documents = staged;
        if let Some(transaction) = &request.transaction {
            state.active_transactions.remove(transaction);
        }

        Ok(CommitResponse {
            write_results,
            commit_time: Some(commit_time),
        })
    }

    async fn rollback(&self, request: RollbackRequest) -> RpcResult<()> {
        let mut state = self.state.lock().await;
        state.record(RpcCall::Rollback(request.clone()))?;

        if !state.active_transactions.remove(&request.transaction) {
            return Err(Status::invalid_argument(
                "The referenced transaction has expired or is no longer valid.",
            ));
        }
        Ok(())
    }

    async fn batch_get_documents(
        &self,
        request: BatchGetDocumentsRequest,
    ) -> RpcResult<Vec<DocumentSnapshot>> {
        let mut state = self.state.lock().await;
        state.record(RpcCall::BatchGetDocuments(request.clone()))?;
        state.check_transaction(request.transaction.as_ref())?;

        let read_time = Utc::now();
        let snapshots = request
            .documents
            .iter()
            .map(|reference| {
                let snapshot = state.snapshot(reference, read_time);
                match (&request.field_mask, state.documents.get(reference)) {
                    (Some(mask), Some(stored)) => DocumentSnapshot::found(
                        reference.clone(),
                        apply_field_mask(&stored.data, mask),
                        stored.create_time,
                        stored.update_time,
                        read_time,
                    ),
                    _ => snapshot,
                }
            })
            .collect();

        Ok(snapshots)
    }

    async fn run_query(&self, request: RunQueryRequest) -> RpcResult<QuerySnapshot> {
        let mut state = self.state.lock().await;
        state.record(RpcCall::RunQuery(request.clone()))?;
        state.check_transaction(request.transaction.as_ref())?;

        let read_time = Utc::now();
        let collection = request.query.collection();
        let limit = request.query.max_results().unwrap_or(usize::MAX);
        let docs = state
            .documents
            .keys()
            .filter(|reference| collection.contains(reference))
            .take(limit)
            .map(|reference| state.snapshot(reference, read_time))
            .collect();

        Ok(QuerySnapshot::new(docs, read_time))
    }
}

fn apply_write(
    documents: &mut BTreeMap<DocumentReference, StoredDocument>,
    write: &Write,
    commit_time: DateTime<Utc>,
) -> RpcResult<()> {
    let existing = documents.get(&write.document);
    if let Some(precondition) = &write.precondition {
        check_precondition(&write.document, precondition, existing)?;
    }

    match &write.operation {
        WriteOperation::Create { data } => {
            if existing.is_some() {
                return Err(Status::new(
                    Code::AlreadyExists,
                    format!("Document already exists: {}", write.document),
                ));
            }
            documents.insert(
                write.document.clone(),
                StoredDocument {
                    data: data.clone(),
                    create_time: commit_time,
                    update_time: commit_time,
                },
            );
        }
        WriteOperation::Set { data, merge } => {
            let create_time = existing.map_or(commit_time, |stored| stored.create_time);
            let data = match (merge, existing) {
                (true, Some(stored)) => {
                    let mut merged = stored.data.clone();
                    merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                    merged
                }
                _ => data.clone(),
            };
            documents.insert(
                write.document.clone(),
                StoredDocument {
                    data,
                    create_time,
                    update_time: commit_time,
                },
            );
        }
        WriteOperation::Update { fields } => {
            let Some(stored) = documents.get_mut(&write.document) else {
                return Err(Status::not_found(format!(
                    "No document to update: {}",
                    write.document
                )));
            };
            for (path, value) in fields {
                set_nested(&mut stored.data, path.segments(), value.clone());
            }
            stored.update_time = commit_time;
        }
        WriteOperation::Delete => {
            documents.remove(&write.document);
        }
    }

    Ok(())
}

fn check_precondition(
    document: &DocumentReference,
    precondition: &Precondition,
    existing: Option<&StoredDocument>,
) -> RpcResult<()> {
    if let Some(exists) = precondition.exists {
        if exists != existing.is_some() {
            return Err(Status::new(
                Code::FailedPrecondition,
                format!(
                    "Precondition failed for {}: document {}",
                    document,
                    if exists { "does not exist" } else { "already exists" }
                ),
            ));
        }
    }

    if let Some(expected) = precondition.last_update_time {
        if existing.map(|stored| stored.update_time) != Some(expected) {
            return Err(Status::new(
                Code::FailedPrecondition,
                format!("Precondition failed for {}: update time mismatch", document),
            ));
        }
    }

    Ok(())
}

fn set_nested(data: &mut DocumentData, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        data.insert(first.clone(), value);
        return;
    }

    let entry = data
        .entry(first.clone())
        .or_insert_with(|| Value::Map(DocumentData::new()));
    if !matches!(entry, Value::Map(_)) {
        *entry = Value::Map(DocumentData::new());
    }
    if let Value::Map(child) = entry {
        set_nested(child, rest, value);
    }
}

fn get_nested<'a>(data: &'a DocumentData, segments: &[String]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = data.get(first)?;
    for segment in rest {
        current = current.as_map()?.get(segment)?;
    }
    Some(current)
}

fn apply_field_mask(data: &DocumentData, mask: &[FieldPath]) -> DocumentData {
    let mut masked = DocumentData::new();
    for path in mask {
        if let Some(value) = get_nested(data, path.segments()) {
            set_nested(&mut masked, path.segments(), value.clone());
        }
    }
    masked
}
