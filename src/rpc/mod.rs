// ============================================================================
// RPC Interface
// ============================================================================
//
// Narrow boundary between the transaction coordinator and the remote
// database. Transport, authentication and wire encoding live behind
// `DocumentRpc`; the coordinator only sees these request/response shapes and
// the `Status` a failed call reports.
//
// ============================================================================

pub mod memory;

use crate::core::{
    DocumentData, DocumentReference, DocumentSnapshot, FieldPath, Precondition, Query,
    QuerySnapshot, RequestTag, Status, TransactionId, Value, WriteResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::InMemoryRpc;

pub type RpcResult<T> = std::result::Result<T, Status>;

/// RPC surface consumed by the transaction coordinator
#[async_trait]
pub trait DocumentRpc: Send + Sync {
    async fn begin_transaction(
        &self,
        request: BeginTransactionRequest,
    ) -> RpcResult<BeginTransactionResponse>;

    async fn commit(&self, request: CommitRequest) -> RpcResult<CommitResponse>;

    async fn rollback(&self, request: RollbackRequest) -> RpcResult<()>;

    /// Batched document read; results follow request order.
    async fn batch_get_documents(
        &self,
        request: BatchGetDocumentsRequest,
    ) -> RpcResult<Vec<DocumentSnapshot>>;

    async fn run_query(&self, request: RunQueryRequest) -> RpcResult<QuerySnapshot>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadWrite {
    /// Handle of the failed attempt this transaction retries
    pub retry_transaction: Option<TransactionId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionOptionsProto {
    pub read_write: ReadWrite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginTransactionRequest {
    pub database: String,
    pub options: Option<TransactionOptionsProto>,
}

impl BeginTransactionRequest {
    /// Handle carried as retry hint, if any.
    pub fn retry_transaction(&self) -> Option<&TransactionId> {
        self.options
            .as_ref()
            .and_then(|options| options.read_write.retry_transaction.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginTransactionResponse {
    pub transaction: TransactionId,
}

/// Buffered mutation of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOperation {
    Create { data: DocumentData },
    Set { data: DocumentData, merge: bool },
    Update { fields: Vec<(FieldPath, Value)> },
    Delete,
}

impl WriteOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Set { .. } => "set",
            Self::Update { .. } => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Write {
    pub document: DocumentReference,
    pub operation: WriteOperation,
    pub precondition: Option<Precondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub database: String,
    pub writes: Vec<Write>,
    pub transaction: Option<TransactionId>,
    pub request_tag: RequestTag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitResponse {
    pub write_results: Vec<WriteResult>,
    pub commit_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub database: String,
    pub transaction: TransactionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchGetDocumentsRequest {
    pub database: String,
    pub documents: Vec<DocumentReference>,
    pub field_mask: Option<Vec<FieldPath>>,
    pub transaction: Option<TransactionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunQueryRequest {
    pub database: String,
    pub query: Query,
    pub transaction: Option<TransactionId>,
}
