pub mod config;

use crate::core::{
    DocumentReference, DocumentSnapshot, FieldPath, Query, QuerySnapshot, RequestTag, Result,
    TransactionId,
};
use crate::rpc::{
    BatchGetDocumentsRequest, BeginTransactionRequest, CommitRequest, CommitResponse, DocumentRpc,
    ReadWrite, RollbackRequest, RunQueryRequest, TransactionOptionsProto, Write,
};
use log::debug;
use std::sync::Arc;

/// Database connection handle
///
/// Binds an RPC backend to one database resource name. Every request the
/// transaction machinery issues goes through here. Cloning is cheap and
/// shares the backend.
#[derive(Clone)]
pub struct Connection {
    /// RPC backend
    rpc: Arc<dyn DocumentRpc>,
    /// Database resource name, `projects/{p}/databases/{d}`
    database: Arc<str>,
}

impl Connection {
    pub fn new(rpc: Arc<dyn DocumentRpc>, database: impl Into<String>) -> Self {
        Self {
            rpc,
            database: Arc::from(database.into()),
        }
    }

    /// Get the database resource name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Begin a transaction, passing `retry_of` as the retry hint when set
    pub async fn begin_transaction(&self, retry_of: Option<&TransactionId>) -> Result<TransactionId> {
        let options = retry_of.map(|previous| TransactionOptionsProto {
            read_write: ReadWrite {
                retry_transaction: Some(previous.clone()),
            },
        });

        let response = self
            .rpc
            .begin_transaction(BeginTransactionRequest {
                database: self.database.to_string(),
                options,
            })
            .await?;

        debug!(
            "BeginTransaction issued {} (retry of {:?})",
            response.transaction,
            retry_of.map(ToString::to_string)
        );
        Ok(response.transaction)
    }

    /// Commit `writes`, optionally inside `transaction`
    pub async fn commit(
        &self,
        transaction: Option<&TransactionId>,
        writes: Vec<Write>,
        request_tag: &RequestTag,
    ) -> Result<CommitResponse> {
        let write_count = writes.len();
        let response = self
            .rpc
            .commit(CommitRequest {
                database: self.database.to_string(),
                writes,
                transaction: transaction.cloned(),
                request_tag: request_tag.clone(),
            })
            .await?;

        debug!(
            "[{}] Commit applied {} write(s) in {:?}",
            request_tag,
            write_count,
            transaction.map(ToString::to_string)
        );
        Ok(response)
    }

    /// Roll back `transaction`
    pub async fn rollback(&self, transaction: &TransactionId) -> Result<()> {
        self.rpc
            .rollback(RollbackRequest {
                database: self.database.to_string(),
                transaction: transaction.clone(),
            })
            .await?;

        debug!("Rollback of {} acknowledged", transaction);
        Ok(())
    }

    /// Read several documents at once, in request order
    pub async fn batch_get(
        &self,
        documents: Vec<DocumentReference>,
        field_mask: Option<Vec<FieldPath>>,
        transaction: Option<&TransactionId>,
    ) -> Result<Vec<DocumentSnapshot>> {
        let snapshots = self
            .rpc
            .batch_get_documents(BatchGetDocumentsRequest {
                database: self.database.to_string(),
                documents,
                field_mask,
                transaction: transaction.cloned(),
            })
            .await?;
        Ok(snapshots)
    }

    /// Run a query
    pub async fn run_query(
        &self,
        query: Query,
        transaction: Option<&TransactionId>,
    ) -> Result<QuerySnapshot> {
        let snapshot = self
            .rpc
            .run_query(RunQueryRequest {
                database: self.database.to_string(),
                query,
                transaction: transaction.cloned(),
            })
            .await?;
        Ok(snapshot)
    }
}
