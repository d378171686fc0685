use super::path::{CollectionReference, DocumentReference, FieldPath};
use super::value::{DocumentData, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque server-issued transaction handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Vec<u8>);

impl TransactionId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn_")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Correlation token attached to every commit of one `run_transaction` call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestTag(String);

impl RequestTag {
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self(id[..10].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Condition the server checks before applying a write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Precondition {
    pub exists: Option<bool>,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl Precondition {
    pub fn exists(exists: bool) -> Self {
        Self {
            exists: Some(exists),
            last_update_time: None,
        }
    }

    pub fn last_update_time(time: DateTime<Utc>) -> Self {
        Self {
            exists: None,
            last_update_time: Some(time),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exists.is_none() && self.last_update_time.is_none()
    }
}

/// Point-in-time view of one document, which may not exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    reference: DocumentReference,
    data: Option<DocumentData>,
    create_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
    read_time: Option<DateTime<Utc>>,
}

impl DocumentSnapshot {
    pub fn found(
        reference: DocumentReference,
        data: DocumentData,
        create_time: DateTime<Utc>,
        update_time: DateTime<Utc>,
        read_time: DateTime<Utc>,
    ) -> Self {
        Self {
            reference,
            data: Some(data),
            create_time: Some(create_time),
            update_time: Some(update_time),
            read_time: Some(read_time),
        }
    }

    pub fn missing(reference: DocumentReference, read_time: DateTime<Utc>) -> Self {
        Self {
            reference,
            data: None,
            create_time: None,
            update_time: None,
            read_time: Some(read_time),
        }
    }

    pub fn reference(&self) -> &DocumentReference {
        &self.reference
    }

    pub fn id(&self) -> &str {
        self.reference.id()
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&DocumentData> {
        self.data.as_ref()
    }

    /// Resolve a (possibly nested) field.
    pub fn get(&self, field: &FieldPath) -> Option<&Value> {
        let data = self.data.as_ref()?;
        let (first, rest) = field.segments().split_first()?;
        let mut current = data.get(first)?;
        for segment in rest {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    pub fn create_time(&self) -> Option<DateTime<Utc>> {
        self.create_time
    }

    pub fn update_time(&self) -> Option<DateTime<Utc>> {
        self.update_time
    }

    pub fn read_time(&self) -> Option<DateTime<Utc>> {
        self.read_time
    }
}

/// Documents of one collection, optionally limited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    collection: CollectionReference,
    limit: Option<usize>,
}

impl Query {
    pub fn new(collection: CollectionReference) -> Self {
        Self {
            collection,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection(&self) -> &CollectionReference {
        &self.collection
    }

    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }
}

impl From<CollectionReference> for Query {
    fn from(collection: CollectionReference) -> Self {
        Self::new(collection)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySnapshot {
    docs: Vec<DocumentSnapshot>,
    read_time: DateTime<Utc>,
}

impl QuerySnapshot {
    pub fn new(docs: Vec<DocumentSnapshot>, read_time: DateTime<Utc>) -> Self {
        Self { docs, read_time }
    }

    pub fn docs(&self) -> &[DocumentSnapshot] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn read_time(&self) -> DateTime<Utc> {
        self.read_time
    }
}

/// Outcome of one committed write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    pub update_time: Option<DateTime<Utc>>,
}
