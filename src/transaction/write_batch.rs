use crate::core::{DocumentData, DocumentReference, Error, FieldPath, Precondition, Result, Value};
use crate::rpc::{Write, WriteOperation};
use std::collections::HashSet;

/// Options for `set`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge top-level fields into an existing document instead of replacing it
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// Ordered buffer of pending writes
///
/// Writes are recorded in call order and sent to the server together on
/// commit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document; the commit fails if it already exists.
    pub fn create(&mut self, document: &DocumentReference, data: DocumentData) -> &mut Self {
        self.writes.push(Write {
            document: document.clone(),
            operation: WriteOperation::Create { data },
            precondition: None,
        });
        self
    }

    /// Write a document, replacing it or merging into it depending on `options`.
    pub fn set(
        &mut self,
        document: &DocumentReference,
        data: DocumentData,
        options: SetOptions,
    ) -> &mut Self {
        self.writes.push(Write {
            document: document.clone(),
            operation: WriteOperation::Set {
                data,
                merge: options.merge,
            },
            precondition: None,
        });
        self
    }

    /// Update individual fields of an existing document.
    ///
    /// Without an explicit precondition the document must exist.
    pub fn update(
        &mut self,
        document: &DocumentReference,
        fields: Vec<(FieldPath, Value)>,
        precondition: Option<Precondition>,
    ) -> Result<&mut Self> {
        if fields.is_empty() {
            return Err(Error::invalid_argument("At least one field must be updated."));
        }

        if let Some(duplicate) = first_duplicate(&fields) {
            return Err(Error::invalid_argument(format!(
                "Field \"{}\" was specified multiple times.",
                duplicate
            )));
        }

        let precondition = precondition
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| Precondition::exists(true));

        self.writes.push(Write {
            document: document.clone(),
            operation: WriteOperation::Update { fields },
            precondition: Some(precondition),
        });
        Ok(self)
    }

    /// Delete a document.
    pub fn delete(
        &mut self,
        document: &DocumentReference,
        precondition: Option<Precondition>,
    ) -> &mut Self {
        self.writes.push(Write {
            document: document.clone(),
            operation: WriteOperation::Delete,
            precondition: precondition.filter(|p| !p.is_empty()),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Drop every buffered write.
    pub fn reset(&mut self) {
        self.writes.clear();
    }

    /// Hand the buffered writes over, leaving the batch empty.
    pub fn take_writes(&mut self) -> Vec<Write> {
        std::mem::take(&mut self.writes)
    }
}

fn first_duplicate(fields: &[(FieldPath, Value)]) -> Option<&FieldPath> {
    let mut seen = HashSet::with_capacity(fields.len());
    fields.iter().map(|(path, _)| path).find(|path| !seen.insert(*path))
}
