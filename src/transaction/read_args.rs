// ============================================================================
// Multi-document read arguments
// ============================================================================
//
// `get_all` takes a variadic-style argument list: one or more document
// references, optionally followed by read options. The list is modelled as a
// tagged union so every call shape, including the unsupported legacy one
// (a single list of references), is representable and rejected explicitly.
//
// ============================================================================

use crate::core::{DocumentReference, Error, FieldPath, FieldPathInput, Result};

/// Options accepted as the trailing `get_all` argument
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Fields to return; `None` returns whole documents
    pub field_mask: Option<Vec<FieldPathInput>>,
}

impl ReadOptions {
    pub fn field_mask<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldPathInput>,
    {
        Self {
            field_mask: Some(fields.into_iter().map(Into::into).collect()),
        }
    }

    /// Validate every mask entry, converting it to a `FieldPath`.
    pub fn validate(&self) -> Result<Option<Vec<FieldPath>>> {
        let Some(entries) = &self.field_mask else {
            return Ok(None);
        };

        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                entry.to_field_path().map_err(|err| {
                    let detail = match err {
                        Error::InvalidArgument(message) => message,
                        other => other.to_string(),
                    };
                    Error::invalid_argument(format!(
                        "Element at index {} is not a valid field path. {}",
                        index, detail
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

/// One positional `get_all` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetAllArg {
    Document(DocumentReference),
    /// Legacy call shape; always rejected
    DocumentList(Vec<DocumentReference>),
    Options(ReadOptions),
}

impl From<DocumentReference> for GetAllArg {
    fn from(document: DocumentReference) -> Self {
        Self::Document(document)
    }
}

impl From<&DocumentReference> for GetAllArg {
    fn from(document: &DocumentReference) -> Self {
        Self::Document(document.clone())
    }
}

impl From<Vec<DocumentReference>> for GetAllArg {
    fn from(documents: Vec<DocumentReference>) -> Self {
        Self::DocumentList(documents)
    }
}

impl From<ReadOptions> for GetAllArg {
    fn from(options: ReadOptions) -> Self {
        Self::Options(options)
    }
}

/// Validated `get_all` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGetAll {
    pub documents: Vec<DocumentReference>,
    pub field_mask: Option<Vec<FieldPath>>,
}

/// Split a `get_all` argument list into references and an optional field mask.
pub fn parse_get_all_args(mut args: Vec<GetAllArg>) -> Result<ParsedGetAll> {
    if args.is_empty() {
        return Err(Error::invalid_argument(
            "Function \"getAll()\" requires at least 1 argument.",
        ));
    }

    if matches!(args.first(), Some(GetAllArg::DocumentList(_))) {
        return Err(Error::invalid_argument(
            "getAll() no longer accepts an array as its first argument. \
             Please unpack your array and call getAll() with individual arguments.",
        ));
    }

    let field_mask = match args.last() {
        Some(GetAllArg::Options(_)) => match args.pop() {
            Some(GetAllArg::Options(options)) => options.validate()?,
            _ => None,
        },
        _ => None,
    };

    if args.is_empty() {
        return Err(Error::invalid_argument(
            "Function \"getAll()\" requires at least 1 document reference.",
        ));
    }

    let documents = args
        .into_iter()
        .enumerate()
        .map(|(index, arg)| match arg {
            GetAllArg::Document(document) => Ok(document),
            _ => Err(Error::invalid_argument(format!(
                "Element at index {} is not a valid DocumentReference.",
                index
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ParsedGetAll {
        documents,
        field_mask,
    })
}
