// ============================================================================
// Resource and Field Paths
// ============================================================================
//
// Document and collection references are slash-separated resource paths
// relative to the database root:
//
//   users              -> collection (odd number of segments)
//   users/alice        -> document   (even number of segments)
//
// Field paths address (possibly nested) fields inside one document.
//
// ============================================================================

use super::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const FORBIDDEN_FIELD_CHARS: &[char] = &['~', '*', '/', '[', ']'];

/// Slash-separated path relative to the database root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(Error::invalid_argument("Path must be a non-empty string."));
        }
        if trimmed.contains("//") {
            return Err(Error::invalid_argument(format!(
                "Paths must not contain //: {}",
                path
            )));
        }

        Ok(Self {
            segments: trimmed.split('/').map(str::to_string).collect(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_document(&self) -> bool {
        !self.segments.is_empty() && self.segments.len() % 2 == 0
    }

    pub fn is_collection(&self) -> bool {
        self.segments.len() % 2 == 1
    }

    pub fn last_segment(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    fn parent(&self) -> Self {
        Self {
            segments: self.segments[..self.segments.len().saturating_sub(1)].to_vec(),
        }
    }

    fn append(&self, relative: &ResourcePath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Self { segments }
    }

    pub fn relative_name(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative_name())
    }
}

/// Reference to a single document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentReference {
    path: ResourcePath,
}

impl DocumentReference {
    /// Create a reference from a relative path such as `users/alice`.
    pub fn new(path: &str) -> Result<Self> {
        let path = ResourcePath::parse(path)?;
        if !path.is_document() {
            return Err(Error::invalid_argument(format!(
                "Value for argument \"documentPath\" must point to a document, but was \"{}\". \
                 Your path does not contain an even number of components.",
                path
            )));
        }
        Ok(Self { path })
    }

    /// Recover a reference from a full resource name issued by the server.
    pub fn from_resource_name(database: &str, name: &str) -> Result<Self> {
        let prefix = format!("{}/documents/", database);
        let relative = name.strip_prefix(&prefix).ok_or_else(|| {
            Error::invalid_argument(format!(
                "Resource name '{}' does not belong to database '{}'",
                name, database
            ))
        })?;
        Self::new(relative)
    }

    pub fn id(&self) -> &str {
        self.path.last_segment()
    }

    pub fn path(&self) -> String {
        self.path.relative_name()
    }

    pub fn parent(&self) -> CollectionReference {
        CollectionReference {
            path: self.path.parent(),
        }
    }

    pub fn collection(&self, collection_path: &str) -> Result<CollectionReference> {
        let relative = ResourcePath::parse(collection_path)?;
        let path = self.path.append(&relative);
        if !path.is_collection() {
            return Err(Error::invalid_argument(format!(
                "Value for argument \"collectionPath\" must point to a collection, but was \"{}\".",
                collection_path
            )));
        }
        Ok(CollectionReference { path })
    }

    /// Full resource name: `{database}/documents/{path}`
    pub fn formatted_name(&self, database: &str) -> String {
        format!("{}/documents/{}", database, self.path)
    }
}

impl fmt::Display for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Reference to a collection of documents
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionReference {
    path: ResourcePath,
}

impl CollectionReference {
    pub fn new(path: &str) -> Result<Self> {
        let path = ResourcePath::parse(path)?;
        if !path.is_collection() {
            return Err(Error::invalid_argument(format!(
                "Value for argument \"collectionPath\" must point to a collection, but was \"{}\". \
                 Your path does not contain an odd number of components.",
                path
            )));
        }
        Ok(Self { path })
    }

    pub fn id(&self) -> &str {
        self.path.last_segment()
    }

    pub fn path(&self) -> String {
        self.path.relative_name()
    }

    pub fn doc(&self, document_id: &str) -> Result<DocumentReference> {
        let relative = ResourcePath::parse(document_id)?;
        let path = self.path.append(&relative);
        if !path.is_document() {
            return Err(Error::invalid_argument(format!(
                "Value for argument \"documentPath\" must point to a document, but was \"{}\".",
                document_id
            )));
        }
        Ok(DocumentReference { path })
    }

    /// Whether `document` is a direct child of this collection.
    pub fn contains(&self, document: &DocumentReference) -> bool {
        document.path.parent() == self.path
    }

    pub fn formatted_name(&self, database: &str) -> String {
        format!("{}/documents/{}", database, self.path)
    }
}

impl fmt::Display for CollectionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Path to a (possibly nested) field inside a document
///
/// Serialized as its segment list; deserializing runs the same checks as
/// `FieldPath::new`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Create a field path from explicit segments.
    ///
    /// Segments are taken literally, so they may contain dots.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(Error::invalid_argument(
                "Function \"FieldPath()\" requires at least 1 argument.",
            ));
        }
        if let Some(index) = segments.iter().position(String::is_empty) {
            return Err(Error::invalid_argument(format!(
                "Element at index {} should not be an empty string.",
                index
            )));
        }
        Ok(Self { segments })
    }

    /// Parse a dotted field path such as `address.city`.
    pub fn from_dotted(path: &str) -> Result<Self> {
        if path.is_empty()
            || path.starts_with('.')
            || path.ends_with('.')
            || path.contains("..")
            || path.contains(FORBIDDEN_FIELD_CHARS)
        {
            return Err(Error::invalid_argument(format!(
                "Paths can't be empty and must not contain \"*~/[]\". Got \"{}\".",
                path
            )));
        }
        Self::new(path.split('.'))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl TryFrom<Vec<String>> for FieldPath {
    type Error = Error;

    fn try_from(segments: Vec<String>) -> Result<Self> {
        Self::new(segments)
    }
}

impl From<FieldPath> for Vec<String> {
    fn from(path: FieldPath) -> Self {
        path.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Unvalidated field path as supplied by a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPathInput {
    Dotted(String),
    Segments(Vec<String>),
    Path(FieldPath),
}

impl FieldPathInput {
    pub fn to_field_path(&self) -> Result<FieldPath> {
        match self {
            Self::Dotted(path) => FieldPath::from_dotted(path),
            Self::Segments(segments) => FieldPath::new(segments.iter().cloned()),
            Self::Path(path) => Ok(path.clone()),
        }
    }
}

impl From<&str> for FieldPathInput {
    fn from(path: &str) -> Self {
        Self::Dotted(path.to_string())
    }
}

impl From<String> for FieldPathInput {
    fn from(path: String) -> Self {
        Self::Dotted(path)
    }
}

impl From<Vec<String>> for FieldPathInput {
    fn from(segments: Vec<String>) -> Self {
        Self::Segments(segments)
    }
}

impl From<FieldPath> for FieldPathInput {
    fn from(path: FieldPath) -> Self {
        Self::Path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_reference() {
        let doc = DocumentReference::new("users/alice").unwrap();
        assert_eq!(doc.id(), "alice");
        assert_eq!(doc.parent().id(), "users");
        assert_eq!(
            doc.formatted_name("projects/p/databases/(default)"),
            "projects/p/databases/(default)/documents/users/alice"
        );
    }

    #[test]
    fn test_document_reference_requires_even_segments() {
        assert!(DocumentReference::new("users").is_err());
        assert!(DocumentReference::new("").is_err());
        assert!(DocumentReference::new("users//alice").is_err());
    }

    #[test]
    fn test_resource_name_round_trip() {
        let db = "projects/p/databases/d";
        let doc = DocumentReference::new("a/b/c/d").unwrap();
        let parsed = DocumentReference::from_resource_name(db, &doc.formatted_name(db)).unwrap();
        assert_eq!(parsed, doc);
        assert!(DocumentReference::from_resource_name("projects/x/databases/y", &doc.formatted_name(db)).is_err());
    }

    #[test]
    fn test_collection_navigation() {
        let users = CollectionReference::new("users").unwrap();
        let alice = users.doc("alice").unwrap();
        assert!(users.contains(&alice));

        let posts = alice.collection("posts").unwrap();
        assert_eq!(posts.path(), "users/alice/posts");
        assert!(!users.contains(&posts.doc("p1").unwrap()));
    }

    #[test]
    fn test_field_path_parsing() {
        let path = FieldPath::from_dotted("address.city").unwrap();
        assert_eq!(path.segments(), &["address".to_string(), "city".to_string()]);
        assert_eq!(path.to_string(), "address.city");

        assert!(FieldPath::from_dotted("").is_err());
        assert!(FieldPath::from_dotted("a..b").is_err());
        assert!(FieldPath::from_dotted("a*").is_err());
        assert!(FieldPath::new(Vec::<String>::new()).is_err());
        assert!(FieldPath::new(["a", ""]).is_err());

        // Explicit segments keep dots literally.
        let literal = FieldPath::new(["a.b"]).unwrap();
        assert_eq!(literal.segments().len(), 1);
    }

    #[test]
    fn test_field_path_deserialize_is_validated() {
        let path: FieldPath = serde_json::from_str(r#"["address","city"]"#).unwrap();
        assert_eq!(path, FieldPath::from_dotted("address.city").unwrap());
        assert_eq!(serde_json::to_string(&path).unwrap(), r#"["address","city"]"#);

        assert!(serde_json::from_str::<FieldPath>("[]").is_err());
        assert!(serde_json::from_str::<FieldPath>(r#"["a",""]"#).is_err());
    }
}
