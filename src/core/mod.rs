pub mod error;
pub mod path;
pub mod status;
pub mod types;
pub mod value;

pub use error::{Error, Result, READ_AFTER_WRITE_ERROR_MSG};
pub use path::{CollectionReference, DocumentReference, FieldPath, FieldPathInput, ResourcePath};
pub use status::{Code, Status};
pub use types::{
    DocumentSnapshot, Precondition, Query, QuerySnapshot, RequestTag, TransactionId, WriteResult,
};
pub use value::{DocumentData, Value, document_data_from_json};
