use super::status::{Code, Status};
use thiserror::Error;

pub const READ_AFTER_WRITE_ERROR_MSG: &str =
    "transactions require all reads to be executed before all writes";

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", READ_AFTER_WRITE_ERROR_MSG)]
    OrderingViolation,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] Status),

    #[error(transparent)]
    Application(#[from] anyhow::Error),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Status code carried by this error, if it has one.
    ///
    /// Local validation failures report `INVALID_ARGUMENT`; ordering
    /// violations, application errors and lock failures carry no code.
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Rpc(status) => Some(status.code()),
            Self::InvalidArgument(_) => Some(Code::InvalidArgument),
            Self::OrderingViolation | Self::Application(_) | Self::Lock(_) => None,
        }
    }

    /// Whether a transaction attempt that failed with this error may be re-run.
    ///
    /// Only errors reported by the server qualify; local failures never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(status) => status.code().is_transaction_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
