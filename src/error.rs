use std::fmt;
use tonic::Status;

/// Kind of Metastore entity, used in dangling-reference reports and storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Mapping,
    Function,
    Location,
    Stacktrace,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mapping => "mappings",
            Self::Function => "functions",
            Self::Location => "locations",
            Self::Stacktrace => "stacktraces",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("out of order sample in series {series}: timestamp {timestamp} is not after {last}")]
    OutOfOrderSample {
        series: String,
        timestamp: i64,
        last: i64,
    },

    #[error("dangling reference to {kind} {id}")]
    DanglingReference { kind: EntityKind, id: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl fmt::Display) -> Self {
        Self::Internal(anyhow::anyhow!("{}", msg))
    }

    pub fn dangling(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::DanglingReference {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument(msg) => Status::invalid_argument(msg),
            Error::NotFound(msg) => Status::not_found(msg),
            e @ (Error::OutOfOrderSample { .. } | Error::DanglingReference { .. }) => {
                Status::failed_precondition(e.to_string())
            }
            Error::Cancelled => Status::cancelled("request cancelled"),
            Error::Internal(e) => Status::internal(format!("{:#}", e)),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Internal(anyhow::Error::new(err).context("failed to (de)serialize entity"))
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Self::Internal(anyhow::Error::new(err).context("metastore backend failure"))
    }
}
