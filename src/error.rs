use hickory_proto::op::ResponseCode;
use hickory_proto::rr::{DNSClass, Name, RecordType};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NsasError>;

/// Errors raised while building or refreshing cache entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NsasError {
    #[error("inconsistent owner names: {expected} vs {found}")]
    InconsistentOwnerNames { expected: Name, found: Name },

    #[error("inconsistent classes: {expected} vs {found}")]
    InconsistentClass { expected: DNSClass, found: DNSClass },

    #[error("unexpected record type {found}, wanted {expected}")]
    UnexpectedRecordType {
        expected: RecordType,
        found: RecordType,
    },

    #[error("no address records supplied")]
    NoRecords,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure reported by a [`Resolver`](crate::resolver::Resolver) for one query.
///
/// The cache never surfaces these to its own callers; a failed fetch just
/// marks the entry unreachable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("upstream query timed out")]
    Timeout,

    #[error("no {0} records in response")]
    NoData(RecordType),

    #[error("upstream answered {0}")]
    ResponseCode(ResponseCode),

    #[error("dns protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("query dropped without an answer")]
    Abandoned,
}

impl From<hickory_proto::error::ProtoError> for ResolveError {
    fn from(e: hickory_proto::error::ProtoError) -> Self {
        ResolveError::Protocol(e.to_string())
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(e: std::io::Error) -> Self {
        ResolveError::Io(e.to_string())
    }
}
