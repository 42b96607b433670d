use std::fmt;

use crate::delta::ParseDeltaError;
use crate::record::RecordError;
use crate::source::SourceError;

/// Any failure surfaced by a capsule operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The change source failed or returned something unusable.
    Source(SourceError),
    /// A checkout or field access failed.
    Record(RecordError),
    /// A pulled delta token did not parse.
    Malformed(ParseDeltaError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Source(err) => write!(f, "{}", err),
            Error::Record(err) => write!(f, "{}", err),
            Error::Malformed(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<SourceError> for Error {
    fn from(err: SourceError) -> Self {
        Error::Source(err)
    }
}

impl From<RecordError> for Error {
    fn from(err: RecordError) -> Self {
        Error::Record(err)
    }
}

impl From<ParseDeltaError> for Error {
    fn from(err: ParseDeltaError) -> Self {
        Error::Malformed(err)
    }
}
