use std::fmt;

use crate::revision::Revision;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordError {
    /// The checkout target does not resolve to any key in the delta log.
    InvalidRevision(String),
    /// Materialized records are read-only projections.
    ReadOnly(&'static str),
    /// Field access on a record checked out before its creation point.
    NotYetCreated { created_at: Option<Revision> },
    /// Field access on a record checked out at or past its deletion point.
    AlreadyDeleted { last_live: Option<Revision> },
    /// The materialized record has no field by that name.
    UnknownField(String),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::InvalidRevision(target) => {
                write!(
                    f,
                    "revision {} does not exist; recheck the input or refresh",
                    target
                )
            }
            RecordError::ReadOnly(kind) => {
                write!(f, "{} records are read-only; changes arrive as deltas", kind)
            }
            RecordError::NotYetCreated { created_at } => match created_at {
                Some(revision) => write!(f, "comment not created until {}", revision.label()),
                None => write!(f, "comment not created at this revision"),
            },
            RecordError::AlreadyDeleted { last_live } => match last_live {
                Some(revision) => write!(f, "comment deleted; last live at {}", revision.label()),
                None => write!(f, "comment deleted at this revision"),
            },
            RecordError::UnknownField(name) => write!(f, "no field named `{}`", name),
        }
    }
}

impl std::error::Error for RecordError {}
