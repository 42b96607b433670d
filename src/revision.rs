use std::fmt;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Opaque key identifying one point in a record's change history.
///
/// Keys arrive in chronological order and sort the same way they arrive, so
/// comparing two revisions compares their place in history.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(key: impl Into<String>) -> Self {
        Revision(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Timestamp label in local time, e.g. `2021-02-03 12:00:00 (1612324800)`.
    /// Keys that are not unix-second values fall back to the raw key.
    pub fn label(&self) -> String {
        let stamp = self
            .0
            .parse::<i64>()
            .ok()
            .and_then(|secs| Local.timestamp_opt(secs, 0).single());
        match stamp {
            Some(stamp) => format!("{} ({})", stamp.format("%Y-%m-%d %H:%M:%S"), self.0),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Revision {
    fn from(key: &str) -> Self {
        Revision::new(key)
    }
}

impl From<String> for Revision {
    fn from(key: String) -> Self {
        Revision::new(key)
    }
}

/// A checkout target: an explicit revision key, or a signed index into the
/// log's key order. Negative indexes count from the end, so `-1` is the
/// newest known revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevisionSpec {
    Key(Revision),
    Index(isize),
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionSpec::Key(revision) => write!(f, "{}", revision),
            RevisionSpec::Index(index) => write!(f, "index {}", index),
        }
    }
}

impl From<Revision> for RevisionSpec {
    fn from(revision: Revision) -> Self {
        RevisionSpec::Key(revision)
    }
}

impl From<&Revision> for RevisionSpec {
    fn from(revision: &Revision) -> Self {
        RevisionSpec::Key(revision.clone())
    }
}

impl From<&str> for RevisionSpec {
    fn from(key: &str) -> Self {
        RevisionSpec::Key(Revision::new(key))
    }
}

impl From<String> for RevisionSpec {
    fn from(key: String) -> Self {
        RevisionSpec::Key(Revision::new(key))
    }
}

impl From<isize> for RevisionSpec {
    fn from(index: isize) -> Self {
        RevisionSpec::Index(index)
    }
}

impl From<i32> for RevisionSpec {
    fn from(index: i32) -> Self {
        RevisionSpec::Index(index as isize)
    }
}
