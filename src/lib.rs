//! Reconstruct the historical state of a forum post and its comments at any
//! point in a linear revision history.
//!
//! A [`Capsule`] owns one post record and a growing set of comment records,
//! all materialized from immutable base snapshots plus append-only delta
//! logs pulled from a [`ChangeSource`]. Checkouts move every member to one
//! logical revision: advancing reuses the cached materialization, rewinding
//! rebuilds from the base.
//!
//! ```no_run
//! let mut capsule = timecapsule::open("42");
//! capsule.checkout(-1)?; // newest revision
//! let up = capsule.post()?.field("up")?.clone();
//! capsule.checkout(0)?; // back to the first revision
//! # Ok::<(), timecapsule::Error>(())
//! ```

mod capsule;
mod delta;
mod error;
mod record;
mod revision;
mod source;

pub use capsule::Capsule;
pub use delta::{DeltaLog, DeltaToken, FieldDelta, FieldMap, ParseDeltaError, RecordKind};
pub use error::Error;
pub use record::{RecordError, VersionedRecord};
pub use revision::{Revision, RevisionSpec};
pub use source::{
    BaseBundle, ChangeEntry, ChangeSource, SecondaryBundle, SecondaryChange, SourceError,
};
#[cfg(feature = "http")]
pub use source::{HttpChangeSource, DEFAULT_BASE_URL};

/// Open a lazy capsule for a post over the default HTTP change source.
///
/// No request is made until the first access.
#[cfg(feature = "http")]
pub fn open(post_id: impl Into<String>) -> Capsule<HttpChangeSource> {
    Capsule::open(post_id)
}
