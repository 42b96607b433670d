use std::collections::HashMap;

use crate::delta::FieldMap;
use crate::revision::Revision;

use super::error::SourceError;

/// Immutable starting state for a primary record, together with the
/// secondary records that already existed when tracking began.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseBundle {
    pub primary: FieldMap,
    pub secondaries: Vec<SecondaryBundle>,
}

/// One bundled secondary record's id and initial fields.
#[derive(Clone, Debug, PartialEq)]
pub struct SecondaryBundle {
    pub id: String,
    pub fields: FieldMap,
}

/// Everything that changed at one revision: the primary's raw delta plus the
/// per-id secondary deltas. A secondary absent from the map had no change.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEntry {
    pub revision: Revision,
    pub primary: String,
    pub secondaries: HashMap<String, SecondaryChange>,
}

/// Wire-level shape of one secondary's change at one revision.
#[derive(Clone, Debug, PartialEq)]
pub enum SecondaryChange {
    /// Full payload: the secondary came into existence here.
    Created(FieldMap),
    /// The secondary was removed here.
    Deleted,
    /// Raw positional field diff.
    Diff(String),
}

/// Where base snapshots and delta batches come from.
///
/// The engine only ever issues these two requests; transport, decoding and
/// caching live behind this seam.
pub trait ChangeSource {
    /// Fetch the base snapshot bundle for a record id.
    fn fetch_base(&self, record_id: &str) -> Result<BaseBundle, SourceError>;

    /// Fetch the change entries strictly newer than `watermark`, oldest
    /// first. `None` asks for the whole history.
    fn fetch_changes_since(
        &self,
        record_id: &str,
        watermark: Option<&Revision>,
    ) -> Result<Vec<ChangeEntry>, SourceError>;
}
