use std::cell::OnceCell;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde_json::Value;
use tracing::trace;

use crate::delta::{DeltaLog, DeltaToken, FieldMap, RecordKind};
use crate::revision::{Revision, RevisionSpec};

use super::error::RecordError;

/// A record materialized from an immutable base snapshot plus a prefix of
/// its delta log.
///
/// The record can be checked out at any revision appearing in the log. A
/// single-slot cache keeps the last materialization, so advancing to a newer
/// revision only merges the tokens in between; rewinding rebuilds from the
/// base, since counter deltas and the deletion short-circuit are not
/// invertible.
pub struct VersionedRecord {
    kind: RecordKind,
    base: FieldMap,
    log: Arc<RwLock<DeltaLog>>,
    current: Option<Revision>,
    cache: FieldMap,
    // Lifecycle markers never move once written, so each is memoized the
    // first time a scan finds it.
    created_memo: OnceCell<Revision>,
    deleted_memo: OnceCell<Revision>,
    last_live_memo: OnceCell<Revision>,
}

impl VersionedRecord {
    pub(crate) fn new(kind: RecordKind, base: FieldMap, log: Arc<RwLock<DeltaLog>>) -> Self {
        let cache = base.clone();
        VersionedRecord {
            kind,
            base,
            log,
            current: None,
            cache,
            created_memo: OnceCell::new(),
            deleted_memo: OnceCell::new(),
            last_live_memo: OnceCell::new(),
        }
    }

    pub(crate) fn log_handle(&self) -> Arc<RwLock<DeltaLog>> {
        Arc::clone(&self.log)
    }

    fn log(&self) -> RwLockReadGuard<'_, DeltaLog> {
        // A poisoned lock only means a writer panicked mid-append; the
        // entries already there are still readable.
        self.log.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn current_revision(&self) -> Option<&Revision> {
        self.current.as_ref()
    }

    /// Reposition the record at `target`.
    ///
    /// Advancing merges only the tokens between the cached revision and the
    /// target. Rewinding rebuilds from the base snapshot: there is no cheap
    /// path backward.
    pub fn checkout(&mut self, target: impl Into<RevisionSpec>) -> Result<(), RecordError> {
        let spec = target.into();
        let handle = Arc::clone(&self.log);
        let log = handle.read().unwrap_or_else(|poisoned| poisoned.into_inner());

        let (target_position, target) = match log.resolve(&spec) {
            Some((position, revision)) => (position, revision.clone()),
            None => return Err(RecordError::InvalidRevision(spec.to_string())),
        };
        if self.current.as_ref() == Some(&target) {
            return Ok(());
        }

        let current_position = self
            .current
            .as_ref()
            .and_then(|current| log.position(current));
        match current_position {
            Some(position) if position < target_position => {
                trace!(kind = self.kind.as_str(), from = position, to = target_position, "advancing checkout");
                // Once the checkout sits at or past the deletion point the
                // cache is frozen; later tokens carry nothing for this record.
                let deleted = log.deleted_position();
                if deleted.map_or(true, |deleted| position < deleted) {
                    merge(&mut self.cache, log.between(position, target_position));
                }
            }
            _ => {
                trace!(kind = self.kind.as_str(), to = target_position, "rebuilding checkout from base");
                let mut fields = self.base.clone();
                merge(&mut fields, log.through(target_position));
                self.cache = fields;
            }
        }
        self.current = Some(target);
        Ok(())
    }

    /// Read one field of the materialized record at the current checkout.
    pub fn field(&self, name: &str) -> Result<&Value, RecordError> {
        if self.is_deleted() {
            return Err(RecordError::AlreadyDeleted {
                last_live: self.latest_version(),
            });
        }
        if !self.is_created() {
            return Err(RecordError::NotYetCreated {
                created_at: self.created_at(),
            });
        }
        self.cache
            .get(name)
            .ok_or_else(|| RecordError::UnknownField(name.to_string()))
    }

    /// Materialized records are read-only projections; every direct write is
    /// rejected. State moves by merging delta tokens.
    pub fn set_field(&self, _name: &str, _value: Value) -> Result<(), RecordError> {
        Err(RecordError::ReadOnly(self.kind.as_str()))
    }

    /// Owned copy of the materialized fields at the current checkout.
    pub fn to_map(&self) -> FieldMap {
        self.cache.clone()
    }

    /// A sibling record over the same delta log, checked out wherever this
    /// one is.
    pub fn fork(&self) -> Result<VersionedRecord, RecordError> {
        let mut copy = VersionedRecord::new(self.kind, self.base.clone(), self.log_handle());
        if let Some(current) = self.current.clone() {
            copy.checkout(current)?;
        }
        Ok(copy)
    }

    /// The revision where the record came into existence: the first revision
    /// in the log for a primary, the first created marker for a secondary.
    pub fn created_at(&self) -> Option<Revision> {
        if let Some(found) = self.created_memo.get() {
            return Some(found.clone());
        }
        let found = {
            let log = self.log();
            match self.kind {
                RecordKind::Primary => log.first_revision().cloned(),
                RecordKind::Secondary => log.created_marker().cloned(),
            }
        }?;
        let _ = self.created_memo.set(found.clone());
        Some(found)
    }

    /// The revision where the record ceased to exist, if any. Primaries are
    /// never deleted.
    pub fn deleted_at(&self) -> Option<Revision> {
        if self.kind == RecordKind::Primary {
            return None;
        }
        if let Some(found) = self.deleted_memo.get() {
            return Some(found.clone());
        }
        let found = self.log().deleted_marker().cloned()?;
        let _ = self.deleted_memo.set(found.clone());
        Some(found)
    }

    /// The newest revision at which the record still exists: the revision
    /// just before the deleted marker, or the last revision outright.
    pub fn latest_version(&self) -> Option<Revision> {
        if let Some(found) = self.last_live_memo.get() {
            return Some(found.clone());
        }
        let log = self.log();
        let found = log.last_live_revision().cloned()?;
        if log.deleted_position().is_some() {
            let _ = self.last_live_memo.set(found.clone());
        }
        Some(found)
    }

    pub fn is_created(&self) -> bool {
        match self.kind {
            RecordKind::Primary => true,
            RecordKind::Secondary => match (&self.current, self.created_at()) {
                (Some(current), Some(created)) => *current >= created,
                _ => false,
            },
        }
    }

    pub fn is_deleted(&self) -> bool {
        match self.kind {
            RecordKind::Primary => false,
            RecordKind::Secondary => match (&self.current, self.deleted_at()) {
                (Some(current), Some(deleted)) => *current >= deleted,
                _ => false,
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_created() && !self.is_deleted()
    }

    /// Timestamp label of the current checkout, flagged when the record does
    /// not exist there.
    pub fn version_label(&self) -> String {
        let label = match &self.current {
            Some(revision) => revision.label(),
            None => "(unversioned)".to_string(),
        };
        if self.is_valid() {
            label
        } else {
            format!("[invalid] {}", label)
        }
    }
}

impl fmt::Debug for VersionedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedRecord")
            .field("kind", &self.kind)
            .field("current", &self.current)
            .field("fields", &self.cache.len())
            .finish()
    }
}

impl fmt::Display for VersionedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_deleted() {
            let since = self
                .deleted_at()
                .map(|revision| revision.label())
                .unwrap_or_default();
            write!(f, "[deleted since {}]", since)
        } else if !self.is_created() {
            let until = self
                .created_at()
                .map(|revision| revision.label())
                .unwrap_or_default();
            write!(f, "[not created until {}]", until)
        } else {
            write!(f, "{}", Value::Object(self.cache.clone()))
        }
    }
}

/// Apply an ordered run of tokens to a field map. A deleted marker ends the
/// record's history: everything after it is ignored.
fn merge(fields: &mut FieldMap, tokens: &[(Revision, DeltaToken)]) {
    for (_, token) in tokens {
        match token {
            DeltaToken::NoOp | DeltaToken::Created => {}
            DeltaToken::Deleted => return,
            DeltaToken::Diff(delta) => delta.apply(fields),
        }
    }
}
