use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::delta::{DeltaLog, DeltaToken, FieldMap, RecordKind};
use crate::error::Error;
use crate::record::{RecordError, VersionedRecord};
use crate::revision::{Revision, RevisionSpec};
use crate::source::{BaseBundle, ChangeEntry, ChangeSource, SecondaryChange, SourceError};

/// One post and its comments, all checked out at one logical revision.
///
/// The capsule is lazy: constructing one performs no I/O. The first access
/// pulls the base snapshot and the change history, builds every record, and
/// checks out the newest revision. Later refreshes pull only revisions past
/// the watermark and fan newly discovered comments out of the stream.
pub struct Capsule<S> {
    source: S,
    post_id: String,
    // Placeholder until the first pull replaces it wholesale; unreachable
    // through the public surface before then.
    primary: VersionedRecord,
    secondaries: HashMap<String, VersionedRecord>,
    revisions: Vec<Revision>,
    watermark: Option<Revision>,
    current: Option<Revision>,
    initialized: bool,
}

/// Parsed, not-yet-committed outcome of one pull.
struct Extension {
    revisions: Vec<Revision>,
    primary_tokens: Vec<(Revision, DeltaToken)>,
    existing: HashMap<String, Vec<(Revision, DeltaToken)>>,
    discovered: Vec<NewSecondary>,
}

struct NewSecondary {
    id: String,
    base: FieldMap,
    tokens: Vec<(Revision, DeltaToken)>,
}

impl<S: ChangeSource> Capsule<S> {
    /// A lazy capsule over the given change source.
    pub fn with_source(post_id: impl Into<String>, source: S) -> Self {
        Capsule {
            source,
            post_id: post_id.into(),
            primary: VersionedRecord::new(
                RecordKind::Primary,
                FieldMap::new(),
                Arc::new(RwLock::new(DeltaLog::new())),
            ),
            secondaries: HashMap::new(),
            revisions: Vec::new(),
            watermark: None,
            current: None,
            initialized: false,
        }
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    fn ensure_initialized(&mut self) -> Result<(), Error> {
        if !self.initialized {
            self.refresh()?;
        }
        Ok(())
    }

    /// Pull revisions newer than the watermark and extend every member's
    /// delta log.
    ///
    /// Nothing is committed until the whole batch has been fetched and
    /// parsed: a failed pull leaves the capsule exactly as it was.
    pub fn refresh(&mut self) -> Result<(), Error> {
        let batch = self
            .source
            .fetch_changes_since(&self.post_id, self.watermark.as_ref())?;
        let first_pull = !self.initialized;
        if batch.is_empty() && !first_pull {
            return Ok(());
        }
        let bundle = if first_pull {
            Some(self.source.fetch_base(&self.post_id)?)
        } else {
            None
        };

        let extension = self.plan_extension(&batch, bundle.as_ref())?;
        let discovered: Vec<String> = extension
            .discovered
            .iter()
            .map(|secondary| secondary.id.clone())
            .collect();
        debug!(
            post_id = %self.post_id,
            pulled = batch.len(),
            discovered = discovered.len(),
            "extending delta logs"
        );
        self.commit_extension(extension, bundle);

        if first_pull {
            self.initialized = true;
            if !self.revisions.is_empty() {
                self.checkout(RevisionSpec::Index(-1))?;
            }
        } else if let Some(current) = self.current.clone() {
            // Comments discovered mid-stream join the aggregate at its
            // current checkout so every member stays on one revision.
            for id in &discovered {
                if let Some(record) = self.secondaries.get_mut(id) {
                    record.checkout(current.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Check every member out at the target revision.
    pub fn checkout(&mut self, target: impl Into<RevisionSpec>) -> Result<(), Error> {
        self.ensure_initialized()?;
        let spec = target.into();
        let target = self
            .resolve(&spec)
            .ok_or_else(|| Error::Record(RecordError::InvalidRevision(spec.to_string())))?;
        for record in self.secondaries.values_mut() {
            record.checkout(target.clone())?;
        }
        self.primary.checkout(target.clone())?;
        self.current = Some(target);
        Ok(())
    }

    /// The post record at the capsule's checkout.
    pub fn post(&mut self) -> Result<&VersionedRecord, Error> {
        self.ensure_initialized()?;
        Ok(&self.primary)
    }

    /// Every tracked comment record, keyed by id.
    pub fn comments(&mut self) -> Result<&HashMap<String, VersionedRecord>, Error> {
        self.ensure_initialized()?;
        Ok(&self.secondaries)
    }

    /// One comment record, if that id has been seen.
    pub fn comment(&mut self, id: &str) -> Result<Option<&VersionedRecord>, Error> {
        self.ensure_initialized()?;
        Ok(self.secondaries.get(id))
    }

    /// Timestamp label of the current checkout.
    pub fn version(&mut self) -> Result<String, Error> {
        self.ensure_initialized()?;
        Ok(self.primary.version_label())
    }

    /// The newest revision known to the capsule.
    pub fn latest_version(&mut self) -> Result<Option<Revision>, Error> {
        self.ensure_initialized()?;
        Ok(self.primary.latest_version())
    }

    /// The synchronization pointer every member was last checked out at.
    pub fn current_revision(&mut self) -> Result<Option<Revision>, Error> {
        self.ensure_initialized()?;
        Ok(self.current.clone())
    }

    /// Enumerated timestamp labels for every known revision.
    pub fn meta(&mut self) -> Result<Vec<(usize, String)>, Error> {
        self.ensure_initialized()?;
        Ok(self
            .revisions
            .iter()
            .enumerate()
            .map(|(index, revision)| (index, revision.label()))
            .collect())
    }

    fn resolve(&self, spec: &RevisionSpec) -> Option<Revision> {
        match spec {
            RevisionSpec::Key(revision) => self
                .revisions
                .contains(revision)
                .then(|| revision.clone()),
            RevisionSpec::Index(index) => {
                let len = self.revisions.len() as isize;
                let position = if *index < 0 { len + *index } else { *index };
                if (0..len).contains(&position) {
                    Some(self.revisions[position as usize].clone())
                } else {
                    None
                }
            }
        }
    }

    /// Turn a pulled batch into per-record token runs and new-record seeds.
    /// Pure with respect to the capsule: nothing is mutated here, so any
    /// parse failure aborts the refresh with the logs untouched.
    fn plan_extension(
        &self,
        batch: &[ChangeEntry],
        bundle: Option<&BaseBundle>,
    ) -> Result<Extension, Error> {
        let revisions: Vec<Revision> = batch.iter().map(|entry| entry.revision.clone()).collect();

        let mut primary_tokens = Vec::with_capacity(batch.len());
        for entry in batch {
            primary_tokens.push((
                entry.revision.clone(),
                DeltaToken::parse(&entry.primary, RecordKind::Primary)?,
            ));
        }

        // Every id this batch concerns: already tracked, bundled with the
        // base, or appearing in a payload for the first time.
        let mut ids: Vec<String> = self.secondaries.keys().cloned().collect();
        let mut bundled: HashMap<&str, &FieldMap> = HashMap::new();
        if let Some(bundle) = bundle {
            for secondary in &bundle.secondaries {
                bundled.insert(secondary.id.as_str(), &secondary.fields);
                if !ids.contains(&secondary.id) {
                    ids.push(secondary.id.clone());
                }
            }
        }
        for entry in batch {
            for id in entry.secondaries.keys() {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }

        let mut existing = HashMap::new();
        let mut discovered = Vec::new();
        // Ids tracked before any revision was pulled can only have come from
        // the base bundle, so they join the backfill below even when the
        // bundle itself was fetched on an earlier, empty pull.
        let stream_start = self.revisions.is_empty();
        for id in ids {
            let mut tokens = Vec::with_capacity(batch.len());
            let mut first_payload: Option<&FieldMap> = None;
            for entry in batch {
                let token = match entry.secondaries.get(&id) {
                    None => DeltaToken::NoOp,
                    Some(SecondaryChange::Created(payload)) => {
                        if first_payload.is_none() {
                            first_payload = Some(payload);
                        }
                        DeltaToken::Created
                    }
                    Some(SecondaryChange::Deleted) => DeltaToken::Deleted,
                    Some(SecondaryChange::Diff(raw)) => {
                        DeltaToken::parse(raw, RecordKind::Secondary)?
                    }
                };
                tokens.push((entry.revision.clone(), token));
            }

            // Bundled comments existed before tracking began: their first
            // observed revision doubles as their creation point unless the
            // payload already mentions them there.
            if bundled.contains_key(id.as_str())
                || (stream_start && self.secondaries.contains_key(&id))
            {
                if let Some((_, token)) = tokens.first_mut() {
                    if *token == DeltaToken::NoOp {
                        *token = DeltaToken::Created;
                    }
                }
            }

            if self.secondaries.contains_key(&id) {
                existing.insert(id, tokens);
            } else {
                let base = match bundled.get(id.as_str()) {
                    Some(fields) => (*fields).clone(),
                    None => match first_payload {
                        Some(payload) => payload.clone(),
                        None => {
                            return Err(Error::Source(SourceError::Decode(format!(
                                "comment {} appears without a full payload to seed from",
                                id
                            ))));
                        }
                    },
                };
                // Revisions that predate the first appearance read as no-ops.
                let mut padded: Vec<(Revision, DeltaToken)> = self
                    .revisions
                    .iter()
                    .map(|revision| (revision.clone(), DeltaToken::NoOp))
                    .collect();
                padded.extend(tokens);
                discovered.push(NewSecondary {
                    id,
                    base,
                    tokens: padded,
                });
            }
        }

        Ok(Extension {
            revisions,
            primary_tokens,
            existing,
            discovered,
        })
    }

    /// Commit a planned extension: replace or extend the primary, extend
    /// every tracked comment, construct the discovered ones, advance the
    /// watermark. Infallible by construction.
    fn commit_extension(&mut self, extension: Extension, bundle: Option<BaseBundle>) {
        let Extension {
            revisions,
            primary_tokens,
            existing,
            discovered,
        } = extension;

        match bundle {
            Some(bundle) => {
                let log = Arc::new(RwLock::new(DeltaLog::from_entries(primary_tokens)));
                self.primary = VersionedRecord::new(RecordKind::Primary, bundle.primary, log);
            }
            None => {
                let handle = self.primary.log_handle();
                handle
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .extend(primary_tokens);
            }
        }

        for (id, tokens) in existing {
            if let Some(record) = self.secondaries.get(&id) {
                let handle = record.log_handle();
                handle
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .extend(tokens);
            }
        }

        for secondary in discovered {
            let log = Arc::new(RwLock::new(DeltaLog::from_entries(secondary.tokens)));
            self.secondaries.insert(
                secondary.id,
                VersionedRecord::new(RecordKind::Secondary, secondary.base, log),
            );
        }

        self.revisions.extend(revisions);
        self.watermark = self.revisions.last().cloned();
    }
}

#[cfg(feature = "http")]
impl Capsule<crate::source::HttpChangeSource> {
    /// A lazy capsule over the default HTTP change source.
    pub fn open(post_id: impl Into<String>) -> Self {
        Capsule::with_source(post_id, crate::source::HttpChangeSource::default())
    }
}

impl<S> fmt::Display for Capsule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<capsule of post {}>", self.post_id)
    }
}

impl<S> fmt::Debug for Capsule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capsule")
            .field("post_id", &self.post_id)
            .field("initialized", &self.initialized)
            .field("revisions", &self.revisions.len())
            .field("comments", &self.secondaries.len())
            .finish()
    }
}
