use crate::revision::{Revision, RevisionSpec};

use super::token::DeltaToken;

/// Append-only, insertion-ordered mapping of revision to delta token.
///
/// Insertion order is chronological order, so positions in the log double as
/// the merge order for checkout.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeltaLog {
    entries: Vec<(Revision, DeltaToken)>,
}

impl DeltaLog {
    pub fn new() -> Self {
        DeltaLog::default()
    }

    pub fn from_entries(entries: Vec<(Revision, DeltaToken)>) -> Self {
        DeltaLog { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Revision, DeltaToken)] {
        &self.entries
    }

    /// Append a token for the next revision in arrival order.
    pub fn push(&mut self, revision: Revision, token: DeltaToken) {
        self.entries.push((revision, token));
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (Revision, DeltaToken)>) {
        self.entries.extend(entries);
    }

    pub fn position(&self, revision: &Revision) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == revision)
    }

    pub fn revisions(&self) -> impl Iterator<Item = &Revision> {
        self.entries.iter().map(|(revision, _)| revision)
    }

    pub fn first_revision(&self) -> Option<&Revision> {
        self.entries.first().map(|(revision, _)| revision)
    }

    pub fn last_revision(&self) -> Option<&Revision> {
        self.entries.last().map(|(revision, _)| revision)
    }

    /// Resolve a checkout target to its position and key. Index targets are
    /// Python-style: negative counts back from the newest revision.
    pub fn resolve(&self, spec: &RevisionSpec) -> Option<(usize, &Revision)> {
        match spec {
            RevisionSpec::Key(revision) => {
                let position = self.position(revision)?;
                Some((position, &self.entries[position].0))
            }
            RevisionSpec::Index(index) => {
                let len = self.entries.len() as isize;
                let position = if *index < 0 { len + *index } else { *index };
                if (0..len).contains(&position) {
                    let position = position as usize;
                    Some((position, &self.entries[position].0))
                } else {
                    None
                }
            }
        }
    }

    /// Tokens from the start of history through `position`, inclusive.
    pub fn through(&self, position: usize) -> &[(Revision, DeltaToken)] {
        &self.entries[..=position]
    }

    /// Tokens strictly after `position`, through `through` inclusive.
    pub fn between(&self, position: usize, through: usize) -> &[(Revision, DeltaToken)] {
        &self.entries[position + 1..=through]
    }

    /// First revision carrying a created marker.
    pub fn created_marker(&self) -> Option<&Revision> {
        self.entries
            .iter()
            .find(|(_, token)| matches!(token, DeltaToken::Created))
            .map(|(revision, _)| revision)
    }

    /// Position of the first deleted marker.
    pub fn deleted_position(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|(_, token)| matches!(token, DeltaToken::Deleted))
    }

    /// First revision carrying a deleted marker.
    pub fn deleted_marker(&self) -> Option<&Revision> {
        self.deleted_position()
            .map(|position| &self.entries[position].0)
    }

    /// Last revision before the first deleted marker, or the last revision
    /// outright when nothing was deleted.
    pub fn last_live_revision(&self) -> Option<&Revision> {
        match self.deleted_position() {
            Some(0) => None,
            Some(position) => Some(&self.entries[position - 1].0),
            None => self.last_revision(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeltaLog {
        DeltaLog::from_entries(vec![
            (Revision::from("10"), DeltaToken::Created),
            (Revision::from("20"), DeltaToken::NoOp),
            (Revision::from("30"), DeltaToken::Deleted),
            (Revision::from("40"), DeltaToken::NoOp),
        ])
    }

    #[test]
    fn new() {
        let log = DeltaLog::new();
        assert!(log.is_empty());
        assert_eq!(log.first_revision(), None);
        assert_eq!(log.last_live_revision(), None);
    }

    #[test]
    fn resolve_key() {
        let log = sample();
        let (position, revision) = log.resolve(&RevisionSpec::from("20")).unwrap();
        assert_eq!(position, 1);
        assert_eq!(revision, &Revision::from("20"));
        assert!(log.resolve(&RevisionSpec::from("99")).is_none());
    }

    #[test]
    fn resolve_index() {
        let log = sample();
        assert_eq!(log.resolve(&RevisionSpec::Index(0)).unwrap().0, 0);
        assert_eq!(log.resolve(&RevisionSpec::Index(-1)).unwrap().0, 3);
        assert_eq!(log.resolve(&RevisionSpec::Index(-4)).unwrap().0, 0);
        assert!(log.resolve(&RevisionSpec::Index(4)).is_none());
        assert!(log.resolve(&RevisionSpec::Index(-5)).is_none());
    }

    #[test]
    fn ranges() {
        let log = sample();
        assert_eq!(log.through(1).len(), 2);
        assert_eq!(log.between(1, 3).len(), 2);
        assert_eq!(log.between(2, 3).len(), 1);
    }

    #[test]
    fn markers() {
        let log = sample();
        assert_eq!(log.created_marker(), Some(&Revision::from("10")));
        assert_eq!(log.deleted_marker(), Some(&Revision::from("30")));
        assert_eq!(log.last_live_revision(), Some(&Revision::from("20")));
    }

    #[test]
    fn deletion_at_first_revision_has_no_live_revision() {
        let log = DeltaLog::from_entries(vec![(Revision::from("10"), DeltaToken::Deleted)]);
        assert_eq!(log.last_live_revision(), None);
    }

    #[test]
    fn extend_keeps_order() {
        let mut log = sample();
        log.extend(vec![(Revision::from("50"), DeltaToken::NoOp)]);
        assert_eq!(log.last_revision(), Some(&Revision::from("50")));
        assert_eq!(log.len(), 5);
    }
}
