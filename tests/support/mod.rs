use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use timecapsule::{
    BaseBundle, ChangeEntry, ChangeSource, FieldMap, Revision, SecondaryBundle, SecondaryChange,
    SourceError,
};

pub fn fields(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

pub fn bundle(primary: Value, comments: &[(&str, Value)]) -> BaseBundle {
    BaseBundle {
        primary: fields(primary),
        secondaries: comments
            .iter()
            .map(|(id, comment)| SecondaryBundle {
                id: id.to_string(),
                fields: fields(comment.clone()),
            })
            .collect(),
    }
}

pub fn entry(revision: &str, primary: &str, comments: &[(&str, Value)]) -> ChangeEntry {
    let mut secondaries = HashMap::new();
    for (id, change) in comments {
        let change = match change.clone() {
            Value::Object(payload) => SecondaryChange::Created(payload),
            Value::Null => SecondaryChange::Deleted,
            Value::String(raw) => SecondaryChange::Diff(raw),
            other => panic!("unsupported scripted change: {}", other),
        };
        secondaries.insert(id.to_string(), change);
    }
    ChangeEntry {
        revision: Revision::from(revision),
        primary: primary.to_string(),
        secondaries,
    }
}

struct Script {
    post_id: String,
    base: BaseBundle,
    entries: Vec<ChangeEntry>,
    fail_next_pull: bool,
    pulls: usize,
    last_start: Option<Revision>,
}

/// In-memory change source driven by a pre-written history. Tests keep a
/// clone to extend the script or observe the pulls the capsule makes.
#[derive(Clone)]
pub struct ScriptedSource {
    script: Rc<RefCell<Script>>,
}

impl ScriptedSource {
    pub fn new(post_id: &str, base: BaseBundle, entries: Vec<ChangeEntry>) -> Self {
        ScriptedSource {
            script: Rc::new(RefCell::new(Script {
                post_id: post_id.to_string(),
                base,
                entries,
                fail_next_pull: false,
                pulls: 0,
                last_start: None,
            })),
        }
    }

    pub fn push_entry(&self, entry: ChangeEntry) {
        self.script.borrow_mut().entries.push(entry);
    }

    pub fn fail_next_pull(&self) {
        self.script.borrow_mut().fail_next_pull = true;
    }

    pub fn pulls(&self) -> usize {
        self.script.borrow().pulls
    }

    pub fn last_start(&self) -> Option<Revision> {
        self.script.borrow().last_start.clone()
    }
}

impl ChangeSource for ScriptedSource {
    fn fetch_base(&self, record_id: &str) -> Result<BaseBundle, SourceError> {
        let script = self.script.borrow();
        if record_id != script.post_id {
            return Err(SourceError::NotFound(record_id.to_string()));
        }
        Ok(script.base.clone())
    }

    fn fetch_changes_since(
        &self,
        record_id: &str,
        watermark: Option<&Revision>,
    ) -> Result<Vec<ChangeEntry>, SourceError> {
        let mut script = self.script.borrow_mut();
        script.pulls += 1;
        script.last_start = watermark.cloned();
        if script.fail_next_pull {
            script.fail_next_pull = false;
            return Err(SourceError::Transport {
                status: Some(500),
                message: "scripted failure".to_string(),
            });
        }
        if record_id != script.post_id {
            return Err(SourceError::NotFound(record_id.to_string()));
        }
        let start = match watermark {
            None => 0,
            Some(mark) => match script
                .entries
                .iter()
                .position(|entry| &entry.revision == mark)
            {
                Some(position) => position + 1,
                None => 0,
            },
        };
        Ok(script.entries[start..].to_vec())
    }
}
