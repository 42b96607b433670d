use std::collections::HashMap;
use std::sync::RwLock;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::delta::FieldMap;
use crate::revision::Revision;

use super::error::SourceError;
use super::source::{BaseBundle, ChangeEntry, ChangeSource, SecondaryBundle, SecondaryChange};

/// Endpoint the convenience constructors point at.
pub const DEFAULT_BASE_URL: &str = "http://lgulife.furchain.xyz";

/// Blocking HTTP client for the change service.
///
/// Base bundles never change once served, so they are cached per record id
/// for the lifetime of the client. Change batches are not cached: the
/// capsule's watermark already guarantees each revision is fetched once.
pub struct HttpChangeSource {
    base_url: String,
    http: reqwest::blocking::Client,
    base_cache: RwLock<HashMap<String, BaseBundle>>,
}

impl HttpChangeSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpChangeSource {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::blocking::Client::new(),
            base_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for HttpChangeSource {
    fn default() -> Self {
        HttpChangeSource::new(DEFAULT_BASE_URL)
    }
}

impl ChangeSource for HttpChangeSource {
    fn fetch_base(&self, record_id: &str) -> Result<BaseBundle, SourceError> {
        {
            let cache = self
                .base_cache
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(bundle) = cache.get(record_id) {
                return Ok(bundle.clone());
            }
        }

        let url = format!("{}/base?post_id={}", self.base_url, record_id);
        let response = self.http.get(&url).send().map_err(transport)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(record_id.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Transport {
                status: Some(status.as_u16()),
                message: response.text().unwrap_or_default(),
            });
        }
        let payload: Value = response.json().map_err(transport)?;
        let bundle = decode_base(payload)?;
        debug!(
            record_id,
            comments = bundle.secondaries.len(),
            "fetched base snapshot"
        );
        self.base_cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(record_id.to_string(), bundle.clone());
        Ok(bundle)
    }

    fn fetch_changes_since(
        &self,
        record_id: &str,
        watermark: Option<&Revision>,
    ) -> Result<Vec<ChangeEntry>, SourceError> {
        let start = watermark.map(Revision::as_str).unwrap_or("");
        let url = format!(
            "{}/change?post_id={}&start={}",
            self.base_url, record_id, start
        );
        let response = self.http.get(&url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transport {
                status: Some(status.as_u16()),
                message: response.text().unwrap_or_default(),
            });
        }
        let payload: Value = response.json().map_err(transport)?;
        let entries = decode_changes(payload)?;
        debug!(record_id, start, pulled = entries.len(), "fetched change batch");
        Ok(entries)
    }
}

fn transport(err: reqwest::Error) -> SourceError {
    SourceError::Transport {
        status: err.status().map(|status| status.as_u16()),
        message: err.to_string(),
    }
}

#[derive(Deserialize)]
struct WireChanges {
    version: Vec<Value>,
    post: Vec<String>,
    comment: Vec<HashMap<String, Value>>,
}

fn revision_from(value: &Value) -> Result<Revision, SourceError> {
    match value {
        Value::String(key) => Ok(Revision::new(key.clone())),
        Value::Number(key) => Ok(Revision::new(key.to_string())),
        other => Err(SourceError::Decode(format!(
            "unsupported revision key {}",
            other
        ))),
    }
}

fn id_from(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Decode the `/base` payload: primary fields with the service's `_id`
/// renamed to `post_id`, plus the bundled comment payloads.
pub(crate) fn decode_base(payload: Value) -> Result<BaseBundle, SourceError> {
    let mut fields = match payload {
        Value::Object(fields) => fields,
        other => {
            return Err(SourceError::Decode(format!(
                "base payload is not an object: {}",
                other
            )))
        }
    };
    if let Some(id) = fields.remove("_id") {
        fields.insert("post_id".to_string(), id);
    }

    let mut secondaries = Vec::new();
    if let Some(bundled) = fields.remove("comment") {
        let items = match bundled {
            Value::Array(items) => items,
            other => {
                return Err(SourceError::Decode(format!(
                    "bundled comments are not a list: {}",
                    other
                )))
            }
        };
        for item in items {
            let comment_fields: FieldMap = match item {
                Value::Object(comment_fields) => comment_fields,
                other => {
                    return Err(SourceError::Decode(format!(
                        "bundled comment is not an object: {}",
                        other
                    )))
                }
            };
            let id = comment_fields
                .get("comment_id")
                .and_then(id_from)
                .ok_or_else(|| {
                    SourceError::Decode("bundled comment has no comment_id".to_string())
                })?;
            secondaries.push(SecondaryBundle {
                id,
                fields: comment_fields,
            });
        }
    }
    Ok(BaseBundle {
        primary: fields,
        secondaries,
    })
}

/// Decode the `/change` payload: parallel `version`/`post`/`comment` arrays
/// zipped into one entry per revision.
pub(crate) fn decode_changes(payload: Value) -> Result<Vec<ChangeEntry>, SourceError> {
    let wire: WireChanges =
        serde_json::from_value(payload).map_err(|err| SourceError::Decode(err.to_string()))?;
    if wire.post.len() != wire.version.len() || wire.comment.len() != wire.version.len() {
        return Err(SourceError::Decode(format!(
            "change arrays disagree: {} revisions, {} post deltas, {} comment maps",
            wire.version.len(),
            wire.post.len(),
            wire.comment.len()
        )));
    }

    let mut entries = Vec::with_capacity(wire.version.len());
    for ((revision, primary), comments) in wire.version.iter().zip(wire.post).zip(wire.comment) {
        let revision = revision_from(revision)?;
        let mut secondaries = HashMap::with_capacity(comments.len());
        for (id, change) in comments {
            let change = match change {
                Value::Object(fields) => SecondaryChange::Created(fields),
                Value::Null => SecondaryChange::Deleted,
                Value::String(raw) => SecondaryChange::Diff(raw),
                other => {
                    return Err(SourceError::Decode(format!(
                        "unsupported comment delta for {}: {}",
                        id, other
                    )))
                }
            };
            secondaries.insert(id, change);
        }
        entries.push(ChangeEntry {
            revision,
            primary,
            secondaries,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_base_renames_id_and_splits_comments() {
        let bundle = decode_base(json!({
            "_id": "42",
            "date": "2021-02-03",
            "up": 1,
            "comment": [
                {"comment_id": "c1", "up": 0, "hot": 0},
                {"comment_id": 7, "up": 2, "hot": 1},
            ],
        }))
        .unwrap();

        assert_eq!(bundle.primary["post_id"], json!("42"));
        assert!(bundle.primary.get("_id").is_none());
        assert!(bundle.primary.get("comment").is_none());
        assert_eq!(bundle.secondaries.len(), 2);
        assert_eq!(bundle.secondaries[0].id, "c1");
        assert_eq!(bundle.secondaries[1].id, "7");
        assert_eq!(bundle.secondaries[1].fields["up"], json!(2));
    }

    #[test]
    fn decode_base_requires_comment_ids() {
        let err = decode_base(json!({"_id": "42", "comment": [{"up": 0}]})).unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn decode_changes_zips_the_arrays() {
        let entries = decode_changes(json!({
            "version": ["100", 200],
            "post": [",,2,", ""],
            "comment": [
                {"c1": {"comment_id": "c1", "up": 0}},
                {"c1": ",1,,1,", "c2": null},
            ],
        }))
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].revision, Revision::from("100"));
        assert_eq!(entries[1].revision, Revision::from("200"));
        assert_eq!(entries[1].primary, "");
        assert!(matches!(
            entries[0].secondaries["c1"],
            SecondaryChange::Created(_)
        ));
        assert!(matches!(
            entries[1].secondaries["c1"],
            SecondaryChange::Diff(_)
        ));
        assert_eq!(entries[1].secondaries["c2"], SecondaryChange::Deleted);
    }

    #[test]
    fn decode_changes_rejects_mismatched_arrays() {
        let err = decode_changes(json!({
            "version": ["100"],
            "post": [],
            "comment": [],
        }))
        .unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn default_points_at_the_public_endpoint() {
        let source = HttpChangeSource::default();
        assert_eq!(source.base_url(), DEFAULT_BASE_URL);
        let trimmed = HttpChangeSource::new("http://example.test/");
        assert_eq!(trimmed.base_url(), "http://example.test");
    }
}
