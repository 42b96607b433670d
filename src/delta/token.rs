use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name to value mapping for one materialized record.
pub type FieldMap = serde_json::Map<String, Value>;

/// Which lifecycle and diff layout a record follows.
///
/// Primary records (posts) exist for their whole history and their diffs
/// carry a view counter. Secondary records (comments) are created and
/// deleted by lifecycle markers and their diffs carry the hot counter and
/// reply target instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Primary,
    Secondary,
}

impl RecordKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            RecordKind::Primary => "post",
            RecordKind::Secondary => "comment",
        }
    }
}

/// Error for a field-diff payload that does not match its layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseDeltaError {
    pub raw: String,
    pub reason: String,
}

impl fmt::Display for ParseDeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed delta token `{}`: {}", self.raw, self.reason)
    }
}

impl std::error::Error for ParseDeltaError {}

/// One record's change at one revision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DeltaToken {
    /// Nothing happened to the record at this revision.
    NoOp,
    /// The record came into existence at this revision. Only secondary
    /// records carry this marker; a primary exists from its first revision.
    Created,
    /// The record ceased to exist at this revision and onward.
    Deleted,
    /// Field changes to apply on top of the previous materialization.
    Diff(FieldDelta),
}

impl DeltaToken {
    /// Classify a wire value into one of the four token shapes: null is a
    /// deletion, boolean true or a full payload object is a creation, the
    /// empty string is a no-op, any other string is a field diff.
    pub fn from_wire(value: &Value, kind: RecordKind) -> Result<DeltaToken, ParseDeltaError> {
        match value {
            Value::Null => Ok(DeltaToken::Deleted),
            Value::Bool(true) => Ok(DeltaToken::Created),
            Value::Object(_) => Ok(DeltaToken::Created),
            Value::String(raw) => DeltaToken::parse(raw, kind),
            other => Err(ParseDeltaError {
                raw: other.to_string(),
                reason: "unsupported wire shape".to_string(),
            }),
        }
    }

    /// Parse a raw token string: empty means no-op, anything else must be a
    /// well-formed positional diff for the given kind.
    pub fn parse(raw: &str, kind: RecordKind) -> Result<DeltaToken, ParseDeltaError> {
        if raw.is_empty() {
            return Ok(DeltaToken::NoOp);
        }
        FieldDelta::parse(raw, kind).map(DeltaToken::Diff)
    }
}

/// Parsed field-diff payload.
///
/// Every field is optional: an absent sub-field means the value is unchanged
/// at this revision, which is not the same as a zero diff.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub date: Option<String>,
    pub view: Option<i64>,
    pub up: Option<i64>,
    pub down: Option<i64>,
    pub hot: Option<i64>,
    pub reply_to: Option<String>,
}

impl FieldDelta {
    /// Parse the comma-separated positional payload for the given kind.
    ///
    /// Primary layout: `date,view,up,down`. Secondary layout:
    /// `date,up,down,hot,reply_to`.
    pub fn parse(raw: &str, kind: RecordKind) -> Result<FieldDelta, ParseDeltaError> {
        let parts: Vec<&str> = raw.split(',').collect();
        match kind {
            RecordKind::Primary => {
                let [date, view, up, down] = expect_fields::<4>(raw, &parts)?;
                Ok(FieldDelta {
                    date: non_empty(date),
                    view: parse_diff(raw, view)?,
                    up: parse_diff(raw, up)?,
                    down: parse_diff(raw, down)?,
                    ..FieldDelta::default()
                })
            }
            RecordKind::Secondary => {
                let [date, up, down, hot, reply_to] = expect_fields::<5>(raw, &parts)?;
                Ok(FieldDelta {
                    date: non_empty(date),
                    up: parse_diff(raw, up)?,
                    down: parse_diff(raw, down)?,
                    hot: parse_diff(raw, hot)?,
                    reply_to: non_empty(reply_to),
                    ..FieldDelta::default()
                })
            }
        }
    }

    /// Apply this diff to a materialized field map.
    ///
    /// Dates and reply targets replace, counters accumulate. The hot counter
    /// accumulates and is stored back as its truthiness: the field reads as
    /// a boolean even though the diffs are signed integers.
    pub fn apply(&self, fields: &mut FieldMap) {
        if let Some(date) = &self.date {
            fields.insert("date".to_string(), Value::from(date.clone()));
        }
        if let Some(reply_to) = &self.reply_to {
            fields.insert("reply_to".to_string(), Value::from(reply_to.clone()));
        }
        for (name, diff) in [("view", self.view), ("up", self.up), ("down", self.down)] {
            if let Some(diff) = diff {
                let current = fields.get(name).and_then(Value::as_i64).unwrap_or(0);
                fields.insert(name.to_string(), Value::from(current + diff));
            }
        }
        if let Some(diff) = self.hot {
            let current = match fields.get("hot") {
                Some(Value::Bool(hot)) => *hot as i64,
                Some(value) => value.as_i64().unwrap_or(0),
                None => 0,
            };
            fields.insert("hot".to_string(), Value::from(current + diff != 0));
        }
    }
}

fn expect_fields<'a, const N: usize>(
    raw: &str,
    parts: &[&'a str],
) -> Result<[&'a str; N], ParseDeltaError> {
    <[&'a str; N]>::try_from(parts).map_err(|_| ParseDeltaError {
        raw: raw.to_string(),
        reason: format!("expected {} fields, got {}", N, parts.len()),
    })
}

fn non_empty(part: &str) -> Option<String> {
    if part.is_empty() {
        None
    } else {
        Some(part.to_string())
    }
}

fn parse_diff(raw: &str, part: &str) -> Result<Option<i64>, ParseDeltaError> {
    if part.is_empty() {
        return Ok(None);
    }
    part.parse::<i64>().map(Some).map_err(|_| ParseDeltaError {
        raw: raw.to_string(),
        reason: format!("`{}` is not a signed integer", part),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {}", other),
        }
    }

    #[test]
    fn classify_wire_shapes() {
        let kind = RecordKind::Secondary;
        assert_eq!(
            DeltaToken::from_wire(&Value::Null, kind).unwrap(),
            DeltaToken::Deleted
        );
        assert_eq!(
            DeltaToken::from_wire(&json!(true), kind).unwrap(),
            DeltaToken::Created
        );
        assert_eq!(
            DeltaToken::from_wire(&json!({"comment_id": "c1"}), kind).unwrap(),
            DeltaToken::Created
        );
        assert_eq!(
            DeltaToken::from_wire(&json!(""), kind).unwrap(),
            DeltaToken::NoOp
        );
        assert!(matches!(
            DeltaToken::from_wire(&json!(",1,,-2,"), kind).unwrap(),
            DeltaToken::Diff(_)
        ));
        assert!(DeltaToken::from_wire(&json!(7), kind).is_err());
    }

    #[test]
    fn parse_primary_layout() {
        let token = DeltaToken::parse("2021-02-03,5,2,", RecordKind::Primary).unwrap();
        assert_eq!(
            token,
            DeltaToken::Diff(FieldDelta {
                date: Some("2021-02-03".to_string()),
                view: Some(5),
                up: Some(2),
                down: None,
                ..FieldDelta::default()
            })
        );
    }

    #[test]
    fn parse_secondary_layout() {
        let token = DeltaToken::parse(",1,,-1,c9", RecordKind::Secondary).unwrap();
        assert_eq!(
            token,
            DeltaToken::Diff(FieldDelta {
                up: Some(1),
                hot: Some(-1),
                reply_to: Some("c9".to_string()),
                ..FieldDelta::default()
            })
        );
    }

    #[test]
    fn empty_subfields_mean_unchanged() {
        let token = DeltaToken::parse(",,,", RecordKind::Primary).unwrap();
        assert_eq!(token, DeltaToken::Diff(FieldDelta::default()));
    }

    #[test]
    fn wrong_field_count_fails() {
        let err = FieldDelta::parse(",,", RecordKind::Primary).unwrap_err();
        assert!(err.reason.contains("expected 4 fields"));
        let err = FieldDelta::parse(",,,", RecordKind::Secondary).unwrap_err();
        assert!(err.reason.contains("expected 5 fields"));
    }

    #[test]
    fn non_numeric_diff_fails() {
        let err = FieldDelta::parse(",x,,", RecordKind::Primary).unwrap_err();
        assert!(err.reason.contains("not a signed integer"));
    }

    #[test]
    fn counters_accumulate() {
        let mut fields = map(json!({"up": 1, "down": 0, "view": 10}));
        FieldDelta::parse(",3,2,-1", RecordKind::Primary)
            .unwrap()
            .apply(&mut fields);
        assert_eq!(fields["view"], json!(13));
        assert_eq!(fields["up"], json!(3));
        assert_eq!(fields["down"], json!(-1));
    }

    #[test]
    fn date_and_reply_target_replace() {
        let mut fields = map(json!({"date": "old", "reply_to": "c1"}));
        FieldDelta::parse("new,,,,c2", RecordKind::Secondary)
            .unwrap()
            .apply(&mut fields);
        assert_eq!(fields["date"], json!("new"));
        assert_eq!(fields["reply_to"], json!("c2"));
    }

    #[test]
    fn hot_counter_reads_back_as_boolean() {
        let mut fields = map(json!({"hot": 0}));
        FieldDelta::parse(",,,1,", RecordKind::Secondary)
            .unwrap()
            .apply(&mut fields);
        assert_eq!(fields["hot"], json!(true));
        FieldDelta::parse(",,,1,", RecordKind::Secondary)
            .unwrap()
            .apply(&mut fields);
        assert_eq!(fields["hot"], json!(true));
        FieldDelta::parse(",,,-1,", RecordKind::Secondary)
            .unwrap()
            .apply(&mut fields);
        assert_eq!(fields["hot"], json!(false));
    }
}
