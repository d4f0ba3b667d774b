//! Core types for cog-tabulate
//!
//! This module defines the data that flows through each stage: raw trial records
//! as logged by the experiment runtime, the scalar cells of a normalized row, and
//! the session split of the study design.

use crate::error::CogError;
use crate::NOT_APPLICABLE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Highest set number that belongs to the pre-intervention session.
pub const PRE_SESSION_MAX_SET: i64 = 6;

/// Columns every task file starts with, in output order.
///
/// `is_relevant` must stay at index 1: the combiner filters on that position.
pub const COMMON_COLUMNS: [&str; 6] = [
    "date_time",
    "is_relevant",
    "screen_size",
    "time_elapsed",
    "ua",
    "version",
];

/// One logged event from the experiment runtime.
///
/// Records arrive in two shapes: store exports nest the task payload under
/// `results`, while per-task JSON downloads carry every field at the top level.
/// [`TrialRecord::payload`] hides the difference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialRecord(Map<String, Value>);

impl TrialRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a record from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, CogError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CogError::MissingField(format!(
                "trial record must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Parse a JSON array of trial records.
    pub fn parse_array(json: &str) -> Result<Vec<TrialRecord>, CogError> {
        let records: Vec<TrialRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Top-level field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The task payload: the `results` sub-mapping when present, the record itself otherwise.
    pub fn payload(&self) -> &Map<String, Value> {
        match self.0.get("results") {
            Some(Value::Object(results)) => results,
            _ => &self.0,
        }
    }

    /// Payload field lookup.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload().get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    /// Whether a payload field is present and truthy (non-null, non-false, non-zero, non-empty).
    pub fn is_truthy(&self, key: &str) -> bool {
        self.field(key).map(is_truthy).unwrap_or(false)
    }

    /// `isRelevant`, read from the top level first and the payload second.
    pub fn is_relevant(&self) -> Option<bool> {
        self.0
            .get("isRelevant")
            .or_else(|| self.field("isRelevant"))
            .and_then(Value::as_bool)
    }

    pub fn set_num(&self) -> Option<i64> {
        self.field("setNum")
            .or_else(|| self.0.get("setNum"))
            .and_then(as_integer)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.0
            .get("userId")
            .or_else(|| self.field("userId"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Wall-clock timestamp: `dateTime`, or the date part of `experimentDateTime` (`<experiment>|<date>`).
    pub fn date_time(&self) -> Option<&str> {
        let direct = self
            .0
            .get("dateTime")
            .or_else(|| self.field("dateTime"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        direct.or_else(|| {
            self.0
                .get("experimentDateTime")
                .and_then(Value::as_str)
                .and_then(|s| s.split_once('|'))
                .map(|(_, date)| date)
        })
    }

    /// Set a top-level field.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Value> for TrialRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// Truthiness of a JSON value as the experiment runtime uses it for marker fields.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One scalar cell of a normalized row
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(Number),
    Bool(bool),
    /// Rendered as `n/a`; keeps rows a fixed width when a source field is missing.
    NotApplicable,
}

impl Cell {
    /// Convert a JSON value; `null` becomes [`Cell::NotApplicable`] and composites
    /// are stringified as compact JSON.
    pub fn from_json(value: &Value) -> Cell {
        match value {
            Value::Null => Cell::NotApplicable,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => Cell::Number(n.clone()),
            Value::String(s) => Cell::Text(s.clone()),
            composite => Cell::Text(composite.to_string()),
        }
    }

    /// Convert an optional JSON value, treating absence like `null`.
    pub fn from_optional(value: Option<&Value>) -> Cell {
        value.map(Cell::from_json).unwrap_or(Cell::NotApplicable)
    }

    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Cell::NotApplicable)
    }

    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(true) => "True".to_string(),
            Cell::Bool(false) => "False".to_string(),
            Cell::NotApplicable => NOT_APPLICABLE.to_string(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Number(Number::from(v))
    }
}

impl From<usize> for Cell {
    fn from(v: usize) -> Self {
        Cell::Number(Number::from(v))
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Number::from_f64(v)
            .map(Cell::Number)
            .unwrap_or(Cell::NotApplicable)
    }
}

/// A normalized, flat output row keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialRow {
    cells: HashMap<String, Cell>,
}

impl TrialRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, cell: impl Into<Cell>) {
        self.cells.insert(column.into(), cell.into());
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Render one column; columns this row does not carry render as an empty cell.
    pub fn render(&self, column: &str) -> String {
        self.cells.get(column).map(Cell::render).unwrap_or_default()
    }
}

/// Study session, derived purely from the set number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Pre,
    Post,
}

impl Session {
    pub const ALL: [Session; 2] = [Session::Pre, Session::Post];

    /// Sets 1 through 6 are pre-intervention, 7 and above post-intervention.
    pub fn from_set_num(set_num: i64) -> Self {
        if set_num <= PRE_SESSION_MAX_SET {
            Session::Pre
        } else {
            Session::Post
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Pre => "pre",
            Session::Post => "post",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Session {
    type Err = CogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre" => Ok(Session::Pre),
            "post" => Ok(Session::Post),
            other => Err(CogError::InvalidSession(other.to_string())),
        }
    }
}

/// Device details reported by a run's end sentinel
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub ua: Cell,
    pub version: Cell,
    pub screen_size: Cell,
}

impl DeviceInfo {
    /// Read `ua`, `v` and `screen` from an end-sentinel record.
    pub fn from_record(record: &TrialRecord) -> Self {
        Self {
            ua: Cell::from_optional(record.field("ua")),
            version: Cell::from_optional(record.field("v")),
            screen_size: Cell::from_optional(record.field("screen")),
        }
    }

    /// Stamp the device columns onto a row.
    pub fn apply(&self, row: &mut TrialRow) {
        row.set("ua", self.ua.clone());
        row.set("version", self.version.clone());
        row.set("screen_size", self.screen_size.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_boundary() {
        assert_eq!(Session::from_set_num(1), Session::Pre);
        assert_eq!(Session::from_set_num(6), Session::Pre);
        assert_eq!(Session::from_set_num(7), Session::Post);
        assert_eq!(Session::from_set_num(12), Session::Post);
    }

    #[test]
    fn test_session_parse() {
        assert_eq!("pre".parse::<Session>().unwrap(), Session::Pre);
        assert_eq!("post".parse::<Session>().unwrap(), Session::Post);
        assert!("mid".parse::<Session>().is_err());
    }

    #[test]
    fn test_payload_prefers_results() {
        let nested = TrialRecord::from(json!({
            "isRelevant": true,
            "results": { "trial_type": "survey-likert", "rt": 1200 }
        }));
        assert_eq!(nested.str_field("trial_type"), Some("survey-likert"));
        assert_eq!(nested.is_relevant(), Some(true));

        let flat = TrialRecord::from(json!({ "trial_type": "preload", "isRelevant": false }));
        assert_eq!(flat.str_field("trial_type"), Some("preload"));
        assert_eq!(flat.is_relevant(), Some(false));
    }

    #[test]
    fn test_date_time_from_experiment_key() {
        let record = TrialRecord::from(json!({
            "experimentDateTime": "panas|2023-03-01T10:00:00.000Z"
        }));
        assert_eq!(record.date_time(), Some("2023-03-01T10:00:00.000Z"));

        let direct = TrialRecord::from(json!({ "dateTime": "2023-03-01T11:00:00Z" }));
        assert_eq!(direct.date_time(), Some("2023-03-01T11:00:00Z"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("Mozilla/5.0")));
        assert!(is_truthy(&json!(true)));
    }

    #[test]
    fn test_cell_rendering() {
        assert_eq!(Cell::from(false).render(), "False");
        assert_eq!(Cell::from(true).render(), "True");
        assert_eq!(Cell::from_json(&json!(null)).render(), NOT_APPLICABLE);
        assert_eq!(Cell::from_json(&json!(1200)).render(), "1200");
        assert_eq!(Cell::from_json(&json!(["a", "b"])).render(), r#"["a","b"]"#);
        assert_eq!(Cell::from(f64::NAN), Cell::NotApplicable);
    }

    #[test]
    fn test_row_renders_absent_column_empty() {
        let mut row = TrialRow::new();
        row.set("trial_index", 3i64);
        assert_eq!(row.render("trial_index"), "3");
        assert_eq!(row.render("stimulus"), "");
    }

    #[test]
    fn test_set_num_accepts_strings() {
        let record = TrialRecord::from(json!({ "results": { "setNum": "7" } }));
        assert_eq!(record.set_num(), Some(7));
    }
}
