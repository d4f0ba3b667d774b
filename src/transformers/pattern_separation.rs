//! Pattern separation (mnemonic similarity) task
//!
//! The learning phase shows objects with an encoding question; the recall phase
//! shows targets, similar lures and new foils and asks for an old/new rating on a
//! four-point scale. Recall trials are scored here.

use super::{Task, TaskTransformer};
use crate::error::CogError;
use crate::types::{Cell, TrialRecord, TrialRow};
use serde_json::Value;

const LEARNING_COLUMNS: &[&str] = &[
    "trial_index",
    "pic",
    "stimulus_type",
    "is_practice",
    "response",
    "response_time_ms",
];

const RECALL_COLUMNS: &[&str] = &[
    "trial_index",
    "pic",
    "stimulus_type",
    "is_practice",
    "response",
    "response_time_ms",
    "correct",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Learning,
    Recall,
}

pub struct PatternSeparation {
    phase: Phase,
}

impl PatternSeparation {
    pub fn new(phase: Phase) -> Self {
        Self { phase }
    }
}

impl TaskTransformer for PatternSeparation {
    fn task(&self) -> Task {
        match self.phase {
            Phase::Learning => Task::PatternSeparationLearning,
            Phase::Recall => Task::PatternSeparationRecall,
        }
    }

    fn columns(&self) -> &[&'static str] {
        match self.phase {
            Phase::Learning => LEARNING_COLUMNS,
            Phase::Recall => RECALL_COLUMNS,
        }
    }

    fn extract(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
        row.set("trial_index", Cell::from_optional(record.field("trial_index")));
        if !record.is_truthy("pic") {
            return Ok(());
        }

        let stimulus_type = record.str_field("type");
        let response = record.field("response").and_then(key_of);

        row.set("pic", Cell::from_optional(record.field("pic")));
        row.set("stimulus_type", Cell::from_optional(record.field("type")));
        row.set(
            "is_practice",
            record
                .field("isPractice")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        );
        row.set("response", Cell::from_optional(record.field("response")));
        row.set("response_time_ms", Cell::from_optional(record.field("rt")));

        if self.phase == Phase::Recall {
            let correct = match stimulus_type {
                Some(t) => score_recall(t, response.as_deref()),
                None => Cell::NotApplicable,
            };
            row.set("correct", correct);
        }
        Ok(())
    }
}

/// Keyboard responses are logged as strings, older exports as numbers
fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Score one recall response.
///
/// `1`/`2` mean old, `3`/`4` mean new. Targets should be called old, lures and foils
/// new. No response scores `False`; an unrecognized key or stimulus type scores `n/a`.
pub fn score_recall(stimulus_type: &str, response: Option<&str>) -> Cell {
    let expects_old = match stimulus_type.to_ascii_lowercase().as_str() {
        "target" => true,
        "lure" | "foil" => false,
        _ => return Cell::NotApplicable,
    };
    let Some(key) = response else {
        return Cell::Bool(false);
    };
    let said_old = match key.trim() {
        "1" | "2" => true,
        "3" | "4" => false,
        _ => return Cell::NotApplicable,
    };
    Cell::Bool(said_old == expects_old)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_recall() {
        assert_eq!(score_recall("Target", Some("1")), Cell::Bool(true));
        assert_eq!(score_recall("Target", Some("4")), Cell::Bool(false));
        assert_eq!(score_recall("Lure", Some("3")), Cell::Bool(true));
        assert_eq!(score_recall("Lure", Some("2")), Cell::Bool(false));
        assert_eq!(score_recall("Foil", Some("4")), Cell::Bool(true));
        assert_eq!(score_recall("Foil", None), Cell::Bool(false));
        assert_eq!(score_recall("Foil", Some("q")), Cell::NotApplicable);
        assert_eq!(score_recall("Unknown", Some("1")), Cell::NotApplicable);
    }

    #[test]
    fn test_recall_row() {
        let record = TrialRecord::from(json!({
            "results": {
                "trial_type": "image-keyboard-response",
                "trial_index": 9,
                "pic": "obj042b.jpg",
                "type": "Lure",
                "isRecall": true,
                "response": "2",
                "rt": 912
            }
        }));
        let mut row = TrialRow::new();
        PatternSeparation::new(Phase::Recall)
            .extract(&record, &mut row)
            .unwrap();
        assert_eq!(row.render("correct"), "False");
        assert_eq!(row.render("is_practice"), "False");
        assert_eq!(row.render("stimulus_type"), "Lure");
        assert_eq!(row.render("response_time_ms"), "912");
    }

    #[test]
    fn test_learning_row_has_no_score() {
        let record = TrialRecord::from(json!({
            "results": { "pic": "obj001a.jpg", "type": "Target", "isPractice": true, "response": null, "rt": null }
        }));
        let mut row = TrialRow::new();
        PatternSeparation::new(Phase::Learning)
            .extract(&record, &mut row)
            .unwrap();
        assert!(!row.contains("correct"));
        assert_eq!(row.render("is_practice"), "True");
        assert_eq!(row.render("response"), "n/a");
        assert_eq!(row.render("response_time_ms"), "n/a");
    }

    #[test]
    fn test_instruction_line_only_has_index() {
        let record = TrialRecord::from(json!({
            "results": { "trial_type": "html-keyboard-response", "trial_index": 1, "stimulus": "Press space" }
        }));
        let mut row = TrialRow::new();
        PatternSeparation::new(Phase::Recall)
            .extract(&record, &mut row)
            .unwrap();
        assert_eq!(row.len(), 1);
    }
}
