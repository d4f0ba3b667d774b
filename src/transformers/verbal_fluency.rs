//! Letter fluency task: name as many words starting with a letter as possible

use super::{Task, TaskTransformer};
use crate::error::CogError;
use crate::types::{Cell, TrialRecord, TrialRow};
use serde_json::Value;

pub struct VerbalFluency;

impl TaskTransformer for VerbalFluency {
    fn task(&self) -> Task {
        Task::VerbalFluency
    }

    fn columns(&self) -> &[&'static str] {
        &["letter", "response", "word_count", "response_time_ms"]
    }

    fn extract(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
        row.set("letter", Cell::from_optional(record.field("letter")));
        row.set("response_time_ms", Cell::from_optional(record.field("rt")));
        match record.field("response") {
            Some(Value::String(text)) => {
                row.set("response", text.as_str());
                row.set("word_count", count_words(text));
            }
            other => {
                row.set("response", Cell::from_optional(other));
                row.set("word_count", Cell::NotApplicable);
            }
        }
        Ok(())
    }
}

/// Count words in free text; participants separate them with spaces, commas or newlines.
pub fn count_words(text: &str) -> usize {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_words() {
        assert_eq!(count_words("fish, fun,fast\nfern  fig"), 5);
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words(" , ,"), 0);
    }

    #[test]
    fn test_extract() {
        let record = TrialRecord::from(json!({
            "results": { "letter": "F", "response": "fish fox", "rt": 60000 }
        }));
        let mut row = TrialRow::new();
        VerbalFluency.extract(&record, &mut row).unwrap();
        assert_eq!(row.render("letter"), "F");
        assert_eq!(row.render("word_count"), "2");
        assert_eq!(row.render("response_time_ms"), "60000");
    }

    #[test]
    fn test_missing_response() {
        let mut row = TrialRow::new();
        VerbalFluency
            .extract(&TrialRecord::from(json!({ "results": { "letter": "S" } })), &mut row)
            .unwrap();
        assert_eq!(row.render("response"), "n/a");
        assert_eq!(row.render("word_count"), "n/a");
    }
}
