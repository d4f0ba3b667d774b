//! N-back working memory task
//!
//! Each scored trial shows a letter sequence and records every key press the
//! participant made. Presses are spread over indexed columns, so files for this
//! task vary in width from run to run.

use super::{Task, TaskTransformer};
use crate::error::CogError;
use crate::run::RunData;
use crate::types::{Cell, TrialRecord, TrialRow};
use serde_json::Value;

const COLUMNS: &[&str] = &[
    "trial_index",
    "n",
    "sequence",
    "response_index",
    "correct",
    "response_time_ms",
];

pub struct NBack;

impl NBack {
    fn response_columns(i: usize) -> [String; 2] {
        [format!("response_{}_index", i), format!("response_{}_rt", i)]
    }
}

impl TaskTransformer for NBack {
    fn task(&self) -> Task {
        Task::NBack
    }

    fn columns(&self) -> &[&'static str] {
        COLUMNS
    }

    fn has_multi_runs(&self) -> bool {
        true
    }

    fn run_columns(&self, run: &RunData) -> Vec<String> {
        let presses = run
            .rows()
            .iter()
            .map(|row| {
                (0..)
                    .take_while(|i| row.contains(&format!("response_{}_index", i)))
                    .count()
            })
            .max()
            .unwrap_or(0);

        let mut columns: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
        for i in 0..presses {
            columns.extend(Self::response_columns(i));
        }
        columns
    }

    fn extract(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
        row.set("trial_index", Cell::from_optional(record.field("trial_index")));
        let Some(sequence) = record.field("sequence").and_then(Value::as_array) else {
            return Ok(());
        };

        let n = record.field("n").and_then(Value::as_i64);
        let response_index = record.field("response_index").and_then(Value::as_i64);

        row.set("n", Cell::from_optional(record.field("n")));
        row.set("sequence", join_sequence(sequence));
        row.set(
            "response_index",
            Cell::from_optional(record.field("response_index")),
        );
        row.set("response_time_ms", Cell::from_optional(record.field("rt")));

        let correct = match record.field("correct") {
            Some(value) if !value.is_null() => Cell::from_json(value),
            _ => match (n, response_index) {
                (Some(n), Some(ri)) => Cell::Bool(is_match(sequence, n, ri)),
                _ => Cell::NotApplicable,
            },
        };
        row.set("correct", correct);

        if let Some(responses) = record.field("responses").and_then(Value::as_array) {
            for (i, press) in responses.iter().enumerate() {
                let [index_col, rt_col] = Self::response_columns(i);
                row.set(index_col, Cell::from_optional(press.get("index")));
                row.set(rt_col, Cell::from_optional(press.get("rt")));
            }
        }
        Ok(())
    }
}

fn join_sequence(sequence: &[Value]) -> String {
    sequence
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether the item at `index` repeats the one `n` positions back.
fn is_match(sequence: &[Value], n: i64, index: i64) -> bool {
    if n < 1 || index < n {
        return false;
    }
    let (Ok(index), Ok(n)) = (usize::try_from(index), usize::try_from(n)) else {
        return false;
    };
    match (sequence.get(index), sequence.get(index - n)) {
        (Some(current), Some(back)) => current == back,
        _ => false,
    }
}
