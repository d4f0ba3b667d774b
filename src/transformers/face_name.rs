//! Face-name associative memory task

use super::strategy::RenamedCopy;
use super::{Task, TaskTransformer};
use crate::error::CogError;
use crate::types::{Cell, TrialRecord, TrialRow};
use serde_json::Value;

const COLUMNS: &[&str] = &[
    "trial_index",
    "stimulus",
    "response",
    "category",
    "is_learning",
    "is_practice",
    "is_recall",
    "name",
    "names",
    "pic_id",
    "lure",
    "correct",
    "response_time_ms",
    "failed_images",
];

const STIMULUS_FIELDS: RenamedCopy = RenamedCopy {
    source: None,
    pairs: &[
        ("cat", "category"),
        ("correct", "correct"),
        ("lure", "lure"),
        ("name", "name"),
        ("names", "names"),
        ("picId", "pic_id"),
    ],
};

/// Phase flags; a trial showing a face reports `False` for any it does not carry
const PHASE_FLAGS: [(&str, &str); 3] = [
    ("isPractice", "is_practice"),
    ("isLearning", "is_learning"),
    ("isRecall", "is_recall"),
];

pub struct FaceName;

impl TaskTransformer for FaceName {
    fn task(&self) -> Task {
        Task::FaceName
    }

    fn columns(&self) -> &[&'static str] {
        COLUMNS
    }

    fn has_multi_runs(&self) -> bool {
        true
    }

    fn extract(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
        row.set("trial_index", Cell::from_optional(record.field("trial_index")));

        // Image preloads only report which assets failed to load.
        if record.str_field("trial_type") == Some("preload") {
            row.set("failed_images", Cell::from_optional(record.field("failed_images")));
            return Ok(());
        }

        row.set("stimulus", Cell::from_optional(record.field("stimulus")));
        row.set("response", Cell::from_optional(record.field("response")));
        row.set("response_time_ms", Cell::from_optional(record.field("rt")));
        STIMULUS_FIELDS.apply(record, row);

        if record.is_truthy("picId") {
            for (from, to) in PHASE_FLAGS {
                let flag = record.field(from).and_then(Value::as_bool).unwrap_or(false);
                row.set(to, flag);
            }
        }
        Ok(())
    }
}
