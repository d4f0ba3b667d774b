//! Spatial orientation (perspective taking) task

use super::strategy::RenamedCopy;
use super::{Task, TaskTransformer};
use crate::error::CogError;
use crate::types::{Cell, TrialRecord, TrialRow};
use serde_json::Value;

const COPIED: RenamedCopy = RenamedCopy {
    source: None,
    pairs: &[
        ("trial_index", "trial_index"),
        ("completionReason", "completion_reason"),
        ("targetRadians", "target_radians"),
        ("responseRadians", "response_radians"),
    ],
};

const COLUMNS: &[&str] = &[
    "trial_index",
    "completion_reason",
    "target_radians",
    "response_radians",
    "angular_error",
];

pub struct SpatialOrientation;

impl TaskTransformer for SpatialOrientation {
    fn task(&self) -> Task {
        Task::SpatialOrientation
    }

    fn columns(&self) -> &[&'static str] {
        COLUMNS
    }

    fn extract(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
        COPIED.apply(record, row);
        let target = record.field("targetRadians").and_then(Value::as_f64);
        let response = record.field("responseRadians").and_then(Value::as_f64);
        let error = match (target, response) {
            (Some(t), Some(r)) => Cell::from(angular_error(t, r)),
            _ => Cell::NotApplicable,
        };
        row.set("angular_error", error);
        Ok(())
    }
}

/// Absolute difference between two headings, wrapped into `[0, π]`.
pub fn angular_error(target: f64, response: f64) -> f64 {
    let diff = target - response;
    diff.sin().atan2(diff.cos()).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::f64::consts::PI;

    #[test]
    fn test_angular_error_wraps() {
        assert!((angular_error(0.1, 2.0 * PI - 0.1) - 0.2).abs() < 1e-9);
        assert!((angular_error(PI / 2.0, 0.0) - PI / 2.0).abs() < 1e-9);
        assert!(angular_error(1.0, 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_extract() {
        let record = TrialRecord::from(json!({
            "results": {
                "trial_index": 12,
                "completionReason": "responded",
                "targetRadians": 1.5,
                "responseRadians": 1.0
            }
        }));
        let mut row = TrialRow::new();
        SpatialOrientation.extract(&record, &mut row).unwrap();
        assert_eq!(row.render("completion_reason"), "responded");
        let error: f64 = row.render("angular_error").parse().unwrap();
        assert!((error - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_timeout_has_no_error() {
        let record = TrialRecord::from(json!({
            "results": { "completionReason": "timeout", "targetRadians": 0.3, "responseRadians": null }
        }));
        let mut row = TrialRow::new();
        SpatialOrientation.extract(&record, &mut row).unwrap();
        assert_eq!(row.render("response_radians"), "n/a");
        assert_eq!(row.render("angular_error"), "n/a");
        assert_eq!(row.render("trial_index"), "n/a");
    }
}
