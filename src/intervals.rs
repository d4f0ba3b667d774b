//! Time between the end of a learning task and the start of its recall
//!
//! Memory tasks are split into a learning run and a later recall run. For each
//! subject and set this module pairs the learning run's end marker with the moment
//! recall testing begins and reports the gap in whole seconds.

use crate::error::CogError;
use crate::types::TrialRecord;
use crate::NOT_APPLICABLE;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Header line of the summary
pub const HEADER: &str = "user id, set number, seconds from learning end to recall start";

const VERBAL_LEARNING_MARKER: &str = "We presented two different lists of words to you earlier";
const PATTERN_SEPARATION_MARKER: &str = "be tested on your memory";

/// Task pair whose learning/recall gap is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalTask {
    PatternSeparation,
    VerbalLearning,
}

impl IntervalTask {
    /// Whether a recall trial marks the start of recall testing.
    pub fn is_recall_marker(&self, record: &TrialRecord) -> bool {
        let stimulus = record.str_field("stimulus").unwrap_or("");
        match self {
            IntervalTask::VerbalLearning => stimulus.starts_with(VERBAL_LEARNING_MARKER),
            IntervalTask::PatternSeparation => {
                record.str_field("trial_type") == Some("html-keyboard-response")
                    && stimulus.contains(PATTERN_SEPARATION_MARKER)
            }
        }
    }
}

impl FromStr for IntervalTask {
    type Err = CogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pattern-separation" => Ok(IntervalTask::PatternSeparation),
            "verbal-learning" => Ok(IntervalTask::VerbalLearning),
            other => Err(CogError::UnknownTask(other.to_string())),
        }
    }
}

/// Parse a trial timestamp; `Z`-suffixed and offset-less ISO 8601 are both accepted.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CogError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| CogError::DateParseError(format!("{}: {}", value, e)))
}

#[derive(Debug, Clone, PartialEq)]
struct Interval {
    user: String,
    set_num: i64,
    learning_end: Option<DateTime<Utc>>,
    recall_start: Option<DateTime<Utc>>,
}

impl Interval {
    /// Whole seconds from learning end to recall start, if both are known.
    fn seconds(&self) -> Option<i64> {
        let (end, start) = (self.learning_end?, self.recall_start?);
        let millis = (start - end).num_milliseconds();
        Some((millis as f64 / 1000.0).round() as i64)
    }
}

/// Learning-to-recall gaps keyed by (subject, set), in first-seen order
#[derive(Debug, Default)]
pub struct IntervalSummary {
    intervals: Vec<Interval>,
    index: HashMap<(String, i64), usize>,
    current: HashMap<String, usize>,
}

/// Subject and timestamp of a trial; both are required.
fn identify(record: &TrialRecord) -> Result<(&str, DateTime<Utc>), CogError> {
    let user = record
        .user_id()
        .ok_or_else(|| CogError::MissingField("userId".to_string()))?;
    let date_time = record
        .date_time()
        .ok_or_else(|| CogError::MissingField(format!("dateTime for user {}", user)))?;
    Ok((user, parse_timestamp(date_time)?))
}

impl IntervalSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the summary from a learning log and the matching recall log.
    pub fn from_logs(
        task: IntervalTask,
        learning: &[TrialRecord],
        recall: &[TrialRecord],
    ) -> Result<Self, CogError> {
        let mut summary = Self::new();
        summary.record_learning(learning)?;
        summary.record_recall(task, recall)?;
        Ok(summary)
    }

    /// Register sets from start markers and stamp learning end times from end markers.
    pub fn record_learning(&mut self, trials: &[TrialRecord]) -> Result<(), CogError> {
        for record in trials {
            let (user, at) = identify(record)?;
            if record.is_truthy("taskStarted") {
                self.select_set(user, record)?;
            }
            if record.is_truthy("ua") {
                let interval = self.current_mut(user)?;
                interval.learning_end = Some(at);
            }
        }
        Ok(())
    }

    /// Select sets from start markers and stamp the first recall marker of each set.
    pub fn record_recall(&mut self, task: IntervalTask, trials: &[TrialRecord]) -> Result<(), CogError> {
        for record in trials {
            let (user, at) = identify(record)?;
            if record.is_truthy("taskStarted") {
                self.select_set(user, record)?;
            }
            if task.is_recall_marker(record) {
                let interval = self.current_mut(user)?;
                if interval.recall_start.is_none() {
                    interval.recall_start = Some(at);
                }
            }
        }
        Ok(())
    }

    fn select_set(&mut self, user: &str, record: &TrialRecord) -> Result<(), CogError> {
        let set_num = record
            .set_num()
            .ok_or_else(|| CogError::MissingField(format!("setNum on set header for user {}", user)))?;
        let key = (user.to_string(), set_num);
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                self.intervals.push(Interval {
                    user: user.to_string(),
                    set_num,
                    learning_end: None,
                    recall_start: None,
                });
                let position = self.intervals.len() - 1;
                self.index.insert(key, position);
                position
            }
        };
        self.current.insert(user.to_string(), position);
        Ok(())
    }

    fn current_mut(&mut self, user: &str) -> Result<&mut Interval, CogError> {
        let position = *self.current.get(user).ok_or_else(|| {
            CogError::TrialOrder(format!("marker for user {} before any set header", user))
        })?;
        Ok(&mut self.intervals[position])
    }

    /// `(user, set, seconds)` for every pair, in first-seen order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, i64, Option<i64>)> + '_ {
        self.intervals
            .iter()
            .map(|i| (i.user.as_str(), i.set_num, i.seconds()))
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl fmt::Display for IntervalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", HEADER)?;
        for (user, set_num, seconds) in self.entries() {
            match seconds {
                Some(secs) => writeln!(f, "{}, {}, {}", user, set_num, secs)?,
                None => writeln!(f, "{}, {}, {}", user, set_num, NOT_APPLICABLE)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn trials(value: serde_json::Value) -> Vec<TrialRecord> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_verbal_learning_interval() {
        let learning = trials(json!([
            { "userId": "u1", "dateTime": "2023-03-01T10:00:00.000Z", "taskStarted": true, "setNum": 1 },
            { "userId": "u1", "dateTime": "2023-03-01T10:04:00.000Z", "stimulus": "apple" },
            { "userId": "u1", "dateTime": "2023-03-01T10:05:00.000Z", "ua": "Mozilla" }
        ]));
        let recall = trials(json!([
            { "userId": "u1", "dateTime": "2023-03-01T10:24:00.000Z", "taskStarted": true, "setNum": 1 },
            { "userId": "u1", "dateTime": "2023-03-01T10:25:30.400Z",
              "stimulus": "We presented two different lists of words to you earlier. Recall list A." },
            { "userId": "u1", "dateTime": "2023-03-01T10:27:00.000Z",
              "stimulus": "We presented two different lists of words to you earlier. Recall list B." }
        ]));
        let summary = IntervalSummary::from_logs(IntervalTask::VerbalLearning, &learning, &recall).unwrap();
        let entries: Vec<_> = summary.entries().collect();
        assert_eq!(entries, vec![("u1", 1, Some(1230))]);
        assert_eq!(
            summary.to_string(),
            format!("{}\nu1, 1, 1230\n", HEADER)
        );
    }

    #[test]
    fn test_pattern_separation_nested_records_and_missing_end() {
        let learning = trials(json!([
            { "userId": "u1", "dateTime": "2023-03-01T10:00:00Z", "results": { "taskStarted": true, "setNum": 2 } },
            { "userId": "u2", "dateTime": "2023-03-01T11:00:00Z", "results": { "taskStarted": true, "setNum": 2 } },
            { "userId": "u2", "dateTime": "2023-03-01T11:10:00Z", "results": { "ua": "UA" } }
        ]));
        let recall = trials(json!([
            { "userId": "u2", "dateTime": "2023-03-01T11:30:00Z", "results": { "taskStarted": true, "setNum": 2 } },
            { "userId": "u2", "dateTime": "2023-03-01T11:31:00Z",
              "results": { "trial_type": "html-keyboard-response", "stimulus": "<p>You will now be tested on your memory</p>" } },
            { "userId": "u1", "dateTime": "2023-03-01T12:00:00Z", "results": { "taskStarted": true, "setNum": 2 } },
            { "userId": "u1", "dateTime": "2023-03-01T12:01:00Z",
              "results": { "trial_type": "html-keyboard-response", "stimulus": "You will now be tested on your memory" } }
        ]));
        let summary =
            IntervalSummary::from_logs(IntervalTask::PatternSeparation, &learning, &recall).unwrap();
        let entries: Vec<_> = summary.entries().collect();
        assert_eq!(entries, vec![("u1", 2, None), ("u2", 2, Some(1260))]);
        assert!(summary.to_string().contains("u1, 2, n/a\n"));
    }

    #[test]
    fn test_recall_marker_requires_keyboard_response() {
        let record = TrialRecord::from(json!({
            "trial_type": "image-keyboard-response",
            "stimulus": "You will be tested on your memory"
        }));
        assert!(!IntervalTask::PatternSeparation.is_recall_marker(&record));
    }

    #[test]
    fn test_missing_identity_is_fatal() {
        let learning = trials(json!([{ "dateTime": "2023-03-01T10:00:00Z", "taskStarted": true, "setNum": 1 }]));
        let err = IntervalSummary::from_logs(IntervalTask::VerbalLearning, &learning, &[]).unwrap_err();
        assert!(matches!(err, CogError::MissingField(_)));

        let learning = trials(json!([{ "userId": "u1", "taskStarted": true, "setNum": 1 }]));
        let err = IntervalSummary::from_logs(IntervalTask::VerbalLearning, &learning, &[]).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_parse_timestamp() {
        let a = parse_timestamp("2023-03-01T10:00:00.000Z").unwrap();
        let b = parse_timestamp("2023-03-01T10:00:00.500").unwrap();
        assert_eq!((b - a).num_milliseconds(), 500);
        assert!(matches!(parse_timestamp("yesterday"), Err(CogError::DateParseError(_))));
    }

    #[test]
    fn test_task_names() {
        assert_eq!("verbal-learning".parse::<IntervalTask>().unwrap(), IntervalTask::VerbalLearning);
        assert!("flanker".parse::<IntervalTask>().is_err());
    }
}
