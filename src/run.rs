//! Run segmentation
//!
//! Groups a time-ordered stream of trial records into runs, one per task
//! administration. A run opens at a `taskStarted` sentinel and is finalized by the
//! next record carrying a `ua` (user agent) field, at which point the device
//! columns are stamped onto every row collected so far and the run is frozen.

use crate::error::CogError;
use crate::types::{Cell, DeviceInfo, Session, TrialRecord, TrialRow};

/// Trial types that carry no task data and are dropped outright
const SKIPPED_TRIAL_TYPES: [&str; 2] = ["fullscreen", "call-function"];

/// Boilerplate stimulus text shown between sets; dropped when flagged irrelevant
const SET_BOUNDARY_STIMULI: [&str; 2] = ["You are about to start set", "You have completed"];

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Rows may still be appended
    Open,
    /// End sentinel seen; no further mutation allowed
    Finalized,
}

/// All rows of one administration of one task
#[derive(Debug, Clone)]
pub struct RunData {
    set_num: i64,
    rows: Vec<TrialRow>,
    state: RunState,
}

impl RunData {
    pub fn new(set_num: i64) -> Self {
        Self {
            set_num,
            rows: Vec::new(),
            state: RunState::Open,
        }
    }

    /// Append a row to an open run.
    pub fn add_row(&mut self, row: TrialRow) -> Result<(), CogError> {
        if self.state == RunState::Finalized {
            return Err(CogError::RunFrozen(self.set_num));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Stamp device details onto every collected row and freeze the run.
    pub fn finalize(&mut self, device: &DeviceInfo) -> Result<(), CogError> {
        if self.state == RunState::Finalized {
            return Err(CogError::AlreadyFinalized(self.set_num));
        }
        for row in &mut self.rows {
            device.apply(row);
        }
        self.state = RunState::Finalized;
        Ok(())
    }

    pub fn set_num(&self) -> i64 {
        self.set_num
    }

    pub fn session(&self) -> Session {
        Session::from_set_num(self.set_num)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_finalized(&self) -> bool {
        self.state == RunState::Finalized
    }

    pub fn rows(&self) -> &[TrialRow] {
        &self.rows
    }
}

/// Structural role of a trial record in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Skip,
    Start,
    End,
    Normal,
}

/// Classify a record. Rules are checked in priority order: skip, start, end, normal.
pub fn classify(record: &TrialRecord) -> LineKind {
    if is_skipped(record) {
        LineKind::Skip
    } else if record.is_truthy("taskStarted") {
        LineKind::Start
    } else if record.is_truthy("ua") {
        LineKind::End
    } else {
        LineKind::Normal
    }
}

fn is_skipped(record: &TrialRecord) -> bool {
    let trial_type = record.str_field("trial_type").unwrap_or("");
    if SKIPPED_TRIAL_TYPES.contains(&trial_type) {
        return true;
    }
    let stimulus = record.str_field("stimulus").unwrap_or("");
    !record.is_relevant().unwrap_or(true)
        && SET_BOUNDARY_STIMULI.iter().any(|marker| stimulus.contains(marker))
}

/// Outcome of routing one record through the segmenter
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Skipped,
    /// A new run was opened for this set number
    Started(i64),
    /// The open run for this set number was finalized
    Finalized(i64),
    /// A data line; the row holds the common columns and still needs task columns
    Normal(TrialRow),
}

/// Routes records into runs; the most recently started run is the open one
#[derive(Debug, Default)]
pub struct RunSegmenter {
    runs: Vec<RunData>,
}

impl RunSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a record and apply its structural effect.
    ///
    /// Normal lines are returned with their common columns filled in; the caller adds
    /// task columns and hands the row back through [`RunSegmenter::push_row`].
    pub fn process(&mut self, record: &TrialRecord) -> Result<Segment, CogError> {
        match classify(record) {
            LineKind::Skip => Ok(Segment::Skipped),
            LineKind::Start => {
                let set_num = record
                    .set_num()
                    .ok_or_else(|| CogError::MissingField("setNum on run start".to_string()))?;
                self.runs.push(RunData::new(set_num));
                Ok(Segment::Started(set_num))
            }
            LineKind::End => {
                let device = DeviceInfo::from_record(record);
                let run = self.current_run_mut(record)?;
                run.finalize(&device)?;
                Ok(Segment::Finalized(run.set_num()))
            }
            LineKind::Normal => {
                // Fail before any task-specific work if there is nowhere to put the row.
                let run = self.current_run_mut(record)?;
                if run.is_finalized() {
                    return Err(CogError::RunFrozen(run.set_num()));
                }
                Ok(Segment::Normal(common_row(record)))
            }
        }
    }

    /// Append a completed row to the open run.
    pub fn push_row(&mut self, row: TrialRow) -> Result<(), CogError> {
        match self.runs.last_mut() {
            Some(run) => run.add_row(row),
            None => Err(CogError::NoOpenRun("row pushed with no run started".to_string())),
        }
    }

    fn current_run_mut(&mut self, record: &TrialRecord) -> Result<&mut RunData, CogError> {
        self.runs.last_mut().ok_or_else(|| {
            CogError::NoOpenRun(record.date_time().unwrap_or("<no timestamp>").to_string())
        })
    }

    pub fn runs(&self) -> &[RunData] {
        &self.runs
    }

    pub fn into_runs(self) -> Vec<RunData> {
        self.runs
    }
}

/// Columns shared by every task, read from a normal data line.
fn common_row(record: &TrialRecord) -> TrialRow {
    let mut row = TrialRow::new();
    row.set("is_relevant", record.is_relevant().unwrap_or(false));
    row.set("time_elapsed", Cell::from_optional(record.field("time_elapsed")));
    row.set(
        "date_time",
        record
            .date_time()
            .map(Cell::from)
            .unwrap_or(Cell::NotApplicable),
    );
    row
}
