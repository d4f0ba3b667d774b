//! Pipeline orchestration
//!
//! This module provides the public API for turning one subject's trial log for one
//! task into per-run TSV files.

use crate::error::CogError;
use crate::run::{RunData, RunSegmenter, Segment};
use crate::transformers::{transformer_for_task, TaskTransformer};
use crate::types::TrialRecord;
use crate::writer::write_runs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Transform a subject's trials for one task and write one TSV per run.
///
/// # Arguments
/// * `task_name` - Task identifier, e.g. `task-panas` (an unknown task is an error)
/// * `trials` - The subject's trial records for that task, in logged order
/// * `subject` - Subject identifier used in output file names
/// * `out_dir` - Directory the files are written to
///
/// # Returns
/// Paths of the files written, in run order
///
/// # Example
/// ```ignore
/// let paths = transform("task-panas", &trials, "HB0042", Path::new("out"))?;
/// ```
pub fn transform(
    task_name: &str,
    trials: &[TrialRecord],
    subject: &str,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, CogError> {
    let transformer = transformer_for_task(task_name)?;
    transform_with(transformer.as_ref(), trials, subject, out_dir)
}

/// Same as [`transform`], for a raw JSON array of trial records.
pub fn transform_json(
    task_name: &str,
    raw_json: &str,
    subject: &str,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, CogError> {
    let trials = TrialRecord::parse_array(raw_json)?;
    transform(task_name, &trials, subject, out_dir)
}

/// Run the pipeline with an already-selected transformer.
///
/// Pipeline stages:
/// 1. RunSegmenter - classify each record and route it to the open run
/// 2. TaskTransformer - fill task columns of each data line
/// 3. TSV writer - one file per run
pub fn transform_with(
    transformer: &dyn TaskTransformer,
    trials: &[TrialRecord],
    subject: &str,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, CogError> {
    let runs = segment_runs(transformer, trials)?;
    if runs.is_empty() {
        info!(subject, task = %transformer.task(), "No runs found");
        return Ok(Vec::new());
    }
    write_runs(transformer, &runs, subject, out_dir)
}

/// Segment trials into runs, with task columns extracted for every data line.
pub fn segment_runs(
    transformer: &dyn TaskTransformer,
    trials: &[TrialRecord],
) -> Result<Vec<RunData>, CogError> {
    let mut segmenter = RunSegmenter::new();

    for record in trials {
        match segmenter.process(record)? {
            Segment::Normal(mut row) => {
                transformer.extract(record, &mut row)?;
                segmenter.push_row(row)?;
            }
            Segment::Started(set_num) => debug!(set_num, "Run started"),
            Segment::Finalized(set_num) => debug!(set_num, "Run finalized"),
            Segment::Skipped => {}
        }
    }

    Ok(segmenter.into_runs())
}
