//! Tab-separated output for segmented runs
//!
//! Every run becomes one file named
//! `sub-<subject>_ses-<pre|post>_<task>[_run-<n>]_beh.tsv`. The run index is only
//! present for tasks that may be repeated within a session, and counts runs of
//! that session only.

use crate::error::CogError;
use crate::run::RunData;
use crate::transformers::TaskTransformer;
use crate::types::{Session, COMMON_COLUMNS};
use csv::WriterBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Build the output file name for one run.
pub fn file_name(subject: &str, session: Session, task_id: &str, run_index: Option<usize>) -> String {
    match run_index {
        Some(n) => format!("sub-{}_ses-{}_{}_run-{}_beh.tsv", subject, session, task_id, n),
        None => format!("sub-{}_ses-{}_{}_beh.tsv", subject, session, task_id),
    }
}

/// Header for a run's file: common columns first, then the task's columns.
pub fn header(transformer: &dyn TaskTransformer, run: &RunData) -> Vec<String> {
    COMMON_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(transformer.run_columns(run))
        .collect()
}

/// Write every run to `out_dir` and return the paths written, in run order.
pub fn write_runs(
    transformer: &dyn TaskTransformer,
    runs: &[RunData],
    subject: &str,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, CogError> {
    let task_id = transformer.task().id();
    let mut per_session: HashMap<Session, usize> = HashMap::new();
    let mut written: Vec<PathBuf> = Vec::new();

    for run in runs {
        let count = per_session.entry(run.session()).or_insert(0);
        *count += 1;

        let run_index = transformer.has_multi_runs().then_some(*count);
        if run_index.is_none() && *count > 1 {
            warn!(
                subject,
                task = task_id,
                session = %run.session(),
                set_num = run.set_num(),
                "Task allows one run per session; later run replaces the earlier file"
            );
        }
        if !run.is_finalized() {
            warn!(subject, task = task_id, set_num = run.set_num(), "Run has no end marker; device columns left blank");
        }

        let path = out_dir.join(file_name(subject, run.session(), task_id, run_index));
        write_run(&path, &header(transformer, run), run)?;
        debug!(path = %path.display(), rows = run.rows().len(), "Wrote run");

        if !written.contains(&path) {
            written.push(path);
        }
    }

    Ok(written)
}

/// Write one run's rows under the given header.
pub fn write_run(path: &Path, header: &[String], run: &RunData) -> Result<(), CogError> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(header)?;
    for row in run.rows() {
        writer.write_record(header.iter().map(|column| row.render(column)))?;
    }
    writer.flush()?;
    Ok(())
}
