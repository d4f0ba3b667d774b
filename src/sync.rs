//! Store-to-platform batch loader
//!
//! For every subject on the platform, find the tasks each session is missing,
//! fetch those tasks' trials from the experiment store, transform them to TSV and
//! upload each file into an acquisition labeled after it.
//!
//! Remote failures are logged with their context and treated as an empty result so
//! the batch moves on to the next subject or task. Malformed trial data aborts the
//! batch.

use crate::error::CogError;
use crate::pipeline::transform;
use crate::platform::{filename_to_acq_label, Acquisition, DataPlatform};
use crate::store::{fetch_all, resolve_identity, ExperimentStore};
use crate::transformers::Task;
use crate::types::Session;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What to load and how
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Tasks to load regardless of what the platform already has; empty means missing tasks only
    pub tasks: Vec<Task>,
    /// Restrict the batch to one subject
    pub user: Option<String>,
    /// Sessions to load; empty means both
    pub sessions: Vec<Session>,
    /// Reload tasks that already have an acquisition
    pub force: bool,
    /// Fetch, transform and write locally, but only log uploads
    pub dry_run: bool,
    /// Where transformed files are written before upload
    pub out_dir: PathBuf,
}

impl SyncOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks: Vec::new(),
            user: None,
            sessions: Vec::new(),
            force: false,
            dry_run: false,
            out_dir: out_dir.into(),
        }
    }

    fn wants(&self, session: Session) -> bool {
        self.sessions.is_empty() || self.sessions.contains(&session)
    }
}

/// Counts for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub subjects: usize,
    pub files_written: usize,
    pub uploads: usize,
    /// Remote operations that failed and were skipped
    pub remote_failures: usize,
}

/// Whether an acquisition already holds data for `task`.
fn has_task(acquisitions: &[Acquisition], task: Task) -> bool {
    let label = format!("beh_{}", task.id());
    let run_prefix = format!("{}_run-", label);
    acquisitions
        .iter()
        .any(|a| a.label == label || a.label.starts_with(&run_prefix))
}

/// Tasks a session still needs: every task given in that session, minus those
/// with an acquisition already, unless `force` is set.
pub fn missing_tasks(session: Session, acquisitions: &[Acquisition], force: bool) -> Vec<Task> {
    Task::ALL
        .iter()
        .copied()
        .filter(|t| t.in_session(session))
        .filter(|t| force || !has_task(acquisitions, *t))
        .collect()
}

/// Run the batch over every subject (or the one selected).
pub fn sync(
    store: &dyn ExperimentStore,
    platform: &dyn DataPlatform,
    options: &SyncOptions,
) -> Result<SyncReport, CogError> {
    let subjects = match &options.user {
        Some(user) => vec![user.clone()],
        None => platform.subjects()?,
    };

    let mut report = SyncReport::default();
    for subject in &subjects {
        sync_subject(store, platform, subject, options, &mut report)?;
        report.subjects += 1;
    }

    info!(
        subjects = report.subjects,
        files = report.files_written,
        uploads = report.uploads,
        remote_failures = report.remote_failures,
        dry_run = options.dry_run,
        "Sync finished"
    );
    Ok(report)
}

/// Log a remote failure and substitute `fallback`; anything else propagates.
fn recover<T>(
    result: Result<T, CogError>,
    fallback: T,
    report: &mut SyncReport,
) -> Result<T, CogError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_remote() => {
            error!(error = %e, "Remote operation failed; continuing");
            report.remote_failures += 1;
            Ok(fallback)
        }
        Err(e) => Err(e),
    }
}

fn sync_subject(
    store: &dyn ExperimentStore,
    platform: &dyn DataPlatform,
    subject: &str,
    options: &SyncOptions,
    report: &mut SyncReport,
) -> Result<(), CogError> {
    let sessions = recover(platform.sessions(subject), Vec::new(), report)?;
    let sessions: Vec<Session> = sessions.into_iter().filter(|s| options.wants(*s)).collect();
    if sessions.is_empty() {
        warn!(subject, "No pre/post sessions to load");
        return Ok(());
    }

    let identity = recover(resolve_identity(store, subject).map(Some), None, report)?;
    // Tasks are fetched and transformed once; both sessions pick their files from the result.
    let mut written: HashMap<Task, Vec<PathBuf>> = HashMap::new();

    for session in sessions {
        let acquisitions = recover(platform.acquisitions(subject, session), Vec::new(), report)?;
        let tasks = if options.tasks.is_empty() {
            missing_tasks(session, &acquisitions, options.force)
        } else {
            options.tasks.clone()
        };

        for task in tasks {
            info!(subject, session = %session, task = %task, "Processing");
            if !written.contains_key(&task) {
                let files = match &identity {
                    Some(identity) => {
                        fetch_and_transform(store, identity, subject, task, &options.out_dir, report)?
                    }
                    None => Vec::new(),
                };
                report.files_written += files.len();
                written.insert(task, files);
            }

            let marker = format!("ses-{}", session);
            let session_files = written
                .get(&task)
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .filter(|f| file_name(f).contains(&marker));
            for file in session_files {
                upload(platform, subject, session, &acquisitions, file, options.dry_run, report)?;
            }
        }
    }
    Ok(())
}

fn fetch_and_transform(
    store: &dyn ExperimentStore,
    identity: &str,
    subject: &str,
    task: Task,
    out_dir: &Path,
    report: &mut SyncReport,
) -> Result<Vec<PathBuf>, CogError> {
    let trials = recover(
        fetch_all(store, identity, &task.experiment_name()),
        Vec::new(),
        report,
    )?;
    if trials.is_empty() {
        info!(subject, task = %task, "No trials found");
        return Ok(Vec::new());
    }
    transform(task.id(), &trials, subject, out_dir)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn upload(
    platform: &dyn DataPlatform,
    subject: &str,
    session: Session,
    acquisitions: &[Acquisition],
    file: &Path,
    dry_run: bool,
    report: &mut SyncReport,
) -> Result<(), CogError> {
    let label = filename_to_acq_label(&file_name(file));
    if dry_run {
        info!(file = %file.display(), acquisition = %label, "Dry run: would upload");
        return Ok(());
    }

    if !acquisitions.iter().any(|a| a.label == label) {
        let created = recover(
            platform
                .create_acquisition(subject, session, &label)
                .map(|_| true),
            false,
            report,
        )?;
        if !created {
            return Ok(());
        }
    }

    info!(file = %file.display(), acquisition = %label, "Uploading");
    let uploaded = recover(
        platform
            .upload_file(subject, session, &label, file)
            .map(|_| true),
        false,
        report,
    )?;
    if uploaded {
        report.uploads += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::LocalPlatform;
    use crate::store::{JsonExportStore, UserRecord};
    use crate::types::TrialRecord;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;

    fn acquisition(label: &str) -> Acquisition {
        Acquisition {
            label: label.to_string(),
            files: Vec::new(),
        }
    }

    #[test]
    fn test_missing_tasks() {
        let all_pre = missing_tasks(Session::Pre, &[], false);
        assert_eq!(all_pre.len(), Task::ALL.len());

        let post = missing_tasks(Session::Post, &[], false);
        assert!(!post.contains(&Task::PhysicalActivity));

        let have = [acquisition("beh_task-panas_run-1"), acquisition("beh_task-dass")];
        let missing = missing_tasks(Session::Pre, &have, false);
        assert!(!missing.contains(&Task::Panas));
        assert!(!missing.contains(&Task::Dass));
        assert!(missing.contains(&Task::DailyStressors));

        assert_eq!(missing_tasks(Session::Pre, &have, true).len(), Task::ALL.len());
    }

    #[test]
    fn test_has_task_does_not_match_longer_names() {
        let have = [acquisition("beh_task-patternSeparationLearning")];
        assert!(has_task(&have, Task::PatternSeparationLearning));
        assert!(!has_task(&have, Task::PatternSeparationRecall));
    }

    fn dass_trials(identity: &str, user: &str, set_num: i64, day: u32) -> Vec<TrialRecord> {
        let key = |sec: u32| format!("dass|2023-03-{:02}T10:00:{:02}.000Z", day, sec);
        vec![
            TrialRecord::from(json!({
                "identityId": identity, "userId": user, "experimentDateTime": key(0),
                "isRelevant": false, "results": { "taskStarted": true, "setNum": set_num }
            })),
            TrialRecord::from(json!({
                "identityId": identity, "userId": user, "experimentDateTime": key(1),
                "isRelevant": true, "results": { "time_elapsed": 1000, "response": { "Q0": 1 } }
            })),
            TrialRecord::from(json!({
                "identityId": identity, "userId": user, "experimentDateTime": key(2),
                "isRelevant": false, "results": { "ua": "UA", "v": "1", "screen": "s" }
            })),
        ]
    }

    fn fixture() -> (tempfile::TempDir, LocalPlatform, JsonExportStore) {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("HB001/pre")).unwrap();
        fs::create_dir_all(root.path().join("HB001/post")).unwrap();
        fs::create_dir_all(root.path().join("HB002/pre")).unwrap();

        let users = vec![UserRecord {
            human_id: "HB001".to_string(),
            user_id: "u-1".to_string(),
        }];
        let mut experiments = dass_trials("id-1", "u-1", 1, 1);
        experiments.extend(dass_trials("id-1", "u-1", 7, 20));
        let store = JsonExportStore::new(users, experiments, 2);
        let platform = LocalPlatform::new(root.path());
        (root, platform, store)
    }

    #[test]
    fn test_sync_uploads_each_session_its_files() {
        let (root, platform, store) = fixture();
        let out = tempfile::tempdir().unwrap();
        let mut options = SyncOptions::new(out.path());
        options.user = Some("HB001".to_string());

        let report = sync(&store, &platform, &options).unwrap();
        assert_eq!(report.subjects, 1);
        assert_eq!(report.files_written, 2);
        assert_eq!(report.uploads, 2);
        assert!(root
            .path()
            .join("HB001/pre/beh_task-dass/sub-HB001_ses-pre_task-dass_beh.tsv")
            .is_file());
        assert!(root
            .path()
            .join("HB001/post/beh_task-dass/sub-HB001_ses-post_task-dass_beh.tsv")
            .is_file());

        // Second pass finds nothing missing for the task that now has data.
        let again = sync(&store, &platform, &options).unwrap();
        assert_eq!(again.uploads, 0);
    }

    #[test]
    fn test_unknown_subject_is_skipped() {
        let (_root, platform, store) = fixture();
        let out = tempfile::tempdir().unwrap();
        let mut options = SyncOptions::new(out.path());
        options.tasks = vec![Task::Dass];
        options.sessions = vec![Session::Pre];

        let report = sync(&store, &platform, &options).unwrap();
        assert_eq!(report.subjects, 2);
        // HB002 has no store user: one failed lookup, no uploads for it.
        assert_eq!(report.remote_failures, 1);
        assert_eq!(report.uploads, 1);
    }

    #[test]
    fn test_dry_run_never_uploads() {
        let (root, platform, store) = fixture();
        let out = tempfile::tempdir().unwrap();
        let mut options = SyncOptions::new(out.path());
        options.user = Some("HB001".to_string());
        options.tasks = vec![Task::Dass];
        options.dry_run = true;

        let report = sync(&store, &platform, &options).unwrap();
        assert_eq!(report.uploads, 0);
        assert_eq!(report.files_written, 2);
        assert!(out.path().join("sub-HB001_ses-post_task-dass_beh.tsv").is_file());
        assert!(!root.path().join("HB001/pre/beh_task-dass").exists());
    }
}
