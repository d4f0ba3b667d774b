//! Combine per-run task files into one file per task
//!
//! Subject, session and run come from each file's name and are appended as
//! metadata columns. Only rows whose `is_relevant` column reads `True` are kept
//! unless every row is requested.
//!
//! N-back files differ in width (one pair of columns per recorded key press), so
//! their rows are padded by position to the widest header before the metadata
//! columns are appended.

use crate::error::CogError;
use crate::platform::DataPlatform;
use crate::types::Session;
use crate::NOT_APPLICABLE;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake128;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{info, warn};

/// Position of `is_relevant` in every task file
const RELEVANCE_COLUMN: usize = 1;

/// Task whose files vary in width
const VARIABLE_WIDTH_TASK: &str = "nBack";

static TASK_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^sub-(?P<sub>[^_]+)_ses-(?P<sess>pre|post)_task-(?P<task>[A-Za-z]+)_(?:beh\.tsv|run-(?P<run>[0-9]+)_beh\.tsv)$",
    )
    .expect("Invalid task file name regex")
});

/// Metadata encoded in a task file's name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub sub: String,
    pub sess: Session,
    pub task: String,
    /// Run number, or `n/a` for tasks run once per session
    pub run: String,
}

/// Parse `sub-<id>_ses-<pre|post>_task-<name>[_run-<n>]_beh.tsv`.
pub fn parse_file_name(file_name: &str) -> Result<FileMetadata, CogError> {
    let caps = TASK_FILE_NAME
        .captures(file_name)
        .ok_or_else(|| CogError::UnmatchedFileName(file_name.to_string()))?;
    Ok(FileMetadata {
        sub: caps["sub"].to_string(),
        sess: caps["sess"].parse()?,
        task: caps["task"].to_string(),
        run: caps
            .name("run")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
    })
}

/// Length of the SHAKE128 output behind a pseudonym, in bytes
const PSEUDONYM_BYTES: usize = 16;

/// Pseudonymous subject ID: 16 bytes of SHAKE128 output, hex encoded.
///
/// User-condition maps are keyed by this value, so it must not change.
pub fn pseudonym(subject: &str) -> String {
    let mut hasher = Shake128::default();
    hasher.update(subject.as_bytes());
    let mut digest = [0u8; PSEUDONYM_BYTES];
    hasher.finalize_xof().read(&mut digest);
    hex::encode(digest)
}

/// Blinded letters standing in for the two study conditions.
///
/// Draw once per batch and pass it to every file of that batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionMap {
    f: char,
    p: char,
}

impl ConditionMap {
    /// Two distinct uppercase letters drawn from `rng`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let letters: Vec<char> = ('A'..='Z').collect();
        let mut picked = letters.choose_multiple(rng, 2);
        let f = picked.next().copied().unwrap_or('A');
        let p = picked.next().copied().unwrap_or('B');
        Self { f, p }
    }

    pub fn new(f: char, p: char) -> Self {
        Self { f, p }
    }

    /// Blinded letter for a condition code; anything but `F` or `P` is `unk`.
    pub fn blind(&self, condition: Option<&str>) -> String {
        match condition {
            Some("F") => self.f.to_string(),
            Some("P") => self.p.to_string(),
            _ => "unk".to_string(),
        }
    }
}

/// Replaces subject IDs with pseudonyms and adds a blinded condition column
#[derive(Debug, Clone)]
pub struct Pseudonymizer {
    /// Pseudonym → condition code
    user_map: HashMap<String, String>,
    conditions: ConditionMap,
}

impl Pseudonymizer {
    pub fn new(user_map: HashMap<String, String>, conditions: ConditionMap) -> Self {
        Self {
            user_map,
            conditions,
        }
    }

    /// Load a JSON object mapping pseudonyms to condition codes.
    pub fn load(path: &Path, conditions: ConditionMap) -> Result<Self, CogError> {
        let user_map = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(Self::new(user_map, conditions))
    }

    /// `(pseudonym, blinded condition)` for a subject ID
    pub fn apply(&self, subject: &str) -> (String, String) {
        let hashed = pseudonym(subject);
        let condition = self
            .conditions
            .blind(self.user_map.get(&hashed).map(String::as_str));
        (hashed, condition)
    }
}

/// How files are combined
#[derive(Debug, Clone, Default)]
pub struct CombineOptions {
    /// Keep every row rather than only relevant ones
    pub include_all: bool,
    pub pseudonymizer: Option<Pseudonymizer>,
}

impl CombineOptions {
    fn metadata_header(&self) -> Vec<&'static str> {
        match self.pseudonymizer {
            Some(_) => vec!["sub", "condition", "sess", "run"],
            None => vec!["sub", "sess", "run"],
        }
    }

    fn metadata(&self, meta: &FileMetadata) -> Vec<String> {
        match &self.pseudonymizer {
            Some(p) => {
                let (sub, condition) = p.apply(&meta.sub);
                vec![sub, condition, meta.sess.to_string(), meta.run.clone()]
            }
            None => vec![meta.sub.clone(), meta.sess.to_string(), meta.run.clone()],
        }
    }
}

struct TaskFile<'a> {
    path: &'a Path,
    meta: FileMetadata,
}

fn file_name_of(path: &Path) -> Result<&str, CogError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CogError::UnmatchedFileName(path.display().to_string()))
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<fs::File>, CogError> {
    Ok(ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_path(path)?)
}

/// Combine task files into `output`, returning the number of data rows written.
///
/// Every file name must parse (see [`parse_file_name`]); nothing is written otherwise.
/// An empty file list writes nothing.
pub fn combine_files(
    files: &[PathBuf],
    output: &Path,
    options: &CombineOptions,
) -> Result<usize, CogError> {
    let mut task_files = Vec::with_capacity(files.len());
    for path in files {
        task_files.push(TaskFile {
            path,
            meta: parse_file_name(file_name_of(path)?)?,
        });
    }

    let Some(first) = task_files.first() else {
        warn!("No task files to combine");
        return Ok(0);
    };
    let pad = first.meta.task == VARIABLE_WIDTH_TASK;

    let header = if pad {
        widest_header(&task_files)?
    } else {
        tsv_reader(first.path)?.headers()?.clone()
    };

    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(output)?;
    writer.write_record(header.iter().chain(options.metadata_header()))?;

    let mut written = 0usize;
    for file in &task_files {
        let mut reader = tsv_reader(file.path)?;
        let file_header = reader.headers()?.clone();
        if !pad && file_header != header {
            warn!(file = %file.path.display(), "Header differs from the first file; columns may not line up");
        }
        let padding = header.len().saturating_sub(file_header.len());
        let metadata = options.metadata(&file.meta);

        for record in reader.records() {
            let record = record?;
            if !options.include_all && record.get(RELEVANCE_COLUMN) != Some("True") {
                continue;
            }
            let mut row: Vec<&str> = record.iter().collect();
            if pad {
                row.extend(std::iter::repeat("").take(padding));
            }
            row.extend(metadata.iter().map(String::as_str));
            writer.write_record(&row)?;
            written += 1;
        }
    }
    writer.flush()?;

    info!(files = task_files.len(), rows = written, output = %output.display(), "Combined task files");
    Ok(written)
}

fn widest_header(files: &[TaskFile<'_>]) -> Result<StringRecord, CogError> {
    let mut widest = StringRecord::new();
    for file in files {
        let header = tsv_reader(file.path)?.headers()?.clone();
        if header.len() > widest.len() {
            widest = header;
        }
    }
    Ok(widest)
}

/// Download every file for `task` from the platform into `dest`.
///
/// Looks in the selected sessions (both when `sessions` is empty) for acquisitions
/// labeled `beh_task-<task>…` and files named `sub-*_ses-<session>_task-<task>*_beh.tsv`.
/// Platform failures for one subject are logged and skipped.
pub fn download_task_files(
    platform: &dyn DataPlatform,
    task: &str,
    sessions: &[Session],
    dest: &Path,
) -> Result<Vec<PathBuf>, CogError> {
    let sessions: &[Session] = if sessions.is_empty() {
        &Session::ALL
    } else {
        sessions
    };
    let label_prefix = format!("beh_task-{}", task);
    let mut downloaded = Vec::new();

    for subject in platform.subjects()? {
        let available = match platform.sessions(&subject) {
            Ok(available) => available,
            Err(e) => {
                warn!(subject = %subject, error = %e, "Skipping subject");
                continue;
            }
        };
        for session in sessions.iter().copied().filter(|s| available.contains(s)) {
            let acquisitions = match platform.acquisitions(&subject, session) {
                Ok(acquisitions) => acquisitions,
                Err(e) => {
                    warn!(subject = %subject, session = %session, error = %e, "Skipping session");
                    continue;
                }
            };
            let file_prefix = format!("_ses-{}_task-{}", session, task);
            for acq in acquisitions.iter().filter(|a| a.label.starts_with(&label_prefix)) {
                for name in acq
                    .files
                    .iter()
                    .filter(|n| n.starts_with("sub-") && n.contains(&file_prefix) && n.ends_with("_beh.tsv"))
                {
                    info!(file = %name, session = %session, acquisition = %acq.label, "Downloading");
                    let target = dest.join(name);
                    match platform.download_file(&subject, session, &acq.label, name, &target) {
                        Ok(()) => downloaded.push(target),
                        Err(e) => warn!(file = %name, error = %e, "Download failed"),
                    }
                }
            }
        }
    }
    Ok(downloaded)
}

/// Download a task's files into a scratch directory and combine them.
pub fn combine_from_platform(
    platform: &dyn DataPlatform,
    task: &str,
    sessions: &[Session],
    output: &Path,
    options: &CombineOptions,
) -> Result<usize, CogError> {
    let scratch = tempfile::tempdir()?;
    let files = download_task_files(platform, task, sessions, scratch.path())?;
    if files.is_empty() {
        info!(task, "No data files found");
        return Ok(0);
    }
    combine_files(&files, output, options)
}
