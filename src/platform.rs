//! Research data platform
//!
//! The platform organizes files as subject → session → acquisition → file, with
//! sessions labeled `pre` or `post`. [`DataPlatform`] is the seam the sync and
//! combine commands talk to; [`LocalPlatform`] backs it with a directory tree:
//!
//! ```text
//! <root>/<subject>/<session>/<acquisition>/<file>
//! ```

use crate::error::CogError;
use crate::types::Session;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// A labeled acquisition and the names of the files it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub label: String,
    pub files: Vec<String>,
}

/// Operations needed from the data platform.
///
/// Implementations report failures as [`CogError::Platform`].
pub trait DataPlatform {
    /// Labels of every subject in the project
    fn subjects(&self) -> Result<Vec<String>, CogError>;

    /// The subject's `pre`/`post` sessions; other session labels are ignored
    fn sessions(&self, subject: &str) -> Result<Vec<Session>, CogError>;

    fn acquisitions(&self, subject: &str, session: Session) -> Result<Vec<Acquisition>, CogError>;

    fn create_acquisition(&self, subject: &str, session: Session, label: &str)
        -> Result<(), CogError>;

    /// Upload a local file into an existing acquisition, keeping its file name.
    fn upload_file(
        &self,
        subject: &str,
        session: Session,
        acquisition: &str,
        file: &Path,
    ) -> Result<(), CogError>;

    fn download_file(
        &self,
        subject: &str,
        session: Session,
        acquisition: &str,
        file_name: &str,
        dest: &Path,
    ) -> Result<(), CogError>;
}

static TASK_FILE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sub-[^_]+_ses-[A-Za-z]+_(.*)_beh\.tsv$").expect("Invalid task file label regex")
});

/// Acquisition label for a task file: `sub-X_ses-pre_task-panas_run-1_beh.tsv` → `beh_task-panas_run-1`.
///
/// Names that are not task files come back unchanged.
pub fn filename_to_acq_label(file_name: &str) -> String {
    match TASK_FILE_LABEL.captures(file_name) {
        Some(caps) => format!("beh_{}", &caps[1]),
        None => file_name.to_string(),
    }
}

/// Directory-tree platform rooted at one project
#[derive(Debug, Clone)]
pub struct LocalPlatform {
    root: PathBuf,
}

impl LocalPlatform {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the project directory `<root>/<group>/<project>`, which must exist.
    pub fn open_project(root: &Path, group: &str, project: &str) -> Result<Self, CogError> {
        let dir = root.join(group).join(project);
        if !dir.is_dir() {
            return Err(CogError::platform(
                format!("lookup {}/{}", group, project),
                format!("{} is not a directory", dir.display()),
            ));
        }
        Ok(Self::new(dir))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, subject: &str, session: Session) -> PathBuf {
        self.root.join(subject).join(session.as_str())
    }

    fn acquisition_dir(&self, subject: &str, session: Session, label: &str) -> PathBuf {
        self.session_dir(subject, session).join(label)
    }
}

/// Sorted names of the entries in `dir` that satisfy `keep`.
fn list_dir(
    dir: &Path,
    operation: &str,
    keep: impl Fn(&fs::DirEntry) -> bool,
) -> Result<Vec<String>, CogError> {
    let entries = fs::read_dir(dir).map_err(|e| CogError::platform(operation, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CogError::platform(operation, e))?;
        if keep(&entry) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn is_dir(entry: &fs::DirEntry) -> bool {
    entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
}

fn is_file(entry: &fs::DirEntry) -> bool {
    entry.file_type().map(|t| t.is_file()).unwrap_or(false)
}

impl DataPlatform for LocalPlatform {
    fn subjects(&self) -> Result<Vec<String>, CogError> {
        list_dir(&self.root, "list subjects", is_dir)
    }

    fn sessions(&self, subject: &str) -> Result<Vec<Session>, CogError> {
        let operation = format!("list sessions of {}", subject);
        let labels = list_dir(&self.root.join(subject), &operation, is_dir)?;
        let mut sessions: Vec<Session> = labels.iter().filter_map(|l| l.parse().ok()).collect();
        sessions.sort();
        Ok(sessions)
    }

    fn acquisitions(&self, subject: &str, session: Session) -> Result<Vec<Acquisition>, CogError> {
        let operation = format!("list acquisitions of {}/{}", subject, session);
        let dir = self.session_dir(subject, session);
        let mut acquisitions = Vec::new();
        for label in list_dir(&dir, &operation, is_dir)? {
            let files = list_dir(&dir.join(&label), &operation, is_file)?;
            acquisitions.push(Acquisition { label, files });
        }
        Ok(acquisitions)
    }

    fn create_acquisition(
        &self,
        subject: &str,
        session: Session,
        label: &str,
    ) -> Result<(), CogError> {
        let session_dir = self.session_dir(subject, session);
        let operation = format!("create acquisition {}/{}/{}", subject, session, label);
        if !session_dir.is_dir() {
            return Err(CogError::platform(operation, "session does not exist"));
        }
        fs::create_dir_all(session_dir.join(label)).map_err(|e| CogError::platform(operation, e))
    }

    fn upload_file(
        &self,
        subject: &str,
        session: Session,
        acquisition: &str,
        file: &Path,
    ) -> Result<(), CogError> {
        let operation = format!("upload {} to {}/{}/{}", file.display(), subject, session, acquisition);
        let dir = self.acquisition_dir(subject, session, acquisition);
        if !dir.is_dir() {
            return Err(CogError::platform(operation, "acquisition does not exist"));
        }
        let name = file
            .file_name()
            .ok_or_else(|| CogError::platform(&operation, "path has no file name"))?;
        fs::copy(file, dir.join(name))
            .map(|_| ())
            .map_err(|e| CogError::platform(operation, e))
    }

    fn download_file(
        &self,
        subject: &str,
        session: Session,
        acquisition: &str,
        file_name: &str,
        dest: &Path,
    ) -> Result<(), CogError> {
        let source = self.acquisition_dir(subject, session, acquisition).join(file_name);
        fs::copy(&source, dest).map(|_| ()).map_err(|e| {
            CogError::platform(format!("download {}", source.display()), e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn project() -> (tempfile::TempDir, LocalPlatform) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("HB001/pre")).unwrap();
        fs::create_dir_all(dir.path().join("HB001/post")).unwrap();
        fs::create_dir_all(dir.path().join("HB001/baseline")).unwrap();
        fs::create_dir_all(dir.path().join("HB002/pre")).unwrap();
        let platform = LocalPlatform::new(dir.path());
        (dir, platform)
    }

    #[test]
    fn test_filename_to_acq_label() {
        assert_eq!(
            filename_to_acq_label("sub-HB001_ses-pre_task-panas_run-1_beh.tsv"),
            "beh_task-panas_run-1"
        );
        assert_eq!(
            filename_to_acq_label("sub-HB001_ses-post_task-dass_beh.tsv"),
            "beh_task-dass"
        );
        assert_eq!(filename_to_acq_label("notes.txt"), "notes.txt");
    }

    #[test]
    fn test_lists_subjects_and_sessions() {
        let (_dir, platform) = project();
        assert_eq!(platform.subjects().unwrap(), vec!["HB001", "HB002"]);
        assert_eq!(
            platform.sessions("HB001").unwrap(),
            vec![Session::Pre, Session::Post]
        );
        assert!(platform.sessions("HB404").unwrap_err().is_remote());
    }

    #[test]
    fn test_upload_and_download() {
        let (dir, platform) = project();
        let scratch = tempfile::tempdir().unwrap();
        let file = scratch.path().join("sub-HB001_ses-pre_task-dass_beh.tsv");
        fs::write(&file, "date_time\n").unwrap();

        let err = platform
            .upload_file("HB001", Session::Pre, "beh_task-dass", &file)
            .unwrap_err();
        assert!(err.is_remote());

        platform
            .create_acquisition("HB001", Session::Pre, "beh_task-dass")
            .unwrap();
        platform
            .upload_file("HB001", Session::Pre, "beh_task-dass", &file)
            .unwrap();

        let acquisitions = platform.acquisitions("HB001", Session::Pre).unwrap();
        assert_eq!(
            acquisitions,
            vec![Acquisition {
                label: "beh_task-dass".to_string(),
                files: vec!["sub-HB001_ses-pre_task-dass_beh.tsv".to_string()],
            }]
        );

        let dest = scratch.path().join("copy.tsv");
        platform
            .download_file("HB001", Session::Pre, "beh_task-dass", "sub-HB001_ses-pre_task-dass_beh.tsv", &dest)
            .unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "date_time\n");
        drop(dir);
    }

    #[test]
    fn test_open_project_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalPlatform::open_project(dir.path(), "emocog", "2023_HeartBEAM").is_err());
        fs::create_dir_all(dir.path().join("emocog/2023_HeartBEAM")).unwrap();
        let platform = LocalPlatform::open_project(dir.path(), "emocog", "2023_HeartBEAM").unwrap();
        assert!(platform.root().ends_with("emocog/2023_HeartBEAM"));
    }
}
