//! Task transformers
//!
//! Each task in the study logs its own payload shape. A transformer declares the
//! task's output columns and fills them in from one data line's payload; the run
//! segmenter supplies the common columns and the run boundaries.
//!
//! Dispatch is a closed registry: [`Task`] enumerates every supported task and an
//! unrecognized task name is an error, never a fallback.

mod face_name;
mod n_back;
mod pattern_separation;
mod spatial_orientation;
mod strategy;
mod surveys;
mod verbal_fluency;

pub use face_name::FaceName;
pub use n_back::NBack;
pub use pattern_separation::{score_recall, PatternSeparation, Phase};
pub use spatial_orientation::{angular_error, SpatialOrientation};
pub use strategy::{DirectCopy, RenamedCopy};
pub use surveys::{Ffmq, MoodPrediction, Survey, FFMQ_QUESTIONS};
pub use verbal_fluency::{count_words, VerbalFluency};

pub(crate) use strategy::source_map;
pub(crate) use surveys::ffmq_column;

use crate::error::CogError;
use crate::run::RunData;
use crate::types::{Session, TrialRecord, TrialRow};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Trait implemented by every per-task transformer
pub trait TaskTransformer {
    /// The task this transformer handles
    fn task(&self) -> Task;

    /// Task-specific output columns, in declaration order
    fn columns(&self) -> &[&'static str];

    /// Whether a subject may complete this task more than once per session
    fn has_multi_runs(&self) -> bool {
        false
    }

    /// Task columns for one run's file. Most tasks use [`TaskTransformer::columns`]
    /// unchanged; tasks with variable-length payloads extend it per run.
    fn run_columns(&self, _run: &RunData) -> Vec<String> {
        self.columns().iter().map(|c| c.to_string()).collect()
    }

    /// Fill the task columns of `row` from a data line.
    fn extract(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError>;
}

/// Every task the study administers that has a transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    MoodPrediction,
    Panas,
    PhysicalActivity,
    Dass,
    DailyStressors,
    Ffmq,
    FaceName,
    PatternSeparationLearning,
    PatternSeparationRecall,
    NBack,
    SpatialOrientation,
    VerbalFluency,
}

impl Task {
    pub const ALL: [Task; 12] = [
        Task::MoodPrediction,
        Task::Panas,
        Task::PhysicalActivity,
        Task::Dass,
        Task::DailyStressors,
        Task::Ffmq,
        Task::FaceName,
        Task::PatternSeparationLearning,
        Task::PatternSeparationRecall,
        Task::NBack,
        Task::SpatialOrientation,
        Task::VerbalFluency,
    ];

    /// Task identifier as used in file names and acquisition labels
    pub fn id(&self) -> &'static str {
        match self {
            Task::MoodPrediction => "task-moodPrediction",
            Task::Panas => "task-panas",
            Task::PhysicalActivity => "task-physicalActivity",
            Task::Dass => "task-dass",
            Task::DailyStressors => "task-dailyStressors",
            Task::Ffmq => "task-ffmq",
            Task::FaceName => "task-faceName",
            Task::PatternSeparationLearning => "task-patternSeparationLearning",
            Task::PatternSeparationRecall => "task-patternSeparationRecall",
            Task::NBack => "task-nBack",
            Task::SpatialOrientation => "task-spatialOrientation",
            Task::VerbalFluency => "task-verbalFluency",
        }
    }

    /// Identifier without the `task-` prefix, as it appears after `task-` in file names
    pub fn short_name(&self) -> &'static str {
        &self.id()["task-".len()..]
    }

    /// Experiment name the runtime logs under (`task-moodPrediction` → `mood-prediction`)
    pub fn experiment_name(&self) -> String {
        task_to_experiment(self.id())
    }

    /// Whether the task is administered in the given session
    pub fn in_session(&self, session: Session) -> bool {
        !(session == Session::Post && *self == Task::PhysicalActivity)
    }

    pub fn transformer(&self) -> Box<dyn TaskTransformer> {
        match self {
            Task::MoodPrediction => Box::new(MoodPrediction),
            Task::Panas => Box::new(Survey::panas()),
            Task::PhysicalActivity => Box::new(Survey::physical_activity()),
            Task::Dass => Box::new(Survey::dass()),
            Task::DailyStressors => Box::new(Survey::daily_stressors()),
            Task::Ffmq => Box::new(Ffmq),
            Task::FaceName => Box::new(FaceName),
            Task::PatternSeparationLearning => Box::new(PatternSeparation::new(Phase::Learning)),
            Task::PatternSeparationRecall => Box::new(PatternSeparation::new(Phase::Recall)),
            Task::NBack => Box::new(NBack),
            Task::SpatialOrientation => Box::new(SpatialOrientation),
            Task::VerbalFluency => Box::new(VerbalFluency),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Task {
    type Err = CogError;

    /// Accepts `task-panas` or `panas`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.strip_prefix("task-").unwrap_or(s);
        Task::ALL
            .iter()
            .copied()
            .find(|t| t.short_name() == short)
            .ok_or_else(|| CogError::UnknownTask(s.to_string()))
    }
}

static UPPERCASE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]+").expect("Invalid uppercase regex"));

/// Look up the transformer for a task name; unknown names are fatal.
pub fn transformer_for_task(task_name: &str) -> Result<Box<dyn TaskTransformer>, CogError> {
    Ok(task_name.parse::<Task>()?.transformer())
}

/// Convert a task identifier to the runtime's experiment name.
///
/// `task-moodPrediction` → `mood-prediction`, `task-nBack` → `n-back`.
pub fn task_to_experiment(task_name: &str) -> String {
    let name = task_name.strip_prefix("task-").unwrap_or(task_name);
    let name = name.split('_').next().unwrap_or(name);
    UPPERCASE_RUN
        .replace_all(name, |caps: &regex::Captures| {
            format!("-{}", caps[0].to_lowercase())
        })
        .into_owned()
}
