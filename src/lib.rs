//! cog-tabulate - Normalizes cognitive-assessment trial logs into analysis-ready TSV files
//!
//! Raw trial records logged by the experiment runtime are grouped into runs (one
//! per task administration), normalized by a per-task transformer into flat rows
//! and written one TSV file per run: run segmentation → task transformation →
//! TSV writing.
//!
//! ## Modules
//!
//! - **Pipeline**: segment, transform and write one subject's trials for one task
//! - **Combiner**: merge per-run files of one task into a single file with subject metadata
//! - **CSV export**: flat comma-separated export of one experiment's relevant trials
//! - **Intervals**: time from the end of a learning run to the start of its recall
//! - **Sync**: load missing task data from the experiment store onto the data platform

pub mod combiner;
pub mod config;
pub mod csv_export;
pub mod error;
pub mod intervals;
pub mod label;
pub mod logging;
pub mod pipeline;
pub mod platform;
pub mod run;
pub mod store;
pub mod sync;
pub mod transformers;
pub mod types;
pub mod writer;

pub use combiner::{combine_files, combine_from_platform, CombineOptions, ConditionMap, Pseudonymizer};
pub use config::SyncConfig;
pub use csv_export::{export_file, Extractor};
pub use error::CogError;
pub use intervals::{IntervalSummary, IntervalTask};
pub use label::label_set_numbers;
pub use pipeline::{segment_runs, transform, transform_json};
pub use run::{RunData, RunSegmenter};
pub use sync::{sync, SyncOptions, SyncReport};
pub use transformers::{transformer_for_task, Task, TaskTransformer};
pub use types::{Cell, Session, TrialRecord, TrialRow};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Marker written for a value that is missing from the source record
pub const NOT_APPLICABLE: &str = "n/a";
