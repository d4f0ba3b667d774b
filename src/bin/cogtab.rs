//! cogtab CLI - Command-line interface for cog-tabulate
//!
//! Commands:
//! - transform: Turn one subject's raw trial export into per-run TSV files
//! - sync: Load missing task data from the experiment store onto the data platform
//! - combine: Merge every subject's files for one task, pulled from the platform
//! - combine-files: Merge local task files
//! - export-csv: Flatten one experiment's JSON downloads into comma-separated files
//! - intervals: Report time from learning end to recall start
//! - label-sets: Copy set numbers from set headers onto the trials that follow

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use cog_tabulate::logging::{init_logging, LogConfig, LogFormat};
use cog_tabulate::{
    combine_files, combine_from_platform, export_file, label_set_numbers, sync, transform_json,
    CogError, CombineOptions, ConditionMap, Extractor, IntervalSummary, IntervalTask, Pseudonymizer, Session, SyncConfig,
    SyncOptions, Task, TrialRecord, VERSION,
};

/// cogtab - Cognitive-assessment trial logs to analysis-ready TSV
#[derive(Parser)]
#[command(name = "cogtab")]
#[command(author = "HeartBEAM Data Team")]
#[command(version = VERSION)]
#[command(about = "Normalize cognitive-assessment trial logs into per-run TSV files", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format (pretty, compact, json)
    #[arg(long, default_value = "pretty", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform one subject's raw trial export into per-run TSV files
    Transform {
        /// Task identifier (e.g. task-panas)
        #[arg(short, long)]
        task: String,

        /// Subject identifier used in the file names
        #[arg(short, long)]
        subject: String,

        /// JSON array of trial records
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Load missing task data from the experiment store onto the data platform
    Sync {
        /// Config file (falls back to $COGTAB_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Load this task even if the platform already has it (repeatable)
        #[arg(short, long = "task")]
        tasks: Vec<Task>,

        /// Only load this subject
        #[arg(short, long)]
        user: Option<String>,

        #[command(flatten)]
        sessions: SessionArgs,

        /// Reload tasks that already have an acquisition
        #[arg(long)]
        force: bool,

        /// Transform and write locally but do not upload
        #[arg(long)]
        dry_run: bool,

        /// Where transformed files are written before upload
        #[arg(short, long, default_value = "data")]
        out_dir: PathBuf,
    },

    /// Combine every subject's files for one task, downloaded from the platform
    Combine {
        /// Config file (falls back to $COGTAB_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Task identifier without the task- prefix (e.g. panas)
        #[arg(short, long)]
        task: String,

        /// Combined output file
        #[arg(short, long)]
        outfile: PathBuf,

        #[command(flatten)]
        sessions: SessionArgs,

        /// Keep every row, not only rows marked relevant
        #[arg(long)]
        include_all: bool,

        #[command(flatten)]
        blinding: BlindingArgs,
    },

    /// Combine local task files
    CombineFiles {
        /// Combined output file
        #[arg(short, long)]
        outfile: PathBuf,

        /// Keep every row, not only rows marked relevant
        #[arg(long)]
        include_all: bool,

        #[command(flatten)]
        blinding: BlindingArgs,

        /// Task files named sub-<id>_ses-<pre|post>_task-<task>[_run-<n>]_beh.tsv
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Flatten per-experiment JSON downloads into CSV, relevant trials only
    ExportCsv {
        /// Experiment (demographics, physical-activity, pattern-separation, face-name, panas, daily-stressors, dass, ffmq)
        #[arg(short, long)]
        experiment: Extractor,

        /// JSON arrays of trials; each is written to <file>.csv
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Report seconds from the end of a learning run to the start of its recall
    Intervals {
        /// Task pair to measure
        #[arg(short, long, value_enum)]
        task: IntervalArg,

        /// Learning trials (JSON array)
        learning: PathBuf,

        /// Recall trials (JSON array)
        recall: PathBuf,
    },

    /// Label trials with the set number of their preceding set header
    LabelSets {
        /// Raw trials (JSON array)
        input: PathBuf,

        /// Labeled trials (JSON array)
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct BlindingArgs {
    /// JSON map of subject pseudonym to condition code; enables blinding
    #[arg(long)]
    user_map: Option<PathBuf>,

    /// Seed for the condition letter assignment
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(clap::Args)]
struct SessionArgs {
    /// Only the pre session (sets 1-6)
    #[arg(long)]
    pre: bool,

    /// Only the post session (sets 7+)
    #[arg(long)]
    post: bool,
}

impl SessionArgs {
    /// Selected sessions; neither flag means both.
    fn selected(&self) -> Vec<Session> {
        let mut sessions = Vec::new();
        if self.pre {
            sessions.push(Session::Pre);
        }
        if self.post {
            sessions.push(Session::Post);
        }
        sessions
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum IntervalArg {
    PatternSeparation,
    VerbalLearning,
}

impl From<IntervalArg> for IntervalTask {
    fn from(t: IntervalArg) -> Self {
        match t {
            IntervalArg::PatternSeparation => IntervalTask::PatternSeparation,
            IntervalArg::VerbalLearning => IntervalTask::VerbalLearning,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig::from_verbosity(cli.verbose).with_format(cli.log_format);
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), CogtabCliError> {
    match command {
        Commands::Transform {
            task,
            subject,
            input,
            out_dir,
        } => cmd_transform(&task, &subject, &input, &out_dir),

        Commands::Sync {
            config,
            tasks,
            user,
            sessions,
            force,
            dry_run,
            out_dir,
        } => {
            let mut options = SyncOptions::new(out_dir);
            options.tasks = tasks;
            options.user = user;
            options.sessions = sessions.selected();
            options.force = force;
            options.dry_run = dry_run;
            cmd_sync(config, &options)
        }

        Commands::Combine {
            config,
            task,
            outfile,
            sessions,
            include_all,
            blinding,
        } => cmd_combine(config, &task, &sessions.selected(), &outfile, include_all, &blinding),

        Commands::CombineFiles {
            outfile,
            include_all,
            blinding,
            files,
        } => {
            let options = combine_options(include_all, &blinding)?;
            let rows = combine_files(&files, &outfile, &options)?;
            info!(rows, output = %outfile.display(), "Combined");
            Ok(())
        }

        Commands::ExportCsv { experiment, files } => {
            for file in &files {
                println!("{}", export_file(experiment, file)?.display());
            }
            Ok(())
        }

        Commands::Intervals {
            task,
            learning,
            recall,
        } => cmd_intervals(task.into(), &learning, &recall),

        Commands::LabelSets { input, output } => cmd_label_sets(&input, &output),
    }
}

fn cmd_transform(task: &str, subject: &str, input: &Path, out_dir: &Path) -> Result<(), CogtabCliError> {
    let raw = fs::read_to_string(input)?;
    fs::create_dir_all(out_dir)?;
    let paths = transform_json(task, &raw, subject, out_dir)?;
    if paths.is_empty() {
        return Err(CogtabCliError::NoRuns(task.to_string()));
    }
    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}

fn cmd_sync(config: Option<PathBuf>, options: &SyncOptions) -> Result<(), CogtabCliError> {
    let config = SyncConfig::load(&SyncConfig::resolve_path(config)?)?;
    let store = config.store()?;
    let platform = config.platform()?;
    fs::create_dir_all(&options.out_dir)?;

    let report = sync(&store, &platform, options)?;
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "subjects": report.subjects,
        "files_written": report.files_written,
        "uploads": report.uploads,
        "remote_failures": report.remote_failures,
        "dry_run": options.dry_run,
    }))?);
    Ok(())
}

fn cmd_combine(
    config: Option<PathBuf>,
    task: &str,
    sessions: &[Session],
    outfile: &Path,
    include_all: bool,
    blinding: &BlindingArgs,
) -> Result<(), CogtabCliError> {
    let config = SyncConfig::load(&SyncConfig::resolve_path(config)?)?;
    let platform = config.platform()?;
    let options = combine_options(include_all, blinding)?;
    let short = task.strip_prefix("task-").unwrap_or(task);
    let rows = combine_from_platform(&platform, short, sessions, outfile, &options)?;
    info!(rows, task = short, output = %outfile.display(), "Combined");
    Ok(())
}

/// One random condition assignment per invocation.
fn combine_options(include_all: bool, blinding: &BlindingArgs) -> Result<CombineOptions, CogtabCliError> {
    let pseudonymizer = match &blinding.user_map {
        Some(path) => {
            let mut rng = match blinding.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            Some(Pseudonymizer::load(path, ConditionMap::random(&mut rng))?)
        }
        None => None,
    };
    Ok(CombineOptions {
        include_all,
        pseudonymizer,
    })
}

fn cmd_intervals(task: IntervalTask, learning: &Path, recall: &Path) -> Result<(), CogtabCliError> {
    let learning = TrialRecord::parse_array(&fs::read_to_string(learning)?)?;
    let recall = TrialRecord::parse_array(&fs::read_to_string(recall)?)?;
    let summary = IntervalSummary::from_logs(task, &learning, &recall)?;
    print!("{}", summary);
    Ok(())
}

fn cmd_label_sets(input: &Path, output: &Path) -> Result<(), CogtabCliError> {
    let mut trials = TrialRecord::parse_array(&fs::read_to_string(input)?)?;
    label_set_numbers(&mut trials)?;
    fs::write(output, serde_json::to_string_pretty(&trials)?)?;
    info!(trials = trials.len(), output = %output.display(), "Labeled");
    Ok(())
}

// Error types

#[derive(Debug)]
enum CogtabCliError {
    Io(io::Error),
    Cog(CogError),
    Json(serde_json::Error),
    NoRuns(String),
}

impl From<io::Error> for CogtabCliError {
    fn from(e: io::Error) -> Self {
        CogtabCliError::Io(e)
    }
}

impl From<CogError> for CogtabCliError {
    fn from(e: CogError) -> Self {
        CogtabCliError::Cog(e)
    }
}

impl From<serde_json::Error> for CogtabCliError {
    fn from(e: serde_json::Error) -> Self {
        CogtabCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CogtabCliError> for CliError {
    fn from(e: CogtabCliError) -> Self {
        match e {
            CogtabCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CogtabCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CogtabCliError::NoRuns(task) => CliError {
                code: "NO_RUNS".to_string(),
                message: format!("No runs of {} found in input", task),
                hint: Some("Check that the export holds set headers for this task".to_string()),
            },
            CogtabCliError::Cog(e) => {
                let hint = match &e {
                    CogError::UnknownTask(_) => Some("Use a task id such as task-panas".to_string()),
                    CogError::Config { .. } => {
                        Some("Pass --config or set COGTAB_CONFIG".to_string())
                    }
                    CogError::UnmatchedFileName(_) => Some(
                        "Files must be named sub-<id>_ses-<pre|post>_task-<task>[_run-<n>]_beh.tsv"
                            .to_string(),
                    ),
                    e if e.is_contract_violation() => {
                        Some("The trial log is malformed; fix the export and retry".to_string())
                    }
                    e if e.is_remote() => Some("Check platform and store availability".to_string()),
                    _ => None,
                };
                CliError {
                    code: "COGTAB_ERROR".to_string(),
                    message: e.to_string(),
                    hint,
                }
            }
        }
    }
}
