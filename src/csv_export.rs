//! Flat per-experiment CSV exports
//!
//! A per-experiment JSON download is flattened into one comma-separated row per
//! relevant trial, every field quoted. Irrelevant trials are dropped. A relevant
//! trial whose `trial_type` the experiment never produces, or whose answers name a
//! column the export does not declare, aborts the export before anything is written.

use crate::error::CogError;
use crate::transformers::{ffmq_column, source_map};
use crate::types::{Cell, TrialRecord, TrialRow};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde_json::Value;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

const DEMOGRAPHICS_COLUMNS: &[&str] = &[
    "asthma",
    "inhaler_med",
    "diabetes_pre_diabetes",
    "diabetes",
    "heart_condition",
    "sleep_aide_med",
    "other_disease",
    "other_disease_which",
    "race_bi1",
    "race_bi2",
    "race_other",
    "sleep_apnea",
    "varicose_hemorrhoids",
    "thyroid_med",
    "estrogen_replacement_current",
    "antidepressant_med",
    "irregular_heartbeats",
    "heart_disease",
    "arthritis_et_al",
    "none_med",
    "estrogen_replacement_med",
    "osteoporosis_tendonitis",
    "cancer",
    "dateTime",
    "userId",
    "race",
    "ethnicity",
    "experiment",
    "trial_type",
    "isRelevant",
    "time_elapsed",
    "covid_vax",
    "med1_name",
    "med1_dose",
    "med2_name",
    "med2_dose",
    "med3_name",
    "med3_dose",
    "med4_name",
    "med4_dose",
    "med5_name",
    "med5_dose",
    "med6_name",
    "med6_dose",
    "covid_vax_1st_dose",
    "covid_vax_2nd_dose",
    "covid_positive_test1",
    "covid_positive_test2",
    "covid_positive_test3",
    "covid_count",
    "psych_diag",
    "retired",
    "weekly_alcoholic_drinks",
    "profession",
    "last_menstrual_period",
    "blood_pressure_med",
    "ever_smoked",
    "doctorNone",
    "education_years",
    "psych_diag_which",
    "hypertension",
    "heart_disease_med",
];

const PHYSICAL_ACTIVITY_COLUMNS: &[&str] = &[
    "isRelevant",
    "dateTime",
    "userId",
    "activity_level",
    "weight",
    "height_feet",
    "height_inches",
    "age",
    "gender",
    "setNum",
];

const PATTERN_SEPARATION_COLUMNS: &[&str] = &[
    "userId",
    "experiment",
    "dateTime",
    "trial_type",
    "trial_index",
    "isRelevant",
    "isPractice",
    "isLearning",
    "isRecall",
    "type",
    "pic",
    "response",
    "rt",
    "time_elapsed",
];

const FACE_NAME_COLUMNS: &[&str] = &[
    "userId",
    "experiment",
    "dateTime",
    "trial_type",
    "trial_index",
    "isRelevant",
    "isPractice",
    "isLearning",
    "isRecall",
    "cat",
    "picId",
    "names",
    "name",
    "response",
    "correct",
    "rt",
    "time_elapsed",
];

const PANAS_COLUMNS: &[&str] = &[
    "userId",
    "experiment",
    "dateTime",
    "trial_type",
    "trial_index",
    "isRelevant",
    "question_order",
    "interested",
    "distressed",
    "excited",
    "upset",
    "strong",
    "guilty",
    "scared",
    "hostile",
    "enthusiastic",
    "proud",
    "irritable",
    "alert",
    "ashamed",
    "inspired",
    "nervous",
    "determined",
    "attentive",
    "jittery",
    "active",
    "afraid",
    "rt",
    "time_elapsed",
];

const DAILY_STRESSORS_COLUMNS: &[&str] = &[
    "userId", "experiment", "dateTime", "trial_type", "trial_index", "isRelevant", "Q0", "Q1",
    "Q2", "Q3", "Q4", "Q5", "Q6", "Q7", "rt", "time_elapsed",
];

const DASS_COLUMNS: &[&str] = &[
    "userId", "experiment", "dateTime", "trial_type", "trial_index", "isRelevant", "Q0", "Q1",
    "Q2", "Q3", "Q4", "Q5", "Q6", "Q7", "Q8", "Q9", "Q10", "Q11", "Q12", "Q13", "Q14", "Q15",
    "Q16", "Q17", "Q18", "Q19", "Q20", "rt", "time_elapsed",
];

const FFMQ_EXPORT_COLUMNS: &[&str] = &[
    "userId", "experiment", "dateTime", "trial_type", "trial_index", "isRelevant", "Q0", "Q1",
    "Q2", "Q3", "Q4", "Q5", "Q6", "Q7", "Q8", "Q9", "Q10", "Q11", "Q12", "Q13", "Q14", "rt",
    "time_elapsed",
];

/// Identity and timing fields every questionnaire trial must carry
const SURVEY_REQUIRED: &[&str] = &[
    "userId",
    "experiment",
    "dateTime",
    "trial_type",
    "trial_index",
    "isRelevant",
    "rt",
    "time_elapsed",
];

const LEARNING_FLAGS: &[&str] = &["isRelevant", "isPractice", "isLearning", "isRecall"];

/// How a relevant trial becomes a row
#[derive(Debug, Clone, Copy)]
enum RowShape {
    /// Declared fields that are present, plus every `response` answer; absent `defaults` read `False`
    Form { defaults: &'static [&'static str] },
    /// Declared fields that are present; absent `defaults` read `False`
    Flagged { defaults: &'static [&'static str] },
    /// `SURVEY_REQUIRED` fields plus every `response` answer
    Survey,
    /// `SURVEY_REQUIRED` fields plus answers keyed by FFMQ question text
    QuestionLookup,
}

/// One experiment's flat CSV export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    Demographics,
    PhysicalActivity,
    PatternSeparation,
    FaceName,
    Panas,
    DailyStressors,
    Dass,
    Ffmq,
}

impl Extractor {
    pub const ALL: [Extractor; 8] = [
        Extractor::Demographics,
        Extractor::PhysicalActivity,
        Extractor::PatternSeparation,
        Extractor::FaceName,
        Extractor::Panas,
        Extractor::DailyStressors,
        Extractor::Dass,
        Extractor::Ffmq,
    ];

    /// Experiment name as the runtime logs it
    pub fn name(&self) -> &'static str {
        match self {
            Extractor::Demographics => "demographics",
            Extractor::PhysicalActivity => "physical-activity",
            Extractor::PatternSeparation => "pattern-separation",
            Extractor::FaceName => "face-name",
            Extractor::Panas => "panas",
            Extractor::DailyStressors => "daily-stressors",
            Extractor::Dass => "dass",
            Extractor::Ffmq => "ffmq",
        }
    }

    /// Output columns, in order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Extractor::Demographics => DEMOGRAPHICS_COLUMNS,
            Extractor::PhysicalActivity => PHYSICAL_ACTIVITY_COLUMNS,
            Extractor::PatternSeparation => PATTERN_SEPARATION_COLUMNS,
            Extractor::FaceName => FACE_NAME_COLUMNS,
            Extractor::Panas => PANAS_COLUMNS,
            Extractor::DailyStressors => DAILY_STRESSORS_COLUMNS,
            Extractor::Dass => DASS_COLUMNS,
            Extractor::Ffmq => FFMQ_EXPORT_COLUMNS,
        }
    }

    /// `trial_type` values a relevant trial of this experiment may have
    pub fn trial_types(&self) -> &'static [&'static str] {
        match self {
            Extractor::Demographics => &["survey-html-form"],
            Extractor::PhysicalActivity => &["html-keyboard-response", "survey-html-form"],
            Extractor::PatternSeparation => &["image-keyboard-response"],
            Extractor::FaceName => &["html-keyboard-response"],
            Extractor::Panas | Extractor::Ffmq => &["survey-likert"],
            Extractor::DailyStressors | Extractor::Dass => &["survey-multi-choice"],
        }
    }

    fn shape(&self) -> RowShape {
        match self {
            Extractor::Demographics => RowShape::Form {
                defaults: &["userId", "experiment", "dateTime", "trial_type", "isRelevant", "time_elapsed"],
            },
            Extractor::PhysicalActivity => RowShape::Form {
                defaults: &["userId", "dateTime", "isRelevant"],
            },
            Extractor::PatternSeparation | Extractor::FaceName => {
                RowShape::Flagged { defaults: LEARNING_FLAGS }
            }
            Extractor::Panas | Extractor::DailyStressors | Extractor::Dass => RowShape::Survey,
            Extractor::Ffmq => RowShape::QuestionLookup,
        }
    }

    /// Whether a trial belongs in the export.
    ///
    /// Irrelevant trials are skipped; a relevant trial of an unexpected type is fatal.
    pub fn accepts(&self, record: &TrialRecord) -> Result<bool, CogError> {
        if !record.is_relevant().unwrap_or(false) {
            return Ok(false);
        }
        let trial_type = lookup(record, "trial_type").and_then(Value::as_str);
        match trial_type {
            Some(t) if self.trial_types().contains(&t) => Ok(true),
            other => Err(CogError::UnexpectedTrialType {
                experiment: self.name().to_string(),
                trial_type: other.unwrap_or("<none>").to_string(),
            }),
        }
    }

    /// Flatten one accepted trial.
    pub fn row(&self, record: &TrialRecord) -> Result<TrialRow, CogError> {
        let mut row = TrialRow::new();
        match self.shape() {
            RowShape::Form { defaults } => {
                self.copy_present(record, &mut row);
                default_false(record, defaults, &mut row);
                self.merge_response(record, &mut row)?;
            }
            RowShape::Flagged { defaults } => {
                self.copy_present(record, &mut row);
                default_false(record, defaults, &mut row);
            }
            RowShape::Survey => {
                copy_required(record, &mut row)?;
                self.merge_response(record, &mut row)?;
            }
            RowShape::QuestionLookup => {
                copy_required(record, &mut row)?;
                let response = source_map(record, Some("response"))
                    .ok_or_else(|| CogError::MissingField("response".to_string()))?;
                for (question, answer) in response.iter() {
                    let column = ffmq_column(question)
                        .ok_or_else(|| CogError::UnmappedQuestion(question.clone()))?;
                    row.set(column, Cell::from_json(answer));
                }
            }
        }
        Ok(row)
    }

    fn copy_present(&self, record: &TrialRecord, row: &mut TrialRow) {
        for column in self.columns() {
            let Some(value) = lookup(record, column) else {
                continue;
            };
            let cell = match (*self, value) {
                (Extractor::FaceName, Value::Array(names)) if *column == "names" => {
                    Cell::Text(join_names(names))
                }
                _ => Cell::from_json(value),
            };
            row.set(*column, cell);
        }
    }

    fn merge_response(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
        let response = source_map(record, Some("response"))
            .ok_or_else(|| CogError::MissingField("response".to_string()))?;
        for (key, value) in response.iter() {
            if !self.columns().contains(&key.as_str()) {
                return Err(CogError::UnexpectedColumn {
                    experiment: self.name().to_string(),
                    column: key.clone(),
                });
            }
            row.set(key.clone(), Cell::from_json(value));
        }
        Ok(())
    }
}

impl fmt::Display for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Extractor {
    type Err = CogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Extractor::ALL
            .iter()
            .copied()
            .find(|e| e.name() == s)
            .ok_or_else(|| CogError::UnknownTask(s.to_string()))
    }
}

/// Field lookup that sees both nested and flat records.
fn lookup<'a>(record: &'a TrialRecord, key: &str) -> Option<&'a Value> {
    record.field(key).or_else(|| record.get(key))
}

fn default_false(record: &TrialRecord, keys: &[&'static str], row: &mut TrialRow) {
    for key in keys {
        if lookup(record, key).is_none() {
            row.set(*key, false);
        }
    }
}

fn copy_required(record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
    for key in SURVEY_REQUIRED {
        let value = lookup(record, key).ok_or_else(|| CogError::MissingField((*key).to_string()))?;
        row.set(*key, Cell::from_json(value));
    }
    Ok(())
}

fn join_names(names: &[Value]) -> String {
    names
        .iter()
        .map(|n| n.as_str().map(str::to_string).unwrap_or_else(|| n.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Rows for every relevant trial, in input order.
pub fn export_rows(extractor: Extractor, trials: &[TrialRecord]) -> Result<Vec<TrialRow>, CogError> {
    let mut rows = Vec::new();
    for record in trials {
        if extractor.accepts(record)? {
            rows.push(extractor.row(record)?);
        }
    }
    debug!(experiment = %extractor, kept = rows.len(), total = trials.len(), "Filtered trials");
    Ok(rows)
}

/// Write rows as fully quoted, `\n`-terminated CSV; columns a row lacks are empty.
pub fn write_csv(extractor: Extractor, rows: &[TrialRow], output: &Path) -> Result<(), CogError> {
    let mut writer = WriterBuilder::new()
        .delimiter(b',')
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_path(output)?;
    writer.write_record(extractor.columns())?;
    for row in rows {
        writer.write_record(extractor.columns().iter().map(|c| row.render(c)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Output path for an export: the input path with `.csv` appended.
pub fn csv_path(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(".csv");
    PathBuf::from(name)
}

/// Export one JSON download next to itself and return the CSV path.
///
/// # Example
/// ```ignore
/// let out = export_file(Extractor::Panas, Path::new("panas.02.19.2023.json"))?;
/// assert_eq!(out, Path::new("panas.02.19.2023.json.csv"));
/// ```
pub fn export_file(extractor: Extractor, input: &Path) -> Result<PathBuf, CogError> {
    let trials = TrialRecord::parse_array(&fs::read_to_string(input)?)?;
    let rows = export_rows(extractor, &trials)?;
    let output = csv_path(input);
    write_csv(extractor, &rows, &output)?;
    info!(experiment = %extractor, rows = rows.len(), output = %output.display(), "Exported");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn panas_trial(relevant: bool, trial_type: &str) -> TrialRecord {
        TrialRecord::from(json!({
            "userId": "u1",
            "experiment": "panas",
            "dateTime": "2023-02-19T19:32:08.000Z",
            "trial_type": trial_type,
            "trial_index": 4,
            "isRelevant": relevant,
            "rt": 5120,
            "time_elapsed": 30211,
            "response": { "interested": 3, "afraid": 1 }
        }))
    }

    #[test]
    fn test_irrelevant_trials_are_dropped() {
        let trials = vec![
            panas_trial(true, "survey-likert"),
            panas_trial(false, "html-keyboard-response"),
            TrialRecord::from(json!({ "trial_type": "fullscreen" })),
        ];
        let rows = export_rows(Extractor::Panas, &trials).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].render("interested"), "3");
        assert_eq!(rows[0].render("isRelevant"), "True");
        assert_eq!(rows[0].render("excited"), "");
    }

    #[test]
    fn test_unexpected_trial_type_is_fatal() {
        let trials = vec![panas_trial(true, "survey-likert"), panas_trial(true, "survey-multi-choice")];
        let err = export_rows(Extractor::Panas, &trials).unwrap_err();
        assert!(matches!(
            &err,
            CogError::UnexpectedTrialType { experiment, trial_type }
                if experiment == "panas" && trial_type == "survey-multi-choice"
        ));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_demographics_defaults_identity_fields() {
        let record = TrialRecord::from(json!({
            "userId": "u7",
            "isRelevant": true,
            "trial_type": "survey-html-form",
            "ignored_field": "x",
            "response": { "asthma": "no", "education_years": "16" }
        }));
        let rows = export_rows(Extractor::Demographics, &[record]).unwrap();
        let row = &rows[0];
        assert_eq!(row.render("userId"), "u7");
        assert_eq!(row.render("experiment"), "False");
        assert_eq!(row.render("time_elapsed"), "False");
        assert_eq!(row.render("asthma"), "no");
        assert_eq!(row.render("education_years"), "16");
        assert!(!row.contains("ignored_field"));
    }

    #[test]
    fn test_undeclared_answer_is_fatal() {
        let record = TrialRecord::from(json!({
            "userId": "u7",
            "isRelevant": true,
            "trial_type": "survey-html-form",
            "response": { "favorite_color": "blue" }
        }));
        let err = Extractor::Demographics.row(&record).unwrap_err();
        assert!(matches!(err, CogError::UnexpectedColumn { column, .. } if column == "favorite_color"));
    }

    #[test]
    fn test_face_name_joins_names_and_defaults_flags() {
        let record = TrialRecord::from(json!({
            "userId": "u2",
            "isRelevant": true,
            "trial_type": "html-keyboard-response",
            "isLearning": true,
            "names": ["Ann", "Bo", "Cy"],
            "picId": "f12"
        }));
        let row = Extractor::FaceName.row(&record).unwrap();
        assert_eq!(row.render("names"), "Ann,Bo,Cy");
        assert_eq!(row.render("isLearning"), "True");
        assert_eq!(row.render("isPractice"), "False");
        assert_eq!(row.render("isRecall"), "False");
        assert_eq!(row.render("rt"), "");
    }

    #[test]
    fn test_survey_requires_identity_fields() {
        let mut record = panas_trial(true, "survey-likert").into_value();
        record.as_object_mut().unwrap().remove("rt");
        let err = Extractor::Panas.row(&TrialRecord::from(record)).unwrap_err();
        assert!(matches!(err, CogError::MissingField(field) if field == "rt"));
    }

    #[test]
    fn test_ffmq_answers_keyed_by_question() {
        let mut record = panas_trial(true, "survey-likert").into_value();
        record["experiment"] = json!("ffmq");
        record["response"] = json!({ "I find myself doing things without paying attention.": 4 });
        let row = Extractor::Ffmq.row(&TrialRecord::from(record.clone())).unwrap();
        assert_eq!(row.render("Q1"), "4");

        record["response"] = json!({ "Something else entirely": 2 });
        assert!(matches!(
            Extractor::Ffmq.row(&TrialRecord::from(record)),
            Err(CogError::UnmappedQuestion(_))
        ));
    }

    #[test]
    fn test_export_file_writes_quoted_csv_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("daily-stressors.02.19.2023.json");
        let trial = json!({
            "userId": "u1", "experiment": "daily-stressors", "dateTime": "2023-02-19T19:30:57Z",
            "trial_type": "survey-multi-choice", "trial_index": 2, "isRelevant": true,
            "rt": 900, "time_elapsed": 1500, "response": { "Q0": "Yes", "Q3": "No" }
        });
        fs::write(&input, json!([trial, { "isRelevant": false }]).to_string()).unwrap();

        let output = export_file(Extractor::DailyStressors, &input).unwrap();
        assert_eq!(output, dir.path().join("daily-stressors.02.19.2023.json.csv"));

        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("\"userId\",\"experiment\",\"dateTime\""));
        assert_eq!(
            lines[1],
            "\"u1\",\"daily-stressors\",\"2023-02-19T19:30:57Z\",\"survey-multi-choice\",\"2\",\"True\",\
             \"Yes\",\"\",\"\",\"No\",\"\",\"\",\"\",\"\",\"900\",\"1500\""
        );
        assert!(!text.contains('\r'));
    }

    #[test]
    fn test_extractor_names() {
        assert_eq!("face-name".parse::<Extractor>().unwrap(), Extractor::FaceName);
        assert!(matches!("n-back".parse::<Extractor>(), Err(CogError::UnknownTask(_))));
    }
}
