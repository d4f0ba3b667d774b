//! Questionnaire tasks
//!
//! Survey answers arrive as a `response` mapping. Most surveys copy it straight
//! through; mood prediction renames its keys and FFMQ keys answers by question
//! text, which is mapped onto fixed question numbers.

use super::strategy::{source_map, DirectCopy, RenamedCopy};
use super::{Task, TaskTransformer};
use crate::error::CogError;
use crate::types::{Cell, TrialRecord, TrialRow};

const PANAS_FIELDS: &[&str] = &[
    "ashamed",
    "upset",
    "strong",
    "proud",
    "excited",
    "hostile",
    "attentive",
    "active",
    "inspired",
    "distressed",
    "enthusiastic",
    "guilty",
    "irritable",
    "alert",
    "nervous",
    "determined",
    "jittery",
    "afraid",
    "interested",
    "scared",
];

const PHYSICAL_ACTIVITY_FIELDS: &[&str] = &[
    "activity_level",
    "weight",
    "height_feet",
    "height_inches",
    "age",
    "gender",
];

const DASS_FIELDS: &[&str] = &[
    "Q0", "Q1", "Q2", "Q3", "Q4", "Q5", "Q6", "Q7", "Q8", "Q9", "Q10", "Q11", "Q12", "Q13",
    "Q14", "Q15", "Q16", "Q17", "Q18", "Q19", "Q20",
];

const DAILY_STRESSORS_FIELDS: &[&str] = &["Q0", "Q1", "Q2", "Q3", "Q4", "Q5", "Q6", "Q7"];

/// Survey whose `response` keys are already the output column names
pub struct Survey {
    task: Task,
    copy: DirectCopy,
    multi_runs: bool,
}

impl Survey {
    pub fn panas() -> Self {
        Self {
            task: Task::Panas,
            copy: DirectCopy { source: Some("response"), fields: PANAS_FIELDS },
            multi_runs: true,
        }
    }

    pub fn physical_activity() -> Self {
        Self {
            task: Task::PhysicalActivity,
            copy: DirectCopy { source: Some("response"), fields: PHYSICAL_ACTIVITY_FIELDS },
            multi_runs: false,
        }
    }

    pub fn dass() -> Self {
        Self {
            task: Task::Dass,
            copy: DirectCopy { source: Some("response"), fields: DASS_FIELDS },
            multi_runs: false,
        }
    }

    pub fn daily_stressors() -> Self {
        Self {
            task: Task::DailyStressors,
            copy: DirectCopy { source: Some("response"), fields: DAILY_STRESSORS_FIELDS },
            multi_runs: false,
        }
    }
}

impl TaskTransformer for Survey {
    fn task(&self) -> Task {
        self.task
    }

    fn columns(&self) -> &[&'static str] {
        self.copy.fields
    }

    fn has_multi_runs(&self) -> bool {
        self.multi_runs
    }

    fn extract(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
        self.copy.apply(record, row);
        Ok(())
    }
}

const MOOD_PREDICTION_RESPONSES: RenamedCopy = RenamedCopy {
    source: Some("response"),
    pairs: &[
        ("Bad Mood", "bad_mood"),
        ("Neutral Mood", "neutral_mood"),
        ("Good Mood", "good_mood"),
    ],
};

/// Mood prediction: the prompt plus three slider ratings
pub struct MoodPrediction;

impl TaskTransformer for MoodPrediction {
    fn task(&self) -> Task {
        Task::MoodPrediction
    }

    fn columns(&self) -> &[&'static str] {
        &["preamble", "bad_mood", "neutral_mood", "good_mood"]
    }

    fn extract(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
        row.set("preamble", Cell::from_optional(record.field("preamble")));
        MOOD_PREDICTION_RESPONSES.apply(record, row);
        Ok(())
    }
}

/// FFMQ question text, exactly as shown to participants, and its output column
pub const FFMQ_QUESTIONS: [(&str, &str); 15] = [
    ("I think some of my emotions are bad or inappropriate and I shouldn’t feel them.", "Q0"),
    ("I find myself doing things without paying attention.", "Q1"),
    ("When I take a shower or a bath, I stay alert to the sensations of water on my body.", "Q2"),
    ("I have trouble thinking of the right words to express how I feel about things.", "Q3"),
    ("I tell myself I shouldn’t be feeling the way I’m feeling.", "Q4"),
    ("When I have distressing thoughts or images I just notice them and let them go.", "Q5"),
    ("When I have distressing thoughts or images I am able just to notice them without reacting.", "Q6"),
    ("I pay attention to sensations, such as the wind in my hair or the sun on my face.", "Q7"),
    ("I don’t pay attention to what I’m doing because I’m daydreaming, worrying, or otherwise distracted.", "Q8"),
    ("I do jobs or tasks automatically without being aware of what I’m doing.", "Q9"),
    ("I’m good at finding words to describe my feelings.", "Q10"),
    ("When I have distressing thoughts or images, I “step back” and am aware of the thought or image without getting taken over by it.", "Q11"),
    ("I notice how foods and drinks affect my thoughts, bodily sensations, and emotions.", "Q12"),
    ("Even when I’m feeling terribly upset I can find a way to put it into words.", "Q13"),
    ("I believe some of my thoughts are abnormal or bad and I shouldn’t think that way.", "Q14"),
];

const FFMQ_COLUMNS: &[&str] = &[
    "Q0", "Q1", "Q2", "Q3", "Q4", "Q5", "Q6", "Q7", "Q8", "Q9", "Q10", "Q11", "Q12", "Q13", "Q14",
];

pub(crate) fn ffmq_column(question: &str) -> Option<&'static str> {
    FFMQ_QUESTIONS
        .iter()
        .find(|(text, _)| *text == question)
        .map(|(_, column)| *column)
}

/// Five Facet Mindfulness Questionnaire
pub struct Ffmq;

impl TaskTransformer for Ffmq {
    fn task(&self) -> Task {
        Task::Ffmq
    }

    fn columns(&self) -> &[&'static str] {
        FFMQ_COLUMNS
    }

    fn extract(&self, record: &TrialRecord, row: &mut TrialRow) -> Result<(), CogError> {
        for column in FFMQ_COLUMNS {
            row.set(*column, Cell::NotApplicable);
        }
        let Some(response) = source_map(record, Some("response")) else {
            return Ok(());
        };
        for (question, answer) in response.iter() {
            let column = ffmq_column(question)
                .ok_or_else(|| CogError::UnmappedQuestion(question.clone()))?;
            row.set(column, Cell::from_json(answer));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_panas_copies_all_words() {
        let mut response = serde_json::Map::new();
        for (i, word) in PANAS_FIELDS.iter().enumerate() {
            response.insert(word.to_string(), json!(i % 5));
        }
        let record = TrialRecord::from(json!({ "results": { "response": response } }));
        let mut row = TrialRow::new();
        Survey::panas().extract(&record, &mut row).unwrap();
        assert_eq!(row.len(), PANAS_FIELDS.len());
        assert_eq!(row.render("upset"), "1");
        assert_eq!(row.render("scared"), "4");
    }

    #[test]
    fn test_mood_prediction_renames() {
        let record = TrialRecord::from(json!({
            "results": {
                "preamble": "How will you feel tomorrow?",
                "response": { "Bad Mood": 10, "Neutral Mood": 55, "Good Mood": 35 }
            }
        }));
        let mut row = TrialRow::new();
        MoodPrediction.extract(&record, &mut row).unwrap();
        assert_eq!(row.render("preamble"), "How will you feel tomorrow?");
        assert_eq!(row.render("bad_mood"), "10");
        assert_eq!(row.render("neutral_mood"), "55");
        assert_eq!(row.render("good_mood"), "35");
    }

    #[test]
    fn test_mood_prediction_missing_response() {
        let record = TrialRecord::from(json!({ "results": { "trial_type": "survey-html-form" } }));
        let mut row = TrialRow::new();
        MoodPrediction.extract(&record, &mut row).unwrap();
        assert_eq!(row.render("preamble"), "n/a");
        assert_eq!(row.render("good_mood"), "n/a");
    }

    #[test]
    fn test_ffmq_maps_question_text() {
        let record = TrialRecord::from(json!({
            "results": { "response": {
                "I find myself doing things without paying attention.": 3,
                "I’m good at finding words to describe my feelings.": 1
            } }
        }));
        let mut row = TrialRow::new();
        Ffmq.extract(&record, &mut row).unwrap();
        assert_eq!(row.render("Q1"), "3");
        assert_eq!(row.render("Q10"), "1");
        assert_eq!(row.render("Q0"), "n/a");
    }

    #[test]
    fn test_ffmq_unmapped_question_is_fatal() {
        let record = TrialRecord::from(json!({
            "results": { "response": { "I like turtles.": 4 } }
        }));
        let mut row = TrialRow::new();
        let err = Ffmq.extract(&record, &mut row).unwrap_err();
        assert!(matches!(err, CogError::UnmappedQuestion(ref q) if q == "I like turtles."));
    }

    #[test]
    fn test_ffmq_table_covers_every_column() {
        let mut columns: Vec<&str> = FFMQ_QUESTIONS.iter().map(|(_, c)| *c).collect();
        columns.sort_by_key(|c| c[1..].parse::<u32>().unwrap());
        assert_eq!(columns, FFMQ_COLUMNS.to_vec());
    }
}
