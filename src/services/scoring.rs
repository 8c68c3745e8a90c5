use std::collections::HashMap;

use crate::db::models::{AttemptAnswer, Question, QuestionShape};

/// Result of auto-grading one answer at submission time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AutoGrade {
    Graded { is_correct: bool, earned_points: f64 },
    /// Essay answers wait for a teacher.
    Pending,
}

impl AutoGrade {
    pub(crate) fn is_correct(self) -> Option<bool> {
        match self {
            AutoGrade::Graded { is_correct, .. } => Some(is_correct),
            AutoGrade::Pending => None,
        }
    }

    pub(crate) fn earned_points(self) -> f64 {
        match self {
            AutoGrade::Graded { earned_points, .. } => earned_points,
            AutoGrade::Pending => 0.0,
        }
    }
}

pub(crate) fn auto_grade(shape: &QuestionShape, points: f64, answer_text: &str) -> AutoGrade {
    match shape {
        QuestionShape::Essay => AutoGrade::Pending,
        QuestionShape::Single { correct_option, .. } => {
            let is_correct = answer_text.trim().eq_ignore_ascii_case(correct_option);
            AutoGrade::Graded { is_correct, earned_points: if is_correct { points } else { 0.0 } }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScoreSummary {
    pub(crate) score_raw: f64,
    pub(crate) max_points: f64,
    /// 0 when the quiz has nothing to score against.
    pub(crate) score_percent: f64,
}

/// Sums earned points over answers whose question is still live. `questions`
/// is the live question set of the quiz.
pub(crate) fn summarize(answers: &[AttemptAnswer], questions: &[Question]) -> ScoreSummary {
    let live: HashMap<&str, &Question> = questions
        .iter()
        .filter(|question| question.is_live())
        .map(|question| (question.id.as_str(), question))
        .collect();

    let max_points: f64 = live.values().map(|question| question.points.max(0.0)).sum();
    let score_raw: f64 = answers
        .iter()
        .filter(|answer| live.contains_key(answer.question_id.as_str()))
        .map(|answer| answer.earned_points)
        .sum();

    let score_percent = if max_points > 0.0 { round2(score_raw / max_points * 100.0) } else { 0.0 };

    ScoreSummary { score_raw: round2(score_raw), max_points, score_percent }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
