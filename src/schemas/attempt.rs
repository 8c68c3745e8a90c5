use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::core::time::{format_primitive, parse_client_timestamp};
use crate::db::models::{Attempt, AttemptAnswer};
use crate::db::types::AttemptStatus;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerPayload {
    #[serde(alias = "questionID", alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    pub(crate) text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitAttemptRequest {
    #[serde(alias = "quizID", alias = "quizId")]
    #[validate(length(min = 1, message = "quiz_id must not be empty"))]
    pub(crate) quiz_id: String,
    #[serde(default, alias = "studentID", alias = "studentId")]
    pub(crate) student_id: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) answers: Vec<AnswerPayload>,
    #[serde(
        default,
        alias = "startedAt",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) started_at: Option<OffsetDateTime>,
    #[serde(
        default,
        alias = "finishedAt",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) finished_at: Option<OffsetDateTime>,
    #[serde(default, alias = "includeAnswers")]
    pub(crate) include_answers: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AttemptCorrectionRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "status must not be empty"))]
    pub(crate) status: Option<String>,
    #[serde(
        default,
        alias = "startedAt",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) started_at: Option<OffsetDateTime>,
    #[serde(
        default,
        alias = "finishedAt",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) finished_at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeAnswerRequest {
    #[serde(default, alias = "isCorrect")]
    pub(crate) is_correct: Option<bool>,
    #[serde(default, alias = "earnedPoints")]
    #[validate(range(min = 0.0, message = "earned_points must be non-negative"))]
    pub(crate) earned_points: Option<f64>,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
    #[serde(default, alias = "overrideAutoGrade")]
    pub(crate) override_auto_grade: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListAttemptsQuery {
    #[serde(default, alias = "quizID", alias = "quizId")]
    pub(crate) quiz_id: Option<String>,
    #[serde(default, alias = "studentID", alias = "studentId")]
    pub(crate) student_id: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) quiz_id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) text: String,
    pub(crate) is_correct: Option<bool>,
    pub(crate) earned_points: f64,
    pub(crate) graded_by_teacher_id: Option<String>,
    pub(crate) graded_at: Option<String>,
    pub(crate) feedback: Option<String>,
    pub(crate) answered_at: String,
}

impl From<AttemptAnswer> for AnswerResponse {
    fn from(answer: AttemptAnswer) -> Self {
        Self {
            id: answer.id,
            quiz_id: answer.quiz_id,
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            text: answer.answer_text,
            is_correct: answer.is_correct,
            earned_points: answer.earned_points,
            graded_by_teacher_id: answer.graded_by_teacher_id,
            graded_at: answer.graded_at.map(format_primitive),
            feedback: answer.feedback,
            answered_at: format_primitive(answer.answered_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) organization_id: String,
    pub(crate) quiz_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) finished_at: Option<String>,
    pub(crate) score_raw: Option<f64>,
    pub(crate) score_percent: Option<f64>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) answers: Option<Vec<AnswerResponse>>,
}

impl AttemptResponse {
    pub(crate) fn with_answers(attempt: Attempt, answers: Vec<AttemptAnswer>) -> Self {
        let mut response = Self::from(attempt);
        response.answers = Some(answers.into_iter().map(AnswerResponse::from).collect());
        response
    }
}

impl From<Attempt> for AttemptResponse {
    fn from(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            organization_id: attempt.organization_id,
            quiz_id: attempt.quiz_id,
            student_id: attempt.student_id,
            status: attempt.status,
            started_at: format_primitive(attempt.started_at),
            finished_at: attempt.finished_at.map(format_primitive),
            score_raw: attempt.score_raw,
            score_percent: attempt.score_percent,
            created_at: format_primitive(attempt.created_at),
            updated_at: format_primitive(attempt.updated_at),
            answers: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeAnswerResponse {
    pub(crate) answer: AnswerResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) attempt: Option<AttemptResponse>,
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_client_timestamp(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}
