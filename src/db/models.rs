use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, OptionsError, QuestionOptions, QuestionType};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Quiz {
    pub(crate) id: String,
    pub(crate) organization_id: String,
    pub(crate) title: String,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) is_published: bool,
    pub(crate) deleted_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) organization_id: String,
    pub(crate) quiz_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) prompt: String,
    pub(crate) points: f64,
    pub(crate) options: Option<Json<serde_json::Value>>,
    pub(crate) correct_option: Option<String>,
    pub(crate) order_index: i32,
    pub(crate) deleted_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Validated view of a question, produced by [`Question::validate_shape`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum QuestionShape {
    Single { options: QuestionOptions, correct_option: String },
    Essay,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub(crate) enum ShapeError {
    #[error("question {0} has negative points")]
    NegativePoints(String),
    #[error("essay question {0} must not carry a correct option")]
    EssayWithCorrectOption(String),
    #[error("single-choice question {0} has no correct option")]
    MissingCorrectOption(String),
    #[error("single-choice question {0} has no options")]
    MissingOptions(String),
    #[error("single-choice question {0} has malformed options")]
    MalformedOptions(String),
    #[error("single-choice question {question_id}: {source}")]
    InvalidOptions { question_id: String, source: OptionsError },
    #[error("single-choice question {question_id}: correct option '{key}' is not offered")]
    CorrectOptionNotOffered { question_id: String, key: String },
}

impl Question {
    pub(crate) fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub(crate) fn validate_shape(&self) -> Result<QuestionShape, ShapeError> {
        if !(self.points >= 0.0) {
            return Err(ShapeError::NegativePoints(self.id.clone()));
        }

        match self.question_type {
            QuestionType::Essay => {
                if self.correct_option.as_deref().is_some_and(|key| !key.trim().is_empty()) {
                    return Err(ShapeError::EssayWithCorrectOption(self.id.clone()));
                }
                Ok(QuestionShape::Essay)
            }
            QuestionType::Single => {
                let correct_option = self
                    .correct_option
                    .as_deref()
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .ok_or_else(|| ShapeError::MissingCorrectOption(self.id.clone()))?
                    .to_ascii_uppercase();

                let raw = self
                    .options
                    .as_ref()
                    .ok_or_else(|| ShapeError::MissingOptions(self.id.clone()))?;
                let options: QuestionOptions = serde_json::from_value(raw.0.clone())
                    .map_err(|_| ShapeError::MalformedOptions(self.id.clone()))?;
                options.validate().map_err(|source| ShapeError::InvalidOptions {
                    question_id: self.id.clone(),
                    source,
                })?;

                if !options.contains_key(&correct_option) {
                    return Err(ShapeError::CorrectOptionNotOffered {
                        question_id: self.id.clone(),
                        key: correct_option,
                    });
                }

                Ok(QuestionShape::Single { options, correct_option })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) organization_id: String,
    pub(crate) quiz_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) finished_at: Option<PrimitiveDateTime>,
    pub(crate) score_raw: Option<f64>,
    pub(crate) score_percent: Option<f64>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AttemptAnswer {
    pub(crate) id: String,
    pub(crate) organization_id: String,
    pub(crate) quiz_id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) answer_text: String,
    pub(crate) is_correct: Option<bool>,
    pub(crate) earned_points: f64,
    pub(crate) graded_by_teacher_id: Option<String>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) feedback: Option<String>,
    pub(crate) answered_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
