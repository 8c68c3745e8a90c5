use std::collections::HashSet;

use crate::core::config::StatusPolicy;
use crate::db::types::AttemptStatus;
use crate::services::errors::AttemptError;

/// One submitted answer, as received from the caller.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AnswerInput {
    pub(crate) question_id: String,
    pub(crate) text: String,
}

/// Manual grading payload for a single answer.
#[derive(Debug, Clone, Default)]
pub(crate) struct GradeInput {
    pub(crate) is_correct: Option<bool>,
    pub(crate) earned_points: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) override_auto_grade: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SubmissionValidator {
    max_answers: usize,
    max_answer_length: usize,
}

impl SubmissionValidator {
    pub(crate) fn new(max_answers: usize, max_answer_length: usize) -> Self {
        Self { max_answers, max_answer_length }
    }

    /// Returns the batch with ids and texts trimmed. Nothing is written when
    /// this fails, so it runs before any storage call.
    pub(crate) fn validate_answers(
        &self,
        answers: &[AnswerInput],
    ) -> Result<Vec<AnswerInput>, AttemptError> {
        if answers.len() > self.max_answers {
            return Err(AttemptError::Validation(format!(
                "at most {} answers may be submitted at once",
                self.max_answers
            )));
        }

        let mut seen = HashSet::with_capacity(answers.len());
        let mut normalized = Vec::with_capacity(answers.len());
        for answer in answers {
            let question_id = answer.question_id.trim();
            if question_id.is_empty() {
                return Err(AttemptError::Validation("question_id must not be blank".to_string()));
            }
            if !seen.insert(question_id) {
                return Err(AttemptError::Validation(format!(
                    "question {question_id} is answered more than once"
                )));
            }

            let text = answer.text.trim();
            if text.is_empty() {
                return Err(AttemptError::Validation(format!(
                    "answer to question {question_id} must not be blank"
                )));
            }
            if text.chars().count() > self.max_answer_length {
                return Err(AttemptError::Validation(format!(
                    "answer to question {question_id} exceeds {} characters",
                    self.max_answer_length
                )));
            }

            normalized.push(AnswerInput {
                question_id: question_id.to_string(),
                text: text.to_string(),
            });
        }

        Ok(normalized)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GradeValidator {
    max_feedback_length: usize,
}

impl GradeValidator {
    pub(crate) fn new(max_feedback_length: usize) -> Self {
        Self { max_feedback_length }
    }

    pub(crate) fn validate(&self, input: &GradeInput) -> Result<(), AttemptError> {
        if input.is_correct.is_none() && input.earned_points.is_none() && input.feedback.is_none()
        {
            return Err(AttemptError::Validation(
                "at least one of is_correct, earned_points or feedback is required".to_string(),
            ));
        }

        if let Some(points) = input.earned_points {
            if !points.is_finite() || points < 0.0 {
                return Err(AttemptError::Validation(
                    "earned_points must be a non-negative number".to_string(),
                ));
            }
        }

        if let Some(feedback) = input.feedback.as_deref() {
            if feedback.chars().count() > self.max_feedback_length {
                return Err(AttemptError::Validation(format!(
                    "feedback exceeds {} characters",
                    self.max_feedback_length
                )));
            }
        }

        Ok(())
    }
}

/// Maps a caller-supplied status onto the attempt lifecycle. Under the
/// lenient policy unknown values fall back to `in_progress`.
pub(crate) fn resolve_status(
    raw: &str,
    policy: StatusPolicy,
) -> Result<AttemptStatus, AttemptError> {
    match (AttemptStatus::parse(raw), policy) {
        (Some(status), _) => Ok(status),
        (None, StatusPolicy::Lenient) => {
            tracing::warn!(status = %raw, "Unknown attempt status, falling back to in_progress");
            Ok(AttemptStatus::InProgress)
        }
        (None, StatusPolicy::Strict) => {
            Err(AttemptError::Validation(format!("unknown attempt status '{}'", raw.trim())))
        }
    }
}
