use std::sync::Arc;

use sqlx::PgPool;

use crate::core::metrics;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Attempt, AttemptAnswer, Question, QuestionShape};
use crate::repositories::{answers, attempts};
use crate::services::catalog::QuestionCatalog;
use crate::services::errors::AttemptError;
use crate::services::submission::recompute_scores;
use crate::services::validation::{GradeInput, GradeValidator};
use crate::services::Actor;

#[derive(Debug)]
pub(crate) struct GradeOutcome {
    pub(crate) answer: AttemptAnswer,
    /// Present when the parent attempt was re-scored as part of grading.
    pub(crate) attempt: Option<Attempt>,
}

/// Teacher grading of a single answer.
pub(crate) struct AnswerGrader {
    catalog: Arc<dyn QuestionCatalog>,
    validator: GradeValidator,
    eager_recompute: bool,
}

/// Values written back to the answer row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedGrade {
    pub(crate) is_correct: Option<bool>,
    pub(crate) earned_points: f64,
    pub(crate) feedback: Option<String>,
}

impl AnswerGrader {
    pub(crate) fn new(
        catalog: Arc<dyn QuestionCatalog>,
        validator: GradeValidator,
        eager_recompute: bool,
    ) -> Self {
        Self { catalog, validator, eager_recompute }
    }

    pub(crate) async fn grade_answer(
        &self,
        pool: &PgPool,
        actor: &Actor,
        answer_id: &str,
        input: GradeInput,
    ) -> Result<GradeOutcome, AttemptError> {
        if !actor.role.is_staff() {
            return Err(AttemptError::Forbidden("Grading requires a teacher role"));
        }
        self.validator.validate(&input)?;

        let organization_id = actor.organization_id.as_str();
        let answer = answers::find_by_id(pool, organization_id, answer_id)
            .await
            .map_err(AttemptError::db("Failed to fetch answer"))?
            .ok_or(AttemptError::NotFound("Answer not found"))?;

        let question = self
            .catalog
            .find_question(organization_id, &answer.question_id)
            .await
            .map_err(AttemptError::db("Failed to fetch question"))?
            .ok_or(AttemptError::NotFound("Question not found"))?;
        let belongs = self
            .catalog
            .question_belongs_to_quiz(&question.id, &answer.quiz_id)
            .await
            .map_err(AttemptError::db("Failed to check question ownership"))?;
        if !belongs {
            return Err(AttemptError::Consistency {
                question_id: question.id,
                quiz_id: answer.quiz_id,
            });
        }

        // Same lock order as submissions: attempt first, then its answers. The
        // answer is re-read under the lock so the grade applies to the text
        // that is actually on file.
        let mut tx = pool.begin().await.map_err(AttemptError::db("Failed to start transaction"))?;
        attempts::lock(&mut *tx, organization_id, &answer.attempt_id)
            .await
            .map_err(AttemptError::db("Failed to lock attempt"))?
            .ok_or(AttemptError::NotFound("Attempt not found"))?;
        let answer = answers::find_by_id(&mut *tx, organization_id, &answer.id)
            .await
            .map_err(AttemptError::db("Failed to fetch answer"))?
            .ok_or(AttemptError::NotFound("Answer not found"))?;

        let resolved = resolve_grade(&question, &answer, input)?;
        let now = primitive_now_utc();

        let graded = answers::grade(
            &mut *tx,
            organization_id,
            &answer.id,
            answers::GradeAnswer {
                is_correct: resolved.is_correct,
                earned_points: resolved.earned_points,
                feedback: resolved.feedback.as_deref(),
                graded_by: &actor.actor_id,
                graded_at: now,
            },
        )
        .await
        .map_err(AttemptError::db("Failed to grade answer"))?
        .ok_or(AttemptError::NotFound("Answer not found"))?;

        let attempt = if self.eager_recompute {
            let catalog = self.catalog.as_ref();
            Some(recompute_scores(&mut *tx, catalog, organization_id, &graded.attempt_id).await?)
        } else {
            None
        };

        tx.commit().await.map_err(AttemptError::db("Failed to commit grade"))?;
        metrics::record_manual_grade();

        tracing::info!(
            answer_id = %graded.id,
            attempt_id = %graded.attempt_id,
            grader_id = %actor.actor_id,
            earned_points = graded.earned_points,
            recomputed = attempt.is_some(),
            "Answer graded by teacher"
        );

        Ok(GradeOutcome { answer: graded, attempt })
    }
}

/// Merges a grading payload with the answer's current grade. Missing fields
/// keep their stored value; `is_correct` alone implies full or zero points.
pub(crate) fn resolve_grade(
    question: &Question,
    answer: &AttemptAnswer,
    input: GradeInput,
) -> Result<ResolvedGrade, AttemptError> {
    let shape =
        question.validate_shape().map_err(|err| AttemptError::Validation(err.to_string()))?;
    if matches!(shape, QuestionShape::Single { .. }) && !input.override_auto_grade {
        return Err(AttemptError::Validation(format!(
            "answer {} is auto-graded; set override_auto_grade to change it",
            answer.id
        )));
    }

    let earned_points = match (input.earned_points, input.is_correct) {
        (Some(points), _) => points,
        (None, Some(true)) => question.points,
        (None, Some(false)) => 0.0,
        (None, None) => answer.earned_points,
    };
    if earned_points > question.points {
        return Err(AttemptError::Validation(format!(
            "earned_points cannot exceed {} for question {}",
            question.points, question.id
        )));
    }

    let is_correct = input
        .is_correct
        .or_else(|| input.earned_points.map(|points| points > 0.0))
        .or(answer.is_correct);

    let feedback = match input.feedback {
        Some(feedback) => {
            let trimmed = feedback.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        None => answer.feedback.clone(),
    };

    Ok(ResolvedGrade { is_correct, earned_points, feedback })
}
