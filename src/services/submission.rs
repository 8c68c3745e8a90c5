use std::collections::HashMap;
use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::StatusPolicy;
use crate::core::metrics;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Attempt, AttemptAnswer, Question};
use crate::db::types::AttemptStatus;
use crate::repositories::{answers, attempts};
use crate::services::catalog::QuestionCatalog;
use crate::services::errors::AttemptError;
use crate::services::scoring::{self, AutoGrade};
use crate::services::validation::{AnswerInput, SubmissionValidator};
use crate::services::Actor;

#[derive(Debug, Clone)]
pub(crate) struct SubmitAttempt {
    pub(crate) quiz_id: String,
    pub(crate) student_id: Option<String>,
    pub(crate) answers: Vec<AnswerInput>,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) finished_at: Option<PrimitiveDateTime>,
}

#[derive(Debug)]
pub(crate) struct SubmitOutcome {
    pub(crate) attempt: Attempt,
    pub(crate) answers: Vec<AttemptAnswer>,
    pub(crate) created: bool,
}

pub(crate) struct SubmissionCoordinator {
    catalog: Arc<dyn QuestionCatalog>,
    validator: SubmissionValidator,
    status_policy: StatusPolicy,
}

impl SubmissionCoordinator {
    pub(crate) fn new(
        catalog: Arc<dyn QuestionCatalog>,
        validator: SubmissionValidator,
        status_policy: StatusPolicy,
    ) -> Self {
        Self { catalog, validator, status_policy }
    }

    pub(crate) fn catalog(&self) -> &dyn QuestionCatalog {
        self.catalog.as_ref()
    }

    pub(crate) fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    /// Starts or submits the caller's attempt. An empty batch only makes sure
    /// the attempt exists; otherwise every answer is upserted, auto-graded and
    /// the attempt is re-scored from all answers on file, in one transaction.
    pub(crate) async fn submit(
        &self,
        pool: &PgPool,
        actor: &Actor,
        request: SubmitAttempt,
    ) -> Result<SubmitOutcome, AttemptError> {
        let starting = request.answers.is_empty();
        let result = self.submit_inner(pool, actor, request).await;
        match &result {
            Ok(_) if starting => metrics::record_submission("started"),
            Ok(_) => metrics::record_submission("graded"),
            Err(AttemptError::Database { .. }) => metrics::record_submission("error"),
            Err(_) => metrics::record_submission("rejected"),
        }
        result
    }

    async fn submit_inner(
        &self,
        pool: &PgPool,
        actor: &Actor,
        request: SubmitAttempt,
    ) -> Result<SubmitOutcome, AttemptError> {
        let batch = self.validator.validate_answers(&request.answers)?;
        let student_id = resolve_student(actor, request.student_id.as_deref())?;
        let organization_id = actor.organization_id.as_str();

        let quiz = self
            .catalog
            .find_quiz(organization_id, request.quiz_id.trim())
            .await
            .map_err(AttemptError::db("Failed to fetch quiz"))?
            .ok_or(AttemptError::NotFound("Quiz not found"))?;
        if !quiz.is_published && !actor.role.is_staff() {
            return Err(AttemptError::NotFound("Quiz not found"));
        }

        let questions = self
            .catalog
            .questions_for_quiz(organization_id, &quiz.id)
            .await
            .map_err(AttemptError::db("Failed to fetch quiz questions"))?;
        let graded = grade_batch(&batch, &questions, &quiz.id)?;

        // Staff may backfill timestamps; students always get server time.
        let (started_at, finished_at) = if actor.role.is_staff() {
            (request.started_at, request.finished_at)
        } else {
            (None, None)
        };

        let attempt_id = Uuid::new_v4().to_string();
        let mut tx = pool.begin().await.map_err(AttemptError::db("Failed to start transaction"))?;

        let (attempt, created) = attempts::get_or_create(
            &mut *tx,
            attempts::CreateAttempt {
                id: &attempt_id,
                organization_id,
                quiz_id: &quiz.id,
                student_id: &student_id,
                started_at: started_at.unwrap_or_else(primitive_now_utc),
                now: primitive_now_utc(),
            },
        )
        .await
        .map_err(AttemptError::db("Failed to create attempt"))?;

        if created {
            tracing::info!(
                attempt_id = %attempt.id,
                quiz_id = %quiz.id,
                student_id = %student_id,
                "Attempt created"
            );
        } else if started_at.is_some_and(|requested| requested != attempt.started_at) {
            return Err(AttemptError::Conflict(
                "Attempt already started; correct started_at through PATCH /attempts/{id}"
                    .to_string(),
            ));
        }

        if graded.is_empty() {
            tx.commit().await.map_err(AttemptError::db("Failed to commit attempt"))?;
            let answers = answers::list_by_attempt(pool, organization_id, &attempt.id)
                .await
                .map_err(AttemptError::db("Failed to fetch attempt answers"))?;
            return Ok(SubmitOutcome { attempt, answers, created });
        }

        if !attempt.status.can_transition_to(AttemptStatus::Finished) {
            return Err(AttemptError::Conflict(format!(
                "Attempt is {} and no longer accepts answers",
                attempt.status.as_str()
            )));
        }

        // The row lock is held from here on. A concurrent creator may have
        // stamped started_at after this request arrived, so the server clock
        // never lands before it.
        let now = primitive_now_utc().max(attempt.started_at);
        let finished_at = match finished_at {
            Some(requested) if requested < attempt.started_at => {
                return Err(AttemptError::Validation(
                    "finished_at must not be earlier than started_at".to_string(),
                ));
            }
            Some(requested) => requested,
            None => now,
        };

        for (answer, grade) in &graded {
            let answer_id = Uuid::new_v4().to_string();
            answers::upsert(
                &mut *tx,
                answers::UpsertAnswer {
                    id: &answer_id,
                    organization_id,
                    quiz_id: &quiz.id,
                    attempt_id: &attempt.id,
                    question_id: &answer.question_id,
                    answer_text: &answer.text,
                    is_correct: grade.is_correct(),
                    earned_points: grade.earned_points(),
                    answered_at: now,
                },
            )
            .await
            .map_err(AttemptError::db("Failed to save answer"))?;

            if let AutoGrade::Graded { is_correct, .. } = grade {
                metrics::record_autograde(*is_correct);
            }
        }

        let answers = answers::list_by_attempt(&mut *tx, organization_id, &attempt.id)
            .await
            .map_err(AttemptError::db("Failed to fetch attempt answers"))?;
        let summary = scoring::summarize(&answers, &questions);

        let attempt = attempts::finish_with_scores(
            &mut *tx,
            organization_id,
            &attempt.id,
            summary.score_raw,
            summary.score_percent,
            finished_at,
            now,
        )
        .await
        .map_err(AttemptError::db("Failed to update attempt score"))?;

        tx.commit().await.map_err(AttemptError::db("Failed to commit submission"))?;

        tracing::info!(
            attempt_id = %attempt.id,
            answers_written = graded.len(),
            answers_on_file = answers.len(),
            score_raw = summary.score_raw,
            score_percent = summary.score_percent,
            "Submission graded"
        );

        Ok(SubmitOutcome { attempt, answers, created })
    }
}

/// Resolves whose attempt is being submitted. Students act for themselves;
/// staff must name the student.
pub(crate) fn resolve_student(
    actor: &Actor,
    requested: Option<&str>,
) -> Result<String, AttemptError> {
    let requested = requested.map(str::trim).filter(|value| !value.is_empty());

    if actor.role.is_staff() {
        return requested.map(str::to_string).ok_or_else(|| {
            AttemptError::Validation("student_id is required for staff submissions".to_string())
        });
    }

    match requested {
        Some(student_id) if student_id != actor.actor_id => {
            Err(AttemptError::Forbidden("Students can only submit their own attempts"))
        }
        _ => Ok(actor.actor_id.clone()),
    }
}

/// Matches every answer to a live question of the quiz and auto-grades it.
/// The first answer that does not belong to the quiz rejects the whole batch.
fn grade_batch<'a>(
    batch: &'a [AnswerInput],
    questions: &[Question],
    quiz_id: &str,
) -> Result<Vec<(&'a AnswerInput, AutoGrade)>, AttemptError> {
    let by_id: HashMap<&str, &Question> =
        questions.iter().map(|question| (question.id.as_str(), question)).collect();

    batch
        .iter()
        .map(|answer| {
            let question = by_id.get(answer.question_id.as_str()).ok_or_else(|| {
                AttemptError::Consistency {
                    question_id: answer.question_id.clone(),
                    quiz_id: quiz_id.to_string(),
                }
            })?;
            let shape = question
                .validate_shape()
                .map_err(|err| AttemptError::Validation(err.to_string()))?;
            Ok((answer, scoring::auto_grade(&shape, question.points, &answer.text)))
        })
        .collect()
}

/// Re-scores an attempt from the answers on file without touching its status.
/// Takes the attempt row lock, so concurrent submissions cannot interleave.
pub(crate) async fn recompute_scores(
    conn: &mut PgConnection,
    catalog: &dyn QuestionCatalog,
    organization_id: &str,
    attempt_id: &str,
) -> Result<Attempt, AttemptError> {
    let attempt = attempts::lock(&mut *conn, organization_id, attempt_id)
        .await
        .map_err(AttemptError::db("Failed to lock attempt"))?
        .ok_or(AttemptError::NotFound("Attempt not found"))?;
    let questions = catalog
        .questions_for_quiz(organization_id, &attempt.quiz_id)
        .await
        .map_err(AttemptError::db("Failed to fetch quiz questions"))?;
    let answers = answers::list_by_attempt(&mut *conn, organization_id, &attempt.id)
        .await
        .map_err(AttemptError::db("Failed to fetch attempt answers"))?;
    let summary = scoring::summarize(&answers, &questions);

    attempts::update_scores(
        &mut *conn,
        organization_id,
        &attempt.id,
        summary.score_raw,
        summary.score_percent,
        primitive_now_utc(),
    )
    .await
    .map_err(AttemptError::db("Failed to update attempt score"))?
    .ok_or(AttemptError::NotFound("Attempt not found"))
}
