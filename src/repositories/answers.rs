use time::PrimitiveDateTime;

use crate::db::models::AttemptAnswer;

pub(crate) const COLUMNS: &str = "\
    id, organization_id, quiz_id, attempt_id, question_id, answer_text, is_correct, \
    earned_points, graded_by_teacher_id, graded_at, feedback, answered_at, created_at, updated_at";

pub(crate) struct UpsertAnswer<'a> {
    pub(crate) id: &'a str,
    pub(crate) organization_id: &'a str,
    pub(crate) quiz_id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) answer_text: &'a str,
    pub(crate) is_correct: Option<bool>,
    pub(crate) earned_points: f64,
    pub(crate) answered_at: PrimitiveDateTime,
}

pub(crate) struct GradeAnswer<'a> {
    pub(crate) is_correct: Option<bool>,
    pub(crate) earned_points: f64,
    pub(crate) feedback: Option<&'a str>,
    pub(crate) graded_by: &'a str,
    pub(crate) graded_at: PrimitiveDateTime,
}

/// Inserts or replaces the answer for `(attempt, question)`.
///
/// A re-answer with identical text keeps an existing manual grade; any other
/// re-answer replaces the grading state with the supplied values and clears
/// the grader metadata.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    answer: UpsertAnswer<'_>,
) -> Result<AttemptAnswer, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(&format!(
        "INSERT INTO quiz_attempt_answers AS a (
            id, organization_id, quiz_id, attempt_id, question_id, answer_text,
            is_correct, earned_points, answered_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9,$9)
        ON CONFLICT (attempt_id, question_id) DO UPDATE
        SET is_correct = CASE
                WHEN a.answer_text = EXCLUDED.answer_text AND a.graded_by_teacher_id IS NOT NULL
                THEN a.is_correct ELSE EXCLUDED.is_correct END,
            earned_points = CASE
                WHEN a.answer_text = EXCLUDED.answer_text AND a.graded_by_teacher_id IS NOT NULL
                THEN a.earned_points ELSE EXCLUDED.earned_points END,
            feedback = CASE
                WHEN a.answer_text = EXCLUDED.answer_text THEN a.feedback ELSE NULL END,
            graded_at = CASE
                WHEN a.answer_text = EXCLUDED.answer_text THEN a.graded_at ELSE NULL END,
            graded_by_teacher_id = CASE
                WHEN a.answer_text = EXCLUDED.answer_text THEN a.graded_by_teacher_id ELSE NULL END,
            answer_text = EXCLUDED.answer_text,
            answered_at = EXCLUDED.answered_at,
            updated_at = EXCLUDED.updated_at
        RETURNING {COLUMNS}"
    ))
    .bind(answer.id)
    .bind(answer.organization_id)
    .bind(answer.quiz_id)
    .bind(answer.attempt_id)
    .bind(answer.question_id)
    .bind(answer.answer_text)
    .bind(answer.is_correct)
    .bind(answer.earned_points)
    .bind(answer.answered_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_by_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    organization_id: &str,
    attempt_id: &str,
) -> Result<Vec<AttemptAnswer>, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(&format!(
        "SELECT {COLUMNS}
         FROM quiz_attempt_answers
         WHERE organization_id = $1 AND attempt_id = $2
         ORDER BY answered_at, id"
    ))
    .bind(organization_id)
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    organization_id: &str,
    id: &str,
) -> Result<Option<AttemptAnswer>, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(&format!(
        "SELECT {COLUMNS}
         FROM quiz_attempt_answers
         WHERE organization_id = $1 AND id = $2"
    ))
    .bind(organization_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn grade(
    executor: impl sqlx::PgExecutor<'_>,
    organization_id: &str,
    id: &str,
    grade: GradeAnswer<'_>,
) -> Result<Option<AttemptAnswer>, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(&format!(
        "UPDATE quiz_attempt_answers
         SET is_correct = $1,
             earned_points = $2,
             feedback = $3,
             graded_by_teacher_id = $4,
             graded_at = $5,
             updated_at = $5
         WHERE organization_id = $6 AND id = $7
         RETURNING {COLUMNS}"
    ))
    .bind(grade.is_correct)
    .bind(grade.earned_points)
    .bind(grade.feedback)
    .bind(grade.graded_by)
    .bind(grade.graded_at)
    .bind(organization_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}
