use sqlx::PgPool;

use crate::db::models::Question;

pub(crate) const COLUMNS: &str = "\
    id, organization_id, quiz_id, question_type, prompt, points, options, correct_option, \
    order_index, deleted_at, created_at, updated_at";

pub(crate) async fn list_live_by_quiz(
    pool: &PgPool,
    organization_id: &str,
    quiz_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS}
         FROM quiz_questions
         WHERE organization_id = $1 AND quiz_id = $2 AND deleted_at IS NULL
         ORDER BY order_index, created_at"
    ))
    .bind(organization_id)
    .bind(quiz_id)
    .fetch_all(pool)
    .await
}

/// Includes soft-deleted questions so historical answers stay gradable.
pub(crate) async fn find_by_id(
    pool: &PgPool,
    organization_id: &str,
    id: &str,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS}
         FROM quiz_questions
         WHERE organization_id = $1 AND id = $2"
    ))
    .bind(organization_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn belongs_to_quiz(
    pool: &PgPool,
    question_id: &str,
    quiz_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM quiz_questions WHERE id = $1 AND quiz_id = $2
         )",
    )
    .bind(question_id)
    .bind(quiz_id)
    .fetch_one(pool)
    .await
}
