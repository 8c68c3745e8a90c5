use sqlx::PgPool;

use crate::db::models::Quiz;

pub(crate) const COLUMNS: &str = "\
    id, organization_id, title, time_limit_minutes, is_published, deleted_at, \
    created_at, updated_at";

pub(crate) async fn find_live(
    pool: &PgPool,
    organization_id: &str,
    id: &str,
) -> Result<Option<Quiz>, sqlx::Error> {
    sqlx::query_as::<_, Quiz>(&format!(
        "SELECT {COLUMNS}
         FROM quizzes
         WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL"
    ))
    .bind(organization_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}
