use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, organization_id, quiz_id, student_id, status, started_at, finished_at, \
    score_raw, score_percent, created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) organization_id: &'a str,
    pub(crate) quiz_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) now: PrimitiveDateTime,
}

#[derive(Debug, Default)]
pub(crate) struct AttemptFilter<'a> {
    pub(crate) quiz_id: Option<&'a str>,
    pub(crate) student_id: Option<&'a str>,
    pub(crate) status: Option<AttemptStatus>,
}

pub(crate) struct StatusCorrection {
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) finished_at: Option<PrimitiveDateTime>,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    organization_id: &str,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS}
         FROM quiz_attempts
         WHERE organization_id = $1 AND id = $2"
    ))
    .bind(organization_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Row-locks the attempt for the rest of the transaction. Every writer that
/// rescores an attempt takes this lock before touching its answers.
pub(crate) async fn lock(
    conn: &mut PgConnection,
    organization_id: &str,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS}
         FROM quiz_attempts
         WHERE organization_id = $1 AND id = $2
         FOR UPDATE"
    ))
    .bind(organization_id)
    .bind(id)
    .fetch_optional(conn)
    .await
}

async fn lock_for_student(
    conn: &mut PgConnection,
    organization_id: &str,
    quiz_id: &str,
    student_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS}
         FROM quiz_attempts
         WHERE organization_id = $1 AND quiz_id = $2 AND student_id = $3
         FOR UPDATE"
    ))
    .bind(organization_id)
    .bind(quiz_id)
    .bind(student_id)
    .fetch_optional(conn)
    .await
}

/// Returns the attempt for `(organization, quiz, student)` and whether this
/// call created it. Concurrent callers converge on the same row through the
/// `quiz_attempts_identity` unique constraint. Either way the row is locked
/// until the caller's transaction ends.
pub(crate) async fn get_or_create(
    conn: &mut PgConnection,
    attempt: CreateAttempt<'_>,
) -> Result<(Attempt, bool), sqlx::Error> {
    let inserted = sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO quiz_attempts (
            id, organization_id, quiz_id, student_id, status, started_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        ON CONFLICT (organization_id, quiz_id, student_id) DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(attempt.id)
    .bind(attempt.organization_id)
    .bind(attempt.quiz_id)
    .bind(attempt.student_id)
    .bind(AttemptStatus::InProgress)
    .bind(attempt.started_at)
    .bind(attempt.now)
    .bind(attempt.now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(created) = inserted {
        return Ok((created, true));
    }

    let existing = lock_for_student(
        conn,
        attempt.organization_id,
        attempt.quiz_id,
        attempt.student_id,
    )
    .await?
    .ok_or(sqlx::Error::RowNotFound)?;

    Ok((existing, false))
}

pub(crate) async fn finish_with_scores(
    executor: impl sqlx::PgExecutor<'_>,
    organization_id: &str,
    id: &str,
    score_raw: f64,
    score_percent: f64,
    finished_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE quiz_attempts
         SET score_raw = $1,
             score_percent = $2,
             status = $3,
             finished_at = $4,
             updated_at = $5
         WHERE organization_id = $6 AND id = $7
         RETURNING {COLUMNS}"
    ))
    .bind(score_raw)
    .bind(score_percent)
    .bind(AttemptStatus::Finished)
    .bind(finished_at)
    .bind(now)
    .bind(organization_id)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update_scores(
    executor: impl sqlx::PgExecutor<'_>,
    organization_id: &str,
    id: &str,
    score_raw: f64,
    score_percent: f64,
    now: PrimitiveDateTime,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE quiz_attempts
         SET score_raw = $1, score_percent = $2, updated_at = $3
         WHERE organization_id = $4 AND id = $5
         RETURNING {COLUMNS}"
    ))
    .bind(score_raw)
    .bind(score_percent)
    .bind(now)
    .bind(organization_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Moves an attempt to `next` only while it is still in one of `from`.
pub(crate) async fn transition(
    executor: impl sqlx::PgExecutor<'_>,
    organization_id: &str,
    id: &str,
    from: &[AttemptStatus],
    next: AttemptStatus,
    now: PrimitiveDateTime,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE quiz_attempts
         SET status = $1, updated_at = $2
         WHERE organization_id = $3 AND id = $4 AND status::text = ANY($5)
         RETURNING {COLUMNS}"
    ))
    .bind(next)
    .bind(now)
    .bind(organization_id)
    .bind(id)
    .bind(from.iter().map(|status| status.as_str().to_string()).collect::<Vec<_>>())
    .fetch_optional(executor)
    .await
}

pub(crate) async fn apply_correction(
    executor: impl sqlx::PgExecutor<'_>,
    organization_id: &str,
    id: &str,
    correction: StatusCorrection,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE quiz_attempts
         SET status = $1, started_at = $2, finished_at = $3, updated_at = $4
         WHERE organization_id = $5 AND id = $6
         RETURNING {COLUMNS}"
    ))
    .bind(correction.status)
    .bind(correction.started_at)
    .bind(correction.finished_at)
    .bind(correction.now)
    .bind(organization_id)
    .bind(id)
    .fetch_optional(executor)
    .await
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    organization_id: &str,
    filter: &AttemptFilter<'_>,
) {
    builder.push(" WHERE organization_id = ");
    builder.push_bind(organization_id.to_string());

    if let Some(quiz_id) = filter.quiz_id {
        builder.push(" AND quiz_id = ");
        builder.push_bind(quiz_id.to_string());
    }
    if let Some(student_id) = filter.student_id {
        builder.push(" AND student_id = ");
        builder.push_bind(student_id.to_string());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
}

pub(crate) async fn list(
    pool: &PgPool,
    organization_id: &str,
    filter: &AttemptFilter<'_>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Attempt>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM quiz_attempts"));
    push_filters(&mut builder, organization_id, filter);

    builder.push(" ORDER BY created_at DESC, id OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Attempt>().fetch_all(pool).await
}

pub(crate) async fn count(
    pool: &PgPool,
    organization_id: &str,
    filter: &AttemptFilter<'_>,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM quiz_attempts");
    push_filters(&mut builder, organization_id, filter);

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}
