use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;
use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;
use crate::repositories::attempts;
use crate::services::errors::AttemptError;
use crate::services::submission::{recompute_scores, SubmissionCoordinator};
use crate::services::validation::resolve_status;

/// Administrative correction of an attempt's status or timestamps.
#[derive(Debug, Clone, Default)]
pub(crate) struct AttemptCorrection {
    pub(crate) status: Option<String>,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) finished_at: Option<PrimitiveDateTime>,
}

impl SubmissionCoordinator {
    pub(crate) async fn abandon(
        &self,
        pool: &PgPool,
        organization_id: &str,
        attempt_id: &str,
    ) -> Result<Attempt, AttemptError> {
        let attempt = load_attempt(pool, organization_id, attempt_id).await?;
        if attempt.status.is_terminal() {
            return Err(AttemptError::Conflict(format!(
                "Attempt is {} and cannot be abandoned",
                attempt.status.as_str()
            )));
        }

        let updated = attempts::transition(
            pool,
            organization_id,
            attempt_id,
            &[AttemptStatus::InProgress, AttemptStatus::Submitted],
            AttemptStatus::Abandoned,
            primitive_now_utc(),
        )
        .await
        .map_err(AttemptError::db("Failed to abandon attempt"))?
        .ok_or_else(|| AttemptError::Conflict("Attempt changed state concurrently".to_string()))?;

        tracing::info!(
            attempt_id = %updated.id,
            previous_status = attempt.status.as_str(),
            "Attempt abandoned"
        );
        Ok(updated)
    }

    /// Overwrites status and timestamps as an administrator asks. The state
    /// machine is not consulted; unknown statuses follow the configured policy.
    pub(crate) async fn correct(
        &self,
        pool: &PgPool,
        organization_id: &str,
        attempt_id: &str,
        correction: AttemptCorrection,
    ) -> Result<Attempt, AttemptError> {
        if correction.status.is_none()
            && correction.started_at.is_none()
            && correction.finished_at.is_none()
        {
            return Err(AttemptError::Validation(
                "at least one of status, started_at or finished_at is required".to_string(),
            ));
        }

        let attempt = load_attempt(pool, organization_id, attempt_id).await?;
        let status = match correction.status.as_deref() {
            Some(raw) => resolve_status(raw, self.status_policy())?,
            None => attempt.status,
        };
        let started_at = correction.started_at.unwrap_or(attempt.started_at);
        let finished_at = correction.finished_at.or(attempt.finished_at);

        if finished_at.is_some_and(|finished_at| finished_at < started_at) {
            return Err(AttemptError::Validation(
                "finished_at must not be earlier than started_at".to_string(),
            ));
        }

        let updated = attempts::apply_correction(
            pool,
            organization_id,
            attempt_id,
            attempts::StatusCorrection {
                status,
                started_at,
                finished_at,
                now: primitive_now_utc(),
            },
        )
        .await
        .map_err(AttemptError::db("Failed to correct attempt"))?
        .ok_or(AttemptError::NotFound("Attempt not found"))?;

        tracing::info!(
            attempt_id = %updated.id,
            previous_status = attempt.status.as_str(),
            status = updated.status.as_str(),
            "Attempt corrected"
        );
        Ok(updated)
    }

    /// Re-scores the attempt from the answers on file. Status and timestamps
    /// are left alone.
    pub(crate) async fn regrade(
        &self,
        pool: &PgPool,
        organization_id: &str,
        attempt_id: &str,
    ) -> Result<Attempt, AttemptError> {
        let mut tx = pool.begin().await.map_err(AttemptError::db("Failed to start transaction"))?;
        let updated =
            recompute_scores(&mut *tx, self.catalog(), organization_id, attempt_id).await?;
        tx.commit().await.map_err(AttemptError::db("Failed to commit regrade"))?;

        tracing::info!(
            attempt_id = %updated.id,
            score_raw = ?updated.score_raw,
            score_percent = ?updated.score_percent,
            "Attempt regraded"
        );
        Ok(updated)
    }
}

async fn load_attempt(
    pool: &PgPool,
    organization_id: &str,
    attempt_id: &str,
) -> Result<Attempt, AttemptError> {
    attempts::find_by_id(pool, organization_id, attempt_id)
        .await
        .map_err(AttemptError::db("Failed to fetch attempt"))?
        .ok_or(AttemptError::NotFound("Attempt not found"))
}
