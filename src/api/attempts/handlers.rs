use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_admin, require_staff, CurrentActor};
use crate::api::pagination::{self, PaginatedResponse};
use crate::core::state::AppState;
use crate::core::time::to_primitive_utc;
use crate::db::types::AttemptStatus;
use crate::repositories;
use crate::schemas::attempt::{
    AttemptCorrectionRequest, AttemptResponse, ListAttemptsQuery, SubmitAttemptRequest,
};
use crate::services::lifecycle::AttemptCorrection;
use crate::services::submission::SubmitAttempt;
use crate::services::validation::AnswerInput;

pub(super) async fn submit_attempt(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let include_answers = payload.include_answers;
    let request = SubmitAttempt {
        quiz_id: payload.quiz_id,
        student_id: payload.student_id,
        answers: payload
            .answers
            .into_iter()
            .map(|answer| AnswerInput { question_id: answer.question_id, text: answer.text })
            .collect(),
        started_at: payload.started_at.map(to_primitive_utc),
        finished_at: payload.finished_at.map(to_primitive_utc),
    };

    let outcome = state.coordinator().submit(state.db(), &actor, request).await?;

    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    let response = if include_answers {
        AttemptResponse::with_answers(outcome.attempt, outcome.answers)
    } else {
        AttemptResponse::from(outcome.attempt)
    };

    Ok((status, Json(response)))
}

pub(super) async fn list_attempts(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Query(params): Query<ListAttemptsQuery>,
) -> Result<Json<PaginatedResponse<AttemptResponse>>, ApiError> {
    let student_id = if actor.role.is_staff() {
        params.student_id.as_deref()
    } else {
        match params.student_id.as_deref() {
            Some(requested) if requested != actor.actor_id => {
                return Err(ApiError::Forbidden("Students can only list their own attempts"));
            }
            _ => Some(actor.actor_id.as_str()),
        }
    };

    let status = params
        .status
        .as_deref()
        .map(|raw| {
            AttemptStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown attempt status '{raw}'")))
        })
        .transpose()?;

    let filter = repositories::attempts::AttemptFilter {
        quiz_id: params.quiz_id.as_deref(),
        student_id,
        status,
    };
    let (skip, limit) = pagination::normalize(params.skip, params.limit);

    let total_count = repositories::attempts::count(state.db(), &actor.organization_id, &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
    let attempts =
        repositories::attempts::list(state.db(), &actor.organization_id, &filter, skip, limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    Ok(Json(PaginatedResponse {
        items: attempts.into_iter().map(AttemptResponse::from).collect(),
        total_count,
        skip,
        limit,
    }))
}

pub(super) async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt =
        repositories::attempts::find_by_id(state.db(), &actor.organization_id, &attempt_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?;

    let Some(attempt) = attempt else {
        return Err(ApiError::NotFound("Attempt not found".to_string()));
    };

    // Another student's attempt looks the same as a missing one.
    if !actor.role.is_staff() && attempt.student_id != actor.actor_id {
        return Err(ApiError::NotFound("Attempt not found".to_string()));
    }

    let answers =
        repositories::answers::list_by_attempt(state.db(), &actor.organization_id, &attempt.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch attempt answers"))?;

    Ok(Json(AttemptResponse::with_answers(attempt, answers)))
}

pub(super) async fn correct_attempt(
    Path(attempt_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(payload): Json<AttemptCorrectionRequest>,
) -> Result<Json<AttemptResponse>, ApiError> {
    require_admin(&actor)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let correction = AttemptCorrection {
        status: payload.status,
        started_at: payload.started_at.map(to_primitive_utc),
        finished_at: payload.finished_at.map(to_primitive_utc),
    };
    let attempt = state
        .coordinator()
        .correct(state.db(), &actor.organization_id, &attempt_id, correction)
        .await?;

    Ok(Json(AttemptResponse::from(attempt)))
}

pub(super) async fn abandon_attempt(
    Path(attempt_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    require_admin(&actor)?;

    let attempt =
        state.coordinator().abandon(state.db(), &actor.organization_id, &attempt_id).await?;
    Ok(Json(AttemptResponse::from(attempt)))
}

pub(super) async fn regrade_attempt(
    Path(attempt_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    require_staff(&actor)?;

    let attempt =
        state.coordinator().regrade(state.db(), &actor.organization_id, &attempt_id).await?;
    Ok(Json(AttemptResponse::from(attempt)))
}
