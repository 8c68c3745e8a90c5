use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentActor;
use crate::core::state::AppState;
use crate::schemas::attempt::{
    AnswerResponse, AttemptResponse, GradeAnswerRequest, GradeAnswerResponse,
};
use crate::services::validation::GradeInput;

pub(super) async fn grade_answer(
    Path(answer_id): Path<String>,
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Json(payload): Json<GradeAnswerRequest>,
) -> Result<Json<GradeAnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let input = GradeInput {
        is_correct: payload.is_correct,
        earned_points: payload.earned_points,
        feedback: payload.feedback,
        override_auto_grade: payload.override_auto_grade,
    };
    let outcome = state.grader().grade_answer(state.db(), &actor, &answer_id, input).await?;

    Ok(Json(GradeAnswerResponse {
        answer: AnswerResponse::from(outcome.answer),
        attempt: outcome.attempt.map(AttemptResponse::from),
    }))
}
