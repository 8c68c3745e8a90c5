mod grading;
mod handlers;

use axum::{routing::get, routing::patch, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_attempts).post(handlers::submit_attempt))
        .route("/:attempt_id", get(handlers::get_attempt).patch(handlers::correct_attempt))
        .route("/:attempt_id/abandon", post(handlers::abandon_attempt))
        .route("/:attempt_id/regrade", post(handlers::regrade_attempt))
}

pub(crate) fn answers_router() -> Router<AppState> {
    Router::new().route("/:answer_id", patch(grading::grade_answer))
}

#[cfg(test)]
mod tests;
