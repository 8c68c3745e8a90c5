use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::security::{self, ActorRole};
use crate::core::state::AppState;
use crate::services::Actor;

const BAD_CREDENTIALS: &str = "Invalid authentication credentials";

/// Authenticated caller resolved from the bearer token.
pub(crate) struct CurrentActor(pub(crate) Actor);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized(BAD_CREDENTIALS))?;
        let claims = security::verify_token(token, state.settings()).map_err(|err| {
            tracing::debug!(error = %err, "Rejected bearer token");
            ApiError::Unauthorized(BAD_CREDENTIALS)
        })?;

        Ok(CurrentActor(Actor {
            organization_id: claims.org,
            actor_id: claims.sub,
            role: claims.role,
        }))
    }
}

pub(crate) fn require_staff(actor: &Actor) -> Result<(), ApiError> {
    actor.role.is_staff().then_some(()).ok_or(ApiError::Forbidden("Teacher access required"))
}

pub(crate) fn require_admin(actor: &Actor) -> Result<(), ApiError> {
    if actor.role == ActorRole::Admin {
        return Ok(());
    }
    Err(ApiError::Forbidden("Admin access required"))
}
