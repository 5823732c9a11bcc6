use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};

use crate::api::handler::AppState;
use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// The chat user issuing a command, taken from `x-user-id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AppError::Unauthorized)?;

        Ok(Actor(user_id.to_string()))
    }
}

/// Rejects requests that do not carry the configured admin token
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected: &str = &state.admin_token;
    if expected.trim().is_empty() {
        error!("Admin token is not configured, refusing admin request");
        return Err(AppError::Forbidden);
    }

    let token = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match token {
        Some(token) if token == expected => Ok(next.run(req).await),
        Some(_) => {
            warn!("Rejected admin request with wrong token");
            Err(AppError::Forbidden)
        }
        None => Err(AppError::Unauthorized),
    }
}
