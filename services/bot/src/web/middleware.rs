//! services/bot/src/web/middleware.rs
//!
//! Resolves the caller of a conversation route to a `User` row.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::web::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";

/// Reads the transport's stable user id and optional display name.
pub fn caller_identity(headers: &HeaderMap) -> Result<(i64, Option<String>), StatusCode> {
    let external_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let username = headers
        .get(USERNAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    Ok((external_id, username))
}

/// Middleware that looks up (or registers) the user named by `x-user-id`.
///
/// The `User` is inserted into request extensions for handlers to use.
/// A missing or malformed header returns 400 Bad Request.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (external_id, username) = caller_identity(req.headers())?;

    let user = state
        .db
        .get_or_create_user(external_id, username.as_deref())
        .await
        .map_err(|e| {
            error!(external_id, error = %e, "Failed to resolve user");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
