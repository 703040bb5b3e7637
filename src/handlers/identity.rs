//! Caller identity, as forwarded by the authenticating gateway.
//!
//! - `x-user-id`: opaque user id, required
//! - `x-user-role`: `admin` grants admin rights; anything else is a plain user

use crate::{errors::AppError, services::deletion_service::Actor};
use axum::http::{HeaderMap, HeaderName};

pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub const USER_ROLE_HEADER: HeaderName = HeaderName::from_static("x-user-role");

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AppError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::unauthorized("missing x-user-id header"))?;
    let is_admin = headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));
    Ok(Actor {
        user_id: user_id.to_string(),
        is_admin,
    })
}
