//! Session middleware
//!
//! Authenticates a request from its access token and attaches the caller's
//! public profile as a [`CurrentUser`] extension. Handlers behind
//! [`require_auth`] can rely on that extension being present.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use tubeline_shared::{CoreError, CoreResult, UserProfile};

use super::{cookies::ACCESS_TOKEN_COOKIE, session::TokenService};
use crate::{error::ApiError, state::AppState, store::UserStore};

/// Authenticated identity attached to a request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserProfile);

/// Pull the access token from the `accessToken` cookie, falling back to
/// `Authorization: Bearer`. The cookie wins when both are present.
pub fn extract_access_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Verify a presented access token and load the caller's profile
pub async fn authenticate(
    tokens: &TokenService,
    users: &dyn UserStore,
    token: Option<&str>,
) -> CoreResult<UserProfile> {
    let token = token.ok_or_else(|| CoreError::unauthorized("Unauthorized request"))?;
    let user_id = tokens.verify_access(token)?;

    let user = users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| CoreError::unauthorized("Invalid access token"))?;

    Ok(user.profile())
}

/// Middleware that rejects unauthenticated requests with 401
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_access_token(&jar, request.headers());

    let profile = authenticate(&state.tokens, state.users.as_ref(), token.as_deref())
        .await
        .map_err(|e| {
            tracing::debug!(path = %request.uri().path(), error = %e, "Request not authenticated");
            ApiError::from(e)
        })?;

    request.extensions_mut().insert(CurrentUser(profile));
    Ok(next.run(request).await)
}
