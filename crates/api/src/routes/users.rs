//! User account, session and channel routes

use std::path::Path as FsPath;

use axum::{
    extract::{Extension, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use tubeline_shared::{ChannelProfile, TokenPair, UserProfile, VideoId, WatchedVideo};

use super::uploads::spool_multipart;
use crate::{
    accounts::{AccountDetails, LoginInput, LoginOutcome, RegisterInput},
    auth::{
        cookies::{clear_session_cookies, set_session_cookies, REFRESH_TOKEN_COOKIE},
        CurrentUser,
    },
    error::{ApiResponse, ApiResult},
    state::AppState,
};

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub full_name: String,
    pub email: String,
    pub username: String,
}

fn with_session(state: &AppState, jar: CookieJar, pair: &TokenPair) -> CookieJar {
    let jwt = state.tokens.jwt();
    set_session_cookies(
        jar,
        pair,
        jwt.access_token_expiry_seconds(),
        jwt.refresh_token_expiry_seconds(),
    )
}

// =============================================================================
// Session
// =============================================================================

/// Register a new account (multipart, avatar required)
pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<ApiResponse<UserProfile>> {
    let temp_dir = FsPath::new(&state.config.upload_temp_dir);
    let mut form = spool_multipart(multipart, temp_dir).await?;

    let input = RegisterInput {
        full_name: form.text("fullName"),
        email: form.text("email"),
        username: form.text("username"),
        password: form.text("password"),
        avatar: form.take_file("avatar"),
        cover_image: form.take_file("coverImage"),
    };
    form.discard().await;

    let user = state.accounts.register(input).await?;

    Ok(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User created successfully",
    ))
}

/// Log in by username or email and set session cookies
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieJar, ApiResponse<LoginOutcome>)> {
    let outcome = state
        .accounts
        .login(LoginInput {
            username: req.username,
            email: req.email,
            password: req.password,
        })
        .await?;

    let jar = with_session(&state, jar, &outcome.tokens);
    Ok((jar, ApiResponse::ok(outcome, "Logged in successfully")))
}

/// End the caller's session and clear its cookies
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, ApiResponse<Value>)> {
    state.accounts.logout(user.id).await?;

    Ok((
        clear_session_cookies(jar),
        ApiResponse::ok(json!({}), "User logged out successfully"),
    ))
}

/// Rotate the refresh token from the cookie, or from the body when no cookie is sent
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<(CookieJar, ApiResponse<TokenPair>)> {
    let presented = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| body.and_then(|Json(req)| req.refresh_token));

    let pair = state.accounts.refresh(presented.as_deref()).await?;

    let jar = with_session(&state, jar, &pair);
    Ok((jar, ApiResponse::ok(pair, "Access token refreshed successfully")))
}

// =============================================================================
// Account
// =============================================================================

pub async fn change_password(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<ApiResponse<Value>> {
    state
        .accounts
        .change_password(user.id, &req.old_password, &req.new_password)
        .await?;

    Ok(ApiResponse::ok(json!({}), "Password changed successfully"))
}

pub async fn current_user(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResponse<UserProfile> {
    ApiResponse::ok(user, "Current user fetched successfully")
}

pub async fn update_account(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<UpdateAccountRequest>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let updated = state
        .accounts
        .update_account(
            user.id,
            AccountDetails {
                full_name: req.full_name,
                email: req.email,
                username: req.username,
            },
        )
        .await?;

    Ok(ApiResponse::ok(updated, "Account details updated"))
}

pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Multipart,
) -> ApiResult<ApiResponse<UserProfile>> {
    let mut form =
        spool_multipart(multipart, FsPath::new(&state.config.upload_temp_dir)).await?;
    let file = form.take_file("avatar");
    form.discard().await;

    let updated = state
        .accounts
        .update_avatar(user.id, file.as_deref())
        .await?;
    Ok(ApiResponse::ok(updated, "Avatar updated"))
}

pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Multipart,
) -> ApiResult<ApiResponse<UserProfile>> {
    let mut form =
        spool_multipart(multipart, FsPath::new(&state.config.upload_temp_dir)).await?;
    let file = form.take_file("coverImage");
    form.discard().await;

    let updated = state
        .accounts
        .update_cover_image(user.id, file.as_deref())
        .await?;
    Ok(ApiResponse::ok(updated, "Cover image updated"))
}

// =============================================================================
// Channels and history
// =============================================================================

pub async fn channel_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> ApiResult<ApiResponse<ChannelProfile>> {
    let profile = state.channels.channel_profile(user.id, &username).await?;
    Ok(ApiResponse::ok(profile, "Channel found"))
}

pub async fn watch_history(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<ApiResponse<Vec<WatchedVideo>>> {
    let history = state.channels.watch_history(user.id).await?;
    Ok(ApiResponse::ok(history, "Watch history fetched successfully"))
}

pub async fn record_watch(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let updated = state
        .accounts
        .record_watch(user.id, VideoId(video_id))
        .await?;
    Ok(ApiResponse::ok(updated, "Watch history updated"))
}
