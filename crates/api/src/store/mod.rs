//! Persistent record store capabilities
//!
//! The core only talks to storage through these traits. [`PgStore`] is the
//! production implementation; [`MemoryStore`] keeps everything in process and
//! backs the test suites.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use tubeline_shared::{ChannelProfile, CoreResult, User, UserId, Video, VideoId, WatchedVideo};

use crate::auth::PasswordHash;

/// Fields required to create a user record
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Already lowercased
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: PasswordHash,
    pub avatar: String,
    pub cover_image: Option<String>,
}

/// A single-field-group patch applied by [`UserStore::update_by_id`]
#[derive(Debug, Clone)]
pub enum UserUpdate {
    Account {
        full_name: String,
        email: String,
        username: String,
    },
    Avatar(String),
    CoverImage(String),
    Password(PasswordHash),
}

/// User records and their credential state
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Duplicate username or email fails with `Conflict`.
    async fn create(&self, user: NewUser) -> CoreResult<User>;

    async fn find_by_id(&self, id: UserId) -> CoreResult<Option<User>>;

    /// Match on username OR email; `None` arguments never match.
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> CoreResult<Option<User>>;

    /// Apply a patch and return the updated record, `None` if the user is gone
    async fn update_by_id(&self, id: UserId, update: UserUpdate) -> CoreResult<Option<User>>;

    /// Unconditionally store `token` as the user's only valid refresh token.
    /// Returns `false` if the user does not exist.
    async fn set_refresh_token(&self, id: UserId, token: &str) -> CoreResult<bool>;

    /// Replace the stored refresh token with `next` only if it still equals
    /// `current`. Returns `false` when the slot held something else.
    async fn swap_refresh_token(&self, id: UserId, current: &str, next: &str) -> CoreResult<bool>;

    /// Clear the stored refresh token. Idempotent.
    async fn clear_refresh_token(&self, id: UserId) -> CoreResult<()>;

    /// Append a video to the watch history, moving it to the end if present
    async fn push_watch_history(&self, id: UserId, video: VideoId) -> CoreResult<bool>;
}

/// Read-only joins over users, videos and subscription edges
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Channel identity plus subscription counts, computed from one snapshot.
    /// `username` is already lowercased.
    async fn channel_profile(
        &self,
        viewer: UserId,
        username: &str,
    ) -> CoreResult<Option<ChannelProfile>>;

    /// Viewer's watch history in stored order, skipping videos that no longer exist
    async fn watch_history(&self, viewer: UserId) -> CoreResult<Vec<WatchedVideo>>;

    async fn find_video(&self, id: VideoId) -> CoreResult<Option<Video>>;
}
