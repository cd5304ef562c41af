//! Account operations: registration, login, credentials and profile updates

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;

use tubeline_shared::{CoreError, CoreResult, TokenPair, User, UserId, UserProfile, VideoId};

use crate::{
    auth::{hash_password, verify_against_dummy, verify_password, PasswordHash, TokenService},
    media::{public_id_from_url, BlobStorage, UploadedAsset},
    store::{GraphStore, NewUser, UserStore, UserUpdate},
};

/// Registration input; files are local paths already spooled to disk
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: Option<PathBuf>,
    pub cover_image: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct LoginInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct AccountDetails {
    pub full_name: String,
    pub email: String,
    pub username: String,
}

/// Result of a successful login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub user: UserProfile,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Trimmed value of a required text field
fn required(value: &str, field: &str) -> CoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Trimmed, lowercased identifier, `None` when absent or blank
fn identifier(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// Remove spooled uploads that will never reach blob storage
async fn discard_local(files: &[Option<&Path>]) {
    for path in files.iter().flatten() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::debug!(path = %path.display(), error = %e, "Failed to discard local upload");
        }
    }
}

/// Account operations over the user store, blob storage and token service
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    graph: Arc<dyn GraphStore>,
    blobs: Arc<dyn BlobStorage>,
    tokens: TokenService,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        graph: Arc<dyn GraphStore>,
        blobs: Arc<dyn BlobStorage>,
        tokens: TokenService,
    ) -> Self {
        Self {
            users,
            graph,
            blobs,
            tokens,
        }
    }

    async fn load(&self, id: UserId) -> CoreResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("User not found"))
    }

    /// Create an account. Nothing is persisted unless the avatar upload succeeds.
    pub async fn register(&self, input: RegisterInput) -> CoreResult<UserProfile> {
        let local_files = [input.avatar.as_deref(), input.cover_image.as_deref()];

        let validated = (|| {
            let full_name = required(&input.full_name, "Full name")?;
            let email = required(&input.email, "Email")?.to_lowercase();
            let username = required(&input.username, "Username")?.to_lowercase();
            required(&input.password, "Password")?;
            Ok::<_, CoreError>((full_name, email, username))
        })();
        let (full_name, email, username) = match validated {
            Ok(fields) => fields,
            Err(e) => {
                discard_local(&local_files).await;
                return Err(e);
            }
        };

        let existing = self
            .users
            .find_by_username_or_email(Some(&username), Some(&email))
            .await;
        match existing {
            Ok(None) => {}
            Ok(Some(_)) => {
                discard_local(&local_files).await;
                return Err(CoreError::conflict(
                    "User with this email or username already exists",
                ));
            }
            Err(e) => {
                discard_local(&local_files).await;
                return Err(e);
            }
        }

        let Some(avatar_path) = input.avatar.as_deref() else {
            discard_local(&local_files).await;
            return Err(CoreError::validation("Avatar file is required"));
        };

        let password_hash = match hash_password(&input.password) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!(error = %e, "Password hashing failed");
                discard_local(&local_files).await;
                return Err(CoreError::internal("Something went wrong while creating the user"));
            }
        };

        let Some(avatar) = self.blobs.upload(avatar_path).await else {
            discard_local(&[input.cover_image.as_deref()]).await;
            return Err(CoreError::internal("Failed to upload avatar"));
        };

        let cover_image = match input.cover_image.as_deref() {
            Some(path) => {
                let uploaded = self.blobs.upload(path).await;
                if uploaded.is_none() {
                    tracing::warn!(username = %username, "Cover image upload failed, continuing without");
                }
                uploaded
            }
            None => None,
        };

        let created = self
            .users
            .create(NewUser {
                username,
                email,
                full_name,
                password_hash,
                avatar: avatar.url.clone(),
                cover_image: cover_image.as_ref().map(|c| c.url.clone()),
            })
            .await;

        match created {
            Ok(user) => {
                tracing::info!(user_id = %user.id, username = %user.username, "User registered");
                Ok(user.profile())
            }
            Err(e) => {
                self.delete_assets(std::iter::once(&avatar).chain(cover_image.as_ref()))
                    .await;
                Err(e)
            }
        }
    }

    async fn delete_assets<'a>(&self, assets: impl Iterator<Item = &'a UploadedAsset>) {
        for asset in assets {
            if self.blobs.delete(&asset.public_id).await.is_none() {
                tracing::warn!(public_id = %asset.public_id, "Orphaned asset left in blob storage");
            }
        }
    }

    /// Check credentials and open a new session, replacing any previous one
    pub async fn login(&self, input: LoginInput) -> CoreResult<LoginOutcome> {
        let username = identifier(input.username.as_deref());
        let email = identifier(input.email.as_deref());
        if username.is_none() && email.is_none() {
            return Err(CoreError::validation("Username or email is required"));
        }

        let user = self
            .users
            .find_by_username_or_email(username.as_deref(), email.as_deref())
            .await?;

        let Some(user) = user else {
            verify_against_dummy(&input.password);
            tracing::warn!(reason = "unknown_identity", "Login failed");
            return Err(CoreError::unauthorized("Invalid user credentials"));
        };

        let valid = verify_password(&input.password, &PasswordHash::from_stored(&user.password_hash))
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Stored password hash unreadable");
                CoreError::internal("Something went wrong while verifying credentials")
            })?;
        if !valid {
            tracing::warn!(user_id = %user.id, reason = "bad_password", "Login failed");
            return Err(CoreError::unauthorized("Invalid user credentials"));
        }

        let tokens = self.tokens.issue_pair(user.id).await?;
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome {
            user: user.profile(),
            tokens,
        })
    }

    /// End the user's session
    pub async fn logout(&self, user_id: UserId) -> CoreResult<()> {
        self.tokens.revoke(user_id).await
    }

    /// Rotate a presented refresh token into a fresh pair
    pub async fn refresh(&self, presented: Option<&str>) -> CoreResult<TokenPair> {
        let presented = presented
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoreError::unauthorized("Unauthorized request"))?;
        self.tokens.rotate(presented).await
    }

    pub async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
    ) -> CoreResult<()> {
        required(new_password, "New password")?;
        let user = self.load(user_id).await?;

        let valid = verify_password(old_password, &PasswordHash::from_stored(&user.password_hash))
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Stored password hash unreadable");
                CoreError::internal("Something went wrong while verifying credentials")
            })?;
        if !valid {
            tracing::warn!(user_id = %user.id, reason = "bad_old_password", "Password change rejected");
            return Err(CoreError::unauthorized("Invalid old password"));
        }

        let hash = hash_password(new_password).map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            CoreError::internal("Something went wrong while changing the password")
        })?;

        self.users
            .update_by_id(user_id, UserUpdate::Password(hash))
            .await?
            .ok_or_else(|| CoreError::not_found("User not found"))?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    pub async fn current_user(&self, user_id: UserId) -> CoreResult<UserProfile> {
        Ok(self.load(user_id).await?.profile())
    }

    pub async fn update_account(
        &self,
        user_id: UserId,
        details: AccountDetails,
    ) -> CoreResult<UserProfile> {
        let full_name = required(&details.full_name, "Full name")?;
        let email = required(&details.email, "Email")?.to_lowercase();
        let username = required(&details.username, "Username")?.to_lowercase();

        let user = self
            .users
            .update_by_id(
                user_id,
                UserUpdate::Account {
                    full_name,
                    email,
                    username,
                },
            )
            .await?
            .ok_or_else(|| CoreError::not_found("User not found"))?;

        Ok(user.profile())
    }

    /// Replace the avatar. The old asset is deleted only after the new URL is stored.
    pub async fn update_avatar(
        &self,
        user_id: UserId,
        file: Option<&Path>,
    ) -> CoreResult<UserProfile> {
        let file = file.ok_or_else(|| CoreError::validation("Avatar file is missing"))?;
        let current = match self.load(user_id).await {
            Ok(user) => user,
            Err(e) => {
                discard_local(&[Some(file)]).await;
                return Err(e);
            }
        };

        let asset = self
            .blobs
            .upload(file)
            .await
            .ok_or_else(|| CoreError::internal("Error while uploading avatar"))?;

        let updated = self
            .persist_asset(user_id, &asset, UserUpdate::Avatar(asset.url.clone()))
            .await?;
        self.delete_replaced(Some(&current.avatar), &asset).await;

        Ok(updated.profile())
    }

    /// Replace the cover image with the same ordering guarantees as the avatar
    pub async fn update_cover_image(
        &self,
        user_id: UserId,
        file: Option<&Path>,
    ) -> CoreResult<UserProfile> {
        let file = file.ok_or_else(|| CoreError::validation("Cover image file is missing"))?;
        let current = match self.load(user_id).await {
            Ok(user) => user,
            Err(e) => {
                discard_local(&[Some(file)]).await;
                return Err(e);
            }
        };

        let asset = self
            .blobs
            .upload(file)
            .await
            .ok_or_else(|| CoreError::internal("Error while uploading cover image"))?;

        let updated = self
            .persist_asset(user_id, &asset, UserUpdate::CoverImage(asset.url.clone()))
            .await?;
        self.delete_replaced(current.cover_image.as_deref(), &asset)
            .await;

        Ok(updated.profile())
    }

    /// Store a freshly uploaded asset's URL, rolling the upload back on failure
    async fn persist_asset(
        &self,
        user_id: UserId,
        asset: &UploadedAsset,
        update: UserUpdate,
    ) -> CoreResult<User> {
        let result = self.users.update_by_id(user_id, update).await;
        match result {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                self.delete_assets(std::iter::once(asset)).await;
                Err(CoreError::not_found("User not found"))
            }
            Err(e) => {
                self.delete_assets(std::iter::once(asset)).await;
                Err(e)
            }
        }
    }

    async fn delete_replaced(&self, old_url: Option<&str>, new_asset: &UploadedAsset) {
        let Some(old_url) = old_url.filter(|u| !u.is_empty()) else {
            return;
        };
        match public_id_from_url(old_url) {
            Some(public_id) if public_id != new_asset.public_id => {
                if self.blobs.delete(&public_id).await.is_none() {
                    tracing::warn!(public_id = %public_id, "Failed to delete replaced asset");
                }
            }
            Some(_) => {}
            None => tracing::warn!(url = %old_url, "Cannot derive public id of replaced asset"),
        }
    }

    /// Append a video to the caller's watch history
    pub async fn record_watch(&self, user_id: UserId, video_id: VideoId) -> CoreResult<UserProfile> {
        self.graph
            .find_video(video_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Video not found"))?;

        if !self.users.push_watch_history(user_id, video_id).await? {
            return Err(CoreError::not_found("User not found"));
        }
        self.current_user(user_id).await
    }
}
