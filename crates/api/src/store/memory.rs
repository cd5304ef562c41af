//! In-process store
//!
//! All state sits behind one lock, so every read observes a single snapshot
//! and the refresh-token swap is a true compare-and-swap.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use tubeline_shared::{
    ChannelProfile, CoreError, CoreResult, Subscription, User, UserId, Video, VideoId,
    VideoOwner, WatchedVideo,
};

use super::{GraphStore, NewUser, UserStore, UserUpdate};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    videos: HashMap<VideoId, Video>,
    subscriptions: HashSet<Subscription>,
}

impl Inner {
    fn ensure_unique(&self, except: Option<UserId>, username: &str, email: &str) -> CoreResult<()> {
        let taken = self.users.values().any(|u| {
            Some(u.id) != except && (u.username == username || u.email == email)
        });
        if taken {
            return Err(CoreError::conflict(
                "User with this email or username already exists",
            ));
        }
        Ok(())
    }
}

/// Store that lives entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a video owned by `owner`
    pub async fn insert_video(&self, owner: UserId, title: &str) -> VideoId {
        let id = VideoId::new();
        let video = Video {
            id,
            owner_id: owner,
            video_file: format!("https://cdn.example.com/videos/{}.mp4", id),
            thumbnail: format!("https://cdn.example.com/thumbs/{}.jpg", id),
            title: title.to_string(),
            description: String::new(),
            duration: 0,
            views: 0,
            is_published: true,
            created_at: OffsetDateTime::now_utc(),
        };
        self.inner.write().await.videos.insert(id, video);
        id
    }

    pub async fn remove_video(&self, id: VideoId) {
        self.inner.write().await.videos.remove(&id);
    }

    /// Record that `subscriber` follows `channel`
    pub async fn subscribe(&self, subscriber: UserId, channel: UserId) {
        self.inner
            .write()
            .await
            .subscriptions
            .insert(Subscription { subscriber, channel });
    }

    /// Current stored refresh token, for assertions
    pub async fn stored_refresh_token(&self, id: UserId) -> Option<String> {
        self.inner
            .read()
            .await
            .users
            .get(&id)
            .and_then(|u| u.refresh_token.clone())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> CoreResult<User> {
        let mut inner = self.inner.write().await;
        inner.ensure_unique(None, &user.username, &user.email)?;

        let now = OffsetDateTime::now_utc();
        let record = User {
            id: UserId::new(),
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            password_hash: user.password_hash.into_string(),
            avatar: user.avatar,
            cover_image: user.cover_image,
            watch_history: Vec::new(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: UserId) -> CoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> CoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| {
                username.is_some_and(|name| u.username == name)
                    || email.is_some_and(|mail| u.email == mail)
            })
            .cloned())
    }

    async fn update_by_id(&self, id: UserId, update: UserUpdate) -> CoreResult<Option<User>> {
        let mut inner = self.inner.write().await;
        if let UserUpdate::Account {
            ref username,
            ref email,
            ..
        } = update
        {
            inner.ensure_unique(Some(id), username, email)?;
        }

        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        match update {
            UserUpdate::Account {
                full_name,
                email,
                username,
            } => {
                user.full_name = full_name;
                user.email = email;
                user.username = username;
            }
            UserUpdate::Avatar(url) => user.avatar = url,
            UserUpdate::CoverImage(url) => user.cover_image = Some(url),
            UserUpdate::Password(hash) => user.password_hash = hash.into_string(),
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn set_refresh_token(&self, id: UserId, token: &str) -> CoreResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(match inner.users.get_mut(&id) {
            Some(user) => {
                user.refresh_token = Some(token.to_string());
                true
            }
            None => false,
        })
    }

    async fn swap_refresh_token(&self, id: UserId, current: &str, next: &str) -> CoreResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(match inner.users.get_mut(&id) {
            Some(user) if user.refresh_token.as_deref() == Some(current) => {
                user.refresh_token = Some(next.to_string());
                true
            }
            _ => false,
        })
    }

    async fn clear_refresh_token(&self, id: UserId) -> CoreResult<()> {
        if let Some(user) = self.inner.write().await.users.get_mut(&id) {
            user.refresh_token = None;
        }
        Ok(())
    }

    async fn push_watch_history(&self, id: UserId, video: VideoId) -> CoreResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(false);
        };
        user.watch_history.retain(|v| *v != video.0);
        user.watch_history.push(video.0);
        Ok(true)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn channel_profile(
        &self,
        viewer: UserId,
        username: &str,
    ) -> CoreResult<Option<ChannelProfile>> {
        let inner = self.inner.read().await;
        let Some(channel) = inner.users.values().find(|u| u.username == username) else {
            return Ok(None);
        };

        let mut subscribers_count = 0;
        let mut subscribed_to_count = 0;
        let mut is_subscribed = false;
        for edge in &inner.subscriptions {
            if edge.channel == channel.id {
                subscribers_count += 1;
                is_subscribed |= edge.subscriber == viewer;
            }
            if edge.subscriber == channel.id {
                subscribed_to_count += 1;
            }
        }

        Ok(Some(ChannelProfile {
            id: channel.id,
            username: channel.username.clone(),
            full_name: channel.full_name.clone(),
            avatar: channel.avatar.clone(),
            cover_image: channel.cover_image.clone(),
            subscribers_count,
            subscribed_to_count,
            is_subscribed,
        }))
    }

    async fn watch_history(&self, viewer: UserId) -> CoreResult<Vec<WatchedVideo>> {
        let inner = self.inner.read().await;
        let Some(user) = inner.users.get(&viewer) else {
            return Ok(Vec::new());
        };

        Ok(user
            .watch_history
            .iter()
            .filter_map(|id| inner.videos.get(&VideoId(*id)))
            .map(|video| {
                let owner = inner.users.get(&video.owner_id).map(|o| VideoOwner {
                    id: o.id,
                    full_name: o.full_name.clone(),
                    username: o.username.clone(),
                    avatar: o.avatar.clone(),
                });
                WatchedVideo::new(video.clone(), owner)
            })
            .collect())
    }

    async fn find_video(&self, id: VideoId) -> CoreResult<Option<Video>> {
        Ok(self.inner.read().await.videos.get(&id).cloned())
    }
}
