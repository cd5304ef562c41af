//! PostgreSQL-backed store

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use tubeline_shared::{
    ChannelProfile, CoreResult, User, UserId, Video, VideoId, VideoOwner, WatchedVideo,
};

use super::{GraphStore, NewUser, UserStore, UserUpdate};

const USER_COLUMNS: &str = r#"
    id, username, email, full_name, password_hash, avatar, cover_image,
    watch_history, refresh_token, created_at, updated_at
"#;

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct WatchHistoryRow {
    id: VideoId,
    owner_id: UserId,
    video_file: String,
    thumbnail: String,
    title: String,
    description: String,
    duration: i32,
    views: i64,
    is_published: bool,
    created_at: OffsetDateTime,
    owner_username: Option<String>,
    owner_full_name: Option<String>,
    owner_avatar: Option<String>,
}

impl From<WatchHistoryRow> for WatchedVideo {
    fn from(row: WatchHistoryRow) -> Self {
        let owner = match (row.owner_username, row.owner_full_name, row.owner_avatar) {
            (Some(username), Some(full_name), Some(avatar)) => Some(VideoOwner {
                id: row.owner_id,
                full_name,
                username,
                avatar,
            }),
            _ => None,
        };

        WatchedVideo::new(
            Video {
                id: row.id,
                owner_id: row.owner_id,
                video_file: row.video_file,
                thumbnail: row.thumbnail,
                title: row.title,
                description: row.description,
                duration: row.duration,
                views: row.views,
                is_published: row.is_published,
                created_at: row.created_at,
            },
            owner,
        )
    }
}

/// Store over a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: NewUser) -> CoreResult<User> {
        let query = format!(
            r#"
            INSERT INTO users (id, username, email, full_name, password_hash, avatar, cover_image)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );

        let created: User = sqlx::query_as(&query)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(user.password_hash.as_str())
            .bind(&user.avatar)
            .bind(user.cover_image.as_deref())
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn find_by_id(&self, id: UserId) -> CoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> CoreResult<Option<User>> {
        let query = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE ($1::text IS NOT NULL AND username = $1)
               OR ($2::text IS NOT NULL AND email = $2)
            LIMIT 1
            "#
        );
        Ok(sqlx::query_as(&query)
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_by_id(&self, id: UserId, update: UserUpdate) -> CoreResult<Option<User>> {
        let (assignments, query_args): (&str, Vec<String>) = match update {
            UserUpdate::Account {
                full_name,
                email,
                username,
            } => (
                "full_name = $2, email = $3, username = $4",
                vec![full_name, email, username],
            ),
            UserUpdate::Avatar(url) => ("avatar = $2", vec![url]),
            UserUpdate::CoverImage(url) => ("cover_image = $2", vec![url]),
            UserUpdate::Password(hash) => ("password_hash = $2", vec![hash.into_string()]),
        };

        let query = format!(
            "UPDATE users SET {assignments}, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let mut q = sqlx::query_as::<_, User>(&query).bind(id);
        for arg in query_args {
            q = q.bind(arg);
        }
        Ok(q.fetch_optional(&self.pool).await?)
    }

    async fn set_refresh_token(&self, id: UserId, token: &str) -> CoreResult<bool> {
        let result = sqlx::query("UPDATE users SET refresh_token = $2 WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn swap_refresh_token(&self, id: UserId, current: &str, next: &str) -> CoreResult<bool> {
        // Single conditional update: concurrent rotations with the same token
        // serialize on the row lock and only the first one matches.
        let result = sqlx::query(
            "UPDATE users SET refresh_token = $3 WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id)
        .bind(current)
        .bind(next)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_refresh_token(&self, id: UserId) -> CoreResult<()> {
        sqlx::query("UPDATE users SET refresh_token = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn push_watch_history(&self, id: UserId, video: VideoId) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET watch_history = array_append(array_remove(watch_history, $2), $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(video.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl GraphStore for PgStore {
    async fn channel_profile(
        &self,
        viewer: UserId,
        username: &str,
    ) -> CoreResult<Option<ChannelProfile>> {
        // Counts and membership come from one statement, one snapshot
        let profile = sqlx::query_as::<_, ChannelProfile>(
            r#"
            SELECT
                u.id,
                u.username,
                u.full_name,
                u.avatar,
                u.cover_image,
                COUNT(*) FILTER (WHERE s.channel_id = u.id) AS subscribers_count,
                COUNT(*) FILTER (WHERE s.subscriber_id = u.id) AS subscribed_to_count,
                COALESCE(
                    BOOL_OR(s.channel_id = u.id AND s.subscriber_id = $2),
                    FALSE
                ) AS is_subscribed
            FROM users u
            LEFT JOIN subscriptions s
                ON s.channel_id = u.id OR s.subscriber_id = u.id
            WHERE u.username = $1
            GROUP BY u.id
            "#,
        )
        .bind(username)
        .bind(viewer)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn watch_history(&self, viewer: UserId) -> CoreResult<Vec<WatchedVideo>> {
        let rows: Vec<WatchHistoryRow> = sqlx::query_as(
            r#"
            SELECT
                v.id,
                v.owner_id,
                v.video_file,
                v.thumbnail,
                v.title,
                v.description,
                v.duration,
                v.views,
                v.is_published,
                v.created_at,
                o.username AS owner_username,
                o.full_name AS owner_full_name,
                o.avatar AS owner_avatar
            FROM users u
            CROSS JOIN LATERAL unnest(u.watch_history) WITH ORDINALITY AS h(video_id, position)
            JOIN videos v ON v.id = h.video_id
            LEFT JOIN users o ON o.id = v.owner_id
            WHERE u.id = $1
            ORDER BY h.position
            "#,
        )
        .bind(viewer)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WatchedVideo::from).collect())
    }

    async fn find_video(&self, id: VideoId) -> CoreResult<Option<Video>> {
        Ok(sqlx::query_as(
            r#"
            SELECT id, owner_id, video_file, thumbnail, title, description,
                   duration, views, is_published, created_at
            FROM videos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }
}
