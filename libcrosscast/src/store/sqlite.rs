//! SQLite-backed store

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::store::Store;
use crate::types::{
    ConnectionUpdate, Metrics, MetricsSnapshot, NewConnection, Platform, Profile,
    SocialConnection, SocialPost,
};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if necessary) the database at `db_path` and run
    /// migrations.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work on both Windows and Unix. Foreign keys
        // must be set per pool connection, so they go on the connect
        // options rather than a one-off PRAGMA.
        let db_url = format!("sqlite://{}", expanded_path.replace('\\', "/"));
        let options = db_url
            .parse::<SqliteConnectOptions>()
            .map_err(DbError::SqlxError)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_connection(row: &sqlx::sqlite::SqliteRow) -> Result<SocialConnection> {
    let platform_str: String = row.get("platform");
    let platform = Platform::from_str(&platform_str)?;

    let metadata: Option<String> = row.get("metadata");
    let metadata = metadata.and_then(|m| serde_json::from_str(&m).ok());

    Ok(SocialConnection {
        id: row.get("id"),
        user_id: row.get("user_id"),
        client_id: row.get("client_id"),
        platform,
        username: row.get("username"),
        platform_user_id: row.get("platform_user_id"),
        profile_url: row.get("profile_url"),
        avatar_url: row.get("avatar_url"),
        follower_count: row.get("follower_count"),
        following_count: row.get("following_count"),
        post_count: row.get("post_count"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        token_expires_at: row.get("token_expires_at"),
        api_quota_used: row.get("api_quota_used"),
        api_quota_limit: row.get("api_quota_limit"),
        quota_window_started_at: row.get("quota_window_started_at"),
        scopes: row.get("scopes"),
        webhook_url: row.get("webhook_url"),
        is_active: row.get::<i64, _>("is_active") != 0,
        revoked_reason: row.get("revoked_reason"),
        last_sync_at: row.get("last_sync_at"),
        metadata,
        created_at: row.get("created_at"),
    })
}

fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> MetricsSnapshot {
    MetricsSnapshot {
        connection_id: row.get("connection_id"),
        date: row.get("date"),
        metrics: Metrics {
            followers: row.get("followers"),
            following: row.get("following"),
            posts: row.get("posts"),
            likes: row.get("likes"),
            comments: row.get("comments"),
            shares: row.get("shares"),
            impressions: row.get("impressions"),
            reach: row.get("reach"),
            engagement_rate: row.get("engagement_rate"),
        },
    }
}

fn row_to_post(row: &sqlx::sqlite::SqliteRow) -> SocialPost {
    let json_vec = |col: &str| -> Vec<String> {
        let raw: String = row.get(col);
        serde_json::from_str(&raw).unwrap_or_default()
    };

    SocialPost {
        id: row.get("id"),
        connection_id: row.get("connection_id"),
        platform_post_id: row.get("platform_post_id"),
        content: row.get("content"),
        media_urls: json_vec("media_urls"),
        hashtags: json_vec("hashtags"),
        mentions: json_vec("mentions"),
        likes_count: row.get("likes_count"),
        comments_count: row.get("comments_count"),
        shares_count: row.get("shares_count"),
        engagement_rate: row.get("engagement_rate"),
        published_at: row.get("published_at"),
        fetched_at: row.get("fetched_at"),
    }
}

fn json_text(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_connection(&self, new: NewConnection) -> Result<SocialConnection> {
        let quota_limit = new
            .api_quota_limit
            .unwrap_or_else(|| new.platform.default_quota_limit());
        let metadata = new.metadata.as_ref().map(|m| m.to_string());
        let created_at = chrono::Utc::now().timestamp();

        let row = sqlx::query(
            r#"
            INSERT INTO social_connections (
                user_id, client_id, platform, username, platform_user_id,
                profile_url, avatar_url, follower_count, following_count, post_count,
                access_token, refresh_token, token_expires_at,
                api_quota_used, api_quota_limit, quota_window_started_at,
                scopes, webhook_url, is_active, revoked_reason,
                last_sync_at, metadata, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 0, ?, ?, 1, NULL, NULL, ?, ?)
            RETURNING id
            "#,
        )
        .bind(new.user_id)
        .bind(new.client_id)
        .bind(new.platform.as_str())
        .bind(&new.username)
        .bind(&new.platform_user_id)
        .bind(&new.profile_url)
        .bind(&new.avatar_url)
        .bind(new.follower_count)
        .bind(new.following_count)
        .bind(new.post_count)
        .bind(&new.access_token)
        .bind(&new.refresh_token)
        .bind(new.token_expires_at)
        .bind(quota_limit)
        .bind(&new.scopes)
        .bind(&new.webhook_url)
        .bind(metadata)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let id: i64 = row.get("id");
        let connection = self
            .get_connection(id)
            .await?
            .ok_or_else(|| DbError::SqlxError(sqlx::Error::RowNotFound))?;
        Ok(connection)
    }

    async fn get_connection(&self, id: i64) -> Result<Option<SocialConnection>> {
        let row = sqlx::query("SELECT * FROM social_connections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(row_to_connection).transpose()
    }

    async fn list_connections(&self, user_id: i64) -> Result<Vec<SocialConnection>> {
        let rows = sqlx::query(
            "SELECT * FROM social_connections WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_connection).collect()
    }

    async fn list_active_connections(&self) -> Result<Vec<SocialConnection>> {
        let rows = sqlx::query("SELECT * FROM social_connections WHERE is_active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_connection).collect()
    }

    async fn update_connection(
        &self,
        id: i64,
        update: ConnectionUpdate,
    ) -> Result<Option<SocialConnection>> {
        let Some(current) = self.get_connection(id).await? else {
            return Ok(None);
        };

        let client_id = update.client_id.or(current.client_id);
        let username = update.username.unwrap_or(current.username);
        let profile_url = update.profile_url.or(current.profile_url);
        let avatar_url = update.avatar_url.or(current.avatar_url);
        let api_quota_limit = update.api_quota_limit.unwrap_or(current.api_quota_limit);
        let scopes = update.scopes.or(current.scopes);
        let webhook_url = update.webhook_url.or(current.webhook_url);
        let is_active = update.is_active.unwrap_or(current.is_active);
        let metadata = update
            .metadata
            .or(current.metadata)
            .map(|m| m.to_string());

        sqlx::query(
            r#"
            UPDATE social_connections
            SET client_id = ?, username = ?, profile_url = ?, avatar_url = ?,
                api_quota_limit = ?, scopes = ?, webhook_url = ?, is_active = ?,
                metadata = ?
            WHERE id = ?
            "#,
        )
        .bind(client_id)
        .bind(&username)
        .bind(&profile_url)
        .bind(&avatar_url)
        .bind(api_quota_limit)
        .bind(&scopes)
        .bind(&webhook_url)
        .bind(if is_active { 1 } else { 0 })
        .bind(metadata)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        self.get_connection(id).await
    }

    async fn deactivate_connection(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE social_connections
            SET is_active = 0, access_token = '', refresh_token = NULL
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_connection(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM social_connections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_tokens(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_connections
            SET access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                token_expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn mark_revoked(&self, id: i64, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_connections
            SET is_active = 0, revoked_reason = ?, access_token = '', refresh_token = NULL
            WHERE id = ?
            "#,
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn update_profile(&self, id: i64, profile: &Profile) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_connections
            SET username = ?, platform_user_id = ?, profile_url = ?, avatar_url = ?,
                follower_count = ?, following_count = ?, post_count = ?
            WHERE id = ?
            "#,
        )
        .bind(&profile.username)
        .bind(&profile.platform_user_id)
        .bind(&profile.profile_url)
        .bind(&profile.avatar_url)
        .bind(profile.follower_count)
        .bind(profile.following_count)
        .bind(profile.post_count)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn update_quota(&self, id: i64, used: i64, window_started_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_connections
            SET api_quota_used = ?, quota_window_started_at = ?
            WHERE id = ?
            "#,
        )
        .bind(used)
        .bind(window_started_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn set_last_sync(&self, id: i64, synced_at: i64) -> Result<()> {
        sqlx::query("UPDATE social_connections SET last_sync_at = ? WHERE id = ?")
            .bind(synced_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn upsert_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let m = &snapshot.metrics;
        sqlx::query(
            r#"
            INSERT INTO social_metrics (
                connection_id, date, followers, following, posts,
                likes, comments, shares, impressions, reach, engagement_rate
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(connection_id, date)
            DO UPDATE SET
                followers = excluded.followers,
                following = excluded.following,
                posts = excluded.posts,
                likes = excluded.likes,
                comments = excluded.comments,
                shares = excluded.shares,
                impressions = excluded.impressions,
                reach = excluded.reach,
                engagement_rate = excluded.engagement_rate
            "#,
        )
        .bind(snapshot.connection_id)
        .bind(&snapshot.date)
        .bind(m.followers)
        .bind(m.following)
        .bind(m.posts)
        .bind(m.likes)
        .bind(m.comments)
        .bind(m.shares)
        .bind(m.impressions)
        .bind(m.reach)
        .bind(m.engagement_rate)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn metrics_in_range(
        &self,
        connection_id: i64,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<MetricsSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM social_metrics
            WHERE connection_id = ? AND date >= ? AND date <= ?
            ORDER BY date ASC
            "#,
        )
        .bind(connection_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(row_to_snapshot).collect())
    }

    async fn upsert_post(&self, post: &SocialPost) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_posts (
                connection_id, platform_post_id, content, media_urls, hashtags,
                mentions, likes_count, comments_count, shares_count,
                engagement_rate, published_at, fetched_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(connection_id, platform_post_id)
            DO UPDATE SET
                likes_count = excluded.likes_count,
                comments_count = excluded.comments_count,
                shares_count = excluded.shares_count,
                engagement_rate = excluded.engagement_rate,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(post.connection_id)
        .bind(&post.platform_post_id)
        .bind(&post.content)
        .bind(json_text(&post.media_urls))
        .bind(json_text(&post.hashtags))
        .bind(json_text(&post.mentions))
        .bind(post.likes_count)
        .bind(post.comments_count)
        .bind(post.shares_count)
        .bind(post.engagement_rate)
        .bind(post.published_at)
        .bind(post.fetched_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn posts_for_connection(
        &self,
        connection_id: i64,
        limit: usize,
    ) -> Result<Vec<SocialPost>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM social_posts
            WHERE connection_id = ?
            ORDER BY published_at DESC
            LIMIT ?
            "#,
        )
        .bind(connection_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(row_to_post).collect())
    }

    async fn count_posts(&self, connection_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM social_posts WHERE connection_id = ?")
            .bind(connection_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.get("n"))
    }
}
