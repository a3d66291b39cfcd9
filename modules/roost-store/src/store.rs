// Postgres persistence for collected posts and the accounts they come from.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{error, info, warn};

use roost_common::{Account, Config, Photo, Post, SaveSummary, Video};

use crate::error::{Result, StoreError};

/// Rows per multi-row upsert statement. Chunks share the batch transaction.
pub const CHUNK_SIZE: usize = 1000;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const UPSERT_PREFIX: &str = r#"
    INSERT INTO tweets (
        id, text, username, timestamp, created_at,
        is_reply, is_retweet, likes, retweet_count, replies,
        photos, videos, urls, permanent_url, in_reply_to_status_id, hashtags,
        created_by, created_date, modified_by, modified_date
    ) "#;

// created_by / created_date are never touched on conflict; they keep their first-insert values.
const UPSERT_ON_CONFLICT: &str = r#"
    ON CONFLICT (id) DO UPDATE SET
        text = EXCLUDED.text,
        username = EXCLUDED.username,
        timestamp = EXCLUDED.timestamp,
        created_at = EXCLUDED.created_at,
        is_reply = EXCLUDED.is_reply,
        is_retweet = EXCLUDED.is_retweet,
        likes = EXCLUDED.likes,
        retweet_count = EXCLUDED.retweet_count,
        replies = EXCLUDED.replies,
        photos = EXCLUDED.photos,
        videos = EXCLUDED.videos,
        urls = EXCLUDED.urls,
        permanent_url = EXCLUDED.permanent_url,
        in_reply_to_status_id = EXCLUDED.in_reply_to_status_id,
        hashtags = EXCLUDED.hashtags,
        modified_by = EXCLUDED.modified_by,
        modified_date = EXCLUDED.modified_date
    "#;

/// Who gets written into the audit columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditActors {
    pub created_by: String,
    pub modified_by: String,
}

impl AuditActors {
    pub fn new(created_by: impl Into<String>, modified_by: impl Into<String>) -> Self {
        Self {
            created_by: created_by.into(),
            modified_by: modified_by.into(),
        }
    }
}

/// A row from the tweets table, audit columns included.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredPost {
    pub id: i64,
    pub text: String,
    pub username: String,
    pub timestamp: i64,
    pub created_at: DateTime<Utc>,
    pub is_reply: bool,
    pub is_retweet: bool,
    pub likes: i32,
    pub retweet_count: i32,
    pub replies: i32,
    pub photos: Json<Vec<Photo>>,
    pub videos: Json<Vec<Video>>,
    pub urls: Json<Vec<String>>,
    pub permanent_url: String,
    pub in_reply_to_status_id: Option<i64>,
    pub hashtags: Json<Vec<String>>,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub modified_by: String,
    pub modified_date: DateTime<Utc>,
}

impl StoredPost {
    pub fn into_post(self) -> Post {
        Post {
            id: self.id,
            text: self.text,
            username: self.username,
            timestamp: self.timestamp,
            created_at: self.created_at,
            is_reply: self.is_reply,
            is_retweet: self.is_retweet,
            likes: self.likes,
            retweet_count: self.retweet_count,
            replies: self.replies,
            photos: self.photos.0,
            videos: self.videos.0,
            urls: self.urls.0,
            hashtags: self.hashtags.0,
            permanent_url: self.permanent_url,
            in_reply_to_status_id: self.in_reply_to_status_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    handle: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            handle: row.handle,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

/// Owns the connection pool. All batch writes go through [`PostStore::save_batch`].
pub struct PostStore {
    pool: PgPool,
    audit: AuditActors,
}

impl PostStore {
    pub fn new(pool: PgPool, audit: AuditActors) -> Self {
        Self { pool, audit }
    }

    /// Build a store from config. The pool connects lazily, so an unreachable
    /// database surfaces from [`PostStore::initialize`].
    pub fn from_config(config: &Config) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.db_host)
            .port(config.db_port)
            .username(&config.db_user)
            .password(&config.db_password)
            .database(&config.db_name);

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(options);

        Self::new(
            pool,
            AuditActors::new(&config.audit_created_by, &config.audit_modified_by),
        )
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if absent. Safe on every start.
    pub async fn initialize(&self) -> Result<()> {
        match sqlx::migrate!("./migrations").run(&self.pool).await {
            Ok(()) => {
                info!("Database initialized");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize database");
                Err(StoreError::Init(e))
            }
        }
    }

    /// Active accounts in the order they were added. An empty list is not an error.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, handle, active, created_at FROM accounts
            WHERE active
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    /// Register an account, reactivating it if it was deactivated.
    pub async fn add_account(&self, handle: &str) -> Result<Account> {
        let handle = normalize_handle(handle)?;
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (handle) VALUES ($1)
            ON CONFLICT (handle) DO UPDATE SET active = TRUE
            RETURNING id, handle, active, created_at
            "#,
        )
        .bind(&handle)
        .fetch_one(&self.pool)
        .await?;

        info!(handle = row.handle.as_str(), "Account registered");
        Ok(row.into())
    }

    /// Stop collecting for an account. Returns false if the handle is unknown.
    pub async fn deactivate_account(&self, handle: &str) -> Result<bool> {
        let handle = normalize_handle(handle)?;
        let result = sqlx::query("UPDATE accounts SET active = FALSE WHERE handle = $1")
            .bind(&handle)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Upsert a batch of posts in one all-or-nothing transaction.
    ///
    /// Duplicate ids inside `posts` collapse to the last occurrence before any
    /// I/O. Every written row is stamped with the same batch timestamp.
    pub async fn save_batch(&self, posts: &[Post]) -> Result<SaveSummary> {
        validate_batch(posts)?;

        let rows = collapse_duplicates(posts);
        let batch_at = Utc::now().trunc_subsecs(6);

        // The transaction owns the leased connection; dropping it releases the lease.
        let mut tx = self.pool.begin().await?;

        let mut upserted = 0usize;
        for (chunk_index, chunk) in rows.chunks(CHUNK_SIZE).enumerate() {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(UPSERT_PREFIX);
            qb.push_values(chunk.iter().copied(), |mut row, post| {
                row.push_bind(post.id)
                    .push_bind(&post.text)
                    .push_bind(&post.username)
                    .push_bind(post.timestamp)
                    .push_bind(post.created_at)
                    .push_bind(post.is_reply)
                    .push_bind(post.is_retweet)
                    .push_bind(post.likes)
                    .push_bind(post.retweet_count)
                    .push_bind(post.replies)
                    .push_bind(Json(&post.photos))
                    .push_bind(Json(&post.videos))
                    .push_bind(Json(&post.urls))
                    .push_bind(&post.permanent_url)
                    .push_bind(post.in_reply_to_status_id)
                    .push_bind(Json(&post.hashtags))
                    .push_bind(&self.audit.created_by)
                    .push_bind(batch_at)
                    .push_bind(&self.audit.modified_by)
                    .push_bind(batch_at);
            });
            qb.push(UPSERT_ON_CONFLICT);

            match qb.build().execute(&mut *tx).await {
                Ok(done) => upserted += done.rows_affected() as usize,
                Err(e) => {
                    error!(
                        chunk = chunk_index,
                        rows = chunk.len(),
                        error = %e,
                        "Batch upsert failed, rolling back"
                    );
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "Rollback failed; connection will be discarded");
                    }
                    return Err(StoreError::Transaction(e));
                }
            }
        }

        tx.commit().await.map_err(StoreError::Transaction)?;

        let summary = SaveSummary {
            processed_count: posts.len(),
            upserted,
            completed_at: batch_at,
        };
        info!(
            processed = summary.processed_count,
            upserted = summary.upserted,
            "Saved post batch"
        );
        Ok(summary)
    }

    /// Look up a single stored post by id.
    pub async fn get_post(&self, id: i64) -> Result<Option<StoredPost>> {
        let row = sqlx::query_as::<_, StoredPost>("SELECT * FROM tweets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// Total stored posts, optionally for one author.
    pub async fn count_posts(&self, username: Option<&str>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tweets WHERE $1::TEXT IS NULL OR username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Drain and close the pool. Only used at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }
}

fn validate_batch(posts: &[Post]) -> Result<()> {
    if posts.is_empty() {
        return Err(StoreError::Validation(
            "input must be a non-empty batch of posts".to_string(),
        ));
    }
    if let Some(bad) = posts.iter().find(|p| p.id <= 0) {
        return Err(StoreError::Validation(format!(
            "post id must be positive, got {}",
            bad.id
        )));
    }
    Ok(())
}

/// Last write wins: a repeated id keeps the first occurrence's slot and the
/// last occurrence's values.
fn collapse_duplicates(posts: &[Post]) -> Vec<&Post> {
    let mut slots: HashMap<i64, usize> = HashMap::with_capacity(posts.len());
    let mut rows: Vec<&Post> = Vec::with_capacity(posts.len());
    for post in posts {
        match slots.get(&post.id) {
            Some(&slot) => rows[slot] = post,
            None => {
                slots.insert(post.id, rows.len());
                rows.push(post);
            }
        }
    }
    rows
}

fn normalize_handle(handle: &str) -> Result<String> {
    let handle = handle.trim().trim_start_matches('@');
    if handle.is_empty() {
        return Err(StoreError::Validation("account handle is empty".to_string()));
    }
    Ok(handle.to_string())
}
