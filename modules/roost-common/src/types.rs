use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Posts ---

/// An image attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

/// A video attached to a post. `preview` is the poster-frame image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One collected social-media post, keyed by its platform id.
///
/// Engagement counters and content are mutable across sightings; the id is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub username: String,
    /// Posting time as epoch seconds.
    pub timestamp: i64,
    pub created_at: DateTime<Utc>,
    pub is_reply: bool,
    pub is_retweet: bool,
    pub likes: i32,
    pub retweet_count: i32,
    pub replies: i32,
    pub photos: Vec<Photo>,
    pub videos: Vec<Video>,
    pub urls: Vec<String>,
    pub hashtags: Vec<String>,
    pub permanent_url: String,
    pub in_reply_to_status_id: Option<i64>,
}

impl Post {
    /// A post with no engagement and no attachments. Callers fill in the rest.
    pub fn new(
        id: i64,
        username: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let username = username.into();
        let permanent_url = permanent_url(&username, id);
        Self {
            id,
            text: text.into(),
            username,
            timestamp: created_at.timestamp(),
            created_at,
            is_reply: false,
            is_retweet: false,
            likes: 0,
            retweet_count: 0,
            replies: 0,
            photos: Vec::new(),
            videos: Vec::new(),
            urls: Vec::new(),
            hashtags: Vec::new(),
            permanent_url,
            in_reply_to_status_id: None,
        }
    }
}

/// Canonical status URL for a post.
pub fn permanent_url(username: &str, id: i64) -> String {
    format!("https://x.com/{username}/status/{id}")
}

// --- Accounts ---

/// A configured collection target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub handle: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

// --- Batch results ---

/// Result of persisting one batch of posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    /// Number of input posts handled, duplicates included.
    pub processed_count: usize,
    /// Distinct post ids written.
    pub upserted: usize,
    /// Batch timestamp, stamped on every row as modified (and first created) date.
    pub completed_at: DateTime<Utc>,
}

impl std::fmt::Display for SaveSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={} upserted={} at={}",
            self.processed_count,
            self.upserted,
            self.completed_at.to_rfc3339()
        )
    }
}
