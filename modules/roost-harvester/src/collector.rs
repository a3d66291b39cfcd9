// Collector contract plus the Apify-backed implementation.
//
// A Collector opens one session per account per cycle. The session produces
// that account's posts and can be logged out early when the process is told
// to stop.

use std::sync::{Arc, Mutex, PoisonError};

use apify_client::{ApifyClient, Tweet};
use async_trait::async_trait;
use tracing::{info, warn};

use roost_common::{permanent_url, Account, Photo, Post, Video};

use crate::error::CollectorError;

#[async_trait]
pub trait Collector: Send + Sync {
    /// Begin collecting for one account.
    async fn open_session(
        &self,
        account: &Account,
    ) -> Result<Arc<dyn CollectorSession>, CollectorError>;
}

#[async_trait]
pub trait CollectorSession: Send + Sync {
    /// Produce this account's posts, in collector order.
    async fn collect(&self) -> Result<Vec<Post>, CollectorError>;

    /// Release whatever the session holds remotely. Called on shutdown only.
    async fn logout(&self) -> Result<(), CollectorError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Apify
// ---------------------------------------------------------------------------

/// Collects an account's latest posts through the Apify tweet-scraper actor.
pub struct ApifyCollector {
    client: Arc<ApifyClient>,
    limit: u32,
}

impl ApifyCollector {
    pub fn new(client: ApifyClient, limit: u32) -> Self {
        Self {
            client: Arc::new(client),
            limit,
        }
    }
}

#[async_trait]
impl Collector for ApifyCollector {
    async fn open_session(
        &self,
        account: &Account,
    ) -> Result<Arc<dyn CollectorSession>, CollectorError> {
        Ok(Arc::new(ApifySession {
            client: self.client.clone(),
            handle: account.handle.clone(),
            limit: self.limit,
            run_id: Mutex::new(None),
        }))
    }
}

struct ApifySession {
    client: Arc<ApifyClient>,
    handle: String,
    limit: u32,
    /// Actor run currently in flight, aborted on logout.
    run_id: Mutex<Option<String>>,
}

impl ApifySession {
    fn set_run(&self, run_id: Option<String>) -> Option<String> {
        let mut slot = self.run_id.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, run_id)
    }
}

#[async_trait]
impl CollectorSession for ApifySession {
    async fn collect(&self) -> Result<Vec<Post>, CollectorError> {
        info!(handle = self.handle.as_str(), limit = self.limit, "Collecting posts");

        let run = self.client.start_x_scrape(&self.handle, self.limit).await?;
        self.set_run(Some(run.id.clone()));

        let completed = self.client.wait_for_run(&run.id).await;
        self.set_run(None);
        let completed = completed.map_err(|e| {
            if e.is_aborted() {
                CollectorError::Session(format!("run {} for @{} was aborted", run.id, self.handle))
            } else {
                e.into()
            }
        })?;

        let tweets: Vec<Tweet> = self
            .client
            .get_dataset_items(&completed.default_dataset_id)
            .await?;
        let fetched = tweets.len();

        let posts: Vec<Post> = tweets
            .into_iter()
            .filter_map(|t| {
                let id = t.id.clone();
                let post = tweet_to_post(t, &self.handle);
                if post.is_none() {
                    warn!(handle = self.handle.as_str(), id = ?id, "Skipping tweet without id or timestamp");
                }
                post
            })
            .collect();

        info!(
            handle = self.handle.as_str(),
            fetched,
            kept = posts.len(),
            "Collected posts"
        );
        Ok(posts)
    }

    async fn logout(&self) -> Result<(), CollectorError> {
        if let Some(run_id) = self.set_run(None) {
            info!(handle = self.handle.as_str(), run_id = run_id.as_str(), "Aborting Apify run");
            self.client.abort_run(&run_id).await?;
        }
        Ok(())
    }
}

/// Map one Apify dataset item onto a Post. Items without a numeric id or a
/// parsable creation time are dropped.
pub fn tweet_to_post(tweet: Tweet, fallback_handle: &str) -> Option<Post> {
    let id = tweet.numeric_id()?;
    let created_at = tweet.created_at_utc()?;

    let username = tweet
        .author
        .as_ref()
        .and_then(|a| a.user_name.clone())
        .unwrap_or_else(|| fallback_handle.to_string());

    let mut photos = Vec::new();
    let mut videos = Vec::new();
    for media in tweet.media() {
        let id = media.id_str.clone().unwrap_or_default();
        let image = media.media_url_https.clone().unwrap_or_default();
        match media.media_type.as_deref() {
            Some("photo") => photos.push(Photo {
                id,
                url: image,
                alt_text: media.ext_alt_text.clone(),
            }),
            Some("video") | Some("animated_gif") => videos.push(Video {
                id,
                preview: image,
                url: media.best_video_url().map(str::to_string),
            }),
            _ => {}
        }
    }

    let (urls, hashtags) = match &tweet.entities {
        Some(entities) => (
            entities
                .urls
                .iter()
                .filter_map(|u| u.expanded_url.clone().or_else(|| u.url.clone()))
                .collect(),
            entities
                .hashtags
                .iter()
                .filter_map(|h| h.text.clone())
                .collect(),
        ),
        None => (Vec::new(), Vec::new()),
    };

    Some(Post {
        id,
        text: tweet.content().unwrap_or_default().to_string(),
        permanent_url: tweet
            .url
            .clone()
            .unwrap_or_else(|| permanent_url(&username, id)),
        username,
        timestamp: created_at.timestamp(),
        created_at,
        is_reply: tweet.is_reply,
        is_retweet: tweet.is_retweet,
        likes: clamp_count(tweet.like_count),
        retweet_count: clamp_count(tweet.retweet_count),
        replies: clamp_count(tweet.reply_count),
        photos,
        videos,
        urls,
        hashtags,
        in_reply_to_status_id: tweet.in_reply_to(),
    })
}

fn clamp_count(count: Option<i64>) -> i32 {
    count.unwrap_or(0).clamp(0, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet(json: &str) -> Tweet {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn maps_tweet_fields_onto_post() {
        let t = tweet(
            r#"{
                "id": "1001",
                "fullText": "Marsh update #birds",
                "url": "https://x.com/alice/status/1001",
                "createdAt": "Fri Nov 24 17:49:36 +0000 2023",
                "author": {"userName": "alice"},
                "likeCount": 7,
                "retweetCount": 2,
                "replyCount": 1,
                "isRetweet": true,
                "entities": {
                    "hashtags": [{"text": "birds"}],
                    "urls": [{"url": "https://t.co/a", "expanded_url": "https://example.org/a"}, {"url": "https://t.co/b"}]
                },
                "extendedEntities": {"media": [
                    {"id_str": "p1", "type": "photo", "media_url_https": "https://pbs.example/p1.jpg"},
                    {"id_str": "g1", "type": "animated_gif", "media_url_https": "https://pbs.example/g1.jpg"}
                ]}
            }"#,
        );

        let post = tweet_to_post(t, "fallback").unwrap();

        assert_eq!(post.id, 1001);
        assert_eq!(post.username, "alice");
        assert_eq!(post.text, "Marsh update #birds");
        assert_eq!(post.timestamp, 1700848176);
        assert!(post.is_retweet);
        assert!(!post.is_reply);
        assert_eq!((post.likes, post.retweet_count, post.replies), (7, 2, 1));
        assert_eq!(post.hashtags, vec!["birds"]);
        assert_eq!(post.urls, vec!["https://example.org/a", "https://t.co/b"]);
        assert_eq!(post.photos.len(), 1);
        assert_eq!(post.videos.len(), 1);
        assert_eq!(post.videos[0].url, None);
        assert_eq!(post.permanent_url, "https://x.com/alice/status/1001");
    }

    #[test]
    fn missing_author_and_url_fall_back_to_account() {
        let t = tweet(r#"{"id": "5", "text": "hi", "createdAt": "2024-01-02T03:04:05Z"}"#);

        let post = tweet_to_post(t, "bob").unwrap();

        assert_eq!(post.username, "bob");
        assert_eq!(post.permanent_url, "https://x.com/bob/status/5");
        assert_eq!(post.likes, 0);
    }

    #[test]
    fn items_without_id_or_time_are_dropped() {
        assert!(tweet_to_post(tweet(r#"{"text": "no id"}"#), "bob").is_none());
        assert!(tweet_to_post(tweet(r#"{"id": "9"}"#), "bob").is_none());
    }

    #[test]
    fn negative_id_drops_only_that_record() {
        let items = [
            tweet(r#"{"id": "-5", "text": "bad", "createdAt": "2024-01-02T03:04:05Z"}"#),
            tweet(r#"{"id": "6", "text": "good", "createdAt": "2024-01-02T03:04:05Z"}"#),
        ];

        let posts: Vec<Post> = items
            .into_iter()
            .filter_map(|t| tweet_to_post(t, "bob"))
            .collect();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, 6);
    }

    #[test]
    fn oversized_counts_are_clamped() {
        assert_eq!(clamp_count(Some(i64::MAX)), i32::MAX);
        assert_eq!(clamp_count(Some(-3)), 0);
        assert_eq!(clamp_count(None), 0);
    }
}
