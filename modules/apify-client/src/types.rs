use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
}

/// Input for the apidojo/tweet-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct TweetScraperInput {
    #[serde(rename = "twitterHandles")]
    pub twitter_handles: Vec<String>,
    #[serde(rename = "maxItems")]
    pub max_items: u32,
    /// Newest first, so a limited run sees the most recent posts.
    pub sort: String,
}

/// Author info nested inside a Tweet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetAuthor {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetHashtag {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetUrl {
    pub url: Option<String>,
    pub expanded_url: Option<String>,
}

/// Inline entities: hashtags and links.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetEntities {
    #[serde(default)]
    pub hashtags: Vec<TweetHashtag>,
    #[serde(default)]
    pub urls: Vec<TweetUrl>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoVariant {
    pub url: Option<String>,
    pub content_type: Option<String>,
    pub bitrate: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub variants: Vec<VideoVariant>,
}

/// One media attachment. `media_type` is "photo", "video" or "animated_gif".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetMedia {
    pub id_str: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub media_url_https: Option<String>,
    pub ext_alt_text: Option<String>,
    pub video_info: Option<VideoInfo>,
}

impl TweetMedia {
    /// Highest-bitrate mp4 variant, if this is a video.
    pub fn best_video_url(&self) -> Option<&str> {
        self.video_info
            .as_ref()?
            .variants
            .iter()
            .filter(|v| v.content_type.as_deref() == Some("video/mp4"))
            .max_by_key(|v| v.bitrate.unwrap_or(0))
            .and_then(|v| v.url.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedEntities {
    #[serde(default)]
    pub media: Vec<TweetMedia>,
}

/// A single tweet from the Apify dataset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tweet {
    pub id: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "fullText")]
    pub full_text: Option<String>,
    pub url: Option<String>,
    /// Twitter's legacy format, e.g. "Fri Nov 24 17:49:36 +0000 2023".
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
    pub author: Option<TweetAuthor>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<i64>,
    #[serde(rename = "retweetCount")]
    pub retweet_count: Option<i64>,
    #[serde(rename = "replyCount")]
    pub reply_count: Option<i64>,
    #[serde(rename = "isReply", default)]
    pub is_reply: bool,
    #[serde(rename = "isRetweet", default)]
    pub is_retweet: bool,
    #[serde(rename = "inReplyToId")]
    pub in_reply_to_id: Option<String>,
    pub entities: Option<TweetEntities>,
    #[serde(rename = "extendedEntities")]
    pub extended_entities: Option<ExtendedEntities>,
}

const TWITTER_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

impl Tweet {
    /// Returns whichever text field is populated, preferring `fullText`.
    pub fn content(&self) -> Option<&str> {
        self.full_text.as_deref().or(self.text.as_deref())
    }

    /// Numeric tweet id, if present, well-formed and positive.
    pub fn numeric_id(&self) -> Option<i64> {
        self.id.as_deref()?.parse::<i64>().ok().filter(|id| *id > 0)
    }

    pub fn in_reply_to(&self) -> Option<i64> {
        self.in_reply_to_id.as_deref()?.parse().ok()
    }

    /// Parse `createdAt`, accepting both Twitter's legacy format and RFC 3339.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_str(raw, TWITTER_DATE_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn media(&self) -> &[TweetMedia] {
        self.extended_entities
            .as_ref()
            .map(|e| e.media.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "1728108619189874825",
        "text": "short",
        "fullText": "Herons are back at the marsh #birds https://t.co/x",
        "url": "https://x.com/alice/status/1728108619189874825",
        "createdAt": "Fri Nov 24 17:49:36 +0000 2023",
        "author": {"userName": "alice", "name": "Alice"},
        "likeCount": 12,
        "retweetCount": 3,
        "replyCount": 1,
        "isReply": true,
        "inReplyToId": "1728108619189874000",
        "entities": {
            "hashtags": [{"text": "birds"}],
            "urls": [{"url": "https://t.co/x", "expanded_url": "https://example.org/marsh"}]
        },
        "extendedEntities": {
            "media": [
                {"id_str": "m1", "type": "photo", "media_url_https": "https://pbs.example/m1.jpg", "ext_alt_text": "heron"},
                {"id_str": "m2", "type": "video", "media_url_https": "https://pbs.example/m2.jpg",
                 "video_info": {"variants": [
                    {"url": "https://video.example/low.mp4", "content_type": "video/mp4", "bitrate": 256000},
                    {"url": "https://video.example/high.mp4", "content_type": "video/mp4", "bitrate": 2176000},
                    {"url": "https://video.example/pl.m3u8", "content_type": "application/x-mpegURL"}
                 ]}}
            ]
        }
    }"#;

    #[test]
    fn parses_dataset_item() {
        let tweet: Tweet = serde_json::from_str(SAMPLE).unwrap();

        assert_eq!(tweet.numeric_id(), Some(1728108619189874825));
        assert_eq!(tweet.in_reply_to(), Some(1728108619189874000));
        assert!(tweet.content().unwrap().starts_with("Herons"));
        assert!(tweet.is_reply);
        assert!(!tweet.is_retweet);
        assert_eq!(tweet.media().len(), 2);
        assert_eq!(
            tweet.media()[1].best_video_url(),
            Some("https://video.example/high.mp4")
        );
    }

    #[test]
    fn parses_legacy_twitter_dates() {
        let tweet: Tweet = serde_json::from_str(SAMPLE).unwrap();
        let at = tweet.created_at_utc().unwrap();
        assert_eq!(at.to_rfc3339(), "2023-11-24T17:49:36+00:00");
    }

    #[test]
    fn sparse_items_still_deserialize() {
        let tweet: Tweet = serde_json::from_str(r#"{"id": "not-a-number"}"#).unwrap();
        assert_eq!(tweet.numeric_id(), None);
        assert!(tweet.media().is_empty());
        assert!(tweet.created_at_utc().is_none());
    }

    #[test]
    fn non_positive_ids_are_not_ids() {
        for raw in ["-5", "0"] {
            let tweet: Tweet = serde_json::from_str(&format!(r#"{{"id": "{raw}"}}"#)).unwrap();
            assert_eq!(tweet.numeric_id(), None, "id {raw}");
        }
    }
}
