pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{RunData, Tweet, TweetAuthor, TweetMedia, TweetScraperInput};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for apidojo/tweet-scraper.
const TWEET_SCRAPER: &str = "61RPP7dywgiy0JPD0";

/// Seconds the API may hold a run-status request open before answering.
const WAIT_FOR_FINISH_SECS: u32 = 60;

/// Bound on the abort request, which runs on the shutdown path.
const ABORT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ApifyClient {
    http: reqwest::Client,
    token: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
        }
    }

    /// Start an actor run. Returns as soon as the run is queued.
    pub async fn start_run<I: Serialize>(&self, actor_id: &str, input: &I) -> Result<RunData> {
        let resp = self
            .http
            .post(format!("{BASE_URL}/acts/{actor_id}/runs"))
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;
        let envelope: ApiResponse<RunData> = ensure_success(resp).await?.json().await?;
        Ok(envelope.data)
    }

    /// Long-poll a run until it reaches a terminal status.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        let url = format!("{BASE_URL}/actor-runs/{run_id}?waitForFinish={WAIT_FOR_FINISH_SECS}");
        loop {
            let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
            let run = ensure_success(resp)
                .await?
                .json::<ApiResponse<RunData>>()
                .await?
                .data;

            match run.status.as_str() {
                "SUCCEEDED" => return Ok(run),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ApifyError::RunFailed {
                        run_id: run.id,
                        status: run.status,
                    });
                }
                other => debug!(run_id, status = other, "Run still in progress"),
            }
        }
    }

    /// Abort a run that is no longer wanted.
    pub async fn abort_run(&self, run_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{BASE_URL}/actor-runs/{run_id}/abort"))
            .bearer_auth(&self.token)
            .timeout(ABORT_TIMEOUT)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// Fetch every item a finished run wrote to its default dataset.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let resp = self
            .http
            .get(format!("{BASE_URL}/datasets/{dataset_id}/items?format=json"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(ensure_success(resp).await?.json().await?)
    }

    /// Queue a scrape of one handle's most recent posts.
    pub async fn start_x_scrape(&self, handle: &str, limit: u32) -> Result<RunData> {
        let input = TweetScraperInput {
            twitter_handles: vec![handle.to_string()],
            max_items: limit,
            sort: "Latest".to_string(),
        };
        self.start_run(TWEET_SCRAPER, &input).await
    }
}

/// Turn a non-2xx response into `ApifyError::Api`, keeping the body as the message.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ApifyError::Api {
        status: status.as_u16(),
        message,
    })
}
