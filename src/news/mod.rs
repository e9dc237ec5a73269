use anyhow::{bail, Context, Result};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::BotError;

const DEFAULT_SEARCH_BASE: &str = "https://www.google.com/search";
const RATE_LIMIT_RPM: u32 = 20;
const MAX_RETRIES: u32 = 2;

/// Marker div that wraps each result headline in the search response HTML.
const RESULT_MARKER: &str = "<div class=\"BNeawe vvjwJb AP7Wnd\">";

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

type NewsRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Scrapes a web search for recent headlines mentioning a symbol and
/// reports how many showed up. The count is the only thing we extract;
/// no parsing beyond locating the headline wrapper divs.
#[derive(Clone)]
pub struct NewsClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<NewsRateLimiter>,
}

impl NewsClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_SEARCH_BASE.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create news HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            base_url,
            rate_limiter,
        })
    }

    /// Count of headline snippets in the current search results for `symbol`.
    pub async fn headline_count(&self, symbol: &str) -> Result<u32, BotError> {
        let query = format!("{} stock news", symbol);
        let body = self
            .fetch_results(&query)
            .await
            .map_err(|e| BotError::external(format!("news search for {}: {:#}", symbol, e)))?;

        let count = body.matches(RESULT_MARKER).count() as u32;
        debug!("📰 {} headlines found for {}", count, symbol);
        Ok(count)
    }

    async fn fetch_results(&self, query: &str) -> Result<String> {
        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            let response = self
                .client
                .get(&self.base_url)
                .query(&[("q", query)])
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return resp
                            .text()
                            .await
                            .context("Failed to read news search response body");
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let wait = Duration::from_secs(2u64.pow(attempt));
                        warn!(
                            "News search returned {}, retrying in {:?} (attempt {}/{})",
                            status, wait, attempt, MAX_RETRIES
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    bail!("News search error {}: {}", status, query);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let wait = Duration::from_secs(2u64.pow(attempt));
                    warn!(
                        "News search request failed: {}, retrying in {:?} (attempt {}/{})",
                        e, wait, attempt, MAX_RETRIES
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    return Err(e).context("News search request failed after retries");
                }
            }
        }

        bail!("News search failed after {} attempts", MAX_RETRIES)
    }
}
