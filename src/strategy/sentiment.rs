use tracing::warn;

use crate::news::NewsClient;

/// News-volume sentiment feed. Wraps the search scraper and degrades to
/// "no vote" whenever the scrape fails, so a dead news source can never
/// push the aggregate toward a trade on its own.
#[derive(Clone)]
pub struct SentimentSource {
    client: Option<NewsClient>,
}

impl SentimentSource {
    pub fn new(client: NewsClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Source with no backing client. Every fetch abstains. Used by
    /// backtests and the one-shot signal command, which have no live
    /// news to consult.
    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Headline count for `symbol`, or `None` when the source is
    /// disabled or the scrape failed. `Some(0)` is a real observation
    /// (the search worked and found nothing) and still counts as a
    /// quiet-news reading downstream.
    pub async fn fetch_count(&self, symbol: &str) -> Option<u32> {
        let client = self.client.as_ref()?;

        match client.headline_count(symbol).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("⚠ Sentiment unavailable for {}: {}", symbol, e);
                None
            }
        }
    }
}
