use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Asia::Kolkata;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::MarketData;
use crate::error::BotError;
use crate::models::{Candle, Interval};

const API_BASE: &str = "https://apiconnect.angelone.in";
const CANDLE_PATH: &str = "/rest/secure/angelbroking/historical/v1/getCandleData";
const LTP_PATH: &str = "/rest/secure/angelbroking/order/v1/getLtpData";
const RATE_LIMIT_RPM: u32 = 60;
const MAX_RETRIES: u32 = 3;

type ApiRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Broker session credentials plus the device headers the API insists on.
#[derive(Debug, Clone, Deserialize)]
pub struct SmartApiCredentials {
    pub api_key: String,
    pub access_token: String,
    #[serde(default = "default_local_ip")]
    pub client_local_ip: String,
    #[serde(default = "default_local_ip")]
    pub client_public_ip: String,
    #[serde(default = "default_mac")]
    pub mac_address: String,
}

fn default_local_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_mac() -> String {
    "00:00:00:00:00:00".to_string()
}

impl Default for SmartApiCredentials {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            access_token: String::new(),
            client_local_ip: default_local_ip(),
            client_public_ip: default_local_ip(),
            mac_address: default_mac(),
        }
    }
}

/// Exchange listing for one watched symbol. The broker addresses
/// instruments by numeric token, not trading symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub token: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
}

fn default_exchange() -> String {
    "NSE".to_string()
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<T>,
}

/// Candle rows arrive as positional arrays: [timestamp, o, h, l, c, v]
type CandleRow = (String, f64, f64, f64, f64, f64);

#[derive(Debug, Default, Deserialize)]
struct LtpData {
    ltp: f64,
}

// ============== Implementation ==============

/// Client for the Angel One SmartAPI (NSE equities data)
#[derive(Clone)]
pub struct SmartApiClient {
    client: Client,
    base_url: String,
    credentials: SmartApiCredentials,
    instruments: HashMap<String, Instrument>,
    rate_limiter: Arc<ApiRateLimiter>,
}

impl SmartApiClient {
    pub fn new(credentials: SmartApiCredentials, instruments: Vec<Instrument>) -> Result<Self> {
        Self::with_base_url(API_BASE.to_string(), credentials, instruments)
    }

    pub fn with_base_url(
        base_url: String,
        credentials: SmartApiCredentials,
        instruments: Vec<Instrument>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create broker HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        let instruments = instruments
            .into_iter()
            .map(|i| (i.symbol.clone(), i))
            .collect();

        Ok(Self {
            client,
            base_url,
            credentials,
            instruments,
            rate_limiter,
        })
    }

    /// Historical candles for a symbol, oldest first, trimmed to `bars`.
    ///
    /// The request window is padded well past `bars * interval` so that
    /// weekends and closed sessions still leave enough rows.
    pub async fn get_candle_data(
        &self,
        symbol: &str,
        interval: Interval,
        bars: usize,
    ) -> Result<Vec<Candle>> {
        let instrument = self.instrument(symbol)?;

        let to_ist = Utc::now().with_timezone(&Kolkata);
        let pad_minutes = (interval.minutes() * bars as i64 * 4).max(7 * 24 * 60);
        let from_ist = to_ist - ChronoDuration::minutes(pad_minutes);

        let body = json!({
            "exchange": instrument.exchange,
            "symboltoken": instrument.token,
            "interval": interval.as_api_str(),
            "fromdate": from_ist.format("%Y-%m-%d %H:%M").to_string(),
            "todate": to_ist.format("%Y-%m-%d %H:%M").to_string(),
        });

        let response = self.post_json(CANDLE_PATH, &body).await?;
        let envelope: ApiEnvelope<Vec<CandleRow>> = response
            .json()
            .await
            .context("Failed to parse candle data response")?;

        if !envelope.status {
            bail!("Candle data request rejected: {}", envelope.message);
        }

        let rows = envelope.data.unwrap_or_default();
        let skip = rows.len().saturating_sub(bars);

        let mut candles = Vec::with_capacity(rows.len() - skip);
        for (ts, open, high, low, close, volume) in rows.into_iter().skip(skip) {
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .with_context(|| format!("Bad candle timestamp: {}", ts))?
                .with_timezone(&Utc);

            candles.push(Candle {
                symbol: symbol.to_string(),
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        Ok(candles)
    }

    /// Last traded price for a symbol.
    pub async fn get_ltp(&self, symbol: &str) -> Result<f64> {
        let instrument = self.instrument(symbol)?;

        let body = json!({
            "exchange": instrument.exchange,
            "tradingsymbol": instrument.symbol,
            "symboltoken": instrument.token,
        });

        let response = self.post_json(LTP_PATH, &body).await?;
        let envelope: ApiEnvelope<LtpData> = response
            .json()
            .await
            .context("Failed to parse LTP response")?;

        if !envelope.status {
            bail!("LTP request rejected: {}", envelope.message);
        }

        let data = envelope
            .data
            .context("LTP response carried no data")?;

        Ok(data.ltp)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.instruments.keys().cloned().collect()
    }

    fn instrument(&self, symbol: &str) -> Result<&Instrument> {
        self.instruments
            .get(symbol)
            .with_context(|| format!("No instrument mapping for {}", symbol))
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.credentials.access_token))
            .header("Accept", "application/json")
            .header("X-UserType", "USER")
            .header("X-SourceID", "WEB")
            .header("X-ClientLocalIP", &self.credentials.client_local_ip)
            .header("X-ClientPublicIP", &self.credentials.client_public_ip)
            .header("X-MACAddress", &self.credentials.mac_address)
            .header("X-PrivateKey", &self.credentials.api_key)
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            let request = self.with_auth(self.client.post(&url)).json(body);

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return Ok(resp);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let wait = Duration::from_secs(2u64.pow(attempt));
                        warn!(
                            "Broker API returned {}, retrying in {:?} (attempt {}/{})",
                            status, wait, attempt, MAX_RETRIES
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    bail!("Broker API error {} on {}", status, path);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let wait = Duration::from_secs(2u64.pow(attempt));
                    warn!(
                        "Broker API request failed: {}, retrying in {:?} (attempt {}/{})",
                        e, wait, attempt, MAX_RETRIES
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    return Err(e).context("Broker API request failed after retries");
                }
            }
        }

        bail!("Broker API request failed after {} attempts", MAX_RETRIES)
    }
}

#[async_trait]
impl MarketData for SmartApiClient {
    async fn get_price_series(
        &self,
        symbol: &str,
        interval: Interval,
        bars: usize,
    ) -> Result<Vec<Candle>, BotError> {
        self.get_candle_data(symbol, interval, bars)
            .await
            .map_err(|e| BotError::data(format!("{}: {:#}", symbol, e)))
    }

    async fn get_quote(&self, symbol: &str) -> Result<f64, BotError> {
        self.get_ltp(symbol)
            .await
            .map_err(|e| BotError::data(format!("{}: {:#}", symbol, e)))
    }
}
