use async_trait::async_trait;
use pricestat_lib::{Fault, FetchOutcome, PriceCeiling, PriceRequest};
use std::time::Duration;

use crate::err::PricestatError;

pub const DEFAULT_PRICE_URL: &str = "https://api.spot-hinta.fi/JustNowRank/0/{ceiling}";

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Ask whether the current price is at or below the ceiling. Never
    /// fails: every problem is folded into the outcome.
    async fn fetch(&self, request: PriceRequest) -> FetchOutcome;
}

/// Spot price service answering with a status code only.
pub struct SpotPrice {
    http: reqwest::Client,
    url_template: String,
}

impl SpotPrice {
    pub fn new(url_template: &str, timeout: Duration) -> Result<Self, PricestatError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url_template: url_template.to_string(),
        })
    }

    /// `{ceiling}` in the template is replaced, otherwise the ceiling goes
    /// into the query string.
    pub fn url(&self, ceiling: PriceCeiling) -> String {
        let ceiling = ceiling.to_string();
        if self.url_template.contains("{ceiling}") {
            self.url_template.replace("{ceiling}", &ceiling)
        } else {
            let sep = if self.url_template.contains('?') { '&' } else { '?' };
            format!("{}{}ceiling={}", self.url_template, sep, ceiling)
        }
    }
}

fn classify_error(e: &reqwest::Error) -> FetchOutcome {
    if e.is_timeout() || e.is_connect() {
        FetchOutcome::Transient(Fault::Network)
    } else if e.is_body() || e.is_decode() {
        FetchOutcome::Transient(Fault::Unexpected)
    } else {
        FetchOutcome::Permanent(Fault::Unexpected)
    }
}

#[async_trait]
impl PriceSource for SpotPrice {
    async fn fetch(&self, request: PriceRequest) -> FetchOutcome {
        let url = self.url(request.ceiling);
        tracing::debug!("fetching price verdict for hour {} from {}", request.hour, url);
        match self.http.get(&url).send().await {
            Ok(response) => FetchOutcome::from_status(response.status().as_u16()),
            Err(e) => {
                tracing::debug!("price request failed: {}", e);
                classify_error(&e)
            }
        }
    }
}
