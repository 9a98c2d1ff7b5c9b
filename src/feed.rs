// ===============================
// src/feed.rs
// ===============================
//
// Quote source adapters:
// - GoogleFinance : scrapes `data-last-price` / `data-currency-code` off the
//                   public quote page (instrument) or the `CUR-USD` page (fx)
// - StaticQuotes  : in-memory tables, used for FEED mode "mock" and in tests
//
// Adapters only answer "what is the last price". Conversion, rounding and
// aggregation live in resolver.rs / portfolio.rs.
//

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::domain::{Instrument, Quote, USD};
use crate::error::{FeedError, PortfolioError, Result};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Short name for logs.
    fn id(&self) -> &'static str;

    /// Last traded price and listing currency for `TICKER:EXCHANGE`.
    /// `Ok(None)` when the source has no parseable price for it.
    async fn fetch_last_price(&self, symbol_id: &str) -> std::result::Result<Option<Quote>, FeedError>;

    /// Rate to multiply a `currency` amount by to get USD.
    async fn fetch_fx_rate(&self, currency: &str) -> std::result::Result<Option<Decimal>, FeedError>;
}

// -----------------------------------------------------------------------------
// Markup extraction
// -----------------------------------------------------------------------------

/// Numbers come as `123.45`, `1,234.5` or occasionally `1.2E-5`.
fn parse_decimal(raw: &str) -> Option<Decimal> {
    let s: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .ok()
}

/// First element carrying `data-last-price`: (price, currency code if present).
pub fn extract_last_price(html: &str) -> Option<(Decimal, Option<String>)> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("[data-last-price]").ok()?;
    let el = doc.select(&sel).next()?;
    let price = parse_decimal(el.value().attr("data-last-price")?)?;
    let currency = el
        .value()
        .attr("data-currency-code")
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty());
    Some((price, currency))
}

// -----------------------------------------------------------------------------
// Google Finance
// -----------------------------------------------------------------------------
pub struct GoogleFinance {
    http: reqwest::Client,
    base: Url,
}

impl GoogleFinance {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with '/'
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(FeedError::from)?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(FeedError::from)?;
        Ok(Self { http, base })
    }

    fn quote_url(&self, path: &str) -> std::result::Result<Url, FeedError> {
        Ok(self.base.join(&format!("quote/{path}"))?)
    }

    /// `None` on 404, error on any other non-success status.
    async fn get_page(&self, url: Url) -> std::result::Result<Option<String>, FeedError> {
        debug!(%url, "GET quote page");
        let rsp = self.http.get(url.clone()).send().await?;
        match rsp.status() {
            s if s.is_success() => Ok(Some(rsp.text().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(FeedError::Status { url: url.to_string(), status: s.as_u16() }),
        }
    }
}

#[async_trait]
impl QuoteSource for GoogleFinance {
    fn id(&self) -> &'static str {
        "google_finance"
    }

    async fn fetch_last_price(&self, symbol_id: &str) -> std::result::Result<Option<Quote>, FeedError> {
        let url = self.quote_url(symbol_id)?;
        let Some(page) = self.get_page(url).await? else {
            return Ok(None);
        };
        Ok(match extract_last_price(&page) {
            Some((price, Some(currency))) => Some(Quote { price, currency }),
            _ => None,
        })
    }

    async fn fetch_fx_rate(&self, currency: &str) -> std::result::Result<Option<Decimal>, FeedError> {
        let url = self.quote_url(&format!("{}-{USD}", currency.to_ascii_uppercase()))?;
        let Some(page) = self.get_page(url).await? else {
            return Ok(None);
        };
        Ok(extract_last_price(&page).map(|(rate, _)| rate))
    }
}

// -----------------------------------------------------------------------------
// Static (mock) quotes
// -----------------------------------------------------------------------------
#[derive(Debug, Default)]
pub struct StaticQuotes {
    prices: HashMap<String, Quote>,
    fx: HashMap<String, Decimal>,
    price_calls: AtomicUsize,
    fx_calls: AtomicUsize,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, instrument: &Instrument, price: Decimal, currency: &str) -> Self {
        self.prices.insert(
            instrument.symbol_id(),
            Quote { price, currency: currency.to_ascii_uppercase() },
        );
        self
    }

    pub fn with_fx(mut self, currency: &str, rate: Decimal) -> Self {
        self.fx.insert(currency.to_ascii_uppercase(), rate);
        self
    }

    /// `MSFT:NASDAQ=400.00 USD;SHOP:TSE=100 CAD` plus `CAD=0.73;EUR=1.08`.
    pub fn from_tables(quotes: &str, fx: &str) -> Result<Self> {
        let mut out = Self::new();
        for entry in quotes.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let bad = || PortfolioError::InvalidInput(format!("bad mock quote '{entry}'"));
            let (symbol, rest) = entry.split_once('=').ok_or_else(bad)?;
            let (ticker, exchange) = symbol.split_once(':').ok_or_else(bad)?;
            let mut it = rest.split_whitespace();
            let price = it.next().and_then(parse_decimal).ok_or_else(bad)?;
            let currency = it.next().unwrap_or(USD);
            out = out.with_price(&Instrument::new(ticker, exchange)?, price, currency);
        }
        for entry in fx.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let bad = || PortfolioError::InvalidInput(format!("bad mock fx rate '{entry}'"));
            let (currency, rate) = entry.split_once('=').ok_or_else(bad)?;
            let rate = parse_decimal(rate).ok_or_else(bad)?;
            out = out.with_fx(currency.trim(), rate);
        }
        Ok(out)
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    pub fn fx_calls(&self) -> usize {
        self.fx_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for StaticQuotes {
    fn id(&self) -> &'static str {
        "static"
    }

    async fn fetch_last_price(&self, symbol_id: &str) -> std::result::Result<Option<Quote>, FeedError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.prices.get(symbol_id).cloned())
    }

    async fn fetch_fx_rate(&self, currency: &str) -> std::result::Result<Option<Decimal>, FeedError> {
        self.fx_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.fx.get(&currency.to_ascii_uppercase()).copied())
    }
}
