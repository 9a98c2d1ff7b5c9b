// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

/// Transport-level failures talking to a quote source.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bad quote url: {0}")]
    Url(#[from] url::ParseError),
    #[error("quote source returned {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Everything that can stop the valuation pipeline.
///
/// None of these are recovered inside the core; they bubble up to `main`.
#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("no last price available for {symbol}")]
    QuoteUnavailable { symbol: String },
    #[error("no {currency}->USD rate available")]
    FxUnavailable { currency: String },
    #[error("portfolio has zero total value, allocation is undefined")]
    EmptyPortfolio,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("amount out of range: {0}")]
    Overflow(String),
    #[error("report serialization failed: {0}")]
    Render(#[from] serde_json::Error),
    #[error(transparent)]
    Source(#[from] FeedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PortfolioError>;
