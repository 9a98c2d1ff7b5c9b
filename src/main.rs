// ===============================
// src/main.rs
// ===============================
/*
 # live prices, default demo book
 cargo run --release

 # offline run against static tables
 QUOTE_SOURCE=mock \
 MOCK_QUOTES="MSFT:NASDAQ=400.00 USD;SHOP:TSE=100 CAD" MOCK_FX="CAD=0.73" \
 cargo run -- MSFT:NASDAQ:2 SHOP:TSE:10
*/
/*
=============================================================================
Project : portfolio_valuer — multi-currency equity portfolio valuation in Rust
Module  : main.rs
Version : 0.1.0
License : MIT

Summary : Resolves live last prices for a list of holdings, converts non-USD
          listings through a direct X->USD rate, and prints a ranked,
          percentage-weighted valuation report.
=============================================================================
*/
mod config;
mod domain;
mod error;
mod feed;             // quote sources (Google Finance scraper, static tables)
mod metrics;
mod portfolio;
mod report;
mod resolver;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{OutputFormat, Settings, SourceMode};
use crate::error::Result;
use crate::feed::{GoogleFinance, QuoteSource, StaticQuotes};
use crate::report::{JsonRenderer, ReportRenderer, TableRenderer};
use crate::resolver::PriceResolver;

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging (stderr; stdout is the report) ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "valuation failed");
            ExitCode::FAILURE
        }
    }
}

fn build_source(settings: &Settings) -> Result<Arc<dyn QuoteSource>> {
    Ok(match settings.source {
        SourceMode::Google => Arc::new(GoogleFinance::new(&settings.google_url, settings.timeout)?),
        SourceMode::Mock => Arc::new(StaticQuotes::from_tables(&settings.mock_quotes, &settings.mock_fx)?),
    })
}

async fn run() -> Result<()> {
    // ---- Load config ----
    let settings = config::load()?;

    // ---- Metrics ----
    metrics::init();

    info!(
        source = ?settings.source,
        holdings = settings.holdings.len(),
        concurrency = settings.concurrency,
        output = ?settings.output,
        "startup config"
    );

    // ---- Resolve (spec -> price -> holding) ----
    let resolver = PriceResolver::new(build_source(&settings)?);
    let portfolio = resolver
        .resolve_portfolio(&settings.holdings, settings.concurrency)
        .await?;

    // ---- Report ----
    if portfolio.total_value()?.is_zero() {
        warn!(holdings = portfolio.holdings().len(), "portfolio has no value");
        println!("Portfolio is empty; nothing to report.");
    } else {
        let report = portfolio.report()?;
        info!(total = %report.total_value, rows = report.rows.len(), "portfolio valued");

        let renderer: Box<dyn ReportRenderer> = match settings.output {
            OutputFormat::Table => Box::new(TableRenderer::new(settings.locale.clone())),
            OutputFormat::Json => Box::new(JsonRenderer),
        };
        let mut out = std::io::stdout().lock();
        out.write_all(renderer.render(&report)?.as_bytes())?;
        out.flush()?;
    }

    if let Some(path) = &settings.metrics_file {
        metrics::write_textfile(path).await?;
        info!(%path, "metrics written");
    }
    Ok(())
}
