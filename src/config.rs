// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : portfolio_valuer — multi-currency equity portfolio valuation in Rust
Module  : config.rs
Version : 0.1.0
License : MIT

Summary : Resolves live last prices for a list of holdings, converts non-USD
          listings through a direct X->USD rate, and prints a ranked,
          percentage-weighted valuation report.
=============================================================================
*/
use std::time::Duration;

use clap::{Parser, ValueEnum};
use dotenvy::dotenv;

use crate::domain::HoldingSpec;
use crate::error::{PortfolioError, Result};
use crate::report::Locale;

/// Where prices come from
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SourceMode {
    /// Scrape Google Finance quote pages
    Google,
    /// Static tables from MOCK_QUOTES / MOCK_FX
    Mock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

// Demo book: two TSE listings (CAD) and two NASDAQ listings (USD)
pub const DEFAULT_HOLDINGS: &str = "SHOP:TSE:10,MSFT:NASDAQ:2,BNS:TSE:100,GOOGL:NASDAQ:30";

/// Every flag falls back to an env var (and `.env`).
#[derive(Parser, Clone, Debug)]
#[command(name = "portfolio_valuer", version, about = "Value a multi-currency stock portfolio in USD")]
pub struct Cli {
    /// Holdings as TICKER:EXCHANGE:QTY; overrides HOLDINGS
    #[arg(value_name = "HOLDING")]
    pub holdings: Vec<String>,

    /// Comma separated TICKER:EXCHANGE:QTY list
    #[arg(long = "holdings", env = "HOLDINGS", default_value = DEFAULT_HOLDINGS)]
    pub holding_list: String,

    #[arg(long, env = "QUOTE_SOURCE", value_enum, default_value_t = SourceMode::Google)]
    pub source: SourceMode,

    #[arg(long, env = "GOOGLE_FINANCE_URL", default_value = "https://www.google.com/finance/")]
    pub google_url: String,

    #[arg(long, env = "QUOTE_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Max lookups in flight; 1 = strictly sequential
    #[arg(long, env = "RESOLVE_CONCURRENCY", default_value_t = 1)]
    pub concurrency: usize,

    #[arg(long, env = "OUTPUT", value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    #[arg(long, env = "CURRENCY_SYMBOL", default_value = "$")]
    pub currency_symbol: String,

    #[arg(long, env = "THOUSANDS_SEP", default_value = ",")]
    pub thousands_sep: String,

    #[arg(long, env = "DECIMAL_SEP", default_value = ".")]
    pub decimal_sep: String,

    /// Write Prometheus text metrics here after the run
    #[arg(long, env = "METRICS_FILE")]
    pub metrics_file: Option<String>,

    /// e.g. "MSFT:NASDAQ=400.00 USD;SHOP:TSE=100 CAD"
    #[arg(long, env = "MOCK_QUOTES", default_value = "")]
    pub mock_quotes: String,

    /// e.g. "CAD=0.73"
    #[arg(long, env = "MOCK_FX", default_value = "")]
    pub mock_fx: String,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub holdings: Vec<HoldingSpec>,
    pub source: SourceMode,
    pub google_url: String,
    pub timeout: Duration,
    pub concurrency: usize,
    pub output: OutputFormat,
    pub locale: Locale,
    pub metrics_file: Option<String>,
    pub mock_quotes: String,
    pub mock_fx: String,
}

/// `SHOP:TSE:10, MSFT:NASDAQ:2` style lists; blanks skipped.
pub fn parse_holdings<S: AsRef<str>>(items: &[S]) -> Result<Vec<HoldingSpec>> {
    items
        .iter()
        .flat_map(|s| s.as_ref().split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<HoldingSpec>)
        .collect()
}

impl TryFrom<Cli> for Settings {
    type Error = PortfolioError;

    fn try_from(cli: Cli) -> Result<Self> {
        let holdings = if cli.holdings.is_empty() {
            parse_holdings(&[&cli.holding_list])?
        } else {
            parse_holdings(&cli.holdings)?
        };
        if cli.concurrency == 0 {
            return Err(PortfolioError::InvalidInput("RESOLVE_CONCURRENCY must be >= 1".into()));
        }

        Ok(Settings {
            holdings,
            source: cli.source,
            google_url: cli.google_url,
            timeout: Duration::from_secs(cli.timeout_secs),
            concurrency: cli.concurrency,
            output: cli.output,
            locale: Locale {
                currency_symbol: cli.currency_symbol,
                thousands_separator: cli.thousands_sep,
                decimal_separator: cli.decimal_sep,
            },
            metrics_file: cli.metrics_file.filter(|p| !p.trim().is_empty()),
            mock_quotes: cli.mock_quotes,
            mock_fx: cli.mock_fx,
        })
    }
}

pub fn load() -> Result<Settings> {
    // Make sure .env is read before clap looks at the environment
    let _ = dotenv();
    Settings::try_from(Cli::parse())
}
