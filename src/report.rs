// ===============================
// src/report.rs
// ===============================
//
// Renderers for a valuation Report:
// - TableRenderer : psql-style table + one-line total, locale passed in
// - JsonRenderer  : pretty JSON for scripts
//
use rust_decimal::{Decimal, RoundingStrategy};
use tabled::{settings::Style, Table, Tabled};

use crate::error::Result;
use crate::portfolio::Report;

/// Number formatting used for the total line. Never read from process state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    pub currency_symbol: String,
    pub thousands_separator: String,
    pub decimal_separator: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            currency_symbol: "$".into(),
            thousands_separator: ",".into(),
            decimal_separator: ".".into(),
        }
    }
}

impl Locale {
    /// `1234567.891` -> `$1,234,567.89`
    pub fn money(&self, amount: Decimal) -> String {
        let fixed = fixed2(amount);
        let (sign, digits) = match fixed.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", fixed.as_str()),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, ch) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push_str(&self.thousands_separator);
            }
            grouped.push(ch);
        }
        format!(
            "{sign}{}{grouped}{}{frac_part}",
            self.currency_symbol, self.decimal_separator
        )
    }
}

/// Two decimals, half-up, always padded (`7` -> `7.00`).
fn fixed2(x: Decimal) -> String {
    let r = x.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{r:.2}")
}

pub trait ReportRenderer {
    fn render(&self, report: &Report) -> Result<String>;
}

#[derive(Tabled)]
struct TableLine {
    #[tabled(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Exchange")]
    exchange: String,
    #[tabled(rename = "Quantity")]
    quantity: u64,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Market Value")]
    market_value: String,
    #[tabled(rename = "% Allocation")]
    allocation: String,
}

#[derive(Debug, Clone, Default)]
pub struct TableRenderer {
    pub locale: Locale,
}

impl TableRenderer {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }
}

impl ReportRenderer for TableRenderer {
    fn render(&self, report: &Report) -> Result<String> {
        let lines: Vec<TableLine> = report
            .rows
            .iter()
            .map(|r| TableLine {
                ticker: r.ticker.clone(),
                exchange: r.exchange.clone(),
                quantity: r.quantity,
                price: fixed2(r.usd_price),
                market_value: fixed2(r.market_value),
                allocation: fixed2(r.allocation_percent),
            })
            .collect();

        let table = Table::new(lines).with(Style::psql()).to_string();
        Ok(format!(
            "{table}\nTotal portfolio value: {}.\n",
            self.locale.money(report.total_value)
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn render(&self, report: &Report) -> Result<String> {
        let mut out = serde_json::to_string_pretty(report)?;
        out.push('\n');
        Ok(out)
    }
}
