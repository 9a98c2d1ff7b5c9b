// ===============================
// src/portfolio.rs (valuation & ranking)
// ===============================

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{Holding, Row};
use crate::error::{PortfolioError, Result};
use crate::metrics::{PORTFOLIO_HOLDINGS, PORTFOLIO_VALUE};

/// Sum of `quantity * usd_price`. Zero for an empty slice.
pub fn total_value(holdings: &[Holding]) -> Result<Decimal> {
    holdings.iter().try_fold(Decimal::ZERO, |acc, h| -> Result<Decimal> {
        acc.checked_add(h.market_value()?)
            .ok_or_else(|| PortfolioError::Overflow(format!("portfolio total past {acc}")))
    })
}

/// Rows ordered by market value, largest first. Equal values keep input order.
///
/// Allocation needs a positive total: an empty or all-zero portfolio is
/// `EmptyPortfolio`, never a NaN column.
pub fn ranked_rows(holdings: &[Holding]) -> Result<Vec<Row>> {
    let total = total_value(holdings)?;
    if total.is_zero() {
        return Err(PortfolioError::EmptyPortfolio);
    }
    let hundred = Decimal::ONE_HUNDRED;

    let mut ranked: Vec<(&Holding, Decimal)> = holdings
        .iter()
        .map(|h| h.market_value().map(|mv| (h, mv)))
        .collect::<Result<_>>()?;
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    ranked
        .into_iter()
        .map(|(h, mv)| {
            let allocation_percent = mv
                .checked_div(total)
                .ok_or(PortfolioError::EmptyPortfolio)?
                .checked_mul(hundred)
                .ok_or_else(|| PortfolioError::Overflow(format!("allocation of {mv}")))?;
            Ok(Row {
                ticker: h.instrument.ticker().to_string(),
                exchange: h.instrument.exchange().to_string(),
                quantity: h.quantity,
                usd_price: h.price.usd_price,
                market_value: mv,
                allocation_percent,
            })
        })
        .collect()
}

/// Data handed to a renderer. No formatting decisions here.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub as_of: DateTime<Utc>,
    pub rows: Vec<Row>,
    pub total_value: Decimal,
}

/// Resolved holdings in construction order. Duplicates stay separate lines.
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    holdings: Vec<Holding>,
}

impl Portfolio {
    pub fn new(holdings: Vec<Holding>) -> Self {
        Self { holdings }
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn total_value(&self) -> Result<Decimal> {
        total_value(&self.holdings)
    }

    pub fn ranked_rows(&self) -> Result<Vec<Row>> {
        ranked_rows(&self.holdings)
    }

    pub fn report(&self) -> Result<Report> {
        let rows = self.ranked_rows()?;
        let total_value = self.total_value()?;

        PORTFOLIO_HOLDINGS.set(self.holdings.len() as i64);
        PORTFOLIO_VALUE.set(total_value.to_f64().unwrap_or(0.0));

        Ok(Report { as_of: Utc::now(), rows, total_value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Instrument, ResolvedPrice};
    use rust_decimal_macros::dec;

    fn holding(t: &str, e: &str, qty: u64, native: Decimal, ccy: &str, usd: Decimal) -> Holding {
        Holding {
            instrument: Instrument::new(t, e).unwrap(),
            quantity: qty,
            price: ResolvedPrice { native_price: native, currency: ccy.into(), usd_price: usd },
        }
    }

    fn msft() -> Holding {
        holding("MSFT", "NASDAQ", 2, dec!(400.00), "USD", dec!(400.00))
    }

    fn shop() -> Holding {
        holding("SHOP", "TSE", 10, dec!(100.00), "CAD", dec!(73.00))
    }

    #[test]
    fn empty_total_is_zero() {
        assert_eq!(total_value(&[]).unwrap(), Decimal::ZERO);
        assert!(Portfolio::default().total_value().unwrap().is_zero());
    }

    #[test]
    fn empty_rows_are_an_error() {
        assert!(matches!(ranked_rows(&[]), Err(PortfolioError::EmptyPortfolio)));
        let zero_qty = holding("MSFT", "NASDAQ", 0, dec!(400), "USD", dec!(400));
        assert!(matches!(ranked_rows(&[zero_qty]), Err(PortfolioError::EmptyPortfolio)));
        assert!(matches!(Portfolio::default().report(), Err(PortfolioError::EmptyPortfolio)));
    }

    #[test]
    fn msft_shop_scenario() {
        let p = Portfolio::new(vec![shop(), msft()]);
        assert_eq!(p.total_value().unwrap(), dec!(1530.00));

        let rows = p.ranked_rows().unwrap();
        assert_eq!(rows[0].ticker, "MSFT");
        assert_eq!(rows[0].market_value, dec!(800.00));
        assert_eq!(rows[1].ticker, "SHOP");
        assert_eq!(rows[1].market_value, dec!(730.00));
        assert_eq!(rows[0].allocation_percent.round_dp(2), dec!(52.29));
        assert_eq!(rows[1].allocation_percent.round_dp(2), dec!(47.71));
    }

    #[test]
    fn total_ignores_order() {
        let a = vec![shop(), msft(), holding("BNS", "TSE", 100, dec!(70), "CAD", dec!(51.1))];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(total_value(&a).unwrap(), total_value(&b).unwrap());
    }

    #[test]
    fn ties_keep_input_order() {
        let x = holding("AAA", "NYSE", 1, dec!(100), "USD", dec!(100));
        let y = holding("BBB", "NYSE", 2, dec!(50), "USD", dec!(50));
        let z = holding("CCC", "NYSE", 1, dec!(300), "USD", dec!(300));

        let rows = ranked_rows(&[x.clone(), y.clone(), z.clone()]).unwrap();
        let order: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["CCC", "AAA", "BBB"]);

        let rows = ranked_rows(&[y, x, z]).unwrap();
        let order: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["CCC", "BBB", "AAA"]);
    }

    #[test]
    fn duplicate_instruments_are_separate_lines() {
        let rows = ranked_rows(&[msft(), msft()]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].allocation_percent, dec!(50));
    }

    #[test]
    fn allocations_sum_to_hundred() {
        let p = Portfolio::new(vec![
            shop(),
            msft(),
            holding("BNS", "TSE", 100, dec!(70.11), "CAD", dec!(51.18)),
            holding("GOOGL", "NASDAQ", 30, dec!(171.37), "USD", dec!(171.37)),
            holding("PENNY", "NYSE", 7, dec!(0.03), "USD", dec!(0.03)),
        ]);
        let sum: Decimal = p.ranked_rows().unwrap().iter().map(|r| r.allocation_percent).sum();
        assert!((sum - dec!(100)).abs() < dec!(0.0001), "sum was {sum}");
    }

    #[test]
    fn total_overflow_is_an_error() {
        let big = holding("BIG", "NYSE", 1, dec!(50000000000000000000000000000), "USD", dec!(50000000000000000000000000000));
        let p = Portfolio::new(vec![big.clone(), big]);
        assert!(matches!(p.total_value(), Err(PortfolioError::Overflow(_))));
        assert!(matches!(p.ranked_rows(), Err(PortfolioError::Overflow(_))));
        assert!(matches!(p.report(), Err(PortfolioError::Overflow(_))));
    }

    #[test]
    fn report_carries_rows_and_total() {
        let r = Portfolio::new(vec![shop(), msft()]).report().unwrap();
        assert_eq!(r.rows.len(), 2);
        assert_eq!(r.total_value, dec!(1530.00));
    }
}
