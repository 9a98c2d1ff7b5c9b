// ===============================
// src/resolver.rs
// ===============================
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, warn};

use crate::domain::{Holding, HoldingSpec, Instrument, ResolvedPrice, USD};
use crate::error::{PortfolioError, Result};
use crate::feed::QuoteSource;
use crate::metrics::{HOLDINGS_RESOLVED, LOOKUPS, RESOLVE_LATENCY};
use crate::portfolio::Portfolio;

/// Half-up to cents. Used for every FX conversion.
pub fn round_cents(x: Decimal) -> Decimal {
    x.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Turns instruments into USD prices. One price lookup and at most one fx
/// lookup per call: no retries, nothing cached between calls.
#[derive(Clone)]
pub struct PriceResolver {
    source: Arc<dyn QuoteSource>,
}

impl PriceResolver {
    pub fn new(source: Arc<dyn QuoteSource>) -> Self {
        Self { source }
    }

    pub async fn resolve(&self, instrument: &Instrument) -> Result<ResolvedPrice> {
        let started = Instant::now();
        let symbol = instrument.symbol_id();

        let quote = match self.source.fetch_last_price(&symbol).await {
            Ok(Some(q)) => {
                LOOKUPS.with_label_values(&["price", "ok"]).inc();
                q
            }
            Ok(None) => {
                LOOKUPS.with_label_values(&["price", "missing"]).inc();
                warn!(%symbol, source = self.source.id(), "no last price");
                return Err(PortfolioError::QuoteUnavailable { symbol });
            }
            Err(e) => {
                LOOKUPS.with_label_values(&["price", "error"]).inc();
                return Err(e.into());
            }
        };
        debug!(%symbol, price = %quote.price, currency = %quote.currency, "last price");

        // USD must pass through untouched, not multiplied by 1 and rounded
        let usd_price = if quote.currency == USD {
            quote.price
        } else {
            let rate = match self.source.fetch_fx_rate(&quote.currency).await {
                Ok(Some(r)) => {
                    LOOKUPS.with_label_values(&["fx", "ok"]).inc();
                    r
                }
                Ok(None) => {
                    LOOKUPS.with_label_values(&["fx", "missing"]).inc();
                    warn!(currency = %quote.currency, source = self.source.id(), "no fx rate");
                    return Err(PortfolioError::FxUnavailable { currency: quote.currency });
                }
                Err(e) => {
                    LOOKUPS.with_label_values(&["fx", "error"]).inc();
                    return Err(e.into());
                }
            };
            debug!(currency = %quote.currency, %rate, "fx rate");
            let converted = quote.price.checked_mul(rate).ok_or_else(|| {
                PortfolioError::Overflow(format!("{} {} x {rate} for {symbol}", quote.price, quote.currency))
            })?;
            round_cents(converted)
        };

        RESOLVE_LATENCY.observe(started.elapsed().as_secs_f64() * 1000.0);
        Ok(ResolvedPrice { native_price: quote.price, currency: quote.currency, usd_price })
    }

    pub async fn resolve_holding(&self, spec: &HoldingSpec) -> Result<Holding> {
        let price = self.resolve(&spec.instrument).await?;
        HOLDINGS_RESOLVED.inc();
        Ok(Holding { instrument: spec.instrument.clone(), quantity: spec.quantity, price })
    }

    /// Resolves every spec, up to `concurrency` at a time. Output order is
    /// input order whatever the completion order; the first failure aborts.
    pub async fn resolve_portfolio(&self, specs: &[HoldingSpec], concurrency: usize) -> Result<Portfolio> {
        info!(holdings = specs.len(), concurrency, source = self.source.id(), "resolving portfolio");
        let holdings: Vec<Holding> = stream::iter(specs.iter().map(|s| self.resolve_holding(s)))
            .buffered(concurrency.max(1))
            .try_collect()
            .await?;
        Ok(Portfolio::new(holdings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use crate::feed::StaticQuotes;
    use crate::domain::Quote;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn inst(t: &str, e: &str) -> Instrument {
        Instrument::new(t, e).unwrap()
    }

    fn demo_source() -> Arc<StaticQuotes> {
        Arc::new(
            StaticQuotes::new()
                .with_price(&inst("MSFT", "NASDAQ"), dec!(400.00), "USD")
                .with_price(&inst("SHOP", "TSE"), dec!(100.00), "CAD")
                .with_price(&inst("SAP", "ETR"), dec!(10.005), "EUR")
                .with_price(&inst("VOD", "LON"), dec!(72.5), "GBX")
                .with_fx("CAD", dec!(0.73))
                .with_fx("EUR", dec!(1)),
        )
    }

    #[tokio::test]
    async fn usd_price_passes_through_without_fx_call() {
        let src = Arc::new(StaticQuotes::new().with_price(&inst("MSFT", "NASDAQ"), dec!(400.123456), "USD"));
        let r = PriceResolver::new(src.clone());
        let p = r.resolve(&inst("MSFT", "NASDAQ")).await.unwrap();
        assert_eq!(p.usd_price, dec!(400.123456));
        assert_eq!(p.usd_price.scale(), p.native_price.scale());
        assert_eq!(src.price_calls(), 1);
        assert_eq!(src.fx_calls(), 0);
    }

    #[tokio::test]
    async fn converts_cad_with_one_fx_call() {
        let src = demo_source();
        let r = PriceResolver::new(src.clone());
        let h = r.resolve_holding(&HoldingSpec::new(inst("SHOP", "TSE"), 10)).await.unwrap();
        assert_eq!(h.price.native_price, dec!(100.00));
        assert_eq!(h.price.currency, "CAD");
        assert_eq!(h.price.usd_price, dec!(73.00));
        assert_eq!(h.market_value().unwrap(), dec!(730.00));
        assert_eq!(src.price_calls(), 1);
        assert_eq!(src.fx_calls(), 1);
    }

    #[tokio::test]
    async fn conversion_rounds_half_up_to_cents() {
        let r = PriceResolver::new(demo_source());
        let p = r.resolve(&inst("SAP", "ETR")).await.unwrap();
        assert_eq!(p.usd_price, dec!(10.01));
        assert_eq!(round_cents(dec!(2.345)), dec!(2.35));
        assert_eq!(round_cents(dec!(-2.345)), dec!(-2.35));
        assert_eq!(round_cents(dec!(2.344)), dec!(2.34));
    }

    #[tokio::test]
    async fn missing_price_is_quote_unavailable() {
        let src = demo_source();
        let r = PriceResolver::new(src.clone());
        let err = r.resolve(&inst("XYZ", "NYSE")).await.unwrap_err();
        assert!(matches!(err, PortfolioError::QuoteUnavailable { ref symbol } if symbol == "XYZ:NYSE"));
        assert_eq!(src.fx_calls(), 0);
    }

    #[tokio::test]
    async fn missing_rate_is_fx_unavailable() {
        let r = PriceResolver::new(demo_source());
        let err = r.resolve(&inst("VOD", "LON")).await.unwrap_err();
        assert!(matches!(err, PortfolioError::FxUnavailable { ref currency } if currency == "GBX"));
    }

    #[tokio::test]
    async fn one_bad_holding_aborts_the_portfolio() {
        let r = PriceResolver::new(demo_source());
        let specs = vec![
            HoldingSpec::new(inst("MSFT", "NASDAQ"), 2),
            HoldingSpec::new(inst("XYZ", "NYSE"), 5),
            HoldingSpec::new(inst("SHOP", "TSE"), 10),
        ];
        let err = r.resolve_portfolio(&specs, 1).await.unwrap_err();
        assert!(matches!(err, PortfolioError::QuoteUnavailable { .. }));
    }

    #[tokio::test]
    async fn conversion_overflow_is_an_error() {
        let src = Arc::new(StaticQuotes::from_tables("BIG:TSE=9e27 CAD", "CAD=100").unwrap());
        let r = PriceResolver::new(src);
        let err = r.resolve(&inst("BIG", "TSE")).await.unwrap_err();
        assert!(matches!(err, PortfolioError::Overflow(_)));
    }

    #[tokio::test]
    async fn missing_fx_aborts_the_portfolio() {
        let specs = vec![
            HoldingSpec::new(inst("MSFT", "NASDAQ"), 2),
            HoldingSpec::new(inst("VOD", "LON"), 100),
            HoldingSpec::new(inst("SHOP", "TSE"), 10),
        ];
        for concurrency in [1, 3] {
            let r = PriceResolver::new(demo_source());
            let err = r.resolve_portfolio(&specs, concurrency).await.unwrap_err();
            assert!(
                matches!(err, PortfolioError::FxUnavailable { ref currency } if currency == "GBX"),
                "concurrency {concurrency}: {err:?}"
            );
        }
    }

    // Answers later requests first so completion order != input order.
    struct SlowFirst {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteSource for SlowFirst {
        fn id(&self) -> &'static str {
            "slow_first"
        }

        async fn fetch_last_price(&self, symbol_id: &str) -> std::result::Result<Option<Quote>, FeedError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(n * 10))).await;
            let price = match symbol_id {
                "A:X" => dec!(1),
                "B:X" => dec!(2),
                "C:X" => dec!(3),
                _ => return Ok(None),
            };
            Ok(Some(Quote { price, currency: USD.into() }))
        }

        async fn fetch_fx_rate(&self, _currency: &str) -> std::result::Result<Option<Decimal>, FeedError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn concurrent_resolution_keeps_input_order() {
        let r = PriceResolver::new(Arc::new(SlowFirst { calls: AtomicUsize::new(0) }));
        let specs: Vec<HoldingSpec> = ["A", "B", "C"]
            .iter()
            .map(|t| HoldingSpec::new(inst(t, "X"), 1))
            .collect();
        let p = r.resolve_portfolio(&specs, 3).await.unwrap();
        let tickers: Vec<&str> = p.holdings().iter().map(|h| h.instrument.ticker()).collect();
        assert_eq!(tickers, vec!["A", "B", "C"]);
        assert_eq!(p.total_value().unwrap(), dec!(6));
    }
}
