//! Price conversion along a validated conversion path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;

use crate::errors::{ErrorCode, ErrorWithCode, OracleError};
use crate::models::{ConversionPath, CurrencyPair, PriceResponse, PriceResult, TickerPairs};

/// Per-pair outcome of the current acquisition cycle.
pub type LegPrices = HashMap<CurrencyPair, Result<PriceResult, ErrorWithCode>>;

/// Derive a price by walking `path` over this cycle's leg prices.
///
/// Starting from one, each leg multiplies the running value by its price, or
/// by the reciprocal of its price when inverted. The first leg without a
/// price makes the whole path unresolved and its error is returned. The
/// result is stamped with `observed_at`, the acquisition time of the cycle.
pub fn resolve(
    path: &ConversionPath,
    leg_prices: &LegPrices,
    observed_at: DateTime<Utc>,
) -> Result<PriceResult, OracleError> {
    let mut value = Decimal::ONE;

    for leg in &path.legs {
        let price = match leg_prices.get(&leg.pair) {
            Some(Ok(price)) => price.value,
            Some(Err(error)) => {
                debug!("Conversion leg {} unresolved: {}", leg.pair, error);
                return Err(OracleError::UnresolvedLeg {
                    pair: leg.pair.clone(),
                    source: error.clone(),
                });
            }
            None => {
                return Err(OracleError::UnresolvedLeg {
                    pair: leg.pair.clone(),
                    source: ErrorWithCode::new(
                        ErrorCode::UnknownPair,
                        format!("no price fetched for {}", leg.pair),
                    ),
                });
            }
        };

        let factor = if leg.invert {
            if price.is_zero() {
                return Err(invalid_leg(&leg.pair, "cannot invert a zero price"));
            }
            Decimal::ONE
                .checked_div(price)
                .ok_or_else(|| invalid_leg(&leg.pair, "reciprocal out of range"))?
        } else {
            price
        };

        value = value
            .checked_mul(factor)
            .ok_or_else(|| invalid_leg(&leg.pair, "converted price out of range"))?;
    }

    Ok(PriceResult::new(value, observed_at))
}

fn invalid_leg(pair: &CurrencyPair, message: &str) -> OracleError {
    OracleError::UnresolvedLeg {
        pair: pair.clone(),
        source: ErrorWithCode::new(ErrorCode::InvalidResponse, format!("{}: {}", pair, message)),
    }
}

/// Re-key a provider response by currency pair.
///
/// Tickers without an entry in `ticker_pairs` are ignored. When several
/// tickers price the same pair, a resolved price wins over an error.
pub fn leg_prices(response: &PriceResponse, ticker_pairs: &TickerPairs) -> LegPrices {
    let mut legs = LegPrices::new();

    for (ticker, error) in &response.unresolved {
        if let Some(pair) = ticker_pairs.get(ticker) {
            legs.entry(pair.clone()).or_insert_with(|| Err(error.clone()));
        }
    }

    for (ticker, price) in &response.resolved {
        if let Some(pair) = ticker_pairs.get(ticker) {
            legs.insert(pair.clone(), Ok(price.clone()));
        }
    }

    legs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversionLeg, ProviderTicker};
    use rust_decimal_macros::dec;

    fn pair(text: &str) -> CurrencyPair {
        text.parse().unwrap()
    }

    fn btc_usd_path() -> ConversionPath {
        ConversionPath::new(vec![
            ConversionLeg::new(pair("BTC/USDT"), false),
            ConversionLeg::new(pair("USD/USDT"), true),
        ])
    }

    #[test]
    fn test_resolve_with_inverted_leg() {
        let cycle = Utc::now();
        let mut legs = LegPrices::new();
        legs.insert(pair("BTC/USDT"), Ok(PriceResult::now(dec!(50000))));
        legs.insert(pair("USD/USDT"), Ok(PriceResult::now(dec!(0.999))));

        let result = resolve(&btc_usd_path(), &legs, cycle).unwrap();
        assert_eq!(result.value.round_dp(2), dec!(50050.05));
        assert_eq!(result.observed_at, cycle);
    }

    #[test]
    fn test_resolve_propagates_leg_error() {
        let mut legs = LegPrices::new();
        legs.insert(pair("BTC/USDT"), Ok(PriceResult::now(dec!(50000))));
        legs.insert(
            pair("USD/USDT"),
            Err(ErrorWithCode::new(ErrorCode::RateLimit, "429 Too Many Requests")),
        );

        let err = resolve(&btc_usd_path(), &legs, Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::RateLimit));
        match err {
            OracleError::UnresolvedLeg { pair: leg, .. } => assert_eq!(leg, pair("USD/USDT")),
            other => panic!("Expected UnresolvedLeg, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_reports_first_missing_leg() {
        let mut legs = LegPrices::new();
        legs.insert(
            pair("BTC/USDT"),
            Err(ErrorWithCode::new(ErrorCode::DoRequest, "timeout")),
        );
        legs.insert(
            pair("USD/USDT"),
            Err(ErrorWithCode::new(ErrorCode::RateLimit, "429")),
        );

        let err = resolve(&btc_usd_path(), &legs, Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DoRequest));
    }

    #[test]
    fn test_resolve_absent_leg_is_unknown_pair() {
        let mut legs = LegPrices::new();
        legs.insert(pair("BTC/USDT"), Ok(PriceResult::now(dec!(50000))));

        let err = resolve(&btc_usd_path(), &legs, Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnknownPair));
    }

    #[test]
    fn test_resolve_zero_inverted_price() {
        let mut legs = LegPrices::new();
        legs.insert(pair("BTC/USDT"), Ok(PriceResult::now(dec!(50000))));
        legs.insert(pair("USD/USDT"), Ok(PriceResult::now(Decimal::ZERO)));

        let err = resolve(&btc_usd_path(), &legs, Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidResponse));
    }

    #[test]
    fn test_leg_prices_from_response() {
        let btc = ProviderTicker::symbol("BTCUSDT");
        let usd = ProviderTicker::symbol("USDUSDT");
        let unmapped = ProviderTicker::symbol("DOGEUSDT");

        let mut response = PriceResponse::new();
        response.insert_resolved(btc.clone(), PriceResult::now(dec!(50000)));
        response.insert_resolved(unmapped, PriceResult::now(dec!(0.1)));
        response.insert_unresolved(
            usd.clone(),
            ErrorWithCode::new(ErrorCode::UnknownPair, "not listed"),
        );

        let mut pairs = TickerPairs::new();
        pairs.insert(btc, pair("BTC/USDT"));
        pairs.insert(usd, pair("USD/USDT"));

        let legs = leg_prices(&response, &pairs);
        assert_eq!(legs.len(), 2);
        assert!(legs[&pair("BTC/USDT")].is_ok());
        assert!(legs[&pair("USD/USDT")].is_err());
    }

    #[test]
    fn test_leg_prices_resolved_wins_over_error() {
        let primary = ProviderTicker::symbol("BTCUSDT");
        let secondary = ProviderTicker::new("BTCUSDT", r#"{"market": "perp"}"#);

        let mut response = PriceResponse::new();
        response.insert_unresolved(
            primary.clone(),
            ErrorWithCode::new(ErrorCode::DoRequest, "timeout"),
        );
        response.insert_resolved(secondary.clone(), PriceResult::now(dec!(50010)));

        let mut pairs = TickerPairs::new();
        pairs.insert(primary, pair("BTC/USDT"));
        pairs.insert(secondary, pair("BTC/USDT"));

        let legs = leg_prices(&response, &pairs);
        assert_eq!(
            legs[&pair("BTC/USDT")].as_ref().map(|p| p.value).ok(),
            Some(dec!(50010))
        );
    }
}
