//! Conversion path validation.
//!
//! A conversion path is accepted only if its legs telescope from the target's
//! base currency to the target's quote currency. The check is pure and runs
//! at config load, before any provider is queried for the pair.

use crate::errors::OracleError;
use crate::models::{ConversionPath, CurrencyPair};

/// Minimum number of legs in a conversion path.
///
/// A single leg is a direct feed and is configured as a market ticker, not
/// as a conversion.
pub const MIN_PATH_LEGS: usize = 2;

/// Validate every conversion path configured for `target`.
///
/// Returns the first violation found, in path order.
pub fn validate_paths(target: &CurrencyPair, paths: &[ConversionPath]) -> Result<(), OracleError> {
    target.validate()?;

    for (index, path) in paths.iter().enumerate() {
        validate_path(target, index, path)?;
    }

    Ok(())
}

/// Validate a single path.
fn validate_path(
    target: &CurrencyPair,
    index: usize,
    path: &ConversionPath,
) -> Result<(), OracleError> {
    let (Some(first), Some(last)) = (path.legs.first(), path.legs.last()) else {
        return Err(OracleError::PathTooShort { index, legs: 0 });
    };
    if path.len() < MIN_PATH_LEGS {
        return Err(OracleError::PathTooShort {
            index,
            legs: path.len(),
        });
    }

    for leg in &path.legs {
        leg.pair.validate()?;
    }

    if first.start() != target.base() {
        return Err(OracleError::EndpointMismatch {
            expected: target.base().to_string(),
            got: first.start().to_string(),
        });
    }

    if last.end() != target.quote() {
        return Err(OracleError::EndpointMismatch {
            expected: target.quote().to_string(),
            got: last.end().to_string(),
        });
    }

    let mut current = first.end();
    for leg in path.legs.iter().skip(1) {
        if leg.start() != current {
            return Err(OracleError::BrokenChain {
                expected: current.to_string(),
                got: leg.start().to_string(),
            });
        }
        current = leg.end();
    }

    Ok(())
}
