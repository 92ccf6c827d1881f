//! Injected instrumentation capability.
//!
//! The engine reports every request outcome to an [`Observer`] supplied by
//! the caller. [`NoopObserver`] is the default, so the crate carries no
//! dependency on any particular telemetry backend.

use std::time::Duration;

use log::{debug, warn};

use crate::errors::ErrorCode;

/// Outcome of one provider request.
///
/// The code carried by `Partial` and `Failure` is the error of the first
/// failed ticker in request order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Success,
    /// Some tickers resolved, some did not.
    Partial(ErrorCode),
    Failure(ErrorCode),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial(_) => "partial",
            Self::Failure(code) => code.as_str(),
        }
    }
}

pub trait Observer: Send + Sync {
    fn observe(&self, provider: &str, outcome: Outcome, latency: Duration);
}

/// Observer that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn observe(&self, _provider: &str, _outcome: Outcome, _latency: Duration) {}
}

/// Observer that writes each outcome to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn observe(&self, provider: &str, outcome: Outcome, latency: Duration) {
        match outcome {
            Outcome::Success => debug!("{}: request succeeded in {:?}", provider, latency),
            Outcome::Partial(code) => {
                warn!("{}: request partially failed ({}) after {:?}", provider, code, latency)
            }
            Outcome::Failure(code) => {
                warn!("{}: request failed ({}) after {:?}", provider, code, latency)
            }
        }
    }
}
