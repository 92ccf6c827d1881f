use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use super::{PriceFetcher, PriceProvider, PriceValidator};
use crate::config::{ApiConfig, ProviderConfig};
use crate::errors::{ErrorCode, ErrorWithCode, OracleError};
use crate::instrumentation::{NoopObserver, Observer, Outcome};
use crate::models::{PriceResponse, ProviderTicker};

/// Runs one provider's fetch cycles.
///
/// Requested tickers are split into batches (one batch for atomic
/// providers), and each batch is handed to the fetcher on its own task. At
/// most `max_queries` batches are in flight at once, across overlapping
/// cycles as well. Every batch runs under the cycle deadline
/// (`cycle start + timeout`) and a cycle cancellation token; a batch that
/// fails, times out, or panics only affects its own tickers.
pub struct ProviderQueryEngine {
    name: String,
    api: ApiConfig,
    fetcher: Arc<dyn PriceFetcher>,
    permits: Arc<Semaphore>,
    observer: Arc<dyn Observer>,
    validator: PriceValidator,
}

impl ProviderQueryEngine {
    pub fn new(
        config: ProviderConfig,
        fetcher: Arc<dyn PriceFetcher>,
    ) -> Result<Self, OracleError> {
        config.validate()?;
        if !config.api.enabled {
            return Err(OracleError::InvalidConfig {
                provider: config.name,
                message: "query engine requires an enabled api config".to_string(),
            });
        }

        debug!(
            "Creating query engine for {} (max_queries={}, atomic={}, batch_size={})",
            config.name, config.api.max_queries, config.api.atomic, config.api.batch_size
        );

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.api.max_queries)),
            name: config.name,
            api: config.api,
            fetcher,
            observer: Arc::new(NoopObserver),
            validator: PriceValidator::new(),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_validator(mut self, validator: PriceValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ApiConfig {
        &self.api
    }

    /// Run one fetch cycle.
    ///
    /// The returned response holds every distinct requested ticker exactly
    /// once, in either the resolved or the unresolved map. Tickers the
    /// fetcher returns without having been asked for are dropped.
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        tickers: &[ProviderTicker],
    ) -> PriceResponse {
        let requested = dedupe(tickers);
        if requested.is_empty() {
            return PriceResponse::new();
        }

        let deadline = Instant::now() + self.api.timeout;
        // Staleness is measured from when the cycle started acquiring prices.
        let acquired_at = Utc::now();
        let cycle = cancel.child_token();
        // Stops in-flight requests when the cycle returns or is dropped.
        let _cycle_guard = cycle.clone().drop_guard();

        let chunk_size = self.api.chunk_size(requested.len());
        let mut workers = JoinSet::new();
        for chunk in requested.chunks(chunk_size) {
            let worker = ChunkWorker {
                provider: self.name.clone(),
                fetcher: Arc::clone(&self.fetcher),
                permits: Arc::clone(&self.permits),
                observer: Arc::clone(&self.observer),
                cancel: cycle.clone(),
                deadline,
            };
            workers.spawn(worker.run(chunk.to_vec()));
        }

        let mut response = PriceResponse::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(chunk_response) => response.merge(chunk_response),
                Err(e) => error!("{}: request task failed: {}", self.name, e),
            }
        }

        // Only tickers of a failed task can still be missing here.
        for ticker in &requested {
            if response.price(ticker).is_none() && response.error(ticker).is_none() {
                response.insert_unresolved(
                    ticker.clone(),
                    ErrorWithCode::new(ErrorCode::Unknown, "request task failed"),
                );
            }
        }

        self.validator.apply(&mut response, acquired_at);

        debug!(
            "{}: cycle finished with {} resolved and {} unresolved ticker(s)",
            self.name,
            response.resolved.len(),
            response.unresolved.len()
        );
        response
    }
}

#[async_trait]
impl PriceProvider for ProviderQueryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, cancel: &CancellationToken, tickers: &[ProviderTicker]) -> PriceResponse {
        ProviderQueryEngine::fetch(self, cancel, tickers).await
    }
}

/// Everything one batch task needs, owned so the task can be spawned.
struct ChunkWorker {
    provider: String,
    fetcher: Arc<dyn PriceFetcher>,
    permits: Arc<Semaphore>,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
    deadline: Instant,
}

impl ChunkWorker {
    async fn run(self, chunk: Vec<ProviderTicker>) -> PriceResponse {
        let started = Instant::now();

        let response = match timeout_at(self.deadline, self.dispatch(&chunk)).await {
            Ok(Ok(reply)) => settle(&self.provider, &chunk, reply),
            Ok(Err(error)) => PriceResponse::all_unresolved(&chunk, error),
            Err(_) => {
                warn!(
                    "{}: request for {} ticker(s) exceeded the cycle deadline",
                    self.provider,
                    chunk.len()
                );
                PriceResponse::all_unresolved(
                    &chunk,
                    ErrorWithCode::new(ErrorCode::DoRequest, "request exceeded the cycle deadline"),
                )
            }
        };

        self.observer
            .observe(&self.provider, outcome(&chunk, &response), started.elapsed());
        response
    }

    async fn dispatch(&self, chunk: &[ProviderTicker]) -> Result<PriceResponse, ErrorWithCode> {
        let _permit = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => return Err(cancelled()),
            permit = self.permits.acquire() => permit.map_err(|_| {
                ErrorWithCode::new(ErrorCode::DoRequest, "admission gate closed")
            })?,
        };

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(cancelled()),
            reply = self.fetcher.fetch(&self.cancel, chunk) => Ok(reply),
        }
    }
}

fn cancelled() -> ErrorWithCode {
    ErrorWithCode::new(ErrorCode::DoRequest, "request cancelled")
}

/// Keep exactly the requested tickers of a fetcher reply.
fn settle(provider: &str, chunk: &[ProviderTicker], mut reply: PriceResponse) -> PriceResponse {
    let mut response = PriceResponse::new();

    for ticker in chunk {
        if let Some(price) = reply.resolved.remove(ticker) {
            response.insert_resolved(ticker.clone(), price);
        } else if let Some(error) = reply.unresolved.remove(ticker) {
            response.insert_unresolved(ticker.clone(), error);
        } else {
            response.insert_unresolved(
                ticker.clone(),
                ErrorWithCode::new(
                    ErrorCode::InvalidResponse,
                    format!("no price returned for {}", ticker),
                ),
            );
        }
    }

    if !reply.is_empty() {
        debug!(
            "{}: dropped {} ticker(s) that were not requested",
            provider,
            reply.len()
        );
    }

    response
}

/// Summarize a settled chunk, keyed on its first failed ticker.
fn outcome(chunk: &[ProviderTicker], response: &PriceResponse) -> Outcome {
    let Some(code) = chunk
        .iter()
        .find_map(|ticker| response.error(ticker).map(|e| e.code()))
    else {
        return Outcome::Success;
    };
    if response.resolved.is_empty() {
        Outcome::Failure(code)
    } else {
        Outcome::Partial(code)
    }
}

/// Drop repeated tickers, keeping first-seen order.
fn dedupe(tickers: &[ProviderTicker]) -> Vec<ProviderTicker> {
    let mut seen = HashSet::with_capacity(tickers.len());
    tickers
        .iter()
        .filter(|ticker| seen.insert(*ticker))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use crate::engine::ValidatorConfig;
    use crate::models::PriceResult;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Resolves every ticker at 1 after `delay`, tracking concurrency.
    #[derive(Default)]
    struct CountingFetcher {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        batches: Mutex<Vec<usize>>,
    }

    impl CountingFetcher {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PriceFetcher for CountingFetcher {
        async fn fetch(
            &self,
            _cancel: &CancellationToken,
            tickers: &[ProviderTicker],
        ) -> PriceResponse {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.batches.lock().unwrap().push(tickers.len());

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let mut response = PriceResponse::new();
            for ticker in tickers {
                response.insert_resolved(ticker.clone(), PriceResult::now(Decimal::ONE));
            }
            response
        }
    }

    /// Answers from a fixed table; also returns a ticker nobody asked for.
    struct TableFetcher {
        prices: Vec<(&'static str, Decimal)>,
    }

    #[async_trait]
    impl PriceFetcher for TableFetcher {
        async fn fetch(
            &self,
            _cancel: &CancellationToken,
            tickers: &[ProviderTicker],
        ) -> PriceResponse {
            let mut response = PriceResponse::new();
            for ticker in tickers {
                if ticker.off_chain_ticker == "LIMITED" {
                    response.insert_unresolved(
                        ticker.clone(),
                        ErrorWithCode::new(ErrorCode::RateLimit, "429"),
                    );
                    continue;
                }
                if let Some((_, price)) = self
                    .prices
                    .iter()
                    .find(|(symbol, _)| *symbol == ticker.off_chain_ticker)
                {
                    response.insert_resolved(ticker.clone(), PriceResult::now(*price));
                }
            }
            response.insert_resolved(
                ProviderTicker::symbol("UNREQUESTED"),
                PriceResult::now(dec!(1)),
            );
            response
        }
    }

    /// Never answers on its own and ignores cancellation.
    struct StuckFetcher;

    #[async_trait]
    impl PriceFetcher for StuckFetcher {
        async fn fetch(
            &self,
            _cancel: &CancellationToken,
            _tickers: &[ProviderTicker],
        ) -> PriceResponse {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            PriceResponse::new()
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl PriceFetcher for PanickingFetcher {
        async fn fetch(
            &self,
            _cancel: &CancellationToken,
            tickers: &[ProviderTicker],
        ) -> PriceResponse {
            if tickers.iter().any(|t| t.off_chain_ticker == "BOOM") {
                panic!("venue glue bug");
            }
            let mut response = PriceResponse::new();
            for ticker in tickers {
                response.insert_resolved(ticker.clone(), PriceResult::now(dec!(2)));
            }
            response
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        outcomes: Mutex<Vec<(String, Outcome)>>,
    }

    impl Observer for RecordingObserver {
        fn observe(&self, provider: &str, outcome: Outcome, _latency: Duration) {
            self.outcomes
                .lock()
                .unwrap()
                .push((provider.to_string(), outcome));
        }
    }

    fn config(max_queries: usize, atomic: bool, batch_size: usize) -> ProviderConfig {
        let mut config = ProviderConfig::api("test", vec![Endpoint::new("http://localhost")]);
        config.api.max_queries = max_queries;
        config.api.atomic = atomic;
        config.api.batch_size = batch_size;
        config
    }

    fn tickers(symbols: &[&str]) -> Vec<ProviderTicker> {
        symbols.iter().map(|s| ProviderTicker::symbol(*s)).collect()
    }

    #[tokio::test]
    async fn test_in_flight_requests_bounded_by_max_queries() {
        let fetcher = Arc::new(CountingFetcher::with_delay(Duration::from_millis(20)));
        let engine = ProviderQueryEngine::new(config(3, false, 1), fetcher.clone()).unwrap();

        let requested: Vec<_> = (0..12)
            .map(|i| ProviderTicker::symbol(format!("T{}", i)))
            .collect();
        let response = engine.fetch(&CancellationToken::new(), &requested).await;

        assert_eq!(response.resolved.len(), 12);
        assert!(response.unresolved.is_empty());
        assert_eq!(fetcher.calls(), 12);
        let max = fetcher.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "saw {} requests in flight", max);
        assert!(max > 1, "requests never overlapped");
    }

    #[tokio::test]
    async fn test_atomic_provider_sends_one_request() {
        let fetcher = Arc::new(CountingFetcher::default());
        let engine = ProviderQueryEngine::new(config(1, true, 0), fetcher.clone()).unwrap();

        let response = engine
            .fetch(
                &CancellationToken::new(),
                &tickers(&["BTCUSDT", "ETHUSDT", "SOLUSDT", "ATOMUSDT", "OSMOUSDT"]),
            )
            .await;

        assert_eq!(response.resolved.len(), 5);
        assert_eq!(*fetcher.batches.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_batch_size_splits_requests() {
        let fetcher = Arc::new(CountingFetcher::default());
        let engine = ProviderQueryEngine::new(config(2, false, 2), fetcher.clone()).unwrap();

        engine
            .fetch(&CancellationToken::new(), &tickers(&["A", "B", "C", "D", "E"]))
            .await;

        let mut batches = fetcher.batches.lock().unwrap().clone();
        batches.sort_unstable();
        assert_eq!(batches, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_duplicate_tickers_collapsed() {
        let fetcher = Arc::new(CountingFetcher::default());
        let engine = ProviderQueryEngine::new(config(1, false, 1), fetcher.clone()).unwrap();

        let response = engine
            .fetch(&CancellationToken::new(), &tickers(&["BTC-USD", "BTC-USD"]))
            .await;

        assert_eq!(response.len(), 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_every_requested_ticker_in_exactly_one_map() {
        let fetcher = Arc::new(TableFetcher {
            prices: vec![("BTCUSDT", dec!(50000)), ("ETHUSDT", dec!(3000))],
        });
        let engine = ProviderQueryEngine::new(config(1, true, 0), fetcher).unwrap();

        let requested = tickers(&["BTCUSDT", "ETHUSDT", "DOGEUSDT", "LIMITED"]);
        let response = engine.fetch(&CancellationToken::new(), &requested).await;

        assert_eq!(response.len(), requested.len());
        for ticker in &requested {
            let resolved = response.resolved.contains_key(ticker);
            let unresolved = response.unresolved.contains_key(ticker);
            assert!(resolved ^ unresolved, "{} must be in exactly one map", ticker);
        }
        assert_eq!(
            response.error(&ProviderTicker::symbol("DOGEUSDT")).map(|e| e.code()),
            Some(ErrorCode::InvalidResponse)
        );
        assert_eq!(
            response.error(&ProviderTicker::symbol("LIMITED")).map(|e| e.code()),
            Some(ErrorCode::RateLimit)
        );
        assert!(response.price(&ProviderTicker::symbol("UNREQUESTED")).is_none());
        assert!(response.error(&ProviderTicker::symbol("UNREQUESTED")).is_none());
    }

    #[tokio::test]
    async fn test_deadline_marks_chunk_unresolved() {
        let mut config = config(1, false, 1);
        config.api.timeout = Duration::from_millis(50);
        let engine = ProviderQueryEngine::new(config, Arc::new(StuckFetcher)).unwrap();

        let started = std::time::Instant::now();
        let response = engine
            .fetch(&CancellationToken::new(), &tickers(&["A", "B"]))
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(response.resolved.is_empty());
        assert_eq!(response.unresolved.len(), 2);
        assert!(response
            .unresolved
            .values()
            .all(|e| e.code() == ErrorCode::DoRequest));
    }

    #[tokio::test]
    async fn test_cancellation_stops_cycle() {
        let engine = ProviderQueryEngine::new(config(1, false, 1), Arc::new(StuckFetcher)).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let response = engine.fetch(&cancel, &tickers(&["A", "B", "C"])).await;

        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(response.unresolved.len(), 3);
        assert!(response
            .unresolved
            .values()
            .all(|e| e.code() == ErrorCode::DoRequest));
    }

    #[tokio::test]
    async fn test_panic_only_affects_its_chunk() {
        let engine =
            ProviderQueryEngine::new(config(2, false, 1), Arc::new(PanickingFetcher)).unwrap();

        let response = engine
            .fetch(&CancellationToken::new(), &tickers(&["OK1", "BOOM", "OK2"]))
            .await;

        assert_eq!(response.resolved.len(), 2);
        assert_eq!(
            response.error(&ProviderTicker::symbol("BOOM")).map(|e| e.code()),
            Some(ErrorCode::Unknown)
        );
    }

    #[tokio::test]
    async fn test_observer_sees_every_chunk() {
        let observer = Arc::new(RecordingObserver::default());
        let fetcher = Arc::new(TableFetcher {
            prices: vec![("A", dec!(1))],
        });
        let engine = ProviderQueryEngine::new(config(1, false, 1), fetcher)
            .unwrap()
            .with_observer(observer.clone());

        engine
            .fetch(&CancellationToken::new(), &tickers(&["A", "LIMITED", "MISSING"]))
            .await;

        let outcomes = observer.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(provider, _)| provider == "test"));
        assert!(outcomes.contains(&("test".to_string(), Outcome::Success)));
        assert!(outcomes.contains(&(
            "test".to_string(),
            Outcome::Failure(ErrorCode::RateLimit)
        )));
        assert!(outcomes.contains(&(
            "test".to_string(),
            Outcome::Failure(ErrorCode::InvalidResponse)
        )));
    }

    #[tokio::test]
    async fn test_atomic_chunk_outcome_is_deterministic() {
        let observer = Arc::new(RecordingObserver::default());
        let fetcher = Arc::new(TableFetcher {
            prices: vec![("A", dec!(1))],
        });
        let engine = ProviderQueryEngine::new(config(1, true, 0), fetcher)
            .unwrap()
            .with_observer(observer.clone());

        let cancel = CancellationToken::new();
        engine.fetch(&cancel, &tickers(&["A", "LIMITED", "MISSING"])).await;
        engine.fetch(&cancel, &tickers(&["MISSING", "LIMITED"])).await;
        engine.fetch(&cancel, &tickers(&["LIMITED", "MISSING"])).await;
        engine.fetch(&cancel, &tickers(&["A"])).await;

        let outcomes: Vec<_> = observer
            .outcomes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, outcome)| *outcome)
            .collect();
        assert_eq!(
            outcomes,
            vec![
                Outcome::Partial(ErrorCode::RateLimit),
                Outcome::Failure(ErrorCode::InvalidResponse),
                Outcome::Failure(ErrorCode::RateLimit),
                Outcome::Success,
            ]
        );
    }

    /// Reports an observation from before the call, then takes a while.
    struct SlowStaleFetcher {
        observed_before: chrono::Duration,
        delay: Duration,
    }

    #[async_trait]
    impl PriceFetcher for SlowStaleFetcher {
        async fn fetch(
            &self,
            _cancel: &CancellationToken,
            tickers: &[ProviderTicker],
        ) -> PriceResponse {
            let observed_at = Utc::now() - self.observed_before;
            tokio::time::sleep(self.delay).await;
            let mut response = PriceResponse::new();
            for ticker in tickers {
                response.insert_resolved(ticker.clone(), PriceResult::new(dec!(1), observed_at));
            }
            response
        }
    }

    #[tokio::test]
    async fn test_staleness_measured_from_cycle_start() {
        let fetcher = Arc::new(SlowStaleFetcher {
            observed_before: chrono::Duration::milliseconds(700),
            delay: Duration::from_millis(600),
        });
        let engine = ProviderQueryEngine::new(config(1, true, 0), fetcher)
            .unwrap()
            .with_validator(PriceValidator::with_config(ValidatorConfig {
                max_age: Some(chrono::Duration::seconds(1)),
                ..ValidatorConfig::default()
            }));

        let response = engine
            .fetch(&CancellationToken::new(), &tickers(&["X"]))
            .await;

        assert_eq!(
            response.price(&ProviderTicker::symbol("X")).map(|p| p.value),
            Some(dec!(1))
        );
    }

    #[tokio::test]
    async fn test_validator_rejects_prices() {
        let fetcher = Arc::new(TableFetcher {
            prices: vec![("NEG", dec!(-1)), ("BIG", dec!(5000)), ("OK", dec!(10))],
        });
        let engine = ProviderQueryEngine::new(config(1, true, 0), fetcher)
            .unwrap()
            .with_validator(PriceValidator::with_config(ValidatorConfig {
                max_price: Some(dec!(1000)),
                ..ValidatorConfig::default()
            }));

        let response = engine
            .fetch(&CancellationToken::new(), &tickers(&["NEG", "BIG", "OK"]))
            .await;

        assert_eq!(response.price(&ProviderTicker::symbol("OK")).map(|p| p.value), Some(dec!(10)));
        for symbol in ["NEG", "BIG"] {
            assert_eq!(
                response.error(&ProviderTicker::symbol(symbol)).map(|e| e.code()),
                Some(ErrorCode::InvalidResponse)
            );
        }
    }

    #[tokio::test]
    async fn test_empty_request() {
        let fetcher = Arc::new(CountingFetcher::default());
        let engine = ProviderQueryEngine::new(config(1, false, 1), fetcher.clone()).unwrap();

        let response = engine.fetch(&CancellationToken::new(), &[]).await;
        assert!(response.is_empty());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_usable_as_price_provider() {
        let fetcher = Arc::new(CountingFetcher::default());
        let engine = ProviderQueryEngine::new(config(1, true, 0), fetcher).unwrap();
        let provider: &dyn PriceProvider = &engine;

        assert_eq!(provider.name(), "test");
        let response = provider
            .fetch(&CancellationToken::new(), &tickers(&["X"]))
            .await;
        assert_eq!(response.resolved.len(), 1);
    }

    #[test]
    fn test_construction_errors() {
        let fetcher: Arc<dyn PriceFetcher> = Arc::new(CountingFetcher::default());

        let mut zero_queries = config(1, false, 1);
        zero_queries.api.max_queries = 0;
        assert!(matches!(
            ProviderQueryEngine::new(zero_queries, fetcher.clone()),
            Err(OracleError::InvalidConfig { .. })
        ));

        let mut disabled = config(1, false, 1);
        disabled.api.enabled = false;
        assert!(ProviderQueryEngine::new(disabled, fetcher.clone()).is_err());

        let mut renamed = config(1, false, 1);
        renamed.api.name = "other".to_string();
        assert!(matches!(
            ProviderQueryEngine::new(renamed, fetcher),
            Err(OracleError::NameMismatch { .. })
        ));
    }
}
