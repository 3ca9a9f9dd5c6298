use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use exn::ResultExt;
use serde::Serialize;

use crate::address::{Address, Context, LatLon, RegionBias, Suggestion};
use crate::cache::TtlCache;
use crate::provider::{self, Abort, Provider};
use crate::Error;

/// The future returned by [`Searcher::search`].
pub type SearchFuture = Pin<Box<dyn Future<Output = exn::Result<Vec<Suggestion>, Error>> + Send>>;

type Outcome = exn::Result<Vec<Suggestion>, Error>;

/// Tuning knobs for a [`Searcher`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Queries shorter than this (after trimming) resolve empty.
    pub min_chars: usize,
    /// Quiet period before the provider is called.
    pub debounce: Duration,
    /// Lifetime of cached results. Zero disables caching.
    pub cache_ttl: Duration,
    /// Point to measure result distances from.
    pub origin: Option<LatLon>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            min_chars: 3,
            debounce: Duration::from_millis(250),
            cache_ttl: Duration::from_secs(60),
            origin: None,
        }
    }
}

/// Turns a stream of keystroke-driven queries into debounced, cached,
/// cancelable provider lookups.
///
/// At most one request is live at a time. Every [`search`](Self::search)
/// supersedes the previous one synchronously, so an outdated request can
/// never deliver results: its future resolves to an empty list instead.
///
/// The debounce timer and provider call run as a task on the supplied
/// executor, which must be driven for searches to complete.
pub struct Searcher {
    executor: Arc<async_executor::Executor<'static>>,
    provider: Arc<dyn Provider>,
    context: Context,
    options: Options,
    state: Arc<Mutex<State>>,
}

struct State {
    /// Bumped by every search and cancel. Continuations compare their
    /// captured value against it before touching anything else.
    generation: u64,
    /// Debounce + provider call. Dropping it cancels both.
    task: Option<async_executor::Task<()>>,
    abort: Option<Abort>,
    pending: Option<async_channel::Sender<Outcome>>,
    cache: TtlCache<Vec<Address>>,
}

impl State {
    fn supersede(&mut self) {
        self.generation += 1;
        self.task = None;
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
        if let Some(pending) = self.pending.take() {
            let _ = pending.try_send(Ok(Vec::new()));
        }
    }
}

impl Searcher {
    pub fn new(
        executor: Arc<async_executor::Executor<'static>>,
        provider: Arc<dyn Provider>,
        context: Context,
        options: Options,
    ) -> Self {
        let cache = TtlCache::new(options.cache_ttl);
        Self {
            executor,
            provider,
            context,
            options,
            state: Arc::new(Mutex::new(State {
                generation: 0,
                task: None,
                abort: None,
                pending: None,
                cache,
            })),
        }
    }

    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Current value of the generation counter.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().expect("poisoned").generation
    }

    /// Search for `input`, superseding any request still in progress.
    ///
    /// Resolves to an empty list when the query is too short or a later
    /// [`search`](Self::search) or [`cancel`](Self::cancel) supersedes it.
    /// Only provider failures other than cancellation are errors.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn search(&self, input: &str) -> SearchFuture {
        let query = input.trim().to_owned();
        let mut state = self.state.lock().expect("poisoned");
        state.supersede();

        if query.chars().count() < self.options.min_chars {
            tracing::trace!(query = %query, min_chars = self.options.min_chars, "query too short");
            return ready(Ok(Vec::new()));
        }

        let key = match cache_key(&query, &self.context) {
            Ok(key) => key,
            Err(e) => return ready(Err(e)),
        };

        if let Some(cached) = state.cache.get(&key) {
            tracing::debug!(query = %query, results = cached.len(), "cache hit");
            return ready(Ok(augment(cached, self.options.origin)));
        }

        let (tx, rx) = async_channel::bounded(1);
        state.pending = Some(tx);
        let lookup = Lookup {
            state: Arc::clone(&self.state),
            provider: Arc::clone(&self.provider),
            context: self.context.clone(),
            generation: state.generation,
            debounce: self.options.debounce,
            origin: self.options.origin,
            query,
            key,
        };
        state.task = Some(self.executor.spawn(lookup.run()));
        drop(state);

        Box::pin(async move { rx.recv().await.unwrap_or_else(|_| Ok(Vec::new())) })
    }

    /// Abandon the current request: clear its timer, abort its provider
    /// call and resolve its future to an empty list.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn cancel(&self) {
        let mut state = self.state.lock().expect("poisoned");
        state.supersede();
        tracing::trace!(generation = state.generation, "search cancelled");
    }

    /// Drop all cached results. In-flight requests are unaffected.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear_cache(&self) {
        self.state.lock().expect("poisoned").cache.clear();
        tracing::debug!("cache cleared");
    }
}

impl Drop for Searcher {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.supersede();
        }
    }
}

/// One debounced provider call, tied to the generation it was issued in.
struct Lookup {
    state: Arc<Mutex<State>>,
    provider: Arc<dyn Provider>,
    context: Context,
    generation: u64,
    debounce: Duration,
    origin: Option<LatLon>,
    query: String,
    key: String,
}

impl Lookup {
    async fn run(self) {
        async_io::Timer::after(self.debounce).await;

        let signal = {
            let mut state = self.state.lock().expect("poisoned");
            if state.generation != self.generation {
                return;
            }
            let (abort, signal) = provider::abort();
            state.abort = Some(abort);
            signal
        };

        tracing::debug!(query = %self.query, provider = self.provider.name(), "querying provider");
        let result = self
            .provider
            .search(self.query.clone(), self.context.clone(), signal)
            .await;

        let mut state = self.state.lock().expect("poisoned");
        if state.generation != self.generation {
            tracing::debug!(query = %self.query, "discarding stale response");
            return;
        }
        state.abort = None;
        let Some(pending) = state.pending.take() else {
            return;
        };

        let outcome = match result {
            Ok(addresses) => {
                tracing::debug!(query = %self.query, results = addresses.len(), "provider responded");
                state.cache.set(self.key.clone(), addresses.clone());
                Ok(augment(addresses, self.origin))
            }
            Err(e) if e.is_cancelled() => Ok(Vec::new()),
            Err(e) => {
                tracing::warn!(query = %self.query, %e, "provider failed");
                Err::<Vec<Suggestion>, _>(e)
                    .or_raise(|| Error(format!("search for \"{}\" failed", self.query)))
            }
        };
        drop(state);
        let _ = pending.try_send(outcome);
    }
}

fn ready(outcome: Outcome) -> SearchFuture {
    Box::pin(async move { outcome })
}

fn augment(addresses: Vec<Address>, origin: Option<LatLon>) -> Vec<Suggestion> {
    addresses
        .into_iter()
        .map(|address| Suggestion::new(address, origin))
        .collect()
}

#[derive(Serialize)]
struct CacheKey<'a> {
    q: &'a str,
    locale: &'a str,
    cc: Vec<String>,
    rb: &'a RegionBias,
}

/// Canonical cache key for `query` under `context`.
///
/// Country codes are compared as a set: case, order and duplicates do not
/// affect the key.
pub fn cache_key(query: &str, context: &Context) -> exn::Result<String, Error> {
    let mut cc: Vec<String> = context
        .country_codes
        .iter()
        .map(|code| code.to_uppercase())
        .collect();
    cc.sort();
    cc.dedup();
    let key = CacheKey {
        q: query,
        locale: context.locale.as_deref().unwrap_or_default(),
        cc,
        rb: &context.region_bias,
    };
    serde_json::to_string(&key).or_raise(|| Error("encode cache key".into()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_executor::Executor;

    use super::*;
    use crate::address::BBox;
    use crate::provider::{ProviderError, Signal};

    const VIENNA: LatLon = LatLon::new(48.2082, 16.3738);
    const BRATISLAVA: LatLon = LatLon::new(48.1486, 17.1077);

    /// Answers every query with one located address named after it.
    #[derive(Default)]
    struct Mock {
        latency: Duration,
        failure: Option<ProviderError>,
        calls: Mutex<Vec<String>>,
        signals: Mutex<Vec<Signal>>,
        finished: AtomicUsize,
    }

    impl Mock {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Provider for Mock {
        fn name(&self) -> &str {
            "mock"
        }

        fn search(
            &self,
            query: String,
            _context: Context,
            signal: Signal,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Address>, ProviderError>> + Send + '_>>
        {
            self.calls.lock().unwrap().push(query.clone());
            self.signals.lock().unwrap().push(signal.clone());
            Box::pin(async move {
                let work = async move {
                    async_io::Timer::after(self.latency).await;
                    self.finished.fetch_add(1, Ordering::SeqCst);
                    match &self.failure {
                        Some(e) => Err(e.clone()),
                        None => Ok(vec![Address::new(query, "mock").with_coordinates(VIENNA)]),
                    }
                };
                signal.guard(work).await
            })
        }
    }

    fn options() -> Options {
        Options {
            min_chars: 1,
            debounce: Duration::from_millis(20),
            cache_ttl: Duration::from_secs(60),
            origin: None,
        }
    }

    fn run<F, Fut>(test: F)
    where
        F: FnOnce(Arc<Executor<'static>>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let executor = Arc::new(Executor::new());
        async_io::block_on(executor.run(test(Arc::clone(&executor))));
    }

    async fn sleep(ms: u64) {
        async_io::Timer::after(Duration::from_millis(ms)).await;
    }

    #[test]
    fn debounce_collapses_rapid_queries() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), options());

            let first = searcher.search("b");
            let second = searcher.search("br");
            let third = searcher.search("bra");

            assert!(first.await.unwrap().is_empty());
            assert!(second.await.unwrap().is_empty());
            let results = third.await.unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].address.label, "bra");
            assert_eq!(mock.calls(), vec!["bra".to_owned()]);
        });
    }

    #[test]
    fn short_query_skips_everything() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), Options::default());

            assert!(searcher.search("ab").await.unwrap().is_empty());
            assert!(searcher.search("  ab   ").await.unwrap().is_empty());
            sleep(300).await;
            assert!(mock.calls().is_empty());
        });
    }

    #[test]
    fn input_is_trimmed() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), options());

            searcher.search("  vienna \n").await.unwrap();
            assert_eq!(mock.calls(), vec!["vienna".to_owned()]);
        });
    }

    #[test]
    fn cache_hit_skips_provider() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), options());

            assert_eq!(searcher.search("vienna").await.unwrap().len(), 1);
            assert_eq!(searcher.search("vienna").await.unwrap().len(), 1);
            assert_eq!(mock.calls().len(), 1);
        });
    }

    #[test]
    fn cache_expires() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(
                executor,
                mock.clone(),
                Context::new(),
                Options {
                    cache_ttl: Duration::from_millis(30),
                    ..options()
                },
            );

            searcher.search("vienna").await.unwrap();
            sleep(80).await;
            searcher.search("vienna").await.unwrap();
            assert_eq!(mock.calls().len(), 2);
        });
    }

    #[test]
    fn zero_ttl_disables_cache() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(
                executor,
                mock.clone(),
                Context::new(),
                Options {
                    cache_ttl: Duration::ZERO,
                    ..options()
                },
            );

            searcher.search("vienna").await.unwrap();
            searcher.search("vienna").await.unwrap();
            assert_eq!(mock.calls().len(), 2);
        });
    }

    #[test]
    fn clear_cache_forces_lookup() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), options());

            searcher.search("vienna").await.unwrap();
            searcher.clear_cache();
            searcher.search("vienna").await.unwrap();
            assert_eq!(mock.calls().len(), 2);
        });
    }

    #[test]
    fn stale_response_is_discarded() {
        run(|executor| async move {
            let mock = Arc::new(Mock {
                latency: Duration::from_millis(100),
                ..Mock::default()
            });
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), options());

            let old = searcher.search("abc");
            sleep(50).await;
            let new = searcher.search("abcd");

            assert!(old.await.unwrap().is_empty());
            let results = new.await.unwrap();
            assert_eq!(results[0].address.label, "abcd");

            // Nothing was cached for the superseded query.
            let before = mock.calls().len();
            assert_eq!(searcher.search("abc").await.unwrap().len(), 1);
            assert_eq!(mock.calls().len(), before + 1);
        });
    }

    #[test]
    fn cancel_clears_armed_timer() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), options());

            let pending = searcher.search("vienna");
            searcher.cancel();
            assert!(pending.await.unwrap().is_empty());
            sleep(60).await;
            assert!(mock.calls().is_empty());
        });
    }

    #[test]
    fn cancel_aborts_in_flight_call() {
        run(|executor| async move {
            let mock = Arc::new(Mock {
                latency: Duration::from_millis(200),
                ..Mock::default()
            });
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), options());

            let pending = searcher.search("vienna");
            sleep(60).await;
            assert_eq!(mock.calls().len(), 1);
            searcher.cancel();

            assert!(pending.await.unwrap().is_empty());
            assert!(mock.signals.lock().unwrap()[0].is_aborted());
            sleep(250).await;
            assert_eq!(mock.finished.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn exposes_configuration() {
        run(|executor| async move {
            let context = Context::new().with_locale("sk");
            let searcher = Searcher::new(executor, Arc::new(Mock::default()), context.clone(), options());

            assert_eq!(searcher.context(), &context);
            assert_eq!(searcher.options().min_chars, 1);
        });
    }

    #[test]
    fn cancel_is_idempotent() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(executor, mock, Context::new(), options());

            let start = searcher.generation();
            searcher.cancel();
            searcher.cancel();
            assert_eq!(searcher.generation(), start + 2);
        });
    }

    #[test]
    fn provider_cancellation_resolves_empty() {
        run(|executor| async move {
            let mock = Arc::new(Mock {
                failure: Some(ProviderError::Cancelled),
                ..Mock::default()
            });
            let searcher = Searcher::new(executor, mock, Context::new(), options());

            assert!(searcher.search("vienna").await.unwrap().is_empty());
        });
    }

    #[test]
    fn provider_failure_propagates() {
        run(|executor| async move {
            let mock = Arc::new(Mock {
                failure: Some(ProviderError::Network("connection refused".into())),
                ..Mock::default()
            });
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), options());

            assert!(searcher.search("vienna").await.is_err());
            // Failures are not cached.
            assert!(searcher.search("vienna").await.is_err());
            assert_eq!(mock.calls().len(), 2);
        });
    }

    #[test]
    fn results_carry_distance_from_origin() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(
                executor,
                mock,
                Context::new(),
                Options {
                    origin: Some(BRATISLAVA),
                    ..options()
                },
            );

            let fresh = searcher.search("vienna").await.unwrap();
            let cached = searcher.search("vienna").await.unwrap();
            for results in [fresh, cached] {
                let d = results[0].distance_meters.unwrap();
                assert!(d > 40_000.0 && d < 90_000.0);
            }
        });
    }

    #[test]
    fn dropping_searcher_resolves_pending() {
        run(|executor| async move {
            let mock = Arc::new(Mock::default());
            let searcher = Searcher::new(executor, mock.clone(), Context::new(), options());

            let pending = searcher.search("vienna");
            drop(searcher);
            assert!(pending.await.unwrap().is_empty());
            assert!(mock.calls().is_empty());
        });
    }

    #[test]
    fn key_ignores_country_code_order_and_case() {
        let a = Context::new().with_country_codes(["sk", "AT"]);
        let b = Context::new().with_country_codes(["AT", "sk"]);
        assert_eq!(cache_key("q", &a).unwrap(), cache_key("q", &b).unwrap());
    }

    #[test]
    fn key_distinguishes_context() {
        let base = Context::new();
        let localized = Context::new().with_locale("sk");
        let biased = Context::new().with_region_bias(RegionBias::BBox {
            bbox: BBox::new(16.0, 47.0, 18.0, 49.0),
            strict: true,
        });
        let plain = cache_key("q", &base).unwrap();
        assert_ne!(plain, cache_key("q", &localized).unwrap());
        assert_ne!(plain, cache_key("q", &biased).unwrap());
        assert_ne!(plain, cache_key("r", &base).unwrap());
    }

    #[test]
    fn key_layout() {
        let key = cache_key("main street", &Context::new()).unwrap();
        assert_eq!(
            key,
            r#"{"q":"main street","locale":"","cc":[],"rb":{"type":"none"}}"#
        );
    }
}
