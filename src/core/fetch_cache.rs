//! Thumbnail cache with request coalescing and cancellable fetches.
//!
//! Two maps behind one mutex:
//! - `entries`: identifier -> decoded image (only after a successful fetch)
//! - `in_flight`: identifier -> outstanding fetch (token, generation, listeners)
//!
//! Per identifier: `Uncached -> Fetching -> {Cached | Failed}`, and
//! `Fetching -> Cancelled` via `cancel()`. A second `request()` while
//! fetching attaches as another listener, so there is never more than one
//! transfer per identifier.
//!
//! Delivery:
//! - cache hits and malformed identifiers call back synchronously on the
//!   caller's thread
//! - fetched results go through the injected `Dispatcher`, which runs the whole
//!   completion step (map update + listener calls) on its context
//!
//! Every fetch attempt carries a generation number. A completion whose
//! generation no longer matches the in-flight entry (cancelled, or cancelled
//! and re-requested) is discarded: no callback, nothing cached.

use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

use super::cache_man::CacheManager;
use super::dispatch::Dispatcher;
use super::error::FetchError;
use super::image::{DecodedImage, ImageDecoder};
use super::transport::Transport;
use super::workers::CancelToken;

/// Completion callback: `Some(image)` or `None` for "not available"
pub type OnComplete = Box<dyn FnOnce(Option<Arc<DecodedImage>>) + Send + 'static>;

/// Counters for monitoring. Failures are split by kind.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    fetches: AtomicU64,
    malformed: AtomicU64,
    transfer_failures: AtomicU64,
    decode_failures: AtomicU64,
    cancelled: AtomicU64,
    stale: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, err: &FetchError) {
        match err {
            FetchError::MalformedIdentifier(_) => Self::bump(&self.malformed),
            FetchError::TransferFailed(_) => Self::bump(&self.transfer_failures),
            FetchError::DecodeFailed(_) => Self::bump(&self.decode_failures),
            // Counted in cancel(); late Cancelled results land in `stale`
            FetchError::Cancelled => {}
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Requests that joined an already running fetch
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    /// Transfers handed to the transport
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn transfer_failures(&self) -> u64 {
        self.transfer_failures.load(Ordering::Relaxed)
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Completions discarded because their fetch was cancelled
    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }
}

/// Outstanding fetch for one identifier
struct InFlight {
    generation: u64,
    token: CancelToken,
    listeners: Vec<OnComplete>,
}

#[derive(Default)]
struct FetchState {
    entries: HashMap<String, Arc<DecodedImage>>,
    in_flight: HashMap<String, InFlight>,
}

/// State reachable from transport threads and dispatched completions
struct Shared {
    state: Mutex<FetchState>,
    decoder: Arc<dyn ImageDecoder>,
    dispatcher: Arc<dyn Dispatcher>,
    manager: Arc<CacheManager>,
    stats: Arc<CacheStats>,
    next_generation: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, FetchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Completion step. Runs on the dispatcher's context.
    fn finish(&self, identifier: &str, generation: u64, outcome: Result<Arc<DecodedImage>, FetchError>) {
        let flight = {
            let mut state = self.lock();
            match state.in_flight.remove(identifier) {
                Some(flight) if flight.generation == generation => {
                    if let Ok(image) = &outcome {
                        if let Some(old) = state.entries.insert(identifier.to_string(), Arc::clone(image)) {
                            self.manager.free_memory(old.mem());
                        }
                        self.manager.add_memory(image.mem());
                    }
                    flight
                }
                other => {
                    // Newer attempt owns the slot (or none does): put it back untouched
                    if let Some(newer) = other {
                        state.in_flight.insert(identifier.to_string(), newer);
                    }
                    CacheStats::bump(&self.stats.stale);
                    debug!(
                        "Discarding stale completion for {} (generation {}, {})",
                        identifier,
                        generation,
                        if outcome.is_ok() { "ok" } else { "failed" }
                    );
                    return;
                }
            }
        };

        match &outcome {
            Ok(image) => debug!(
                "Cached {} ({}x{}, {} listeners)",
                identifier,
                image.width(),
                image.height(),
                flight.listeners.len()
            ),
            Err(err) => {
                self.stats.record_failure(err);
                warn!("Thumbnail unavailable [{}]: {}: {}", err.kind(), identifier, err);
            }
        }

        if self.manager.check_memory_limit() {
            self.purge();
        }

        let image = outcome.ok();
        for listener in flight.listeners {
            listener(image.clone());
        }
    }

    fn purge(&self) -> usize {
        let entries = std::mem::take(&mut self.lock().entries);
        let freed: usize = entries.values().map(|img| img.mem()).sum();
        self.manager.free_memory(freed);

        if !entries.is_empty() {
            info!(
                "Memory pressure: purged {} thumbnails ({} KB freed)",
                entries.len(),
                freed / 1024
            );
        }
        entries.len()
    }
}

/// Async, cancellable, in-memory thumbnail cache.
///
/// Construct one per application and share it by `Arc`.
///
/// # Example
/// ```ignore
/// let queue = Arc::new(MainQueue::new());
/// let cache = ImageFetchCache::new(
///     Arc::new(HttpTransport::new(8, Duration::from_secs(15))?),
///     Arc::new(RasterDecoder),
///     queue.clone(),
///     Arc::new(CacheManager::new(0.25, 2.0)),
/// );
///
/// cache.request("https://example.com/thumb.jpg", |image| {
///     // Some(image) or None
/// });
/// queue.poll(); // deliver completions on this thread
/// ```
pub struct ImageFetchCache {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
}

impl ImageFetchCache {
    pub fn new(
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn ImageDecoder>,
        dispatcher: Arc<dyn Dispatcher>,
        manager: Arc<CacheManager>,
    ) -> Self {
        debug!("ImageFetchCache created (limit {} KB)", manager.mem().1 / 1024);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(FetchState::default()),
                decoder,
                dispatcher,
                manager,
                stats: Arc::new(CacheStats::new()),
                next_generation: AtomicU64::new(0),
            }),
            transport,
        }
    }

    /// Request the image for `identifier`.
    ///
    /// `on_complete` runs at most once:
    /// - synchronously with `Some` on a cache hit (no network)
    /// - synchronously with `None` if `identifier` isn't an absolute URL
    /// - later, on the dispatcher context, when the fetch finishes
    /// - never, if `cancel(identifier)` is called before the fetch finishes
    pub fn request<F>(&self, identifier: &str, on_complete: F)
    where
        F: FnOnce(Option<Arc<DecodedImage>>) + Send + 'static,
    {
        let url = match Url::parse(identifier) {
            Ok(url) => url,
            Err(e) => {
                let err = FetchError::MalformedIdentifier(format!("{:?}: {}", identifier, e));
                self.shared.stats.record_failure(&err);
                warn!("Thumbnail unavailable [{}]: {}", err.kind(), err);
                on_complete(None);
                return;
            }
        };

        let (generation, token) = {
            let mut state = self.shared.lock();

            if let Some(image) = state.entries.get(identifier).cloned() {
                drop(state);
                CacheStats::bump(&self.shared.stats.hits);
                trace!("Cache hit: {}", identifier);
                on_complete(Some(image));
                return;
            }

            if let Some(flight) = state.in_flight.get_mut(identifier) {
                flight.listeners.push(Box::new(on_complete));
                CacheStats::bump(&self.shared.stats.coalesced);
                trace!(
                    "Joined in-flight fetch for {} ({} listeners)",
                    identifier,
                    flight.listeners.len()
                );
                return;
            }

            let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
            let token = CancelToken::new();
            state.in_flight.insert(
                identifier.to_string(),
                InFlight {
                    generation,
                    token: token.clone(),
                    listeners: vec![Box::new(on_complete)],
                },
            );
            (generation, token)
        }; // lock released before the transport call

        CacheStats::bump(&self.shared.stats.misses);
        CacheStats::bump(&self.shared.stats.fetches);
        debug!("Fetching {} (generation {})", identifier, generation);

        let shared = Arc::clone(&self.shared);
        let key = identifier.to_string();
        let decode_token = token.clone();

        self.transport.fetch(
            url,
            token,
            Box::new(move |result| {
                // Transport thread: decode here, never on the delivery context
                let outcome = result.and_then(|bytes| {
                    if decode_token.is_cancelled() {
                        return Err(FetchError::Cancelled);
                    }
                    shared.decoder.decode(&bytes).map(Arc::new)
                });

                // Weak: `Shared` owns the dispatcher, queued jobs must not own `Shared`
                let delivery = Arc::downgrade(&shared);
                shared.dispatcher.dispatch(Box::new(move || match delivery.upgrade() {
                    Some(shared) => shared.finish(&key, generation, outcome),
                    None => trace!("Cache gone, dropping completion for {}", key),
                }));
            }),
        );
    }

    /// Cancel the in-flight fetch for `identifier`.
    ///
    /// Every listener attached to it is dropped without being called, and a
    /// late result is discarded. No-op if nothing is in flight.
    pub fn cancel(&self, identifier: &str) {
        let flight = self.shared.lock().in_flight.remove(identifier);

        match flight {
            Some(flight) => {
                flight.token.cancel();
                CacheStats::bump(&self.shared.stats.cancelled);
                debug!(
                    "Cancelled {} (generation {}, {} listeners detached)",
                    identifier,
                    flight.generation,
                    flight.listeners.len()
                );
                // Listeners dropped here, outside the lock
            }
            None => trace!("Cancel no-op, nothing in flight: {}", identifier),
        }
    }

    /// Cached image without starting a fetch
    pub fn get(&self, identifier: &str) -> Option<Arc<DecodedImage>> {
        let result = self.shared.lock().entries.get(identifier).cloned();
        if result.is_some() {
            CacheStats::bump(&self.shared.stats.hits);
        } else {
            CacheStats::bump(&self.shared.stats.misses);
        }
        result
    }

    /// Check cache without touching statistics
    pub fn contains(&self, identifier: &str) -> bool {
        self.shared.lock().entries.contains_key(identifier)
    }

    /// True while a fetch for `identifier` is outstanding
    pub fn is_loading(&self, identifier: &str) -> bool {
        self.shared.lock().in_flight.contains_key(identifier)
    }

    /// Number of cached images
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().entries.is_empty()
    }

    /// Number of outstanding fetches
    pub fn in_flight_len(&self) -> usize {
        self.shared.lock().in_flight.len()
    }

    /// Memory-pressure handler: drop every cached image. In-flight fetches
    /// keep running and will populate the cache again.
    ///
    /// Returns the number of entries removed.
    pub fn purge(&self) -> usize {
        self.shared.purge()
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.shared.stats)
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.shared.manager
    }
}

impl Drop for ImageFetchCache {
    fn drop(&mut self) {
        // Outstanding transfers can't deliver into a dead cache's callers
        let state = std::mem::take(&mut *self.shared.lock());
        for flight in state.in_flight.values() {
            flight.token.cancel();
        }
        if !state.in_flight.is_empty() {
            debug!("ImageFetchCache dropped with {} fetches in flight", state.in_flight.len());
        }
        let freed: usize = state.entries.values().map(|img| img.mem()).sum();
        self.shared.manager.free_memory(freed);
    }
}
