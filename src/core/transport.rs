//! Byte transport for thumbnail identifiers.
//!
//! `Transport` is the outbound seam of `ImageFetchCache`: one GET-equivalent
//! per cache miss, never blocking the caller, with best-effort cancellation.
//!
//! `HttpTransport` runs blocking `ureq` requests on the `Workers` pool.
//! `file://` URLs are read from disk so local playlists work offline.

use log::{debug, trace};
use std::io::Read;
use std::time::Duration;
use url::Url;

use super::error::FetchError;
use super::workers::{CancelToken, Workers};

/// Completion for a single fetch. Called exactly once, from any thread.
pub type FetchDone = Box<dyn FnOnce(Result<Vec<u8>, FetchError>) + Send + 'static>;

/// Non-blocking byte fetch with cooperative cancellation.
pub trait Transport: Send + Sync {
    /// Start fetching `url`. Must return without waiting on I/O.
    ///
    /// `done` is called exactly once. Implementations should check `token`
    /// where they can and report `FetchError::Cancelled` early.
    fn fetch(&self, url: Url, token: CancelToken, done: FetchDone);
}

/// Request parameters shared by every job
#[derive(Debug, Clone)]
struct HttpConfig {
    user_agent: String,
    max_size: usize,
}

/// `ureq`-backed transport running on its own worker pool
pub struct HttpTransport {
    agent: ureq::Agent,
    config: HttpConfig,
    workers: Workers,
}

impl HttpTransport {
    /// Create transport with `num_workers` fetch threads and a global
    /// per-request timeout. Fails if no fetch thread can be started.
    pub fn new(num_workers: usize, timeout: Duration) -> std::io::Result<Self> {
        let workers = Workers::new(num_workers)?;
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        debug!(
            "HttpTransport created: workers={}, timeout={:?}",
            num_workers, timeout
        );

        Ok(Self {
            agent,
            config: HttpConfig {
                user_agent: concat!("thumbloader/", env!("CARGO_PKG_VERSION")).to_string(),
                max_size: 16 * 1024 * 1024,
            },
            workers,
        })
    }

    /// Set the User-Agent header
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum response size in bytes
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: Url, token: CancelToken, done: FetchDone) {
        let agent = self.agent.clone();
        let config = self.config.clone();

        self.workers.execute_cancellable(token.clone(), move |cancelled| {
            if cancelled {
                trace!("Skipping cancelled fetch before start: {}", url);
                done(Err(FetchError::Cancelled));
                return;
            }

            let result = fetch_blocking(&agent, &config, &url);

            // Transfer can't be aborted mid-flight; drop the bytes instead
            if token.is_cancelled() {
                trace!("Fetch finished after cancel, discarding: {}", url);
                done(Err(FetchError::Cancelled));
                return;
            }
            done(result);
        });
    }
}

fn fetch_blocking(agent: &ureq::Agent, config: &HttpConfig, url: &Url) -> Result<Vec<u8>, FetchError> {
    match url.scheme() {
        "http" | "https" => fetch_http(agent, config, url),
        "file" => fetch_file(config, url),
        other => Err(FetchError::TransferFailed(format!(
            "Unsupported scheme '{}' in {}",
            other, url
        ))),
    }
}

fn fetch_http(agent: &ureq::Agent, config: &HttpConfig, url: &Url) -> Result<Vec<u8>, FetchError> {
    trace!("GET {}", url);

    // Non-2xx comes back as ureq::Error::StatusCode
    let mut response = agent
        .get(url.as_str())
        .header("User-Agent", &config.user_agent)
        .call()
        .map_err(|e| FetchError::TransferFailed(format!("GET {}: {}", url, e)))?;

    let bytes = response
        .body_mut()
        .with_config()
        .limit(config.max_size as u64)
        .read_to_vec()
        .map_err(|e| FetchError::TransferFailed(format!("Reading body of {}: {}", url, e)))?;

    if bytes.is_empty() {
        return Err(FetchError::TransferFailed(format!("Empty response body: {}", url)));
    }

    debug!("Fetched {} ({} bytes)", url, bytes.len());
    Ok(bytes)
}

fn fetch_file(config: &HttpConfig, url: &Url) -> Result<Vec<u8>, FetchError> {
    let path = url
        .to_file_path()
        .map_err(|_| FetchError::TransferFailed(format!("Not a local file path: {}", url)))?;

    let file = std::fs::File::open(&path)
        .map_err(|e| FetchError::TransferFailed(format!("{}: {}", path.display(), e)))?;

    // Read one byte past the limit to detect oversize files
    let mut bytes = Vec::new();
    file.take(config.max_size as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| FetchError::TransferFailed(format!("{}: {}", path.display(), e)))?;

    if bytes.len() > config.max_size {
        return Err(FetchError::TransferFailed(format!(
            "{} exceeds {} byte limit",
            path.display(),
            config.max_size
        )));
    }
    if bytes.is_empty() {
        return Err(FetchError::TransferFailed(format!("Empty file: {}", path.display())));
    }

    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}
