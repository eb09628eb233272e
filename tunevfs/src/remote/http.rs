//! HTTP client abstraction for testability

use std::io::Read;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Largest response body accepted from a remote catalog (16 MiB).
///
/// Module files and catalog listings are far below this; anything larger
/// is treated as a broken response rather than buffered.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// How long a failed connection marks the network as unreachable.
pub const DEFAULT_OFFLINE_RETRY: Duration = Duration::from_secs(60);

/// Errors from the remote transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Request could not be sent or the body could not be read.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Response body exceeded the configured limit.
    #[error("Response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    /// No network connectivity.
    #[error("No connection")]
    NoConnection,
}

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    ///
    /// # Returns
    ///
    /// The response body as bytes or an error.
    fn get(&self, url: &str) -> Result<Vec<u8>, RemoteError>;

    /// Whether the network is believed to be reachable.
    ///
    /// Search prefers the remote engine when this returns true and falls
    /// back to locally cached rows otherwise.
    fn has_connection(&self) -> bool {
        true
    }
}

/// Real HTTP client implementation using reqwest.
///
/// A request that cannot reach its host (connect failure or timeout) marks
/// the client offline; [`HttpClient::has_connection`] then reports false
/// until a request succeeds or the retry interval elapses.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    max_response_size: usize,
    offline_since: Mutex<Option<Instant>>,
    offline_retry: Duration,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, RemoteError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, RemoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("tunevfs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            offline_since: Mutex::new(None),
            offline_retry: DEFAULT_OFFLINE_RETRY,
        })
    }

    /// Sets the response size cap.
    pub fn with_max_response_size(mut self, limit: usize) -> Self {
        self.max_response_size = limit;
        self
    }

    /// Sets how long a connection failure keeps the client offline.
    pub fn with_offline_retry(mut self, retry: Duration) -> Self {
        self.offline_retry = retry;
        self
    }

    fn mark_offline(&self, url: &str, error: &reqwest::Error) {
        let mut offline_since = self.offline_since.lock();
        if offline_since.is_none() {
            warn!(url = %url, error = %error, "Network unreachable");
        }
        *offline_since = Some(Instant::now());
    }

    fn mark_online(&self) {
        if self.offline_since.lock().take().is_some() {
            info!("Network reachable again");
        }
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        debug!(url = %url, "Fetching");
        let response = match self.client.get(url).send() {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                self.mark_offline(url, &e);
                return Err(RemoteError::NoConnection);
            }
            Err(e) => return Err(RemoteError::Http(format!("Request failed: {}", e))),
        };
        self.mark_online();

        // Check HTTP status
        if !response.status().is_success() {
            return Err(RemoteError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let too_large = || RemoteError::TooLarge {
            url: url.to_string(),
            limit: self.max_response_size,
        };

        if let Some(length) = response.content_length() {
            if length > self.max_response_size as u64 {
                return Err(too_large());
            }
        }

        // Read one byte past the limit to detect oversized bodies without a
        // Content-Length header
        let mut body = Vec::new();
        response
            .take(self.max_response_size as u64 + 1)
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Http(format!("Failed to read response: {}", e)))?;

        if body.len() > self.max_response_size {
            return Err(too_large());
        }
        Ok(body)
    }

    fn has_connection(&self) -> bool {
        match *self.offline_since.lock() {
            Some(since) => since.elapsed() >= self.offline_retry,
            None => true,
        }
    }
}
