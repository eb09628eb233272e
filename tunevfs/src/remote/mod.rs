//! Remote transport used by the catalog sources.
//!
//! Catalogs never talk to the network directly: they go through the
//! [`HttpClient`] trait so tests can substitute canned responses.

mod http;

pub use http::{
    HttpClient, RemoteError, ReqwestClient, DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_OFFLINE_RETRY,
    DEFAULT_TIMEOUT_SECS,
};

#[cfg(test)]
pub(crate) use http::tests::{unreachable_url, MockHttpClient};
