//! REST access to the restaurant backend.
//!
//! This module provides the `RequestClient`, which talks to the hosted
//! PostgREST-style API under `<base>/rest/v1/`. Reads are cached and
//! deduplicated; writes invalidate the cached reads of their table.
//!
//! Requests authenticate with the project's API key, sent both as the
//! `apikey` header and as a bearer token.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{backoff_delay, cache_key, RequestClient, RequestOptions};
pub use error::ApiError;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
