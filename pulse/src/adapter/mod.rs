//! Fault-tolerant access to upstream feeds.
//!
//! Every fetch goes through the [`CachedFetcher`], which consults the
//! per-adapter [`CircuitBreakerRegistry`] before any network I/O and falls
//! back to the last cached body when a refresh is blocked or fails.

pub mod breaker;
pub mod cache;
pub mod errors;
pub mod fetcher;
pub mod transport;

pub use breaker::{BackoffPolicy, BreakerConfig, BreakerState, CircuitBreakerRegistry, CircuitState};
pub use cache::{CacheEntry, ResponseCache};
pub use errors::FetchError;
pub use fetcher::{CachedFetcher, FeedRequest, FetchOutcome, FetchStatus};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
