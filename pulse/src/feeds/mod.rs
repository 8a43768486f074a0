//! Upstream market-data feeds.
//!
//! Each feed has a stable [`AdapterId`] that keys its circuit breaker, its
//! response cache entry and its fetch counters.

pub mod catalog;
pub mod types;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use catalog::{FeedEndpoint, FeedSnapshot, FeedsConfig, feed_requests, parse_payload};
pub use types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterId {
    EtfFlow,
    RatesFx,
    Indices,
    Calendar,
}

impl AdapterId {
    pub const ALL: [AdapterId; 4] = [
        AdapterId::EtfFlow,
        AdapterId::RatesFx,
        AdapterId::Indices,
        AdapterId::Calendar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterId::EtfFlow => "etf_flow",
            AdapterId::RatesFx => "rates_fx",
            AdapterId::Indices => "indices",
            AdapterId::Calendar => "calendar",
        }
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
