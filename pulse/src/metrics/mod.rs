pub mod counters;

pub use counters::{AdapterStats, CycleCounters, FetchCounters};
