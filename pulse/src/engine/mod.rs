pub mod poller;

pub use poller::{AutoReactEngine, CycleReport, POLL_INTERVAL};
