pub mod adapter;
pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod feeds;
pub mod metrics;
pub mod normalize;
pub mod pulse_view;
pub mod rules;
pub mod state;
pub mod wsps;

pub mod error;
