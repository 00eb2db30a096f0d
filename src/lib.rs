//! Status page aggregation.
//!
//! Reads check files produced by an external checker and turns them into
//! per-endpoint latency series, a timeline of events and an overall status.

pub mod config;
pub mod engine;
pub mod model;
pub mod render;
pub mod scheduler;
pub mod storage;
