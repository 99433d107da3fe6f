//! End-to-end tests for the Tether bridge
//!
//! These tests run script source against an isolate runtime wired to the
//! sample host classes and check what crosses the bridge in both
//! directions.

mod harness;
mod bridge;
mod config;
mod concurrency;
mod errors;
mod globals;
mod lifecycle;
mod results;
mod timers;

pub use harness::*;
