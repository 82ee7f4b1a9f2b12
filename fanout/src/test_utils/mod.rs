//! Utilities for exercising the fan-out core without touching the network.

pub mod fetcher;

pub use fetcher::MockFetcher;
