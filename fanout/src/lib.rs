//! Concurrent fan-out core: fetch a batch of urls with bounded parallelism and aggregate the
//! results, failing fast on the first error.

pub mod concurrency;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
