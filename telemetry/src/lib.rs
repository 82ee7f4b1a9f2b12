//! Tracing setup shared by the service binary and its tests.

pub mod tracing;
