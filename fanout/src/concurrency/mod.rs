//! Signaling primitives coordinating the service, its requests and their fetch workers.
//!
//! Both signals wrap a [`tokio::sync::watch`] channel holding a `bool` so that they are
//! level-triggered: once raised they stay raised, any number of receivers observe them
//! without consuming anything, and late subscribers see the raised state immediately.
//!
//! - [`shutdown`] is process-wide. It is raised once when the service starts draining and is
//!   read by the admission gate.
//! - [`cancel`] is scoped to one client request. It is raised by the request coordinator on
//!   the first fetch failure or on client disconnect and is read by every fetch worker of
//!   that request.

pub mod cancel;
pub mod shutdown;
