//! Observability for the session authority.
//!
//! - [`metrics`] - `sa_`-prefixed metrics facade helpers and the
//!   in-process `AuthorityMetrics` counters.

pub mod metrics;

pub use metrics::{AuthorityMetrics, AuthorityMetricsSnapshot};
