//! Relays GraphQL execution telemetry to a usage-reporting ingress.
//!
//! The integration layer hands over one [`TelemetryRecord`] per completed
//! operation: a flat list of resolver timing spans plus any execution
//! errors. This crate reshapes each record into the hierarchical trace
//! tree the ingress expects, groups traces by normalized query signature
//! and delivers report envelopes over HTTP, either inline with the
//! request (`sync`) or deferred through a Redis-backed delivery queue
//! (`redis`) drained by the `submit-usage` command.

pub mod batch;
pub mod config;
pub mod proto;
pub mod queue;
pub mod sender;
pub mod signature;
pub mod telemetry;
pub mod tree;
pub mod worker;

pub use crate::config::Config;
pub use crate::config::SendMode;
pub use crate::telemetry::TelemetryRecord;
pub use crate::tree::TraceTreeBuilder;
pub use crate::worker::UsageReporter;
