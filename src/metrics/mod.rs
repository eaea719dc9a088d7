//! Metrics and observability infrastructure.
//!
//! This module groups observability components:
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `init`: Prometheus exporter initialization

pub mod events;

use metrics_exporter_prometheus::PrometheusBuilder;
use snafu::prelude::*;
use std::net::SocketAddr;

use crate::error::{MetricsError, PrometheusInitSnafu};

/// Initialize the Prometheus metrics exporter with an HTTP endpoint.
///
/// Exposes `/metrics` on the given address. Must be called from within a
/// Tokio runtime.
pub fn init(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context(PrometheusInitSnafu)?;
    Ok(())
}

/// Emit an internal event as a metric.
///
/// # Example
///
/// ```ignore
/// use sheetpress::metrics::events::{JobProcessed, JobStatus};
///
/// emit!(JobProcessed { status: JobStatus::Success });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
