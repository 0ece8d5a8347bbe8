//! Infrastructure - configuration, event bus, and metrics

pub mod bus;
pub mod config;
pub mod metrics;

pub use bus::{EventBus, EventHandler, EventPublisher};
pub use config::{Config, PaymentMode};
pub use metrics::{Metrics, MetricsSummary};
