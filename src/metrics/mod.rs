//! Metrics aggregation and alerting

pub mod alerts;
pub mod snapshot;
pub mod store;

pub use alerts::{Alert, AlertEngine, AlertSeverity, AlertType};
pub use snapshot::{CycleMetrics, MetricsSnapshot, TrendDeltas};
pub use store::{DecisionCounters, Detection, MetricsStore, Resolution};
