//! Prometheus text exposition data model, filled from `prometheus-parse`.

pub mod error;
pub mod parser;
pub mod types;

pub use error::{ParseError, Result};
pub use parser::parse_text;
pub use types::{Metric, MetricFamilies, MetricFamily, MetricType, MetricValue};
