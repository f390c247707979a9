pub mod checker;
pub mod error;
pub mod exporter;
pub mod fixture;
pub mod metric_checker;
pub mod report;
pub mod runner;
pub mod settings;

pub use checker::{CheckOutcome, Checker, CheckerBuilder, LabelFilter};
pub use error::{HeraclesError, Result};
pub use exporter::{ComposeExporter, Exporter, ExternalExporter};
pub use fixture::{
    Fixture, compose::ComposeStack, script::ContainerScriptFixture, script::ScriptFixture,
};
pub use metric_checker::MetricChecker;
pub use report::CheckReport;
pub use runner::{RunOutcome, Runner};
pub use settings::{CheckSettings, MetricSampleConfig, MetricsConfig, SampleMatch};
