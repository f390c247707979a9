use std::sync::Arc;

use heracles_metrics::MetricFamilies;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    checker::CheckerBuilder,
    error::{HeraclesError, Result},
    exporter::Exporter,
    fixture::Fixture,
    report::CheckReport,
    runner::Runner,
    settings::CheckSettings,
};

/// Runs the pipeline once and evaluates every configured checker against the
/// scraped families.
pub struct MetricChecker {
    runner: Runner,
    settings: CheckSettings,
}

impl MetricChecker {
    pub fn new(
        exporter: Arc<dyn Exporter>,
        fixtures: Vec<Arc<dyn Fixture>>,
        settings: CheckSettings,
    ) -> Self {
        Self {
            runner: Runner::new(exporter, fixtures, settings.path.clone(), settings.wait),
            settings,
        }
    }

    /// Returns the report on success. Failed assertions come back as
    /// [`HeraclesError::CheckFailed`] carrying the full report; any other
    /// error means the pipeline itself broke.
    pub async fn check(&self, cancel: &CancellationToken) -> Result<CheckReport> {
        self.runner
            .run(cancel, |families| self.check_metrics(families))
            .await
    }

    pub fn check_metrics(&self, families: &MetricFamilies) -> Result<CheckReport> {
        let checkers = CheckerBuilder::from_settings(&self.settings);
        let mut report = CheckReport::new(families.clone());

        for checker in &checkers {
            debug!(checker = %checker, "checking metrics");
            let outcome = checker.check(families);
            if !outcome.passed {
                warn!(checker = %checker, message = %outcome.message, "check failed");
            }
            report.record(checker.to_string(), outcome);
        }

        if !report.success {
            return Err(HeraclesError::CheckFailed(Box::new(report)));
        }

        info!(checks = report.results.len(), "all checks passed");
        Ok(report)
    }
}
