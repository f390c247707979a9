use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use heracles_metrics::MetricFamilies;
use serde::Serialize;

use crate::checker::CheckOutcome;

/// Result of one check run: the scraped snapshot plus one outcome per checker,
/// keyed by the checker description.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub success: bool,
    pub generated_at: DateTime<Utc>,
    pub metric_families: MetricFamilies,
    pub results: BTreeMap<String, CheckOutcome>,
}

impl CheckReport {
    pub fn new(metric_families: MetricFamilies) -> Self {
        Self {
            success: true,
            generated_at: Utc::now(),
            metric_families,
            results: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, description: String, outcome: CheckOutcome) {
        self.success &= outcome.passed;
        self.results.insert(description, outcome);
    }

    pub fn failures(&self) -> impl Iterator<Item = (&String, &CheckOutcome)> {
        self.results.iter().filter(|(_, outcome)| !outcome.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }
}

#[cfg(test)]
mod tests {
    use heracles_metrics::parse_text;

    use super::CheckReport;
    use crate::checker::CheckOutcome;

    #[test]
    fn a_single_failure_marks_the_report_failed() {
        let mut report = CheckReport::new(Default::default());
        report.record("exists(up)".to_string(), CheckOutcome::pass());
        assert!(report.success);

        report.record(
            "disallow-empty".to_string(),
            CheckOutcome::fail("no metric families were scraped"),
        );
        report.record("type(up, gauge)".to_string(), CheckOutcome::pass());

        assert!(!report.success);
        assert_eq!(report.failed_count(), 1);
        let (description, outcome) = report.failures().next().unwrap();
        assert_eq!(description, "disallow-empty");
        assert_eq!(outcome.message, "no metric families were scraped");
    }

    #[test]
    fn serializes_snapshot_and_results() {
        let families = parse_text("# TYPE up gauge\nup{job=\"node\"} 1\n").unwrap();
        let mut report = CheckReport::new(families);
        report.record("exists(up)".to_string(), CheckOutcome::pass());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["metric_families"]["up"]["metric_type"], "gauge");
        assert_eq!(
            value["metric_families"]["up"]["metrics"][0]["value"]["gauge"],
            1.0
        );
        assert_eq!(value["results"]["exists(up)"]["passed"], true);
    }

    #[test]
    fn keeps_non_finite_values_in_the_snapshot() {
        let families = parse_text(
            "# TYPE h histogram\n\
             h_bucket{le=\"1\"} 1\n\
             h_bucket{le=\"+Inf\"} 3\n\
             h_sum 2.5\n\
             h_count 3\n\
             # TYPE drift gauge\n\
             drift{side=\"low\"} -Inf\n\
             drift{side=\"none\"} NaN\n",
        )
        .unwrap();
        let report = CheckReport::new(families);

        let value = serde_json::to_value(&report).unwrap();
        let histogram = &value["metric_families"]["h"]["metrics"][0]["value"]["histogram"];
        assert_eq!(histogram["buckets"][0][0], 1.0);
        assert_eq!(histogram["buckets"][1][0], "+Inf");
        assert_eq!(histogram["buckets"][1][1], 3.0);
        assert_eq!(histogram["sum"], 2.5);

        let drift = &value["metric_families"]["drift"]["metrics"];
        assert_eq!(drift[0]["value"]["gauge"], "-Inf");
        assert_eq!(drift[1]["value"]["gauge"], "NaN");
    }
}
