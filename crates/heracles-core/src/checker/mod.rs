pub mod builder;

use std::{collections::BTreeMap, fmt};

use heracles_metrics::{Metric, MetricFamilies};
use serde::Serialize;

use crate::settings::SampleMatch;

pub use builder::CheckerBuilder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: String,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: "ok".to_string(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Label filter selecting metric instances inside one family.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelFilter {
    pub labels: BTreeMap<String, String>,
    pub mode: SampleMatch,
}

impl LabelFilter {
    pub fn new(labels: BTreeMap<String, String>, mode: SampleMatch) -> Self {
        Self { labels, mode }
    }

    pub fn matches(&self, metric: &Metric) -> bool {
        match self.mode {
            SampleMatch::ExactCount => {
                // Labels absent from the filter still count towards the total.
                let mut counted = 0;
                for (name, value) in &metric.labels {
                    if self.labels.get(name).is_some_and(|expected| expected != value) {
                        return false;
                    }
                    counted += 1;
                }
                counted == self.labels.len()
            }
            SampleMatch::Subset => self
                .labels
                .iter()
                .all(|(name, expected)| metric.label(name) == Some(expected.as_str())),
        }
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (name, value)) in self.labels.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}={value:?}")?;
        }
        f.write_str("}")?;
        if self.mode == SampleMatch::Subset {
            f.write_str(" subset")?;
        }
        Ok(())
    }
}

/// One atomic assertion over a scraped family map.
#[derive(Debug, Clone, PartialEq)]
pub enum Checker {
    DisallowMetrics { metrics: Vec<String> },
    DisallowEmpty,
    MetricExists { metric: String },
    MetricType { metric: String, expected: String },
    LabelsRequired { metric: String, labels: Vec<String> },
    LabelsDisallowed { metric: String, labels: Vec<String> },
    SampleExists { metric: String, filter: LabelFilter },
    SampleValue {
        metric: String,
        filter: LabelFilter,
        value: f64,
    },
}

impl Checker {
    pub fn check(&self, families: &MetricFamilies) -> CheckOutcome {
        match self {
            Self::DisallowMetrics { metrics } => {
                match metrics.iter().find(|metric| families.contains_key(*metric)) {
                    Some(metric) => {
                        CheckOutcome::fail(format!("metric {metric} is disallowed but was found"))
                    }
                    None => CheckOutcome::pass(),
                }
            }
            Self::DisallowEmpty => {
                if families.is_empty() {
                    CheckOutcome::fail("no metric families were scraped")
                } else {
                    CheckOutcome::pass()
                }
            }
            Self::MetricExists { metric } => {
                if families.contains_key(metric) {
                    CheckOutcome::pass()
                } else {
                    missing(metric)
                }
            }
            Self::MetricType { metric, expected } => {
                let Some(family) = families.get(metric) else {
                    return missing(metric);
                };
                let actual = family.metric_type.as_prometheus_type();
                if actual.eq_ignore_ascii_case(expected) {
                    CheckOutcome::pass()
                } else {
                    CheckOutcome::fail(format!(
                        "expected metric {metric} should be of type {expected} but was {actual}"
                    ))
                }
            }
            Self::LabelsRequired { metric, labels } => {
                let Some(family) = families.get(metric) else {
                    return missing(metric);
                };
                for instance in &family.metrics {
                    if let Some(label) = labels.iter().find(|label| !instance.has_label(label)) {
                        return CheckOutcome::fail(format!(
                            "expected label {label} is missing in metric {metric}"
                        ));
                    }
                }
                CheckOutcome::pass()
            }
            Self::LabelsDisallowed { metric, labels } => {
                let Some(family) = families.get(metric) else {
                    return missing(metric);
                };
                for instance in &family.metrics {
                    if let Some(label) = labels.iter().find(|label| instance.has_label(label)) {
                        return CheckOutcome::fail(format!(
                            "disallowed label {label} is present in metric {metric}"
                        ));
                    }
                }
                CheckOutcome::pass()
            }
            Self::SampleExists { metric, filter } => {
                let Some(family) = families.get(metric) else {
                    return missing(metric);
                };
                if family.metrics.iter().any(|instance| filter.matches(instance)) {
                    CheckOutcome::pass()
                } else {
                    CheckOutcome::fail(format!(
                        "expected sample {filter} not found in metric {metric}"
                    ))
                }
            }
            Self::SampleValue {
                metric,
                filter,
                value,
            } => {
                let Some(family) = families.get(metric) else {
                    return missing(metric);
                };
                let found = family
                    .metrics
                    .iter()
                    .filter(|instance| filter.matches(instance))
                    .any(|instance| instance.value.scalar() == *value);
                if found {
                    CheckOutcome::pass()
                } else {
                    CheckOutcome::fail(format!(
                        "expected value {value} for sample {filter} not found in metric {metric}"
                    ))
                }
            }
        }
    }
}

impl fmt::Display for Checker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DisallowMetrics { metrics } => {
                write!(f, "disallow-metrics[{}]", metrics.join(", "))
            }
            Self::DisallowEmpty => f.write_str("disallow-empty"),
            Self::MetricExists { metric } => write!(f, "exists({metric})"),
            Self::MetricType { metric, expected } => write!(f, "type({metric}, {expected})"),
            Self::LabelsRequired { metric, labels } => {
                write!(f, "labels-required({metric}, [{}])", labels.join(", "))
            }
            Self::LabelsDisallowed { metric, labels } => {
                write!(f, "labels-disallowed({metric}, [{}])", labels.join(", "))
            }
            Self::SampleExists { metric, filter } => write!(f, "sample-exists({metric}{filter})"),
            Self::SampleValue {
                metric,
                filter,
                value,
            } => write!(f, "sample-value({metric}{filter} == {value})"),
        }
    }
}

fn missing(metric: &str) -> CheckOutcome {
    CheckOutcome::fail(format!("expected metric {metric} is missing"))
}
