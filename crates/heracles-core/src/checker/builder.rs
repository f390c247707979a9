use std::collections::BTreeMap;

use crate::{
    checker::{Checker, LabelFilter},
    settings::{CheckSettings, SampleMatch},
};

/// Accumulates global and per-metric checkers and flattens them in insertion
/// order: global checkers first, then each metric's checkers in the order
/// the metric was first mentioned.
#[derive(Debug, Default)]
pub struct CheckerBuilder {
    global: Vec<Checker>,
    per_metric: Vec<(String, Vec<Checker>)>,
}

impl CheckerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the checker list for one check run from settings.
    pub fn from_settings(settings: &CheckSettings) -> Vec<Checker> {
        let mut builder = Self::new();

        if !settings.disallowed_metrics.is_empty() {
            builder.disallowed_metrics(&settings.disallowed_metrics);
        }

        if !settings.allow_empty {
            builder.disallow_empty();
        }

        for metric in &settings.metrics {
            builder.metric_exists(&metric.name);

            if let Some(metric_type) = metric.metric_type.as_deref() {
                builder.metric_type(&metric.name, metric_type);
            }

            if let Some(value) = metric.value {
                builder.sample_value(
                    &metric.name,
                    LabelFilter::new(BTreeMap::new(), SampleMatch::ExactCount),
                    value,
                );
            }

            if !metric.labels.is_empty() {
                builder.required_labels(&metric.name, &metric.labels);
            }

            if !metric.disallowed_labels.is_empty() {
                builder.disallowed_labels(&metric.name, &metric.disallowed_labels);
            }

            for sample in &metric.samples {
                let filter = LabelFilter::new(sample.labels.clone(), sample.match_mode);
                match sample.value {
                    Some(value) => builder.sample_value(&metric.name, filter, value),
                    None => builder.sample_exists(&metric.name, filter),
                };
            }
        }

        builder.build()
    }

    pub fn global_checker(&mut self, checker: Checker) -> &mut Self {
        self.global.push(checker);
        self
    }

    pub fn metric_checkers(
        &mut self,
        metric: &str,
        checkers: impl IntoIterator<Item = Checker>,
    ) -> &mut Self {
        match self.per_metric.iter_mut().find(|(name, _)| name == metric) {
            Some((_, existing)) => existing.extend(checkers),
            None => self
                .per_metric
                .push((metric.to_string(), checkers.into_iter().collect())),
        }
        self
    }

    pub fn disallowed_metrics(&mut self, metrics: &[String]) -> &mut Self {
        self.global_checker(Checker::DisallowMetrics {
            metrics: metrics.to_vec(),
        })
    }

    pub fn disallow_empty(&mut self) -> &mut Self {
        self.global_checker(Checker::DisallowEmpty)
    }

    pub fn metric_exists(&mut self, metric: &str) -> &mut Self {
        self.metric_checkers(
            metric,
            [Checker::MetricExists {
                metric: metric.to_string(),
            }],
        )
    }

    pub fn metric_type(&mut self, metric: &str, expected: &str) -> &mut Self {
        self.metric_checkers(
            metric,
            [Checker::MetricType {
                metric: metric.to_string(),
                expected: expected.to_string(),
            }],
        )
    }

    pub fn required_labels(&mut self, metric: &str, labels: &[String]) -> &mut Self {
        self.metric_checkers(
            metric,
            [Checker::LabelsRequired {
                metric: metric.to_string(),
                labels: labels.to_vec(),
            }],
        )
    }

    pub fn disallowed_labels(&mut self, metric: &str, labels: &[String]) -> &mut Self {
        self.metric_checkers(
            metric,
            [Checker::LabelsDisallowed {
                metric: metric.to_string(),
                labels: labels.to_vec(),
            }],
        )
    }

    pub fn sample_exists(&mut self, metric: &str, filter: LabelFilter) -> &mut Self {
        self.metric_checkers(
            metric,
            [Checker::SampleExists {
                metric: metric.to_string(),
                filter,
            }],
        )
    }

    pub fn sample_value(&mut self, metric: &str, filter: LabelFilter, value: f64) -> &mut Self {
        self.metric_checkers(
            metric,
            [Checker::SampleValue {
                metric: metric.to_string(),
                filter,
                value,
            }],
        )
    }

    pub fn build(self) -> Vec<Checker> {
        let mut checkers = self.global;
        for (_, metric_checkers) in self.per_metric {
            checkers.extend(metric_checkers);
        }
        checkers
    }
}
