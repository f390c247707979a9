use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;

pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_WAIT: Duration = Duration::from_secs(3);

/// Assertion and scrape settings for one exporter group.
///
/// Built once from configuration and handed to the runner and the checker
/// builder; nothing reads configuration behind its back.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    pub path: String,
    pub disallowed_metrics: Vec<String>,
    pub allow_empty: bool,
    /// Fixed warm-up sleep after the exporter reports ready. Readiness of
    /// the network endpoint does not always mean the application serves
    /// metrics yet.
    #[serde(with = "humantime_serde")]
    pub wait: Duration,
    pub metrics: Vec<MetricsConfig>,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_METRICS_PATH.to_string(),
            disallowed_metrics: Vec::new(),
            allow_empty: false,
            wait: DEFAULT_WAIT,
            metrics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub name: String,
    #[serde(default, rename = "type")]
    pub metric_type: Option<String>,
    /// Expected value of the label-less sample.
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub disallowed_labels: Vec<String>,
    #[serde(default)]
    pub samples: Vec<MetricSampleConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricSampleConfig {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, rename = "match")]
    pub match_mode: SampleMatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMatch {
    /// A sample matches when no filtered label has a different value and the
    /// sample carries exactly as many labels as the filter has entries.
    #[default]
    ExactCount,
    /// A sample matches when every filter entry is present with an equal value.
    Subset,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CheckSettings, SampleMatch};

    #[test]
    fn applies_defaults_for_missing_keys() {
        let settings: CheckSettings = serde_yaml::from_str("allow_empty: true\n").unwrap();
        assert_eq!(settings.path, "/metrics");
        assert_eq!(settings.wait, Duration::from_secs(3));
        assert!(settings.allow_empty);
        assert!(settings.metrics.is_empty());
    }

    #[test]
    fn deserializes_metric_rules() {
        let settings: CheckSettings = serde_yaml::from_str(
            r#"
path: /custom
wait: 500ms
disallowed_metrics: [debug_info]
metrics:
  - name: up
    type: gauge
    value: 1
  - name: http_requests_total
    labels: [method, code]
    disallowed_labels: [user_id]
    samples:
      - labels: {method: get}
        value: 3
        match: subset
      - labels: {method: post, code: "500"}
"#,
        )
        .unwrap();

        assert_eq!(settings.path, "/custom");
        assert_eq!(settings.wait, Duration::from_millis(500));
        assert_eq!(settings.disallowed_metrics, vec!["debug_info"]);
        assert_eq!(settings.metrics[0].metric_type.as_deref(), Some("gauge"));
        assert_eq!(settings.metrics[0].value, Some(1.0));

        let requests = &settings.metrics[1];
        assert_eq!(requests.labels, vec!["method", "code"]);
        assert_eq!(requests.disallowed_labels, vec!["user_id"]);
        assert_eq!(requests.samples[0].match_mode, SampleMatch::Subset);
        assert_eq!(requests.samples[0].value, Some(3.0));
        assert_eq!(requests.samples[1].match_mode, SampleMatch::ExactCount);
        assert_eq!(requests.samples[1].labels["code"], "500");
    }
}
