use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    time::Duration,
};

use heracles_core::{CheckSettings, HeraclesError, Result};
use serde::Deserialize;

/// One named group of the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub compose_file: PathBuf,
    /// Compose service running the exporter.
    pub container: String,
    /// Container port the exporter listens on.
    pub port: u16,
    /// When set, the exporter is scraped here and no compose service is awaited.
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub startup_timeout: Duration,
    pub hooks: Vec<HookConfig>,
    #[serde(flatten)]
    pub check: CheckSettings,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            compose_file: PathBuf::from("docker-compose.yml"),
            container: "exporter".to_string(),
            port: 80,
            base_url: String::new(),
            startup_timeout: Duration::from_secs(60),
            hooks: Vec::new(),
            check: CheckSettings::default(),
        }
    }
}

impl GroupConfig {
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for metric in &self.check.metrics {
            if metric.name.is_empty() {
                return Err(HeraclesError::Config("metric rule without a name".to_string()));
            }
            if !seen.insert(metric.name.as_str()) {
                return Err(HeraclesError::Config(format!(
                    "metric {} is configured more than once",
                    metric.name
                )));
            }
        }

        if let Some(hook) = self.hooks.iter().find(|hook| hook.name.is_empty()) {
            return Err(HeraclesError::Config(format!(
                "hook without a name (setup: {:?})",
                hook.setup
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub name: String,
    /// Compose service to run the commands in; the host shell when absent.
    pub container: Option<String>,
    pub setup: Vec<String>,
    pub teardown: Vec<String>,
}

pub fn load_group(path: &Path, group: &str) -> Result<GroupConfig> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        HeraclesError::Config(format!("failed to read {}: {err}", path.display()))
    })?;
    parse_group(&text, group)
}

pub fn parse_group(text: &str, group: &str) -> Result<GroupConfig> {
    let mut groups: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(text)
        .map_err(|err| HeraclesError::Config(format!("malformed configuration: {err}")))?;

    let value = groups
        .remove(group)
        .ok_or_else(|| HeraclesError::Config(format!("invalid group: {group}")))?;

    let config = if value.is_null() {
        GroupConfig::default()
    } else {
        serde_yaml::from_value(value).map_err(|err| {
            HeraclesError::Config(format!("invalid settings in group {group}: {err}"))
        })?
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use heracles_core::{HeraclesError, SampleMatch};

    use super::parse_group;

    const CONFIG: &str = r#"
exporter:
  compose_file: deploy/compose.yaml
  container: node-exporter
  port: 9100
  wait: 1s
  startup_timeout: 2m
  disallowed_metrics: [go_memstats_debug]
  metrics:
    - name: node_load1
      type: gauge
      samples:
        - labels: {instance: "a"}
          match: subset
  hooks:
    - name: seed
      setup: ["./seed.sh"]
      teardown: ["./clean.sh"]
    - name: warm-cache
      container: redis
      setup: ["redis-cli ping"]
external:
  base_url: http://10.0.0.5:9100
  allow_empty: true
empty:
"#;

    #[test]
    fn loads_a_compose_group() {
        let config = parse_group(CONFIG, "exporter").unwrap();
        assert_eq!(config.compose_file, PathBuf::from("deploy/compose.yaml"));
        assert_eq!(config.container, "node-exporter");
        assert_eq!(config.port, 9100);
        assert_eq!(config.startup_timeout, Duration::from_secs(120));
        assert_eq!(config.check.wait, Duration::from_secs(1));
        assert_eq!(config.check.path, "/metrics");
        assert_eq!(config.check.disallowed_metrics, vec!["go_memstats_debug"]);
        assert_eq!(config.check.metrics[0].samples[0].match_mode, SampleMatch::Subset);
        assert_eq!(config.hooks.len(), 2);
        assert_eq!(config.hooks[0].container, None);
        assert_eq!(config.hooks[1].container.as_deref(), Some("redis"));
    }

    #[test]
    fn applies_defaults() {
        let config = parse_group(CONFIG, "external").unwrap();
        assert_eq!(config.base_url, "http://10.0.0.5:9100");
        assert!(config.check.allow_empty);
        assert_eq!(config.compose_file, PathBuf::from("docker-compose.yml"));
        assert_eq!(config.container, "exporter");
        assert_eq!(config.check.wait, Duration::from_secs(3));

        let config = parse_group(CONFIG, "empty").unwrap();
        assert!(config.base_url.is_empty());
        assert!(!config.check.allow_empty);
    }

    #[test]
    fn unknown_group_is_a_config_error() {
        let err = parse_group(CONFIG, "missing").unwrap_err();
        assert!(matches!(err, HeraclesError::Config(message) if message == "invalid group: missing"));
    }

    #[test]
    fn rejects_duplicate_metric_rules() {
        let err = parse_group(
            "exporter:\n  metrics:\n    - name: up\n    - name: up\n",
            "exporter",
        )
        .unwrap_err();
        assert!(err.to_string().contains("configured more than once"));
    }
}
