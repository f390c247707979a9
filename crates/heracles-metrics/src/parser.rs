use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use prometheus_parse::{LineInfo, Sample, Scrape, Value};

use crate::{
    error::{ParseError, Result},
    types::{Metric, MetricFamilies, MetricFamily, MetricType, MetricValue},
};

type Labels = Vec<(String, String)>;

/// Stands in for "no timestamp on the line"; real exposition timestamps are
/// never this far in the past.
const NO_TIMESTAMP: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Sum,
    Count,
}

/// Parses a Prometheus text exposition payload into families keyed by name.
///
/// Tokenizing is left to `prometheus-parse`. Its histogram and summary
/// samples carry only buckets or quantiles, so the `_sum` and `_count` lines
/// of declared histograms and summaries are folded back into the instance
/// with the same labels. Families declared with `# TYPE` but without any
/// sample are dropped.
pub fn parse_text(input: &str) -> Result<MetricFamilies> {
    let declared = declared_types(input)?;
    let lines = input.lines().map(|line| Ok(strip_empty_label_set(line)));
    let scrape = Scrape::parse_at(lines, NO_TIMESTAMP)
        .map_err(|err| ParseError::new(0, err.to_string()))?;

    let mut assembler = FamilyAssembler {
        declared,
        docs: scrape.docs,
        families: MetricFamilies::new(),
    };
    Ok(assembler.assemble(scrape.samples))
}

/// Collects `# TYPE` declarations and rejects lines the tokenizer would
/// silently skip.
fn declared_types(input: &str) -> Result<HashMap<String, MetricType>> {
    let mut declared = HashMap::new();

    for (index, raw) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = strip_empty_label_set(raw.trim());

        match LineInfo::parse(&line) {
            LineInfo::Type {
                metric_name,
                metric_alias,
                ..
            } => {
                let token = line.split_whitespace().nth(3).unwrap_or_default();
                let metric_type = token
                    .parse::<MetricType>()
                    .map_err(|message| ParseError::new(line_number, message))?;
                declared.insert(metric_alias.unwrap_or(metric_name), metric_type);
            }
            LineInfo::Sample { value, .. } => {
                if parse_float(value).is_none() {
                    return Err(ParseError::new(
                        line_number,
                        format!("invalid value {value:?}"),
                    ));
                }
            }
            LineInfo::Ignored if !line.starts_with('#') => {
                return Err(ParseError::new(
                    line_number,
                    format!("malformed sample line {line:?}"),
                ));
            }
            _ => {}
        }
    }

    Ok(declared)
}

struct FamilyAssembler {
    declared: HashMap<String, MetricType>,
    docs: HashMap<String, String>,
    families: MetricFamilies,
}

impl FamilyAssembler {
    fn assemble(&mut self, samples: Vec<Sample>) -> MetricFamilies {
        let (grouped, plain): (Vec<_>, Vec<_>) = samples
            .into_iter()
            .partition(|sample| matches!(sample.value, Value::Histogram(_) | Value::Summary(_)));

        for sample in grouped {
            self.add_grouped(sample);
        }
        for sample in plain {
            self.add_plain(sample);
        }

        // Grouped samples come out of a hash map.
        for family in self.families.values_mut() {
            if matches!(
                family.metric_type,
                MetricType::Histogram | MetricType::Summary
            ) {
                family.metrics.sort_by(|left, right| left.labels.cmp(&right.labels));
            }
        }

        std::mem::take(&mut self.families)
    }

    fn add_grouped(&mut self, sample: Sample) {
        let (metric_type, value) = match &sample.value {
            Value::Histogram(counts) => (
                MetricType::Histogram,
                MetricValue::Histogram {
                    buckets: counts.iter().map(|c| (c.less_than, c.count)).collect(),
                    count: 0.0,
                    sum: 0.0,
                },
            ),
            Value::Summary(counts) => (
                MetricType::Summary,
                MetricValue::Summary {
                    quantiles: counts.iter().map(|c| (c.quantile, c.count)).collect(),
                    count: 0.0,
                    sum: 0.0,
                },
            ),
            _ => return,
        };

        let metric = Metric {
            labels: convert_labels(&sample),
            value,
            timestamp_ms: explicit_timestamp(sample.timestamp),
        };
        self.family(&sample.metric, metric_type).metrics.push(metric);
    }

    fn add_plain(&mut self, sample: Sample) {
        let (metric_type, value) = match &sample.value {
            Value::Counter(value) => (MetricType::Counter, MetricValue::Counter(*value)),
            Value::Gauge(value) => (MetricType::Gauge, MetricValue::Gauge(*value)),
            Value::Untyped(value) => (MetricType::Untyped, MetricValue::Untyped(*value)),
            Value::Histogram(_) | Value::Summary(_) => return,
        };

        if let Some((base, base_type, aggregate)) = self.aggregate_of(&sample.metric) {
            let labels = convert_labels(&sample);
            let metric = self.instance(&base, base_type, labels, sample.timestamp);
            set_aggregate(&mut metric.value, aggregate, value.scalar());
            return;
        }

        let metric = Metric {
            labels: convert_labels(&sample),
            value,
            timestamp_ms: explicit_timestamp(sample.timestamp),
        };
        self.family(&sample.metric, metric_type).metrics.push(metric);
    }

    /// Base family of a `_sum`/`_count` line belonging to a declared
    /// histogram or summary.
    fn aggregate_of(&self, name: &str) -> Option<(String, MetricType, Aggregate)> {
        [("_sum", Aggregate::Sum), ("_count", Aggregate::Count)]
            .into_iter()
            .find_map(|(suffix, aggregate)| {
                let base = name.strip_suffix(suffix)?;
                match self.declared.get(base) {
                    Some(base_type @ (MetricType::Histogram | MetricType::Summary)) => {
                        Some((base.to_string(), *base_type, aggregate))
                    }
                    _ => None,
                }
            })
    }

    fn family(&mut self, name: &str, metric_type: MetricType) -> &mut MetricFamily {
        let help = self.docs.get(name).cloned();
        self.families
            .entry(name.to_string())
            .or_insert_with(|| MetricFamily {
                help,
                ..MetricFamily::new(name, metric_type)
            })
    }

    fn instance(
        &mut self,
        base: &str,
        metric_type: MetricType,
        labels: Labels,
        timestamp: DateTime<Utc>,
    ) -> &mut Metric {
        let family = self.family(base, metric_type);
        let index = match family.metrics.iter().position(|m| m.labels == labels) {
            Some(index) => index,
            None => {
                family.metrics.push(Metric {
                    labels,
                    value: empty_value(metric_type),
                    timestamp_ms: explicit_timestamp(timestamp),
                });
                family.metrics.len() - 1
            }
        };
        &mut family.metrics[index]
    }
}

fn empty_value(metric_type: MetricType) -> MetricValue {
    match metric_type {
        MetricType::Summary => MetricValue::Summary {
            quantiles: Vec::new(),
            count: 0.0,
            sum: 0.0,
        },
        _ => MetricValue::Histogram {
            buckets: Vec::new(),
            count: 0.0,
            sum: 0.0,
        },
    }
}

fn set_aggregate(value: &mut MetricValue, aggregate: Aggregate, scalar: f64) {
    if let MetricValue::Summary { count, sum, .. } | MetricValue::Histogram { count, sum, .. } =
        value
    {
        match aggregate {
            Aggregate::Sum => *sum = scalar,
            Aggregate::Count => *count = scalar,
        }
    }
}

/// Labels sorted by name, with exposition escapes resolved.
fn convert_labels(sample: &Sample) -> Labels {
    sample
        .labels
        .iter()
        .map(|(name, value)| (name.clone(), unescape_label_value(value)))
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .collect()
}

fn explicit_timestamp(timestamp: DateTime<Utc>) -> Option<i64> {
    (timestamp != NO_TIMESTAMP).then(|| timestamp.timestamp_millis())
}

fn parse_float(token: &str) -> Option<f64> {
    if token.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    token.parse().ok()
}

/// `up{} 1` is valid exposition but the tokenizer only accepts non-empty
/// label sets.
fn strip_empty_label_set(line: &str) -> String {
    if line.trim_start().starts_with('#') {
        return line.to_string();
    }
    match line.find('{') {
        Some(start) if line[start..].starts_with("{}") => {
            format!("{}{}", &line[..start], &line[start + 2..])
        }
        _ => line.to_string(),
    }
}

fn unescape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::types::{MetricType, MetricValue};

    use super::parse_text;

    #[test]
    fn parses_counter_and_gauge_families() {
        let families = parse_text(
            "# HELP http_requests_total Total requests.\n\
             # TYPE http_requests_total counter\n\
             http_requests_total{method=\"get\",code=\"200\"} 1027 1395066363000\n\
             http_requests_total{method=\"post\",code=\"400\"} 3\n\
             # TYPE up gauge\n\
             up{} 1\n",
        )
        .unwrap();

        let requests = &families["http_requests_total"];
        assert_eq!(requests.metric_type, MetricType::Counter);
        assert_eq!(requests.help.as_deref(), Some("Total requests."));
        assert_eq!(requests.metrics.len(), 2);
        assert_eq!(requests.metrics[0].label("method"), Some("get"));
        assert_eq!(requests.metrics[0].value, MetricValue::Counter(1027.0));
        assert_eq!(requests.metrics[0].timestamp_ms, Some(1395066363000));
        assert_eq!(requests.metrics[1].timestamp_ms, None);

        let up = &families["up"];
        assert_eq!(up.metric_type, MetricType::Gauge);
        assert!(up.metrics[0].labels.is_empty());
        assert_eq!(up.metrics[0].value, MetricValue::Gauge(1.0));
    }

    #[test]
    fn untyped_samples_form_their_own_family() {
        let families = parse_text("process_start_time_seconds 1.7e9\n").unwrap();
        let family = &families["process_start_time_seconds"];
        assert_eq!(family.metric_type, MetricType::Untyped);
        assert_eq!(family.metrics[0].value, MetricValue::Untyped(1.7e9));
    }

    #[test]
    fn groups_histogram_lines_by_label_set() {
        let families = parse_text(
            "# TYPE rpc_duration_seconds histogram\n\
             rpc_duration_seconds_bucket{service=\"a\",le=\"0.1\"} 2\n\
             rpc_duration_seconds_bucket{service=\"a\",le=\"+Inf\"} 5\n\
             rpc_duration_seconds_sum{service=\"a\"} 3.5\n\
             rpc_duration_seconds_count{service=\"a\"} 5\n\
             rpc_duration_seconds_bucket{service=\"b\",le=\"+Inf\"} 1\n\
             rpc_duration_seconds_sum{service=\"b\"} 0.25\n\
             rpc_duration_seconds_count{service=\"b\"} 1\n",
        )
        .unwrap();

        assert_eq!(families.len(), 1);
        let family = &families["rpc_duration_seconds"];
        assert_eq!(family.metric_type, MetricType::Histogram);
        assert_eq!(family.metrics.len(), 2);
        assert_eq!(
            family.metrics[0].labels,
            vec![("service".to_string(), "a".to_string())]
        );
        match &family.metrics[0].value {
            MetricValue::Histogram {
                buckets,
                count,
                sum,
            } => {
                assert_eq!(buckets, &vec![(0.1, 2.0), (f64::INFINITY, 5.0)]);
                assert_eq!(*count, 5.0);
                assert_eq!(*sum, 3.5);
            }
            other => panic!("unexpected value {other:?}"),
        }
        assert_eq!(family.metrics[1].value.scalar(), 0.25);
    }

    #[test]
    fn groups_summary_quantiles() {
        let families = parse_text(
            "# TYPE gc_duration_seconds summary\n\
             gc_duration_seconds{quantile=\"0.5\"} 0.01\n\
             gc_duration_seconds{quantile=\"0.99\"} 0.2\n\
             gc_duration_seconds_sum 1.5\n\
             gc_duration_seconds_count 42\n",
        )
        .unwrap();

        assert_eq!(families.len(), 1);
        let family = &families["gc_duration_seconds"];
        assert_eq!(family.metric_type, MetricType::Summary);
        assert_eq!(family.metrics.len(), 1);
        assert_eq!(
            family.metrics[0].value,
            MetricValue::Summary {
                quantiles: vec![(0.5, 0.01), (0.99, 0.2)],
                count: 42.0,
                sum: 1.5,
            }
        );
    }

    #[test]
    fn summary_without_quantiles_keeps_sum_and_count() {
        let families = parse_text(
            "# TYPE request_size_bytes summary\n\
             request_size_bytes_sum{path=\"/\"} 2048\n\
             request_size_bytes_count{path=\"/\"} 4\n",
        )
        .unwrap();

        assert_eq!(families.len(), 1);
        let family = &families["request_size_bytes"];
        assert_eq!(family.metric_type, MetricType::Summary);
        assert_eq!(family.metrics[0].label("path"), Some("/"));
        assert_eq!(
            family.metrics[0].value,
            MetricValue::Summary {
                quantiles: Vec::new(),
                count: 4.0,
                sum: 2048.0,
            }
        );
    }

    #[test]
    fn undeclared_sum_lines_stay_plain_families() {
        let families = parse_text("jobs_sum 3\njobs_count 1\n").unwrap();
        assert_eq!(families["jobs_sum"].metric_type, MetricType::Untyped);
        assert_eq!(families["jobs_count"].metrics[0].value.scalar(), 1.0);
    }

    #[test]
    fn unescapes_label_values() {
        let families =
            parse_text("build_info{path=\"C:\\\\bin\",note=\"say \\\"hi\\\"\\n\"} 1\n").unwrap();
        let metric = &families["build_info"].metrics[0];
        assert_eq!(metric.label("path"), Some("C:\\bin"));
        assert_eq!(metric.label("note"), Some("say \"hi\"\n"));
    }

    #[test]
    fn accepts_special_float_values_and_trailing_comma() {
        let families = parse_text(
            "# TYPE temperature gauge\n\
             temperature{room=\"a\",} +Inf\n\
             temperature{room=\"b\"} -Inf\n\
             temperature{room=\"c\"} NaN\n",
        )
        .unwrap();
        let metrics = &families["temperature"].metrics;
        assert_eq!(metrics[0].label("room"), Some("a"));
        assert_eq!(metrics[0].value.scalar(), f64::INFINITY);
        assert_eq!(metrics[1].value.scalar(), f64::NEG_INFINITY);
        assert!(metrics[2].value.scalar().is_nan());
    }

    #[test]
    fn drops_families_without_samples() {
        let families = parse_text("# HELP idle Nothing here.\n# TYPE idle gauge\n").unwrap();
        assert!(families.is_empty());
    }

    #[test]
    fn reports_line_numbers_for_malformed_input() {
        let err = parse_text("up 1\nbroken{job=\"x\" 1\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("malformed sample line"));

        let err = parse_text("# TYPE up gauge\nup one\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("invalid value"));
    }

    #[test]
    fn rejects_unknown_metric_types() {
        let err = parse_text("# TYPE up meter\nup 1\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unknown metric type: meter"));
    }
}
