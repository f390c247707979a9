use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Serialize, Serializer};

/// Scraped families keyed by family name.
pub type MetricFamilies = BTreeMap<String, MetricFamily>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Summary,
    Histogram,
    Untyped,
}

impl MetricType {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Summary => "summary",
            Self::Histogram => "histogram",
            Self::Untyped => "untyped",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_prometheus_type())
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            "summary" => Ok(Self::Summary),
            "histogram" => Ok(Self::Histogram),
            "untyped" => Ok(Self::Untyped),
            other => Err(format!("unknown metric type: {other}")),
        }
    }
}

/// Non-finite values serialize as the exposition spellings `+Inf`, `-Inf`
/// and `NaN`, which JSON numbers cannot carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricValue {
    Counter(#[serde(serialize_with = "serialize_float")] f64),
    Gauge(#[serde(serialize_with = "serialize_float")] f64),
    Summary {
        #[serde(serialize_with = "serialize_float_pairs")]
        quantiles: Vec<(f64, f64)>,
        #[serde(serialize_with = "serialize_float")]
        count: f64,
        #[serde(serialize_with = "serialize_float")]
        sum: f64,
    },
    Histogram {
        #[serde(serialize_with = "serialize_float_pairs")]
        buckets: Vec<(f64, f64)>,
        #[serde(serialize_with = "serialize_float")]
        count: f64,
        #[serde(serialize_with = "serialize_float")]
        sum: f64,
    },
    Untyped(#[serde(serialize_with = "serialize_float")] f64),
}

impl MetricValue {
    /// Single scalar view of the value: gauge, counter, summary sum,
    /// histogram sum, untyped.
    pub fn scalar(&self) -> f64 {
        match self {
            Self::Gauge(value) => *value,
            Self::Counter(value) => *value,
            Self::Summary { sum, .. } => *sum,
            Self::Histogram { sum, .. } => *sum,
            Self::Untyped(value) => *value,
        }
    }
}

struct ExpositionFloat(f64);

impl Serialize for ExpositionFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.0;
        if value.is_finite() {
            serializer.serialize_f64(value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value > 0.0 {
            serializer.serialize_str("+Inf")
        } else {
            serializer.serialize_str("-Inf")
        }
    }
}

fn serialize_float<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    ExpositionFloat(*value).serialize(serializer)
}

fn serialize_float_pairs<S: Serializer>(
    pairs: &[(f64, f64)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(
        pairs
            .iter()
            .map(|(bound, value)| (ExpositionFloat(*bound), ExpositionFloat(*value))),
    )
}

/// One labelled instance inside a family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub labels: Vec<(String, String)>,
    pub value: MetricValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
}

impl Metric {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.label(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFamily {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub metric_type: MetricType,
    pub metrics: Vec<Metric>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: None,
            metric_type,
            metrics: Vec::new(),
        }
    }
}
