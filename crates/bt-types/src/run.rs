//! Reporter specifications and the samples produced by one benchmark run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ReportError;

/// A reporter requested from the benchmark executable, passed as
/// `<name>:<arguments>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReporterSpec {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl ReporterSpec {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Command line form handed to the benchmark process.
    pub fn to_arg(&self) -> String {
        format!("{}:{}", self.name, self.arguments)
    }
}

impl fmt::Display for ReporterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_arg())
    }
}

impl FromStr for ReporterSpec {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, arguments)) if !name.is_empty() => Ok(Self::new(name, arguments)),
            _ => Err(ReportError::InvalidSpec {
                spec: s.to_string(),
            }),
        }
    }
}

/// The tab-separated table one reporter produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterBlock {
    pub reporter: ReporterSpec,
    pub header: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl ReporterBlock {
    /// A block for a reporter that produced nothing this run.
    pub fn empty(reporter: ReporterSpec) -> Self {
        Self {
            reporter,
            header: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.header.iter().position(|h| h == field)
    }

    /// Records as `(field, value)` pairs.
    pub fn rows(&self) -> impl Iterator<Item = Vec<(&str, &str)>> + '_ {
        self.records.iter().map(move |record| {
            self.header
                .iter()
                .map(String::as_str)
                .zip(record.iter().map(String::as_str))
                .collect()
        })
    }
}

/// Selects timing samples out of reporter blocks: records whose
/// `name_field` equals `metric` contribute their numeric `value_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSelector {
    pub name_field: String,
    pub value_field: String,
    pub metric: String,
}

impl Default for MetricSelector {
    fn default() -> Self {
        Self {
            name_field: "name".to_string(),
            value_field: "value".to_string(),
            metric: "PAPI_REAL_NSEC".to_string(),
        }
    }
}

impl MetricSelector {
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }
}

/// Everything one benchmark execution reported, grouped by reporter in
/// request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub blocks: Vec<ReporterBlock>,
}

impl RunResult {
    pub fn new(blocks: Vec<ReporterBlock>) -> Self {
        Self { blocks }
    }

    pub fn block(&self, reporter: &str) -> Option<&ReporterBlock> {
        self.blocks.iter().find(|b| b.reporter.name == reporter)
    }

    pub fn record_count(&self) -> usize {
        self.blocks.iter().map(|b| b.records.len()).sum()
    }

    /// All samples of the selected metric across every reporter block.
    ///
    /// Blocks lacking either selector field are skipped; a matching record
    /// with a non-numeric value is an error.
    pub fn samples(&self, selector: &MetricSelector) -> Result<Vec<f64>, ReportError> {
        let mut samples = Vec::new();

        for block in &self.blocks {
            let (Some(name_idx), Some(value_idx)) = (
                block.field_index(&selector.name_field),
                block.field_index(&selector.value_field),
            ) else {
                continue;
            };

            for record in &block.records {
                if record.get(name_idx).map(String::as_str) != Some(selector.metric.as_str()) {
                    continue;
                }
                let raw = record.get(value_idx).map(String::as_str).unwrap_or("");
                let value = raw.trim().parse::<f64>().map_err(|_| ReportError::NotNumeric {
                    reporter: block.reporter.name.clone(),
                    field: selector.value_field.clone(),
                    value: raw.to_string(),
                })?;
                samples.push(value);
            }
        }

        Ok(samples)
    }

    /// Smallest sample of the selected metric, if any was reported.
    pub fn min_sample(&self, selector: &MetricSelector) -> Result<Option<f64>, ReportError> {
        Ok(self.samples(selector)?.into_iter().reduce(f64::min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn papi_block(rows: &[(&str, &str)]) -> ReporterBlock {
        ReporterBlock {
            reporter: ReporterSpec::new("papi", "3"),
            header: vec!["name".into(), "value".into()],
            records: rows
                .iter()
                .map(|(n, v)| vec![n.to_string(), v.to_string()])
                .collect(),
        }
    }

    #[test]
    fn reporter_spec_round_trip_arg() {
        let spec: ReporterSpec = "papi:runs=3".parse().unwrap();
        assert_eq!(spec.name, "papi");
        assert_eq!(spec.arguments, "runs=3");
        assert_eq!(spec.to_arg(), "papi:runs=3");
        assert!("papi".parse::<ReporterSpec>().is_err());
    }

    #[test]
    fn samples_select_metric_rows() {
        let result = RunResult::new(vec![papi_block(&[
            ("PAPI_TOT_INS", "900"),
            ("PAPI_REAL_NSEC", "120.5"),
            ("PAPI_REAL_NSEC", "110"),
        ])]);

        let selector = MetricSelector::default();
        assert_eq!(result.samples(&selector).unwrap(), vec![120.5, 110.0]);
        assert_eq!(result.min_sample(&selector).unwrap(), Some(110.0));
    }

    #[test]
    fn samples_skip_blocks_without_fields() {
        let other = ReporterBlock {
            reporter: ReporterSpec::new("struct", ""),
            header: vec!["depth".into()],
            records: vec![vec!["4".into()]],
        };
        let papi = ReporterBlock::empty(ReporterSpec::new("papi", ""));
        let result = RunResult::new(vec![other, papi]);
        assert_eq!(result.min_sample(&MetricSelector::default()).unwrap(), None);
    }

    #[test]
    fn samples_reject_non_numeric_value() {
        let result = RunResult::new(vec![papi_block(&[("PAPI_REAL_NSEC", "fast")])]);
        assert!(matches!(
            result.samples(&MetricSelector::default()),
            Err(ReportError::NotNumeric { .. })
        ));
    }
}
