//! Parameter points, derived option sets and scored solutions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::SearchError;

/// Canonical, order-independent identity of a [`ParameterPoint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One candidate tuning configuration: parameter name to integer value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterPoint {
    values: BTreeMap<String, i64>,
}

impl ParameterPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: i64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Parses `<name>:<value>` assignments, e.g. `M:50 m:40`.
    pub fn parse_assignments<S: AsRef<str>>(specs: &[S]) -> Result<Self, SearchError> {
        let mut point = Self::new();
        for spec in specs {
            let spec = spec.as_ref();
            let invalid = || SearchError::InvalidParameter {
                spec: spec.to_string(),
            };
            let (name, value) = spec.split_once(':').ok_or_else(invalid)?;
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid());
            }
            let value = value.trim().parse::<i64>().map_err(|_| invalid())?;
            point.values.insert(name.to_string(), value);
        }
        Ok(point)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: i64) -> Option<i64> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn values(&self) -> &BTreeMap<String, i64> {
        &self.values
    }

    /// Sorted `name=value` pairs joined with `,`.
    pub fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey(join_pairs(self.iter()))
    }
}

impl FromIterator<(String, i64)> for ParameterPoint {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ParameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", join_pairs(self.iter()))
    }
}

fn join_pairs<'a>(pairs: impl Iterator<Item = (&'a str, i64)>) -> String {
    pairs
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Absolute build options derived from a [`ParameterPoint`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet {
    options: BTreeMap<String, i64>,
}

impl OptionSet {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.options.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.options.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// String-valued form handed to the build system.
    pub fn to_build_options(&self) -> BTreeMap<String, String> {
        self.options
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

impl FromIterator<(String, i64)> for OptionSet {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Self {
            options: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", join_pairs(self.iter()))
    }
}

/// A parameter point with its score. Lower scores are better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub point: ParameterPoint,
    pub score: f64,
}

impl Solution {
    pub fn new(point: ParameterPoint, score: f64) -> Self {
        Self { point, score }
    }
}
