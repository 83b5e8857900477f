//! Catalog of build configurations, benchmarks and suites.
//!
//! The catalog is a read-only JSON document describing what can be built and
//! run. Tasks reference it by id.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::errors::{BtResult, CatalogError};
use crate::run::ReporterSpec;
use crate::task::{BenchmarkId, ConfigId, Task};

/// A named index implementation plus the build options it is compiled with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDef {
    pub id: ConfigId,
    /// Build target name of the index (e.g. "rtree").
    pub index: String,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl ConfigDef {
    /// Options in the `name -> string` form the build system consumes.
    pub fn build_options(&self) -> BTreeMap<String, String> {
        self.options
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// A dataset together with the reporters to collect when running it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkDef {
    pub id: BenchmarkId,
    pub dataset: PathBuf,
    /// Dimensionality of the dataset; the build is specialized on it.
    pub dimension: u32,
    #[serde(default)]
    pub reporters: Vec<ReporterSpec>,
}

/// A named group of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteDef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub members: Vec<(ConfigId, BenchmarkId)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    configs: Vec<ConfigDef>,
    #[serde(default)]
    benchmarks: Vec<BenchmarkDef>,
    #[serde(default)]
    suites: Vec<SuiteDef>,
}

/// Indexed view over a catalog document.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    configs: HashMap<ConfigId, ConfigDef>,
    benchmarks: HashMap<BenchmarkId, BenchmarkDef>,
    suites: HashMap<u64, SuiteDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> BtResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> BtResult<Self> {
        let document: CatalogDocument = serde_json::from_str(text)?;
        let mut catalog = Self::new();
        for config in document.configs {
            catalog.add_config(config);
        }
        for benchmark in document.benchmarks {
            catalog.add_benchmark(benchmark);
        }
        for suite in document.suites {
            catalog.add_suite(suite);
        }
        Ok(catalog)
    }

    pub fn add_config(&mut self, config: ConfigDef) {
        self.configs.insert(config.id, config);
    }

    pub fn add_benchmark(&mut self, benchmark: BenchmarkDef) {
        self.benchmarks.insert(benchmark.id, benchmark);
    }

    pub fn add_suite(&mut self, suite: SuiteDef) {
        self.suites.insert(suite.id, suite);
    }

    pub fn config(&self, config_id: ConfigId) -> Result<&ConfigDef, CatalogError> {
        self.configs
            .get(&config_id)
            .ok_or(CatalogError::ConfigNotFound { config_id })
    }

    pub fn benchmark(&self, benchmark_id: BenchmarkId) -> Result<&BenchmarkDef, CatalogError> {
        self.benchmarks
            .get(&benchmark_id)
            .ok_or(CatalogError::BenchmarkNotFound { benchmark_id })
    }

    pub fn suite(&self, suite_id: u64) -> Result<&SuiteDef, CatalogError> {
        self.suites
            .get(&suite_id)
            .ok_or(CatalogError::SuiteNotFound { suite_id })
    }

    /// Expands command line task arguments: `<config>:<benchmark>` names one
    /// task, a bare number names a suite. The result is deduplicated and
    /// sorted.
    pub fn expand_tasks<S: AsRef<str>>(&self, args: &[S]) -> Result<Vec<Task>, CatalogError> {
        let mut tasks = BTreeSet::new();

        for arg in args {
            let arg = arg.as_ref().trim();
            if arg.contains(':') {
                tasks.insert(arg.parse::<Task>()?);
                continue;
            }

            let suite_id = arg.parse::<u64>().map_err(|_| CatalogError::InvalidTask {
                spec: arg.to_string(),
            })?;
            let suite = self.suite(suite_id)?;
            tasks.extend(suite.members.iter().map(|&(c, b)| Task::new(c, b)));
        }

        Ok(tasks.into_iter().collect())
    }
}
