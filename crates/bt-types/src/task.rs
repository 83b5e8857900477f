use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CatalogError;

/// Identifier of a build configuration in the catalog.
pub type ConfigId = u64;

/// Identifier of a benchmark (dataset plus reporters) in the catalog.
pub type BenchmarkId = u64;

/// One (configuration, benchmark) pair to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Task {
    pub config_id: ConfigId,
    pub benchmark_id: BenchmarkId,
}

impl Task {
    pub fn new(config_id: ConfigId, benchmark_id: BenchmarkId) -> Self {
        Self {
            config_id,
            benchmark_id,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.config_id, self.benchmark_id)
    }
}

impl FromStr for Task {
    type Err = CatalogError;

    /// Parses the `<config>:<benchmark>` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CatalogError::InvalidTask {
            spec: s.to_string(),
        };

        let (config, benchmark) = s.split_once(':').ok_or_else(invalid)?;
        let config_id = config.trim().parse().map_err(|_| invalid())?;
        let benchmark_id = benchmark.trim().parse().map_err(|_| invalid())?;

        Ok(Self::new(config_id, benchmark_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_task_pair() {
        let task: Task = "12:4".parse().unwrap();
        assert_eq!(task, Task::new(12, 4));
        assert_eq!(task.to_string(), "12:4");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("12".parse::<Task>().is_err());
        assert!("a:4".parse::<Task>().is_err());
        assert!("1:2:3".parse::<Task>().is_err());
    }
}
