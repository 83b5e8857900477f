//! Hard parameter-space rules plus user restrictions.

use bt_types::{BtResult, ParameterPoint, SearchError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::restriction::Restriction;

/// Names of the parameters carrying the fixed domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainNames {
    /// Node capacity, must be at least 2.
    pub max_entries: String,
    /// Minimum fill as a percentage of `max_entries`, must lie in [0, 50].
    pub min_fill: String,
}

impl Default for DomainNames {
    fn default() -> Self {
        Self {
            max_entries: "M".to_string(),
            min_fill: "m".to_string(),
        }
    }
}

pub const MIN_MAX_ENTRIES: i64 = 2;
pub const MAX_MIN_FILL_PERCENT: i64 = 50;

/// Decides whether a candidate point may be evaluated at all.
#[derive(Debug, Clone, Default)]
pub struct ParameterSpaceValidator {
    names: DomainNames,
    restrictions: Vec<Restriction>,
}

impl ParameterSpaceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and attach restriction expressions.
    pub fn with_restrictions<S: AsRef<str>>(mut self, sources: &[S]) -> Result<Self, SearchError> {
        for source in sources {
            self.restrictions.push(Restriction::parse(source.as_ref())?);
        }
        Ok(self)
    }

    pub fn with_names(mut self, names: DomainNames) -> Self {
        self.names = names;
        self
    }

    pub fn names(&self) -> &DomainNames {
        &self.names
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    /// Domain rules first, then every restriction in order.
    ///
    /// A restriction that cannot be evaluated (unknown name, division by
    /// zero) is reported as an error.
    pub fn check(&self, point: &ParameterPoint) -> BtResult<bool> {
        if let Some(max_entries) = point.get(&self.names.max_entries) {
            if max_entries < MIN_MAX_ENTRIES {
                return Ok(false);
            }
        }
        if let Some(min_fill) = point.get(&self.names.min_fill) {
            if !(0..=MAX_MIN_FILL_PERCENT).contains(&min_fill) {
                return Ok(false);
            }
        }

        for restriction in &self.restrictions {
            if !restriction.evaluate(point)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Like [`check`](Self::check) with evaluation errors counted as invalid.
    pub fn is_valid(&self, point: &ParameterPoint) -> bool {
        match self.check(point) {
            Ok(valid) => valid,
            Err(e) => {
                debug!(point = %point, error = %e, "restriction failed to evaluate");
                false
            }
        }
    }
}
