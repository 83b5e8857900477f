//! Conversion of search parameters into build options.

use bt_types::{OptionSet, ParameterPoint};

use crate::validator::DomainNames;

/// Maps a [`ParameterPoint`] onto the absolute [`OptionSet`] given to the
/// build.
///
/// Values are copied verbatim, except that when both the capacity and the
/// minimum-fill parameter are present, the minimum fill is read as a
/// percentage of the capacity and replaced by
/// `clamp(round(M * m / 100), 1, M / 2)`.
#[derive(Debug, Clone, Default)]
pub struct OptionDeriver {
    names: DomainNames,
}

impl OptionDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names(mut self, names: DomainNames) -> Self {
        self.names = names;
        self
    }

    pub fn derive(&self, point: &ParameterPoint) -> OptionSet {
        let max_entries = point.get(&self.names.max_entries);
        let min_fill = point.get(&self.names.min_fill);

        point
            .iter()
            .map(|(name, value)| {
                let value = match (max_entries, min_fill) {
                    (Some(max), Some(percent)) if name == self.names.min_fill => {
                        absolute_min_fill(max, percent)
                    }
                    _ => value,
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

/// Percentage of `max_entries`, rounded half to even, clamped to
/// `[1, max_entries / 2]`.
pub fn absolute_min_fill(max_entries: i64, percent: i64) -> i64 {
    // Keep the upper bound at least 1 so the clamp range is never empty.
    let upper = (max_entries.max(2)) / 2;
    let raw = (max_entries as f64 * percent as f64 / 100.0).round_ties_even();
    (raw as i64).clamp(1, upper)
}
