use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CURVE_POINTS: usize = 2000;
pub const DEFAULT_MIN_CHART_POINTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Point sets are truncated to this many points after sorting.
    pub max_curve_points: usize,
    /// Fewer points than this still import, but the summary reports the curve as not chartable.
    pub min_chart_points: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_curve_points: DEFAULT_MAX_CURVE_POINTS,
            min_chart_points: DEFAULT_MIN_CHART_POINTS,
        }
    }
}
