use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::model::contrast::Contrast;
use crate::model::scores::ScoreValues;

pub const DEFAULT_N_BOOT: usize = 2000;
pub const DEFAULT_N_PERMUTATIONS: usize = 10_000;
pub const DEFAULT_P_THRESHOLD: f64 = 0.05;
pub const DEFAULT_CHANCE_LEVEL: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Uncertainty {
    pub standard_error: ScoreValues,
    pub ci_lower: ScoreValues,
    pub ci_upper: ScoreValues,
}

/// Group summary of one contrast across subjects. `uncertainty` is present
/// exactly when more than one subject contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStatistic {
    pub times: Vec<f64>,
    pub mean: ScoreValues,
    pub uncertainty: Option<Uncertainty>,
    pub n_subjects: usize,
    pub decim: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatistic {
    /// Sum of the t-values inside the cluster.
    #[default]
    Mass,
    /// Number of time points in the cluster.
    Extent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermutationCluster {
    pub start: usize,
    pub stop: usize,
    pub t_start: f64,
    pub t_stop: f64,
    pub mass: f64,
    pub p_value: f64,
}

impl PermutationCluster {
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_significant(&self, threshold: f64) -> bool {
        self.p_value < threshold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterTestResult {
    pub times: Vec<f64>,
    pub t_values: Vec<f64>,
    pub t_threshold: f64,
    pub clusters: Vec<PermutationCluster>,
    pub n_permutations: usize,
    pub p_threshold: f64,
    pub statistic: ClusterStatistic,
}

impl ClusterTestResult {
    pub fn significant(&self) -> impl Iterator<Item = &PermutationCluster> {
        self.clusters
            .iter()
            .filter(|c| c.is_significant(self.p_threshold))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapParams {
    pub n_boot: usize,
}

impl BootstrapParams {
    pub fn validate(&self) -> ReportResult<()> {
        if self.n_boot < 1 {
            return Err(ReportError::Configuration(
                "n_boot must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BootstrapParams {
    fn default() -> Self {
        Self {
            n_boot: DEFAULT_N_BOOT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterTestParams {
    pub n_permutations: usize,
    pub p_threshold: f64,
    /// Explicit cluster-forming threshold; derived from `p_threshold` and the
    /// degrees of freedom when absent.
    pub t_threshold: Option<f64>,
    pub chance_level: f64,
    pub statistic: ClusterStatistic,
}

impl ClusterTestParams {
    pub fn validate(&self) -> ReportResult<()> {
        if self.n_permutations < 1 {
            return Err(ReportError::Configuration(
                "number of permutations must be at least 1".to_string(),
            ));
        }
        if !(self.p_threshold > 0.0 && self.p_threshold < 1.0) {
            return Err(ReportError::Configuration(format!(
                "cluster permutation p threshold must lie in (0, 1), got {}",
                self.p_threshold
            )));
        }
        if let Some(t) = self.t_threshold
            && !t.is_finite()
        {
            return Err(ReportError::Configuration(
                "cluster forming t threshold must be finite".to_string(),
            ));
        }
        if !self.chance_level.is_finite() {
            return Err(ReportError::Configuration(
                "chance level must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Smallest p-value the test can report.
    pub fn min_p_value(&self) -> f64 {
        1.0 / (self.n_permutations as f64 + 1.0)
    }
}

impl Default for ClusterTestParams {
    fn default() -> Self {
        Self {
            n_permutations: DEFAULT_N_PERMUTATIONS,
            p_threshold: DEFAULT_P_THRESHOLD,
            t_threshold: None,
            chance_level: DEFAULT_CHANCE_LEVEL,
            statistic: ClusterStatistic::Mass,
        }
    }
}

/// Grand-average decoding output for one contrast, persisted next to the
/// group report.
#[derive(Debug, Clone, Serialize)]
pub struct ContrastStatistics {
    pub contrast: Contrast,
    pub metric: String,
    pub subjects: Vec<String>,
    pub full_epochs: GroupStatistic,
    pub full_epochs_subject_means: Vec<f64>,
    pub time_by_time: GroupStatistic,
    pub time_generalization: Option<GroupStatistic>,
    pub clusters: Option<ClusterTestResult>,
    pub n_boot: usize,
}
