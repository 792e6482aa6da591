use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::model::contrast::{Contrast, ContrastSpec};
use crate::model::stats::{
    BootstrapParams, ClusterStatistic, ClusterTestParams, DEFAULT_CHANCE_LEVEL, DEFAULT_N_BOOT,
    DEFAULT_N_PERMUTATIONS, DEFAULT_P_THRESHOLD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialFilter {
    Ica,
    Ssp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NoiseCovSource {
    #[default]
    Baseline,
    Emptyroom,
    Rest,
    AdHoc,
}

impl NoiseCovSource {
    pub fn processing_label(self) -> Option<&'static str> {
        match self {
            NoiseCovSource::Baseline => None,
            NoiseCovSource::Emptyroom => Some("emptyroom"),
            NoiseCovSource::Rest => Some("rest"),
            NoiseCovSource::AdHoc => Some("adhoc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelSelection {
    Keyword(String),
    Names(Vec<String>),
}

impl Default for ChannelSelection {
    fn default() -> Self {
        ChannelSelection::Keyword("all".to_string())
    }
}

impl ChannelSelection {
    pub fn describe(&self, ch_types: &[String]) -> String {
        match self {
            ChannelSelection::Keyword(k) if k == "ch_types" => {
                format!("channel types: {}", ch_types.join(", "))
            }
            ChannelSelection::Keyword(k) => format!("channels: {k}"),
            ChannelSelection::Names(names) => format!("channels: {}", names.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PsdRuns {
    Keyword(String),
    Runs(Vec<String>),
}

impl Default for PsdRuns {
    fn default() -> Self {
        PsdRuns::Keyword("all".to_string())
    }
}

impl PsdRuns {
    pub fn includes(&self, run: Option<&str>) -> bool {
        match self {
            PsdRuns::Keyword(k) => k == "all",
            PsdRuns::Runs(runs) => run.is_some_and(|r| runs.iter().any(|x| x == r)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub bids_root: PathBuf,
    pub deriv_root: Option<PathBuf>,
    pub subjects: Vec<String>,
    pub exclude_subjects: Vec<String>,
    pub sessions: Vec<String>,
    pub task: Option<String>,
    pub task_is_rest: bool,
    pub runs: Vec<String>,
    pub datatype: String,
    pub acq: Option<String>,
    pub rec: Option<String>,
    pub space: Option<String>,
    pub proc: Option<String>,
    pub ch_types: Vec<String>,

    pub conditions: Vec<String>,
    pub contrasts: Vec<ContrastSpec>,

    pub decode: bool,
    pub decoding_metric: String,
    pub decoding_time_generalization: bool,
    pub n_boot: usize,
    pub cluster_n_permutations: usize,
    pub cluster_permutation_p_threshold: f64,
    pub cluster_forming_t_threshold: Option<f64>,
    pub cluster_statistic: ClusterStatistic,
    pub chance_level: f64,
    pub random_state: u64,

    pub analyze_channels: ChannelSelection,
    pub spatial_filter: Option<SpatialFilter>,
    pub find_noisy_channels_meg: bool,
    pub eog_channels: Vec<String>,
    pub plot_psd_for_runs: PsdRuns,
    pub time_frequency_conditions: Vec<String>,
    pub noise_cov: NoiseCovSource,

    pub inverse_method: String,
    pub fs_subjects_dir: Option<PathBuf>,
    pub fs_subject: Option<String>,
    pub use_template_mri: Option<String>,
    pub report_evoked_n_time_points: Option<usize>,
    pub report_stc_n_time_points: Option<usize>,

    pub n_jobs: usize,

    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bids_root: PathBuf::from("."),
            deriv_root: None,
            subjects: Vec::new(),
            exclude_subjects: Vec::new(),
            sessions: Vec::new(),
            task: None,
            task_is_rest: false,
            runs: Vec::new(),
            datatype: "meg".to_string(),
            acq: None,
            rec: None,
            space: None,
            proc: None,
            ch_types: vec!["meg".to_string()],
            conditions: Vec::new(),
            contrasts: Vec::new(),
            decode: true,
            decoding_metric: "roc_auc".to_string(),
            decoding_time_generalization: false,
            n_boot: DEFAULT_N_BOOT,
            cluster_n_permutations: DEFAULT_N_PERMUTATIONS,
            cluster_permutation_p_threshold: DEFAULT_P_THRESHOLD,
            cluster_forming_t_threshold: None,
            cluster_statistic: ClusterStatistic::Mass,
            chance_level: DEFAULT_CHANCE_LEVEL,
            random_state: 42,
            analyze_channels: ChannelSelection::default(),
            spatial_filter: None,
            find_noisy_channels_meg: false,
            eog_channels: Vec::new(),
            plot_psd_for_runs: PsdRuns::default(),
            time_frequency_conditions: Vec::new(),
            noise_cov: NoiseCovSource::Baseline,
            inverse_method: "dSPM".to_string(),
            fs_subjects_dir: None,
            fs_subject: None,
            use_template_mri: None,
            report_evoked_n_time_points: None,
            report_stc_n_time_points: None,
            n_jobs: 1,
            source_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> ReportResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut cfg: PipelineConfig =
            serde_json::from_str(&text).map_err(|source| ReportError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.source_path = Some(path.to_path_buf());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ReportResult<()> {
        self.bootstrap_params().validate()?;
        self.cluster_params().validate()?;
        if self.n_jobs == 0 {
            return Err(ReportError::Configuration(
                "n_jobs must be at least 1".to_string(),
            ));
        }
        if self.decoding_metric.trim().is_empty() {
            return Err(ReportError::Configuration(
                "decoding_metric must not be empty".to_string(),
            ));
        }
        for spec in &self.contrasts {
            if let ContrastSpec::Weighted {
                name,
                conditions,
                weights,
            } = spec
                && conditions.len() != weights.len()
            {
                return Err(ReportError::Configuration(format!(
                    "contrast {name}: {} conditions but {} weights",
                    conditions.len(),
                    weights.len()
                )));
            }
        }
        Ok(())
    }

    pub fn deriv_root(&self) -> PathBuf {
        match &self.deriv_root {
            Some(p) => p.clone(),
            None => self
                .bids_root
                .join("derivatives")
                .join(env!("CARGO_PKG_NAME")),
        }
    }

    /// Configured subjects minus exclusions; falls back to the `sub-*`
    /// directories of the BIDS root when none are listed.
    pub fn subjects(&self) -> Vec<String> {
        let mut subjects = if self.subjects.is_empty() {
            discover_subjects(&self.bids_root)
        } else {
            self.subjects.clone()
        };
        subjects.retain(|s| !self.exclude_subjects.contains(s));
        subjects
    }

    pub fn sessions(&self) -> Vec<Option<String>> {
        if self.sessions.is_empty() {
            vec![None]
        } else {
            self.sessions.iter().cloned().map(Some).collect()
        }
    }

    pub fn runs(&self) -> Vec<Option<String>> {
        if self.runs.is_empty() {
            vec![None]
        } else {
            self.runs.iter().cloned().map(Some).collect()
        }
    }

    pub fn decoding_contrasts(&self) -> Vec<Contrast> {
        self.contrasts
            .iter()
            .filter_map(ContrastSpec::as_decoding_pair)
            .collect()
    }

    pub fn contrast_names(&self) -> Vec<String> {
        self.contrasts.iter().map(ContrastSpec::name).collect()
    }

    /// Conditions followed by contrast names, the order evokeds are stored in.
    pub fn evoked_names(&self) -> Vec<String> {
        let mut names = self.conditions.clone();
        names.extend(self.contrast_names());
        names
    }

    pub fn decoding_enabled(&self) -> bool {
        self.decode && !self.decoding_contrasts().is_empty()
    }

    pub fn fs_subject_for(&self, subject: &str) -> String {
        if let Some(template) = &self.use_template_mri {
            return template.clone();
        }
        match &self.fs_subject {
            Some(s) => s.replace("{subject}", subject),
            None => format!("sub-{subject}"),
        }
    }

    pub fn bootstrap_params(&self) -> BootstrapParams {
        BootstrapParams {
            n_boot: self.n_boot,
        }
    }

    pub fn cluster_params(&self) -> ClusterTestParams {
        ClusterTestParams {
            n_permutations: self.cluster_n_permutations,
            p_threshold: self.cluster_permutation_p_threshold,
            t_threshold: self.cluster_forming_t_threshold,
            chance_level: self.chance_level,
            statistic: self.cluster_statistic,
        }
    }

    pub fn metric_label(&self) -> &str {
        match self.decoding_metric.as_str() {
            "roc_auc" => "ROC AUC",
            other => other,
        }
    }
}

fn discover_subjects(bids_root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(bids_root) else {
        return out;
    };
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(label) = name.strip_prefix("sub-") {
            out.push(label.to_string());
        }
    }
    out.sort();
    out
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/config.rs"]
mod tests;
