use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ReportError, ReportResult};
use crate::input::reader::read_json;

/// Automated noisy-channel detection scores of one run.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoScores {
    pub ch_names: Vec<String>,
    #[serde(default)]
    pub ch_types: Vec<String>,
    pub scores_noisy: Vec<f64>,
    #[serde(default)]
    pub limit_noisy: Option<f64>,
    #[serde(default)]
    pub bads: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelScores {
    pub ch_type: String,
    pub names: Vec<String>,
    pub scores: Vec<f64>,
}

impl AutoScores {
    /// Channel scores grouped per channel type, in first-seen type order.
    pub fn by_type(&self) -> Vec<ChannelScores> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, ChannelScores> = BTreeMap::new();
        for (idx, name) in self.ch_names.iter().enumerate() {
            let ch_type = self
                .ch_types
                .get(idx)
                .cloned()
                .unwrap_or_else(|| "all".to_string());
            let group = groups.entry(ch_type.clone()).or_insert_with(|| {
                order.push(ch_type.clone());
                ChannelScores {
                    ch_type: ch_type.clone(),
                    names: Vec::new(),
                    scores: Vec::new(),
                }
            });
            group.names.push(name.clone());
            group.scores.push(self.scores_noisy[idx]);
        }
        order
            .into_iter()
            .filter_map(|t| groups.remove(&t))
            .collect()
    }
}

pub fn read_auto_scores(path: &Path) -> ReportResult<AutoScores> {
    let scores: AutoScores = read_json(path)?;
    if scores.ch_names.len() != scores.scores_noisy.len() {
        return Err(ReportError::ShapeMismatch(format!(
            "{}: {} channel names but {} scores",
            path.display(),
            scores.ch_names.len(),
            scores.scores_noisy.len()
        )));
    }
    if !scores.ch_types.is_empty() && scores.ch_types.len() != scores.ch_names.len() {
        return Err(ReportError::ShapeMismatch(format!(
            "{}: {} channel types for {} channels",
            path.display(),
            scores.ch_types.len(),
            scores.ch_names.len()
        )));
    }
    Ok(scores)
}
