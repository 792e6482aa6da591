use std::fmt;

use serde::{Deserialize, Serialize};

/// Contrast entry as written in the configuration file: either a plain pair of
/// conditions (`["auditory", "visual"]`) or a named weighted combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContrastSpec {
    Pair(String, String),
    Weighted {
        name: String,
        conditions: Vec<String>,
        weights: Vec<f64>,
    },
}

impl ContrastSpec {
    pub fn name(&self) -> String {
        match self {
            ContrastSpec::Pair(a, b) => format!("{a}+{b}"),
            ContrastSpec::Weighted { name, .. } => name.clone(),
        }
    }

    /// Only plain pairs are decoded.
    pub fn as_decoding_pair(&self) -> Option<Contrast> {
        match self {
            ContrastSpec::Pair(a, b) => Some(Contrast::new(a, b)),
            ContrastSpec::Weighted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingKind {
    FullEpochs,
    TimeByTime,
}

impl DecodingKind {
    pub fn label(self) -> &'static str {
        match self {
            DecodingKind::FullEpochs => "FullEpochs",
            DecodingKind::TimeByTime => "TimeByTime",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Contrast {
    pub first: String,
    pub second: String,
}

impl Contrast {
    pub fn new(first: &str, second: &str) -> Self {
        Self {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    /// BIDS `proc-` entity of the decoding artifacts for this contrast.
    pub fn processing_label(&self, kind: DecodingKind, metric: &str) -> String {
        let a_vs_b = format!("{}+{}", self.first, self.second).replace(['/', '\\'], "");
        format!("{a_vs_b}+{}+{metric}", kind.label()).replace(['_', '-'], "")
    }

    pub fn tag(&self) -> String {
        format!(
            "{}–{}",
            sanitize_cond_name(&self.first),
            sanitize_cond_name(&self.second)
        )
        .to_lowercase()
        .replace(' ', "-")
    }

    /// Tag of the per-contrast time-by-time section in subject reports.
    pub fn time_by_time_tag(&self) -> String {
        format!(
            "{}-{}",
            condition_tag(&self.first),
            condition_tag(&self.second)
        )
    }

    pub fn section_title(&self) -> String {
        format!("Time-by-time decoding: {self}")
    }

    /// Two-line label used on categorical figure axes.
    pub fn axis_label(&self) -> String {
        format!("{} ./.\n{}", self.first, self.second)
    }
}

impl fmt::Display for Contrast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ./. {}", self.first, self.second)
    }
}

pub fn sanitize_cond_name(cond: &str) -> String {
    cond.replace(['/', '_', '-', ' '], "")
}

pub fn condition_tag(cond: &str) -> String {
    cond.to_lowercase().replace(' ', "-")
}
