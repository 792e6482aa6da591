use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{ReportError, ReportResult};
use crate::input::reader::read_json;
use crate::input::{ArtifactKey, ArtifactLocator, SubjectId};
use crate::model::config::PipelineConfig;
use crate::model::contrast::{Contrast, DecodingKind};
use crate::model::scores::{FullEpochScores, ScoreValues, SubjectScoreSet, TimeResolvedScores};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFullEpochs {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

#[derive(Debug, Deserialize)]
struct FullEpochsFile {
    scores: RawFullEpochs,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFoldScores {
    Curves(Vec<Vec<f64>>),
    Matrices(Vec<Vec<Vec<f64>>>),
}

fn default_decim() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TimeByTimeFile {
    times: Vec<f64>,
    #[serde(default = "default_decim")]
    decim: u32,
    scores: RawFoldScores,
    #[serde(default)]
    n_epochs: BTreeMap<String, usize>,
}

/// Reads the per-contrast decoding score artifacts of one subject.
pub struct ScoreLoader<'a> {
    cfg: &'a PipelineConfig,
    locator: &'a ArtifactLocator,
}

impl<'a> ScoreLoader<'a> {
    pub fn new(cfg: &'a PipelineConfig, locator: &'a ArtifactLocator) -> Self {
        Self { cfg, locator }
    }

    pub fn key(
        &self,
        subject: &SubjectId,
        session: Option<&str>,
        contrast: &Contrast,
        kind: DecodingKind,
    ) -> ArtifactKey {
        let processing = contrast.processing_label(kind, &self.cfg.decoding_metric);
        ArtifactKey::base(self.cfg, subject, session)
            .with_processing(Some(&processing))
            .with_suffix("decoding")
            .with_extension(".json")
    }

    pub fn load_full_epochs(
        &self,
        subject: &SubjectId,
        session: Option<&str>,
        contrast: &Contrast,
    ) -> ReportResult<FullEpochScores> {
        let key = self.key(subject, session, contrast, DecodingKind::FullEpochs);
        let what = format!("full-epochs decoding scores for {contrast}");
        let path = self.locator.require(&key, &what)?;
        let file: FullEpochsFile = read_json(&path)?;
        let folds = match file.scores {
            RawFullEpochs::Flat(v) => v,
            RawFullEpochs::Nested(rows) => rows.into_iter().flatten().collect(),
        };
        if folds.is_empty() {
            return Err(ReportError::ShapeMismatch(format!(
                "{} holds no cross-validation scores",
                path.display()
            )));
        }
        Ok(FullEpochScores { folds })
    }

    pub fn time_by_time_available(
        &self,
        subject: &SubjectId,
        session: Option<&str>,
        contrast: &Contrast,
    ) -> bool {
        let key = self.key(subject, session, contrast, DecodingKind::TimeByTime);
        self.locator.exists(&key)
    }

    pub fn load_time_by_time(
        &self,
        subject: &SubjectId,
        session: Option<&str>,
        contrast: &Contrast,
    ) -> ReportResult<TimeResolvedScores> {
        let key = self.key(subject, session, contrast, DecodingKind::TimeByTime);
        let what = format!("time-by-time decoding scores for {contrast}");
        let path = self.locator.require(&key, &what)?;
        let file: TimeByTimeFile = read_json(&path)?;
        let n_times = file.times.len();
        let folds: Vec<ScoreValues> = match file.scores {
            RawFoldScores::Curves(curves) => curves.into_iter().map(ScoreValues::Curve).collect(),
            RawFoldScores::Matrices(mats) => mats.into_iter().map(ScoreValues::Matrix).collect(),
        };
        if folds.is_empty() {
            return Err(ReportError::ShapeMismatch(format!(
                "{} holds no cross-validation folds",
                path.display()
            )));
        }
        for (idx, fold) in folds.iter().enumerate() {
            if !fold.is_square() || fold.shape().n_times() != n_times {
                return Err(ReportError::ShapeMismatch(format!(
                    "{}: fold {} has shape {:?} but {} time points",
                    path.display(),
                    idx,
                    fold.shape(),
                    n_times
                )));
            }
        }
        Ok(TimeResolvedScores {
            times: file.times,
            decim: file.decim.max(1),
            folds,
            n_epochs: file.n_epochs,
        })
    }

    /// Full-epochs scores are required; time-resolved scores are attached
    /// when the artifact exists.
    pub fn load(
        &self,
        subject: &SubjectId,
        session: Option<&str>,
        contrast: &Contrast,
    ) -> ReportResult<SubjectScoreSet> {
        let full_epochs = self.load_full_epochs(subject, session, contrast)?;
        let time_by_time = if self.time_by_time_available(subject, session, contrast) {
            Some(self.load_time_by_time(subject, session, contrast)?)
        } else {
            None
        };
        Ok(SubjectScoreSet {
            subject: subject.clone(),
            session: session.map(str::to_string),
            contrast: contrast.clone(),
            full_epochs,
            time_by_time,
        })
    }

    /// Time-resolved scores of `set`, or the `ArtifactMissing` error naming
    /// the file they are read from.
    pub fn require_time_by_time<'s>(
        &self,
        set: &'s SubjectScoreSet,
    ) -> ReportResult<&'s TimeResolvedScores> {
        set.time_by_time.as_ref().ok_or_else(|| {
            let key = self.key(
                &set.subject,
                set.session.as_deref(),
                &set.contrast,
                DecodingKind::TimeByTime,
            );
            ReportError::missing(
                format!("time-by-time decoding scores for {}", set.contrast),
                self.locator.path(&key),
            )
        })
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/scores.rs"]
mod tests;
