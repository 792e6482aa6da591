use crate::error::{ReportError, ReportResult};
use crate::input::SubjectId;
use crate::input::scores::ScoreLoader;
use crate::model::contrast::Contrast;
use crate::model::scores::{FullEpochScores, ScoreCurve};

/// Subject-level decoding results of one contrast, one entry per subject in
/// configuration order.
#[derive(Debug, Clone)]
pub struct ContrastScores {
    pub contrast: Contrast,
    pub subjects: Vec<String>,
    pub full_epochs: Vec<FullEpochScores>,
    pub curves: Vec<ScoreCurve>,
}

impl ContrastScores {
    pub fn n_subjects(&self) -> usize {
        self.subjects.len()
    }

    pub fn full_epochs_means(&self) -> Vec<f64> {
        self.full_epochs.iter().map(FullEpochScores::mean).collect()
    }

    /// Per-subject curves on the train = test diagonal, for the cluster test.
    pub fn diagonal_curves(&self) -> Vec<Vec<f64>> {
        self.curves.iter().map(|c| c.values.diagonal()).collect()
    }
}

/// Loads every subject's scores for `contrast`. A missing subject is fatal:
/// group statistics over a silently reduced set of subjects are not reported.
pub fn gather_contrast_scores(
    loader: &ScoreLoader<'_>,
    subjects: &[String],
    session: Option<&str>,
    contrast: &Contrast,
) -> ReportResult<ContrastScores> {
    if subjects.is_empty() {
        return Err(ReportError::Configuration(
            "grand average requires at least one subject".to_string(),
        ));
    }

    let mut full_epochs = Vec::with_capacity(subjects.len());
    let mut curves: Vec<ScoreCurve> = Vec::with_capacity(subjects.len());

    for subject in subjects {
        let id = SubjectId::Subject(subject.clone());
        let set = loader.load(&id, session, contrast)?;
        let curve = loader.require_time_by_time(&set)?.mean_curve()?;
        full_epochs.push(set.full_epochs);
        if let Some(reference) = curves.first() {
            if reference.times != curve.times {
                return Err(ReportError::ShapeMismatch(format!(
                    "sub-{subject}: time axis of {contrast} differs from sub-{}",
                    subjects[0]
                )));
            }
            if reference.shape() != curve.shape() {
                return Err(ReportError::ShapeMismatch(format!(
                    "sub-{subject}: score shape {:?} of {contrast} differs from {:?}",
                    curve.shape(),
                    reference.shape()
                )));
            }
        }
        curves.push(curve);
    }

    tracing::debug!(
        "gathered {} subjects for {}",
        subjects.len(),
        contrast
    );

    Ok(ContrastScores {
        contrast: contrast.clone(),
        subjects: subjects.to_vec(),
        full_epochs,
        curves,
    })
}
