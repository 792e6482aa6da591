use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{ReportError, ReportResult};
use crate::input::SubjectId;
use crate::model::contrast::Contrast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "layout", content = "size", rename_all = "snake_case")]
pub enum ValueShape {
    Curve(usize),
    Matrix(usize),
}

impl ValueShape {
    pub fn n_points(self) -> usize {
        match self {
            ValueShape::Curve(n) => n,
            ValueShape::Matrix(n) => n * n,
        }
    }

    pub fn n_times(self) -> usize {
        match self {
            ValueShape::Curve(n) | ValueShape::Matrix(n) => n,
        }
    }
}

/// Scores over time: one value per time point, or a square train-time x
/// test-time matrix for time generalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScoreValues {
    Curve(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

impl ScoreValues {
    pub fn shape(&self) -> ValueShape {
        match self {
            ScoreValues::Curve(v) => ValueShape::Curve(v.len()),
            ScoreValues::Matrix(rows) => ValueShape::Matrix(rows.len()),
        }
    }

    pub fn is_square(&self) -> bool {
        match self {
            ScoreValues::Curve(_) => true,
            ScoreValues::Matrix(rows) => rows.iter().all(|r| r.len() == rows.len()),
        }
    }

    /// Row-major values.
    pub fn flatten(&self) -> Vec<f64> {
        match self {
            ScoreValues::Curve(v) => v.clone(),
            ScoreValues::Matrix(rows) => rows.iter().flatten().copied().collect(),
        }
    }

    pub fn from_flat(shape: ValueShape, data: Vec<f64>) -> ReportResult<Self> {
        if data.len() != shape.n_points() {
            return Err(ReportError::ShapeMismatch(format!(
                "expected {} values for {:?}, got {}",
                shape.n_points(),
                shape,
                data.len()
            )));
        }
        Ok(match shape {
            ValueShape::Curve(_) => ScoreValues::Curve(data),
            ValueShape::Matrix(n) => {
                ScoreValues::Matrix(data.chunks(n.max(1)).map(|c| c.to_vec()).collect())
            }
        })
    }

    /// Scores of classifiers trained and tested on the same time point.
    pub fn diagonal(&self) -> Vec<f64> {
        match self {
            ScoreValues::Curve(v) => v.clone(),
            ScoreValues::Matrix(rows) => rows.iter().enumerate().map(|(i, r)| r[i]).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCurve {
    pub times: Vec<f64>,
    pub values: ScoreValues,
    pub decim: u32,
}

impl ScoreCurve {
    pub fn new(times: Vec<f64>, values: ScoreValues, decim: u32) -> ReportResult<Self> {
        if !values.is_square() {
            return Err(ReportError::ShapeMismatch(
                "time generalization matrix is not square".to_string(),
            ));
        }
        let n = values.shape().n_times();
        if n != times.len() {
            return Err(ReportError::ShapeMismatch(format!(
                "{} time points but {} score columns",
                times.len(),
                n
            )));
        }
        Ok(Self {
            times,
            values,
            decim,
        })
    }

    pub fn shape(&self) -> ValueShape {
        self.values.shape()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FullEpochScores {
    pub folds: Vec<f64>,
}

impl FullEpochScores {
    pub fn mean(&self) -> f64 {
        if self.folds.is_empty() {
            return f64::NAN;
        }
        self.folds.iter().sum::<f64>() / self.folds.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeResolvedScores {
    pub times: Vec<f64>,
    pub decim: u32,
    pub folds: Vec<ScoreValues>,
    pub n_epochs: BTreeMap<String, usize>,
}

impl TimeResolvedScores {
    pub fn is_time_generalization(&self) -> bool {
        matches!(self.folds.first(), Some(ScoreValues::Matrix(_)))
    }

    /// Cross-validation mean, the curve a subject contributes to the group.
    pub fn mean_curve(&self) -> ReportResult<ScoreCurve> {
        let first = self.folds.first().ok_or_else(|| {
            ReportError::ShapeMismatch("time-resolved scores hold no folds".to_string())
        })?;
        let shape = first.shape();
        let mut acc = vec![0.0f64; shape.n_points()];
        for fold in &self.folds {
            if fold.shape() != shape {
                return Err(ReportError::ShapeMismatch(format!(
                    "fold shapes differ: {:?} vs {:?}",
                    fold.shape(),
                    shape
                )));
            }
            for (a, v) in acc.iter_mut().zip(fold.flatten()) {
                *a += v;
            }
        }
        let n = self.folds.len() as f64;
        for a in &mut acc {
            *a /= n;
        }
        let values = ScoreValues::from_flat(shape, acc)?;
        ScoreCurve::new(self.times.clone(), values, self.decim)
    }

    /// Pointwise min and max across folds, on the diagonal.
    pub fn fold_range(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.times.len();
        let mut lo = vec![f64::INFINITY; n];
        let mut hi = vec![f64::NEG_INFINITY; n];
        for fold in &self.folds {
            for (i, v) in fold.diagonal().into_iter().enumerate().take(n) {
                lo[i] = lo[i].min(v);
                hi[i] = hi[i].max(v);
            }
        }
        (lo, hi)
    }
}

/// Decoding results of one subject for one contrast.
#[derive(Debug, Clone)]
pub struct SubjectScoreSet {
    pub subject: SubjectId,
    pub session: Option<String>,
    pub contrast: Contrast,
    pub full_epochs: FullEpochScores,
    pub time_by_time: Option<TimeResolvedScores>,
}
