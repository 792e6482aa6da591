use rand::Rng;

use crate::error::{ReportError, ReportResult};
use crate::model::scores::{ScoreCurve, ScoreValues};
use crate::model::stats::{BootstrapParams, GroupStatistic, Uncertainty};

const CI_LOWER_Q: f64 = 0.025;
const CI_UPPER_Q: f64 = 0.975;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with `ddof` delta degrees of freedom.
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    let n = values.len();
    if n <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - ddof) as f64).sqrt()
}

/// Quantile of sorted data, linear interpolation between order statistics.
pub fn quantile_linear(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn sort_floats(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

fn ensure_aligned(curves: &[ScoreCurve]) -> ReportResult<()> {
    let Some(first) = curves.first() else {
        return Err(ReportError::ShapeMismatch(
            "no subject curves to aggregate".to_string(),
        ));
    };
    for (idx, curve) in curves.iter().enumerate().skip(1) {
        if curve.times != first.times {
            return Err(ReportError::ShapeMismatch(format!(
                "curve {idx} has a different time axis than curve 0"
            )));
        }
        if curve.shape() != first.shape() {
            return Err(ReportError::ShapeMismatch(format!(
                "curve {idx} has shape {:?}, curve 0 has {:?}",
                curve.shape(),
                first.shape()
            )));
        }
    }
    Ok(())
}

/// Combines per-subject curves into the grand mean with bootstrapped
/// standard error and 95% confidence interval. With a single subject only the
/// mean is produced.
pub fn aggregate<R: Rng + ?Sized>(
    curves: &[ScoreCurve],
    params: &BootstrapParams,
    rng: &mut R,
) -> ReportResult<GroupStatistic> {
    params.validate()?;
    ensure_aligned(curves)?;

    let n = curves.len();
    let shape = curves[0].shape();
    let flats: Vec<Vec<f64>> = curves.iter().map(|c| c.values.flatten()).collect();
    let n_points = shape.n_points();

    let mut mean_flat = vec![0.0f64; n_points];
    for flat in &flats {
        for (m, v) in mean_flat.iter_mut().zip(flat) {
            *m += v;
        }
    }
    for m in &mut mean_flat {
        *m /= n as f64;
    }

    let uncertainty = if n > 1 {
        Some(bootstrap(&flats, shape, params.n_boot, rng)?)
    } else {
        None
    };

    Ok(GroupStatistic {
        times: curves[0].times.clone(),
        mean: ScoreValues::from_flat(shape, mean_flat)?,
        uncertainty,
        n_subjects: n,
        decim: curves[0].decim,
    })
}

fn bootstrap<R: Rng + ?Sized>(
    flats: &[Vec<f64>],
    shape: crate::model::scores::ValueShape,
    n_boot: usize,
    rng: &mut R,
) -> ReportResult<Uncertainty> {
    let n = flats.len();
    let n_points = shape.n_points();

    // Resample indices are drawn once and shared by all time points.
    let resamples: Vec<Vec<usize>> = (0..n_boot)
        .map(|_| (0..n).map(|_| rng.random_range(0..n)).collect())
        .collect();

    let mut se = Vec::with_capacity(n_points);
    let mut lower = Vec::with_capacity(n_points);
    let mut upper = Vec::with_capacity(n_points);
    let mut boot_means = vec![0.0f64; n_boot];

    for point in 0..n_points {
        for (b, idx) in resamples.iter().enumerate() {
            let sum: f64 = idx.iter().map(|&s| flats[s][point]).sum();
            boot_means[b] = sum / n as f64;
        }
        se.push(std_dev(&boot_means, 0));
        sort_floats(&mut boot_means);
        lower.push(quantile_linear(&boot_means, CI_LOWER_Q));
        upper.push(quantile_linear(&boot_means, CI_UPPER_Q));
    }

    Ok(Uncertainty {
        standard_error: ScoreValues::from_flat(shape, se)?,
        ci_lower: ScoreValues::from_flat(shape, lower)?,
        ci_upper: ScoreValues::from_flat(shape, upper)?,
    })
}

/// Group statistic of per-subject scalars (full-epochs means), as a
/// single-point curve.
pub fn aggregate_scalars<R: Rng + ?Sized>(
    values: &[f64],
    params: &BootstrapParams,
    rng: &mut R,
) -> ReportResult<GroupStatistic> {
    let curves = values
        .iter()
        .map(|&v| ScoreCurve::new(vec![0.0], ScoreValues::Curve(vec![v]), 1))
        .collect::<ReportResult<Vec<_>>>()?;
    aggregate(&curves, params, rng)
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage2_aggregate.rs"]
mod tests;
