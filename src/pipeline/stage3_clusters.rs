use rand::Rng;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::{ReportError, ReportResult};
use crate::model::stats::{ClusterStatistic, ClusterTestParams, ClusterTestResult, PermutationCluster};

/// One-tailed critical t-value for `alpha` with `df` degrees of freedom.
pub fn t_critical(alpha: f64, df: usize) -> ReportResult<f64> {
    let dist = StudentsT::new(0.0, 1.0, df as f64)
        .map_err(|e| ReportError::Configuration(format!("invalid t distribution: {e}")))?;
    Ok(dist.inverse_cdf(1.0 - alpha))
}

/// One-sample t-values of `deviations` (subject x time) after multiplying
/// each subject row by its sign.
fn t_curve(deviations: &[Vec<f64>], signs: &[f64], out: &mut [f64]) {
    let n = deviations.len() as f64;
    for (t, slot) in out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (row, s) in deviations.iter().zip(signs) {
            sum += s * row[t];
        }
        let m = sum / n;
        let mut ss = 0.0;
        for (row, s) in deviations.iter().zip(signs) {
            let d = s * row[t] - m;
            ss += d * d;
        }
        let sd = (ss / (n - 1.0)).sqrt();
        // Rounding leaves identical rows with a spread of a few ulps.
        let tol = f64::EPSILON * m.abs().max(1.0);
        *slot = if sd > tol {
            m / (sd / n.sqrt())
        } else if m.abs() <= tol {
            0.0
        } else {
            m.signum() * f64::INFINITY
        };
    }
}

/// Maximal runs `[start, stop)` with `t > threshold`.
pub fn find_clusters(t_values: &[f64], threshold: f64) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &t) in t_values.iter().enumerate() {
        match (t > threshold, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, t_values.len()));
    }
    out
}

fn cluster_stat(t_values: &[f64], range: (usize, usize), statistic: ClusterStatistic) -> f64 {
    match statistic {
        ClusterStatistic::Mass => t_values[range.0..range.1].iter().sum(),
        ClusterStatistic::Extent => (range.1 - range.0) as f64,
    }
}

fn max_cluster_stat(t_values: &[f64], threshold: f64, statistic: ClusterStatistic) -> f64 {
    find_clusters(t_values, threshold)
        .into_iter()
        .map(|r| cluster_stat(t_values, r, statistic))
        .fold(0.0, f64::max)
}

/// Random sign per subject; the all-positive pattern reproduces the observed
/// data and is redrawn.
fn draw_signs<R: Rng + ?Sized>(rng: &mut R, signs: &mut [f64]) {
    loop {
        let mut flipped = false;
        for s in signs.iter_mut() {
            if rng.random_bool(0.5) {
                *s = 1.0;
            } else {
                *s = -1.0;
                flipped = true;
            }
        }
        if flipped {
            return;
        }
    }
}

/// One-tailed cluster-based sign-flip permutation test of subject scores
/// (`samples[subject][time]`) against the chance level.
pub fn cluster_permutation_test<R: Rng + ?Sized>(
    samples: &[Vec<f64>],
    times: &[f64],
    params: &ClusterTestParams,
    rng: &mut R,
) -> ReportResult<ClusterTestResult> {
    params.validate()?;
    let n = samples.len();
    if n < 2 {
        return Err(ReportError::Configuration(format!(
            "cluster permutation test needs at least 2 subjects, got {n}"
        )));
    }
    for (idx, row) in samples.iter().enumerate() {
        if row.len() != times.len() {
            return Err(ReportError::ShapeMismatch(format!(
                "subject {idx} has {} scores for {} time points",
                row.len(),
                times.len()
            )));
        }
    }

    let t_threshold = match params.t_threshold {
        Some(t) => t,
        None => t_critical(params.p_threshold, n - 1)?,
    };

    let deviations: Vec<Vec<f64>> = samples
        .iter()
        .map(|row| row.iter().map(|v| v - params.chance_level).collect())
        .collect();

    let mut signs = vec![1.0f64; n];
    let mut t_values = vec![0.0f64; times.len()];
    t_curve(&deviations, &signs, &mut t_values);

    let mut result = ClusterTestResult {
        times: times.to_vec(),
        t_values,
        t_threshold,
        clusters: Vec::new(),
        n_permutations: params.n_permutations,
        p_threshold: params.p_threshold,
        statistic: params.statistic,
    };

    if times.len() < 2 {
        return Ok(result);
    }
    let observed = find_clusters(&result.t_values, t_threshold);
    if observed.is_empty() {
        return Ok(result);
    }

    let mut null_t = vec![0.0f64; times.len()];
    let mut null_max = Vec::with_capacity(params.n_permutations);
    for _ in 0..params.n_permutations {
        draw_signs(rng, &mut signs);
        t_curve(&deviations, &signs, &mut null_t);
        null_max.push(max_cluster_stat(&null_t, t_threshold, params.statistic));
    }

    let denom = params.n_permutations as f64 + 1.0;
    for range in observed {
        let mass = cluster_stat(&result.t_values, range, params.statistic);
        let exceed = null_max.iter().filter(|&&v| v >= mass).count();
        result.clusters.push(PermutationCluster {
            start: range.0,
            stop: range.1,
            t_start: times[range.0],
            t_stop: times[range.1 - 1],
            mass,
            p_value: (exceed as f64 + 1.0) / denom,
        });
    }

    tracing::debug!(
        "cluster test: {} clusters, t threshold {:.3}, {} permutations",
        result.clusters.len(),
        t_threshold,
        params.n_permutations
    );

    Ok(result)
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage3_clusters.rs"]
mod tests;
