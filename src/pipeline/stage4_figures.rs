use crate::error::{ReportError, ReportResult};
use crate::input::auto_scores::ChannelScores;
use crate::model::contrast::Contrast;
use crate::model::scores::{ScoreValues, TimeResolvedScores};
use crate::model::stats::{ClusterTestResult, GroupStatistic};
use crate::pipeline::stage2_aggregate::{mean, quantile_linear, sort_floats};
use crate::report::figure::{
    Band, BarChart, BoxSummary, Figure, Heatmap, Line, LineStyle, Plot, RefLine, Span,
    StripCategory, StripPlot, TimeCourse,
};

const MEAN_COLOR: &str = "#1f77b4";
const BAND_COLOR: &str = "#1f77b4";
const CLUSTER_COLOR: &str = "#f2c12e";
const CHANCE_COLOR: &str = "#444444";
const THRESHOLD_COLOR: &str = "#d62728";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureKind {
    SingleSubject,
    GrandAverage,
}

impl FigureKind {
    fn band_label(self) -> &'static str {
        match self {
            FigureKind::SingleSubject => "range across CV splits",
            FigureKind::GrandAverage => "95% confidence interval",
        }
    }

    fn mean_label(self) -> &'static str {
        match self {
            FigureKind::SingleSubject => "mean across CV splits",
            FigureKind::GrandAverage => "grand mean",
        }
    }
}

fn chance_line(chance: f64) -> RefLine {
    RefLine {
        value: chance,
        color: CHANCE_COLOR.to_string(),
        style: LineStyle::Dotted,
        label: Some("chance".to_string()),
    }
}

fn box_summary(values: &[f64]) -> Option<BoxSummary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sort_floats(&mut sorted);
    let q1 = quantile_linear(&sorted, 0.25);
    let median = quantile_linear(&sorted, 0.5);
    let q3 = quantile_linear(&sorted, 0.75);
    let iqr = q3 - q1;
    let low_fence = q1 - 1.5 * iqr;
    let high_fence = q3 + 1.5 * iqr;
    let whisker_low = sorted
        .iter()
        .copied()
        .find(|&v| v >= low_fence)
        .unwrap_or(q1);
    let whisker_high = sorted
        .iter()
        .rev()
        .copied()
        .find(|&v| v <= high_fence)
        .unwrap_or(q3);
    Some(BoxSummary {
        q1,
        median,
        q3,
        whisker_low,
        whisker_high,
    })
}

/// Full-epochs decoding scores of all contrasts. Single-subject figures show
/// the cross-validation folds, grand-average figures the per-subject means
/// with a box summary.
pub fn full_epochs_figure(
    kind: FigureKind,
    entries: &[(Contrast, Vec<f64>)],
    metric_label: &str,
    chance: f64,
) -> Figure {
    let categories = entries
        .iter()
        .map(|(contrast, points)| StripCategory {
            label: contrast.axis_label(),
            points: points.clone(),
            mean: Some(mean(points)),
            summary: match kind {
                FigureKind::SingleSubject => None,
                FigureKind::GrandAverage => box_summary(points),
            },
        })
        .collect();
    let title = match kind {
        FigureKind::SingleSubject => "Full-epochs decoding",
        FigureKind::GrandAverage => "Full-epochs decoding, grand average",
    };
    Figure {
        title: title.to_string(),
        x_label: "Contrast".to_string(),
        y_label: metric_label.to_string(),
        plot: Plot::Strip(StripPlot {
            categories,
            hlines: vec![chance_line(chance)],
        }),
    }
}

/// Values drawn by [`time_course_figure`].
#[derive(Debug, Clone)]
pub struct TimeCourseData<'a> {
    pub times: Vec<f64>,
    pub mean: Vec<f64>,
    pub band: Option<(Vec<f64>, Vec<f64>)>,
    pub standard_error: Option<Vec<f64>>,
    pub clusters: Option<&'a ClusterTestResult>,
    pub n_subjects: Option<usize>,
    pub decim: u32,
}

impl<'a> TimeCourseData<'a> {
    pub fn from_subject(scores: &TimeResolvedScores) -> ReportResult<Self> {
        let curve = scores.mean_curve()?;
        let (lo, hi) = scores.fold_range();
        Ok(Self {
            times: curve.times,
            mean: curve.values.diagonal(),
            band: Some((lo, hi)),
            standard_error: None,
            clusters: None,
            n_subjects: None,
            decim: curve.decim,
        })
    }

    pub fn from_group(stat: &GroupStatistic, clusters: Option<&'a ClusterTestResult>) -> Self {
        let (band, standard_error) = match &stat.uncertainty {
            Some(u) => (
                Some((u.ci_lower.diagonal(), u.ci_upper.diagonal())),
                Some(u.standard_error.diagonal()),
            ),
            None => (None, None),
        };
        Self {
            times: stat.times.clone(),
            mean: stat.mean.diagonal(),
            band,
            standard_error,
            clusters,
            n_subjects: Some(stat.n_subjects),
            decim: stat.decim,
        }
    }
}

pub fn time_course_figure(
    kind: FigureKind,
    contrast: &Contrast,
    data: TimeCourseData<'_>,
    metric_label: &str,
    chance: f64,
) -> Figure {
    let mut tc = TimeCourse::default();

    if let Some(result) = data.clusters {
        for cluster in result.significant() {
            tc.spans.push(Span {
                start: cluster.t_start,
                stop: cluster.t_stop,
                color: CLUSTER_COLOR.to_string(),
                label: Some(format!("p = {:.4}", cluster.p_value)),
            });
        }
    }

    if let Some((lower, upper)) = data.band {
        tc.bands.push(Band {
            label: Some(kind.band_label().to_string()),
            x: data.times.clone(),
            lower,
            upper,
            color: BAND_COLOR.to_string(),
            opacity: 0.25,
        });
    }

    if let Some(se) = &data.standard_error {
        for sign in [1.0, -1.0] {
            tc.lines.push(Line {
                label: (sign > 0.0).then(|| "mean ± SE".to_string()),
                x: data.times.clone(),
                y: data.mean.iter().zip(se).map(|(m, s)| m + sign * s).collect(),
                color: MEAN_COLOR.to_string(),
                style: LineStyle::Dashed,
                width: 1.0,
            });
        }
    }

    tc.lines.push(Line {
        label: Some(kind.mean_label().to_string()),
        x: data.times.clone(),
        y: data.mean,
        color: MEAN_COLOR.to_string(),
        style: LineStyle::Solid,
        width: 2.0,
    });

    tc.hlines.push(chance_line(chance));
    if data.times.first().is_some_and(|&t| t < 0.0) && data.times.last().is_some_and(|&t| t > 0.0)
    {
        tc.vlines.push(RefLine {
            value: 0.0,
            color: CHANCE_COLOR.to_string(),
            style: LineStyle::Solid,
            label: None,
        });
    }
    tc.annotation = data.n_subjects.map(|n| format!("N = {n}"));

    let title = match kind {
        FigureKind::SingleSubject => format!("Time-by-time decoding: {contrast}"),
        FigureKind::GrandAverage => format!("Time-by-time decoding, grand average: {contrast}"),
    };
    let x_label = if data.decim > 1 {
        format!("Time (s), decim = {}", data.decim)
    } else {
        "Time (s)".to_string()
    };
    Figure {
        title,
        x_label,
        y_label: metric_label.to_string(),
        plot: Plot::TimeCourse(tc),
    }
}

/// Observed t-values with the cluster-forming threshold, for checking which
/// samples entered a cluster.
pub fn t_values_figure(contrast: &Contrast, result: &ClusterTestResult) -> Figure {
    let mut tc = TimeCourse::default();
    for cluster in &result.clusters {
        let color = if cluster.is_significant(result.p_threshold) {
            CLUSTER_COLOR
        } else {
            "#bbbbbb"
        };
        tc.spans.push(Span {
            start: cluster.t_start,
            stop: cluster.t_stop,
            color: color.to_string(),
            label: Some(format!("p = {:.4}", cluster.p_value)),
        });
    }
    // Zero-variance points carry infinite t and are drawn at the axis limit.
    let cap = result
        .t_values
        .iter()
        .filter(|t| t.is_finite())
        .fold(result.t_threshold.abs(), |acc, t| acc.max(t.abs()))
        .max(1.0)
        * 1.5;
    let n_infinite = result.t_values.iter().filter(|t| t.is_infinite()).count();
    tc.lines.push(Line {
        label: Some("t-value".to_string()),
        x: result.times.clone(),
        y: result.t_values.iter().map(|t| t.clamp(-cap, cap)).collect(),
        color: MEAN_COLOR.to_string(),
        style: LineStyle::Solid,
        width: 1.5,
    });
    tc.hlines.push(RefLine {
        value: result.t_threshold,
        color: THRESHOLD_COLOR.to_string(),
        style: LineStyle::Dashed,
        label: Some(format!("threshold t = {:.3}", result.t_threshold)),
    });
    tc.hlines.push(RefLine {
        value: 0.0,
        color: CHANCE_COLOR.to_string(),
        style: LineStyle::Dotted,
        label: None,
    });
    tc.annotation = Some(if n_infinite > 0 {
        format!(
            "{} permutations, {} zero-variance time points",
            result.n_permutations, n_infinite
        )
    } else {
        format!("{} permutations", result.n_permutations)
    });

    Figure {
        title: format!("t-values: {contrast}"),
        x_label: "Time (s)".to_string(),
        y_label: "t".to_string(),
        plot: Plot::TimeCourse(tc),
    }
}

/// Heatmap of a train-time x test-time score matrix, centred on chance.
pub fn time_generalization_figure(
    kind: FigureKind,
    contrast: &Contrast,
    times: &[f64],
    values: &ScoreValues,
    metric_label: &str,
    chance: f64,
) -> ReportResult<Figure> {
    let ScoreValues::Matrix(rows) = values else {
        return Err(ReportError::ShapeMismatch(format!(
            "time generalization scores of {contrast} are not a matrix"
        )));
    };
    let max_dev = rows
        .iter()
        .flatten()
        .filter(|v| v.is_finite())
        .map(|v| (v - chance).abs())
        .fold(0.0f64, f64::max);
    let half = if max_dev > 0.0 { max_dev } else { 0.5 };
    let title = match kind {
        FigureKind::SingleSubject => format!("Time generalization: {contrast}"),
        FigureKind::GrandAverage => format!("Time generalization, grand average: {contrast}"),
    };
    Ok(Figure {
        title,
        x_label: "Testing time (s)".to_string(),
        y_label: "Training time (s)".to_string(),
        plot: Plot::Heatmap(Heatmap {
            x: times.to_vec(),
            y: times.to_vec(),
            values: rows.clone(),
            vmin: chance - half,
            vmax: chance + half,
            colorbar_label: metric_label.to_string(),
            diagonal: true,
        }),
    })
}

/// Noisy-channel detection scores of one channel type in one run.
pub fn auto_scores_figure(
    run_label: &str,
    group: &ChannelScores,
    limit: Option<f64>,
    bads: &[String],
) -> Figure {
    let highlighted = group
        .names
        .iter()
        .zip(&group.scores)
        .map(|(name, score)| bads.contains(name) || limit.is_some_and(|l| *score > l))
        .collect();
    Figure {
        title: format!("Automated noisy channel detection: {run_label}, {}", group.ch_type),
        x_label: "Channel".to_string(),
        y_label: "Score".to_string(),
        plot: Plot::Bars(BarChart {
            labels: group.names.clone(),
            values: group.scores.clone(),
            highlighted,
            threshold: limit,
        }),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage4_figures.rs"]
mod tests;
