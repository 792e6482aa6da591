use rand::Rng;

use crate::error::ReportResult;
use crate::input::events::count_events;
use crate::input::scores::ScoreLoader;
use crate::model::contrast::{Contrast, sanitize_cond_name};
use crate::model::scores::{ScoreCurve, ScoreValues};
use crate::model::stats::{ContrastStatistics, GroupStatistic};
use crate::pipeline::stage1_scores::gather_contrast_scores;
use crate::pipeline::stage2_aggregate::{aggregate, aggregate_scalars};
use crate::pipeline::stage3_clusters::cluster_permutation_test;
use crate::pipeline::stage4_figures::{
    FigureKind, TimeCourseData, full_epochs_figure, t_values_figure, time_course_figure,
    time_generalization_figure,
};
use crate::pipeline::stage5_assemble::{Phase, ReportStage, StageOutcome};
use crate::report::{ArtifactRef, ContentItem, ReportDocument, Section, Table, format_num};
use crate::sections::StageContext;
use crate::sections::decoding::{TIME_GENERALIZATION_CAPTION, decoding_tags};

const EVENT_COUNTS_CSS: &str = "section[data-tags~=\"events\"] table { margin: 0 auto; }
section[data-tags~=\"events\"] th, section[data-tags~=\"events\"] td { text-align: center; }";

fn average_tag(name: &str) -> String {
    sanitize_cond_name(name).to_lowercase().replace(' ', "")
}

/// Group statistics of one decoding contrast over `subjects`. Every subject
/// must provide its score artifacts.
pub fn compute_contrast_statistics<R: Rng + ?Sized>(
    ctx: &StageContext<'_>,
    subjects: &[String],
    contrast: &Contrast,
    rng: &mut R,
) -> ReportResult<ContrastStatistics> {
    let cfg = ctx.cfg;
    let loader = ScoreLoader::new(cfg, ctx.derivatives);
    let gathered = gather_contrast_scores(&loader, subjects, ctx.session(), contrast)?;
    let contrast = &gathered.contrast;
    let boot = cfg.bootstrap_params();

    let subject_means = gathered.full_epochs_means();
    let full_epochs = aggregate_scalars(&subject_means, &boot, rng)?;

    let diagonal = gathered
        .curves
        .iter()
        .map(|c| ScoreCurve::new(c.times.clone(), ScoreValues::Curve(c.values.diagonal()), c.decim))
        .collect::<ReportResult<Vec<_>>>()?;
    let time_by_time = aggregate(&diagonal, &boot, rng)?;

    let has_matrices = gathered
        .curves
        .first()
        .is_some_and(|c| matches!(c.values, ScoreValues::Matrix(_)));
    let time_generalization = if cfg.decoding_time_generalization && has_matrices {
        Some(aggregate(&gathered.curves, &boot, rng)?)
    } else {
        None
    };

    let clusters = if gathered.n_subjects() > 1 {
        let params = cfg.cluster_params();
        if params.min_p_value() >= params.p_threshold {
            tracing::warn!(
                "{} permutations cannot reach p < {} for {}",
                params.n_permutations,
                params.p_threshold,
                contrast
            );
        }
        Some(cluster_permutation_test(
            &gathered.diagonal_curves(),
            &time_by_time.times,
            &params,
            rng,
        )?)
    } else {
        tracing::info!(
            "single subject for {}, skipping cluster permutation test",
            contrast
        );
        None
    };

    if let Some(result) = &clusters {
        tracing::info!(
            "{}: {} clusters, {} significant",
            contrast,
            result.clusters.len(),
            result.significant().count()
        );
        for cluster in result.significant() {
            tracing::info!(
                "{}: cluster {:.3} to {:.3} s over {} time points, p = {:.4}",
                contrast,
                cluster.t_start,
                cluster.t_stop,
                cluster.len(),
                cluster.p_value
            );
        }
    }

    Ok(ContrastStatistics {
        contrast: gathered.contrast.clone(),
        metric: cfg.decoding_metric.clone(),
        subjects: gathered.subjects.clone(),
        full_epochs,
        full_epochs_subject_means: subject_means,
        time_by_time,
        time_generalization,
        clusters,
        n_boot: boot.n_boot,
    })
}

/// Trial-type counts of every events table under the BIDS root.
pub struct EventCounts;

impl ReportStage for EventCounts {
    fn phase(&self) -> Phase {
        Phase::Preprocessing
    }

    fn name(&self) -> &'static str {
        "event counts"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let counts = match count_events(ctx.raw.root(), ctx.session()) {
            Ok(counts) => counts,
            Err(err) => {
                tracing::warn!("could not read events: {}", err);
                return Ok(StageOutcome::skipped("events could not be read"));
            }
        };

        let mut columns = vec![
            "subject".to_string(),
            "session".to_string(),
            "task".to_string(),
            "run".to_string(),
        ];
        columns.extend(counts.trial_types.iter().cloned());
        let mut table = Table::new(columns);
        let dash = || "-".to_string();
        for row in &counts.rows {
            let mut cells = vec![
                row.subject.clone(),
                row.session.clone().unwrap_or_else(dash),
                row.task.clone().unwrap_or_else(dash),
                row.run.clone().unwrap_or_else(dash),
            ];
            for tt in &counts.trial_types {
                cells.push(row.counts.get(tt).copied().unwrap_or(0).to_string());
            }
            table.push_row(cells);
        }

        doc.push_section(
            Section::new("Event counts")
                .with_tags(["events"])
                .with_item(ContentItem::table(table)),
        );
        doc.add_custom_css(EVENT_COUNTS_CSS);
        Ok(StageOutcome::Appended { sections: 1 })
    }
}

pub struct AverageEvokeds;

impl ReportStage for AverageEvokeds {
    fn phase(&self) -> Phase {
        Phase::Sensor
    }

    fn name(&self) -> &'static str {
        "evoked grand averages"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        if cfg.conditions.is_empty() {
            return Ok(StageOutcome::skipped("no conditions"));
        }
        let ave = ctx
            .derivatives
            .require(&ctx.key("ave", ".fif"), "grand-average evoked responses")?;
        for condition in &cfg.conditions {
            let mut artifact = ArtifactRef::new("evoked", ave.clone())
                .with_detail("comment", condition.clone())
                .with_detail("projectors", "off");
            if let Some(n) = cfg.report_evoked_n_time_points {
                artifact = artifact.with_detail("time points", n.to_string());
            }
            doc.push_section(
                Section::new(format!("Average: {condition}"))
                    .with_tags(["evoked".to_string(), average_tag(condition)])
                    .with_item(ContentItem::artifact(artifact)),
            );
        }
        Ok(StageOutcome::Appended {
            sections: cfg.conditions.len(),
        })
    }
}

fn summary_row(contrast: &Contrast, stat: &GroupStatistic) -> Vec<String> {
    let mean = stat.mean.flatten().first().copied().unwrap_or(f64::NAN);
    let (se, lo, hi) = match &stat.uncertainty {
        Some(u) => (
            format_num(u.standard_error.flatten().first().copied().unwrap_or(f64::NAN)),
            format_num(u.ci_lower.flatten().first().copied().unwrap_or(f64::NAN)),
            format_num(u.ci_upper.flatten().first().copied().unwrap_or(f64::NAN)),
        ),
        None => ("-".to_string(), "-".to_string(), "-".to_string()),
    };
    vec![
        contrast.to_string(),
        stat.n_subjects.to_string(),
        format_num(mean),
        se,
        format!("[{lo}, {hi}]"),
    ]
}

/// Decoding statistics across subjects, computed before assembly.
pub struct DecodingGrandAverage<'a> {
    pub statistics: &'a [ContrastStatistics],
}

impl ReportStage for DecodingGrandAverage<'_> {
    fn phase(&self) -> Phase {
        Phase::Sensor
    }

    fn name(&self) -> &'static str {
        "decoding grand average"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        if !cfg.decoding_enabled() || self.statistics.is_empty() {
            return Ok(StageOutcome::skipped("decoding disabled or no decoding contrasts"));
        }
        tracing::info!("adding decoding grand averages");
        let metric = cfg.metric_label();
        let contrasts: Vec<Contrast> = self.statistics.iter().map(|s| s.contrast.clone()).collect();

        let entries: Vec<(Contrast, Vec<f64>)> = self
            .statistics
            .iter()
            .map(|s| (s.contrast.clone(), s.full_epochs_subject_means.clone()))
            .collect();
        let n = self.statistics[0].subjects.len();
        let fig = full_epochs_figure(FigureKind::GrandAverage, &entries, metric, cfg.chance_level);
        let mut table = Table::new(["contrast", "N", "mean", "SE", "95% CI"]);
        for s in self.statistics {
            table.push_row(summary_row(&s.contrast, &s.full_epochs));
        }
        doc.push_section(
            Section::new("Full-epochs Decoding")
                .with_tags(decoding_tags(&contrasts))
                .with_item(ContentItem::figure(fig).with_caption(format!(
                    "Based on N={n} subjects. Each dot represents the mean cross-validation \
score for a single subject. The dotted line is expected chance performance."
                )))
                .with_item(ContentItem::table(table).with_caption(format!(
                    "Grand-average full-epochs {metric}; standard error and confidence interval \
bootstrapped with {} resamples.",
                    cfg.n_boot
                ))),
        );
        let mut added = 1;

        for stats in self.statistics {
            let contrast = &stats.contrast;
            let group = contrast.section_title();
            let tags = decoding_tags(std::slice::from_ref(contrast));
            let n = stats.time_by_time.n_subjects;

            let mut caption = format!(
                "Based on N={n} subjects. Standard error and confidence interval of the mean \
were bootstrapped with {} resamples. CI must not be used for statistical inference here, \
as it is not corrected for multiple testing.",
                stats.n_boot
            );
            if let Some(result) = &stats.clusters {
                caption.push_str(&format!(
                    " Time periods with decoding performance significantly above chance, if any, \
were derived with a one-tailed cluster-based permutation test ({} permutations) and are \
highlighted in yellow.",
                    result.n_permutations
                ));
            }
            let fig = time_course_figure(
                FigureKind::GrandAverage,
                contrast,
                TimeCourseData::from_group(&stats.time_by_time, stats.clusters.as_ref()),
                metric,
                cfg.chance_level,
            );
            doc.push_section(
                Section::new("Decoding performance over time")
                    .with_group(group.clone())
                    .with_tags(tags.clone())
                    .with_item(ContentItem::figure(fig).with_caption(caption)),
            );
            added += 1;

            if let Some(result) = &stats.clusters {
                let fig = t_values_figure(contrast, result);
                doc.push_section(
                    Section::new("t-values based on decoding scores over time")
                        .with_group(group.clone())
                        .with_tags(tags.clone())
                        .with_item(ContentItem::figure(fig).with_caption(format!(
                            "Observed t-values. Time points with t-values > {:.3} were used to \
form clusters.",
                            result.t_threshold
                        ))),
                );
                added += 1;
            }

            if cfg.decoding_time_generalization
                && let Some(tg) = &stats.time_generalization
            {
                let fig = time_generalization_figure(
                    FigureKind::GrandAverage,
                    contrast,
                    &tg.times,
                    &tg.mean,
                    metric,
                    cfg.chance_level,
                )?;
                doc.push_section(
                    Section::new("Time generalization")
                        .with_group(group)
                        .with_tags(tags)
                        .with_item(ContentItem::figure(fig).with_caption(format!(
                            "{TIME_GENERALIZATION_CAPTION} The results were averaged across \
N={} subjects.",
                            tg.n_subjects
                        ))),
                );
                added += 1;
            }
        }
        Ok(StageOutcome::Appended { sections: added })
    }
}

/// Source estimates morphed to the template brain, for conditions and
/// contrasts.
pub struct MorphedSourceEstimates;

impl ReportStage for MorphedSourceEstimates {
    fn phase(&self) -> Phase {
        Phase::Source
    }

    fn name(&self) -> &'static str {
        "morphed source estimates"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        let mut added = 0;
        for name in cfg.evoked_names() {
            let cond = sanitize_cond_name(&name);
            let stc = ctx.stc_lh_path(&format!(
                "{cond}+{}+morph2fsaverage+hemi",
                cfg.inverse_method
            ));
            if !stc.is_file() {
                continue;
            }
            let (title, tags) = if cfg.conditions.contains(&name) {
                (
                    format!("Average: {name}"),
                    vec!["source-estimate".to_string(), average_tag(&name)],
                )
            } else {
                (
                    format!("Average contrast: {name}"),
                    vec![
                        "source-estimate".to_string(),
                        "contrast".to_string(),
                        average_tag(&name),
                    ],
                )
            };
            let mut artifact = ArtifactRef::new("source estimate (lh)", stc)
                .with_detail("method", cfg.inverse_method.clone())
                .with_detail("FreeSurfer subject", "fsaverage");
            if let Some(n) = cfg.report_stc_n_time_points {
                artifact = artifact.with_detail("time points", n.to_string());
            }
            doc.push_section(
                Section::new(title)
                    .with_tags(tags)
                    .with_item(ContentItem::artifact(artifact)),
            );
            added += 1;
        }
        if added == 0 {
            return Ok(StageOutcome::skipped("no morphed source estimates"));
        }
        Ok(StageOutcome::Appended { sections: added })
    }
}
