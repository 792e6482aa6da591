use crate::error::ReportResult;
use crate::input::scores::ScoreLoader;
use crate::model::contrast::Contrast;
use crate::model::scores::TimeResolvedScores;
use crate::pipeline::stage4_figures::{
    FigureKind, TimeCourseData, full_epochs_figure, time_course_figure,
    time_generalization_figure,
};
use crate::pipeline::stage5_assemble::{Phase, ReportStage, StageOutcome};
use crate::report::{ContentItem, ReportDocument, Section};
use crate::sections::StageContext;

pub const TIME_GENERALIZATION_CAPTION: &str = "Time generalization (generalization across time, GAT): \
each classifier is trained on each time point, and tested on all other time points.";

pub fn decoding_tags(contrasts: &[Contrast]) -> Vec<String> {
    let mut tags = vec![
        "epochs".to_string(),
        "contrast".to_string(),
        "decoding".to_string(),
    ];
    tags.extend(contrasts.iter().map(Contrast::tag));
    tags
}

fn epochs_caption(contrast: &Contrast, scores: &TimeResolvedScores) -> String {
    match (
        scores.n_epochs.get(&contrast.first),
        scores.n_epochs.get(&contrast.second),
    ) {
        (Some(n1), Some(n2)) => format!(
            "Time-by-time decoding: {n1} × {} ./. {n2} × {}",
            contrast.first, contrast.second
        ),
        _ => format!("Time-by-time decoding: {contrast}"),
    }
}

pub struct FullEpochsDecoding;

impl ReportStage for FullEpochsDecoding {
    fn phase(&self) -> Phase {
        Phase::Sensor
    }

    fn name(&self) -> &'static str {
        "full-epochs decoding"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        if !cfg.decoding_enabled() {
            return Ok(StageOutcome::skipped("decoding disabled or no decoding contrasts"));
        }
        tracing::info!("adding full-epochs decoding results");

        let loader = ScoreLoader::new(cfg, ctx.derivatives);
        let contrasts = cfg.decoding_contrasts();
        let mut entries = Vec::with_capacity(contrasts.len());
        for contrast in &contrasts {
            let set = loader.load(&ctx.subject, ctx.session(), contrast)?;
            entries.push((set.contrast, set.full_epochs.folds));
        }

        let fig = full_epochs_figure(
            FigureKind::SingleSubject,
            &entries,
            cfg.metric_label(),
            cfg.chance_level,
        );
        let caption = "Each dot represents the score of a single cross-validation split. \
The red bar is the mean of all cross-validation scores. \
The dotted line is expected chance performance.";
        doc.push_section(
            Section::new("Full-epochs Decoding")
                .with_tags(decoding_tags(&contrasts))
                .with_item(ContentItem::figure(fig).with_caption(caption)),
        );
        Ok(StageOutcome::Appended { sections: 1 })
    }
}

pub struct TimeByTimeDecoding;

impl ReportStage for TimeByTimeDecoding {
    fn phase(&self) -> Phase {
        Phase::Sensor
    }

    fn name(&self) -> &'static str {
        "time-by-time decoding"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        if !cfg.decoding_enabled() {
            return Ok(StageOutcome::skipped("decoding disabled or no decoding contrasts"));
        }
        tracing::info!("adding time-by-time decoding results");

        let loader = ScoreLoader::new(cfg, ctx.derivatives);
        let mut added = 0;
        for contrast in cfg.decoding_contrasts() {
            let set = loader.load(&ctx.subject, ctx.session(), &contrast)?;
            let scores = loader.require_time_by_time(&set)?;
            let group = contrast.section_title();
            let tags = [
                "epochs".to_string(),
                "contrast".to_string(),
                "decoding".to_string(),
                contrast.time_by_time_tag(),
            ];

            let fig = time_course_figure(
                FigureKind::SingleSubject,
                &contrast,
                TimeCourseData::from_subject(scores)?,
                cfg.metric_label(),
                cfg.chance_level,
            );
            doc.push_section(
                Section::new("Decoding performance over time")
                    .with_group(group.clone())
                    .with_tags(tags.clone())
                    .with_item(ContentItem::figure(fig).with_caption(epochs_caption(&contrast, scores))),
            );
            added += 1;

            if !cfg.decoding_time_generalization {
                continue;
            }
            if !scores.is_time_generalization() {
                tracing::warn!(
                    "time generalization enabled but scores of {} hold no matrices",
                    contrast
                );
                continue;
            }
            let curve = scores.mean_curve()?;
            let fig = time_generalization_figure(
                FigureKind::SingleSubject,
                &contrast,
                &curve.times,
                &curve.values,
                cfg.metric_label(),
                cfg.chance_level,
            )?;
            doc.push_section(
                Section::new("Time generalization")
                    .with_group(group)
                    .with_tags(tags)
                    .with_item(ContentItem::figure(fig).with_caption(TIME_GENERALIZATION_CAPTION)),
            );
            added += 1;
        }
        Ok(StageOutcome::Appended { sections: added })
    }
}
