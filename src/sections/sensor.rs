use crate::error::ReportResult;
use crate::model::contrast::{condition_tag, sanitize_cond_name};
use crate::pipeline::stage5_assemble::{Phase, ReportStage, StageOutcome};
use crate::report::{ArtifactRef, ContentItem, ReportDocument, Section};
use crate::sections::StageContext;

/// Evoked responses of every condition and contrast, in the order they are
/// stored in the evoked file.
pub struct Evokeds;

impl ReportStage for Evokeds {
    fn phase(&self) -> Phase {
        Phase::Sensor
    }

    fn name(&self) -> &'static str {
        "evoked responses"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        let names = cfg.evoked_names();
        if names.is_empty() {
            return Ok(StageOutcome::skipped("no evoked conditions or contrasts"));
        }
        let ave = ctx
            .derivatives
            .require(&ctx.key("ave", ".fif"), "evoked responses")?;
        tracing::info!("adding {} evoked signals and contrasts", names.len());

        let noise_cov = ctx.derivatives.locate(&ctx.noise_cov_key());
        match &noise_cov {
            Some(path) => tracing::info!("reading noise covariance: {}", path.display()),
            None => tracing::info!("no noise covariance matrix found, not rendering whitened data"),
        }

        for name in &names {
            let (title, tags) = if cfg.conditions.contains(name) {
                (
                    format!("Condition: {name}"),
                    vec!["evoked".to_string(), condition_tag(name)],
                )
            } else {
                (
                    format!("Contrast: {name}"),
                    vec![
                        "evoked".to_string(),
                        "contrast".to_string(),
                        condition_tag(name),
                    ],
                )
            };
            let mut artifact = ArtifactRef::new("evoked", ave.clone())
                .with_detail("comment", name.clone())
                .with_detail("picks", cfg.analyze_channels.describe(&cfg.ch_types))
                .with_detail(
                    "whitened",
                    if noise_cov.is_some() { "yes" } else { "no" },
                );
            if let Some(n) = cfg.report_evoked_n_time_points {
                artifact = artifact.with_detail("time points", n.to_string());
            }
            doc.push_section(
                Section::new(title)
                    .with_tags(tags)
                    .with_item(ContentItem::artifact(artifact)),
            );
        }
        Ok(StageOutcome::Appended {
            sections: names.len(),
        })
    }
}

pub struct TimeFrequency;

impl ReportStage for TimeFrequency {
    fn phase(&self) -> Phase {
        Phase::Sensor
    }

    fn name(&self) -> &'static str {
        "time-frequency"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let conditions = &ctx.cfg.time_frequency_conditions;
        if conditions.is_empty() {
            return Ok(StageOutcome::skipped("no time-frequency conditions"));
        }
        tracing::info!("adding TFR analysis results");

        for condition in conditions {
            let cond = sanitize_cond_name(condition);
            let power_key = ctx.key(&format!("power+{cond}+tfr"), ".h5");
            let itc_key = ctx.key(&format!("itc+{cond}+tfr"), ".h5");
            let power = ctx.derivatives.require(&power_key, "TFR power")?;
            let itc = ctx.derivatives.require(&itc_key, "TFR inter-trial coherence")?;
            let tags = ["time-frequency".to_string(), condition_tag(condition)];

            doc.push_section(
                Section::new(format!("TFR Power: {condition}"))
                    .with_tags(tags.clone())
                    .with_item(
                        ContentItem::artifact(ArtifactRef::new("power", power))
                            .with_caption(format!("TFR Power: {condition}")),
                    ),
            );
            doc.push_section(
                Section::new(format!("TFR ITC: {condition}"))
                    .with_tags(tags)
                    .with_item(
                        ContentItem::artifact(ArtifactRef::new("inter-trial coherence", itc))
                            .with_caption(format!("TFR Inter-Trial Coherence: {condition}")),
                    ),
            );
        }
        Ok(StageOutcome::Appended {
            sections: conditions.len() * 2,
        })
    }
}
