use std::collections::BTreeSet;

use crate::error::{ReportError, ReportResult};
use crate::input::auto_scores::read_auto_scores;
use crate::input::events::count_trial_types;
use crate::model::config::SpatialFilter;
use crate::pipeline::stage4_figures::auto_scores_figure;
use crate::pipeline::stage5_assemble::{Phase, ReportStage, StageOutcome};
use crate::report::{ArtifactRef, ContentItem, ReportDocument, Section, Table};
use crate::sections::StageContext;

fn run_tag(run: Option<&str>) -> Option<String> {
    run.map(|r| format!("run-{r}"))
}

fn channel_type_selected(ch_types: &[String], ch_type: &str) -> bool {
    if ch_type == "all" || ch_types.is_empty() {
        return true;
    }
    ch_types.iter().any(|t| {
        t == ch_type || (t == "meg" && matches!(ch_type, "mag" | "grad"))
    })
}

pub struct FilteredRaw;

impl ReportStage for FilteredRaw {
    fn phase(&self) -> Phase {
        Phase::Preprocessing
    }

    fn name(&self) -> &'static str {
        "filtered raw"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        let mut added = 0;
        for run in cfg.runs() {
            let run = run.as_deref();
            tracing::info!("adding filtered raw data (run {})", run.unwrap_or("-"));
            let key = ctx
                .key("raw", ".fif")
                .with_run(run)
                .with_processing(Some("filt"));
            let path = ctx.derivatives.require(&key, "filtered raw data")?;

            let title = match run {
                Some(r) => format!("Raw, run {r}"),
                None => "Raw".to_string(),
            };
            let psd = if cfg.plot_psd_for_runs.includes(run) { "yes" } else { "no" };
            let artifact = ArtifactRef::new("filtered raw", path)
                .with_detail("power spectral density", psd)
                .with_detail("picks", cfg.analyze_channels.describe(&cfg.ch_types));
            let section = Section::new(title)
                .with_tags(["raw", "filtered"])
                .with_tags(run_tag(run))
                .with_item(ContentItem::artifact(artifact));
            doc.push_section(section);
            added += 1;
        }
        Ok(StageOutcome::Appended { sections: added })
    }
}

pub struct EmptyRoom;

impl ReportStage for EmptyRoom {
    fn phase(&self) -> Phase {
        Phase::Preprocessing
    }

    fn name(&self) -> &'static str {
        "empty-room recording"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let key = ctx
            .key("raw", ".fif")
            .with_task(Some("noise"))
            .with_processing(Some("filt"));
        let Some(path) = ctx.derivatives.locate(&key) else {
            return Ok(StageOutcome::skipped("no filtered empty-room recording"));
        };
        tracing::info!("adding filtered empty-room raw data");
        doc.push_section(
            Section::new("Empty-Room")
                .with_tags(["raw", "empty-room"])
                .with_item(ContentItem::artifact(ArtifactRef::new(
                    "filtered empty-room raw",
                    path,
                ))),
        );
        Ok(StageOutcome::Appended { sections: 1 })
    }
}

/// Bar figures of the automated noisy-channel detection, one per run and
/// channel type.
pub struct DataQuality;

impl ReportStage for DataQuality {
    fn phase(&self) -> Phase {
        Phase::Preprocessing
    }

    fn name(&self) -> &'static str {
        "data quality"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        if !cfg.find_noisy_channels_meg {
            return Ok(StageOutcome::skipped("noisy channel detection disabled"));
        }
        tracing::info!("adding visualization of noisy channel detection");

        let mut section = Section::new("Data Quality").with_tags(["raw", "data-quality"]);
        for run in cfg.runs() {
            let run = run.as_deref();
            let key = ctx
                .key("scores", ".json")
                .with_run(run)
                .with_processing(cfg.proc.as_deref());
            let path = ctx
                .derivatives
                .require(&key, "automated noisy channel scores")?;
            let scores = read_auto_scores(&path)?;
            let run_label = match run {
                Some(r) => format!("Run {r}"),
                None => "Run".to_string(),
            };
            for group in scores.by_type() {
                if !channel_type_selected(&cfg.ch_types, &group.ch_type) {
                    continue;
                }
                let fig = auto_scores_figure(&run_label, &group, scores.limit_noisy, &scores.bads);
                section.push(ContentItem::figure(fig).with_caption(run_label.clone()));
            }
            section.tags.extend(run_tag(run));
        }
        if section.items.is_empty() {
            return Err(ReportError::Parse(format!(
                "no noisy channel scores for channel types {}",
                cfg.ch_types.join(", ")
            )));
        }
        doc.push_section(section);
        Ok(StageOutcome::Appended { sections: 1 })
    }
}

/// Trial-type counts of the BIDS events tables of every configured run.
pub struct Events;

impl ReportStage for Events {
    fn phase(&self) -> Phase {
        Phase::Preprocessing
    }

    fn name(&self) -> &'static str {
        "events"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        if cfg.task_is_rest {
            return Ok(StageOutcome::skipped("resting-state task has no events"));
        }
        tracing::info!("adding events summary");

        let mut per_run = Vec::new();
        let mut trial_types = BTreeSet::new();
        for run in cfg.runs() {
            let mut key = ctx.key("events", ".tsv").with_run(run.as_deref());
            key.space = None;
            let path = ctx.raw.require(&key, "events table")?;
            let counts = count_trial_types(&path)?;
            trial_types.extend(counts.keys().cloned());
            per_run.push((run, counts));
        }

        let mut columns = vec!["run".to_string()];
        columns.extend(trial_types.iter().cloned());
        columns.push("total".to_string());
        let mut table = Table::new(columns);
        for (run, counts) in &per_run {
            let mut row = vec![run.clone().unwrap_or_else(|| "-".to_string())];
            for tt in &trial_types {
                row.push(counts.get(tt).copied().unwrap_or(0).to_string());
            }
            row.push(counts.values().sum::<usize>().to_string());
            table.push_row(row);
        }

        doc.push_section(
            Section::new("Events")
                .with_tags(["events"])
                .with_item(ContentItem::table(table).with_caption("Events per run")),
        );
        Ok(StageOutcome::Appended { sections: 1 })
    }
}

fn epochs_section(
    ctx: &StageContext<'_>,
    title: &str,
    processing: Option<&str>,
) -> ReportResult<Section> {
    let key = ctx.key("epo", ".fif").with_processing(processing);
    let path = ctx.derivatives.require(&key, title)?;
    Ok(Section::new(title)
        .with_tags(["epochs"])
        .with_item(ContentItem::artifact(
            ArtifactRef::new("epochs", path)
                .with_detail("picks", ctx.cfg.analyze_channels.describe(&ctx.cfg.ch_types)),
        )))
}

pub struct EpochsBeforeCleaning;

impl ReportStage for EpochsBeforeCleaning {
    fn phase(&self) -> Phase {
        Phase::Preprocessing
    }

    fn name(&self) -> &'static str {
        "epochs before cleaning"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        tracing::info!("adding uncleaned epochs");
        doc.push_section(epochs_section(ctx, "Epochs (before cleaning)", None)?);
        Ok(StageOutcome::Appended { sections: 1 })
    }
}

pub struct EpochsAfterCleaning;

impl ReportStage for EpochsAfterCleaning {
    fn phase(&self) -> Phase {
        Phase::Preprocessing
    }

    fn name(&self) -> &'static str {
        "epochs after cleaning"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        tracing::info!("adding cleaned epochs");
        doc.push_section(epochs_section(ctx, "Epochs (after cleaning)", Some("clean"))?);
        Ok(StageOutcome::Appended { sections: 1 })
    }
}

pub struct Ica;

impl ReportStage for Ica {
    fn phase(&self) -> Phase {
        Phase::Preprocessing
    }

    fn name(&self) -> &'static str {
        "ICA"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        if ctx.cfg.spatial_filter != Some(SpatialFilter::Ica) {
            return Ok(StageOutcome::skipped("ICA not configured"));
        }
        tracing::info!("adding ICA");
        let path = ctx
            .derivatives
            .require(&ctx.key("ica", ".fif"), "ICA decomposition")?;
        doc.push_section(
            Section::new("ICA")
                .with_tags(["ica"])
                .with_item(ContentItem::artifact(ArtifactRef::new("ICA", path))),
        );
        Ok(StageOutcome::Appended { sections: 1 })
    }
}

/// SSP projectors per artifact kind, when the matching epochs were created.
pub struct Ssp;

impl ReportStage for Ssp {
    fn phase(&self) -> Phase {
        Phase::Preprocessing
    }

    fn name(&self) -> &'static str {
        "SSP"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        if cfg.spatial_filter != Some(SpatialFilter::Ssp) {
            return Ok(StageOutcome::skipped("SSP not configured"));
        }
        let mut added = 0;
        for kind in ["ecg", "eog"] {
            let epochs_key = ctx.key(&format!("{kind}-epo"), ".fif");
            let Some(epochs_path) = ctx.derivatives.locate(&epochs_key) else {
                continue;
            };
            tracing::info!("adding {} SSP", kind.to_uppercase());
            let proj_path = ctx
                .derivatives
                .require(&ctx.key("proj", ".fif"), "SSP projectors")?;
            let trace = match kind {
                "eog" if !cfg.eog_channels.is_empty() => cfg.eog_channels.join(", "),
                _ => kind.to_string(),
            };
            let section = Section::new(format!("SSP: {}", kind.to_uppercase()))
                .with_tags(["ssp", kind])
                .with_item(ContentItem::artifact(
                    ArtifactRef::new(format!("{} epochs", kind.to_uppercase()), epochs_path)
                        .with_detail("trace channels", trace),
                ))
                .with_item(ContentItem::artifact(ArtifactRef::new("projectors", proj_path)));
            doc.push_section(section);
            added += 1;
        }
        if added == 0 {
            return Ok(StageOutcome::skipped("no ECG or EOG epochs"));
        }
        Ok(StageOutcome::Appended { sections: added })
    }
}
