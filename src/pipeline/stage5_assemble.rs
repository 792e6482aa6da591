use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::error::{ReportError, ReportResult};
use crate::input::{ArtifactLocator, SubjectId};
use crate::model::config::PipelineConfig;
use crate::model::stats::ContrastStatistics;
use crate::pipeline::stage6_report::{
    ReportPaths, report_paths, statistics_path, write_contrast_statistics, write_reports,
};
use crate::report::ReportDocument;
use crate::sections::grand_average::compute_contrast_statistics;
use crate::sections::{StageContext, average_stages, subject_stages};

/// Progress of one report. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AssemblyState {
    Empty,
    Preprocessing,
    Sensor,
    Source,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preprocessing,
    Sensor,
    Source,
    Finalize,
}

impl Phase {
    pub fn state(self) -> AssemblyState {
        match self {
            Phase::Preprocessing => AssemblyState::Preprocessing,
            Phase::Sensor => AssemblyState::Sensor,
            Phase::Source => AssemblyState::Source,
            Phase::Finalize => AssemblyState::Finalized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Appended { sections: usize },
    Skipped { reason: String },
}

impl StageOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StageOutcome::Skipped {
            reason: reason.into(),
        }
    }
}

/// One optional contribution to a report. A stage either appends sections,
/// reports why it had nothing to add, or fails the report.
pub trait ReportStage {
    fn phase(&self) -> Phase;
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome>;
}

#[derive(Debug, Clone)]
pub struct StageRecord {
    pub name: &'static str,
    pub phase: Phase,
    pub outcome: StageOutcome,
}

#[derive(Debug)]
pub struct AssembledReport {
    pub document: ReportDocument,
    pub records: Vec<StageRecord>,
}

/// A stage that added nothing to a report, as listed in the batch log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedStage {
    pub stage: String,
    pub phase: Phase,
    pub reason: String,
}

impl AssembledReport {
    pub fn skipped(&self) -> Vec<SkippedStage> {
        self.records
            .iter()
            .filter_map(|r| match &r.outcome {
                StageOutcome::Skipped { reason } => Some(SkippedStage {
                    stage: r.name.to_string(),
                    phase: r.phase,
                    reason: reason.clone(),
                }),
                StageOutcome::Appended { .. } => None,
            })
            .collect()
    }
}

pub struct Assembler {
    state: AssemblyState,
    document: ReportDocument,
    records: Vec<StageRecord>,
}

impl Assembler {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            state: AssemblyState::Empty,
            document: ReportDocument::new(title),
            records: Vec::new(),
        }
    }

    pub fn advance(&mut self, next: AssemblyState) -> ReportResult<()> {
        if next < self.state {
            return Err(ReportError::Internal(format!(
                "report assembly cannot move back from {:?} to {:?}",
                self.state, next
            )));
        }
        if self.state == AssemblyState::Finalized && next == AssemblyState::Finalized {
            return Err(ReportError::Internal(
                "report is already finalized".to_string(),
            ));
        }
        self.state = next;
        Ok(())
    }

    pub fn run_stage(
        &mut self,
        stage: &dyn ReportStage,
        ctx: &StageContext<'_>,
    ) -> ReportResult<()> {
        self.advance(stage.phase().state())?;
        let before = self.document.len();
        let outcome = stage.run(ctx, &mut self.document)?;
        match &outcome {
            StageOutcome::Appended { sections } => {
                tracing::debug!("{}: appended {} sections", stage.name(), sections);
            }
            StageOutcome::Skipped { reason } => {
                if self.document.len() != before {
                    return Err(ReportError::Internal(format!(
                        "stage {} was skipped but changed the report",
                        stage.name()
                    )));
                }
                tracing::info!("skipping {}: {}", stage.name(), reason);
            }
        }
        self.records.push(StageRecord {
            name: stage.name(),
            phase: stage.phase(),
            outcome,
        });
        Ok(())
    }

    pub fn finish(self) -> ReportResult<AssembledReport> {
        if self.state != AssemblyState::Finalized {
            return Err(ReportError::Internal(format!(
                "report ended in state {:?} without finalization",
                self.state
            )));
        }
        Ok(AssembledReport {
            document: self.document,
            records: self.records,
        })
    }
}

#[cfg(test)]
impl Assembler {
    pub fn state(&self) -> AssemblyState {
        self.state
    }
}

/// Runs `stages` in order. Any stage error aborts the whole report.
pub fn assemble(
    title: impl Into<String>,
    stages: &[Box<dyn ReportStage + '_>],
    ctx: &StageContext<'_>,
) -> ReportResult<AssembledReport> {
    let mut assembler = Assembler::new(title);
    for stage in stages {
        assembler.run_stage(stage.as_ref(), ctx)?;
    }
    assembler.finish()
}

pub fn report_title(cfg: &PipelineConfig, subject: &SubjectId, session: Option<&str>) -> String {
    let mut title = format!("sub-{}", subject.label());
    if let Some(ses) = session {
        title.push_str(&format!(", ses-{ses}"));
    }
    if let Some(task) = &cfg.task {
        title.push_str(&format!(", task-{task}"));
    }
    title
}

#[derive(Debug)]
pub struct SubjectReportOutput {
    pub report: ReportPaths,
    pub skipped: Vec<SkippedStage>,
}

/// Builds and writes the report of one subject and session.
pub fn run_subject_report(
    cfg: &PipelineConfig,
    derivatives: &ArtifactLocator,
    raw: &ArtifactLocator,
    subject: &str,
    session: Option<&str>,
) -> ReportResult<SubjectReportOutput> {
    let id = SubjectId::Subject(subject.to_string());
    let ctx = StageContext::new(cfg, derivatives, raw, id.clone(), session);
    tracing::info!("generating report");

    let stages = subject_stages();
    let report = assemble(report_title(cfg, &id, session), &stages, &ctx)?;
    let paths = report_paths(&ctx);
    write_reports(&report.document, &paths)?;
    let skipped = report.skipped();
    tracing::info!(
        "report written to {} ({} sections skipped)",
        paths.html.display(),
        skipped.len()
    );
    Ok(SubjectReportOutput {
        report: paths,
        skipped,
    })
}

#[derive(Debug)]
pub struct GrandAverageOutput {
    pub report: ReportPaths,
    pub statistics: Vec<PathBuf>,
    pub skipped: Vec<SkippedStage>,
}

/// Group report of one session. Statistics are computed for every decoding
/// contrast before assembly; nothing is written unless the whole report
/// succeeds.
pub fn run_grand_average(
    cfg: &PipelineConfig,
    derivatives: &ArtifactLocator,
    raw: &ArtifactLocator,
    subjects: &[String],
    session: Option<&str>,
) -> ReportResult<GrandAverageOutput> {
    let ctx = StageContext::new(cfg, derivatives, raw, SubjectId::Average, session);
    tracing::info!("generating grand average report");

    let mut statistics: Vec<ContrastStatistics> = Vec::new();
    if cfg.decoding_enabled() {
        for (idx, contrast) in cfg.decoding_contrasts().iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(cfg.random_state.wrapping_add(idx as u64));
            statistics.push(compute_contrast_statistics(
                &ctx, subjects, contrast, &mut rng,
            )?);
        }
    }

    let stages = average_stages(&statistics);
    let report = assemble(
        report_title(cfg, &SubjectId::Average, session),
        &stages,
        &ctx,
    )?;

    let paths = report_paths(&ctx);
    write_reports(&report.document, &paths)?;
    let mut written = Vec::with_capacity(statistics.len());
    for stats in &statistics {
        let path = statistics_path(&ctx, &stats.contrast);
        write_contrast_statistics(stats, &path)?;
        written.push(path);
    }
    tracing::info!("grand average report written to {}", paths.html.display());

    Ok(GrandAverageOutput {
        report: paths,
        statistics: written,
        skipped: report.skipped(),
    })
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage5_assemble.rs"]
mod tests;
