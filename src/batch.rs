use std::any::Any;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use serde::Serialize;

use crate::error::{ReportError, ReportResult};
use crate::input::ArtifactLocator;
use crate::logging::task_span;
use crate::model::config::PipelineConfig;
use crate::pipeline::stage5_assemble::{SkippedStage, run_grand_average, run_subject_report};

pub const BATCH_LOG_NAME: &str = "make_reports.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTask {
    pub subject: String,
    pub session: Option<String>,
}

/// What a finished task produced: the HTML report and the stages that had
/// nothing to add to it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub report: PathBuf,
    pub statistics: Vec<PathBuf>,
    pub skipped: Vec<SkippedStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded {
        report: PathBuf,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        statistics: Vec<PathBuf>,
        skipped: Vec<SkippedStage>,
    },
    Failed {
        error: String,
        artifact_missing: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub subject: String,
    pub session: Option<String>,
    #[serde(flatten)]
    pub status: TaskStatus,
    pub elapsed_ms: u64,
}

impl TaskRecord {
    pub fn failed(&self) -> bool {
        matches!(self.status, TaskStatus::Failed { .. })
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BatchLog {
    pub subject_reports: Vec<TaskRecord>,
    pub grand_average: Vec<TaskRecord>,
}

impl BatchLog {
    pub fn n_failed(&self) -> usize {
        self.subject_reports
            .iter()
            .chain(&self.grand_average)
            .filter(|r| r.failed())
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.n_failed() > 0
    }

    pub fn write(&self, path: &Path) -> ReportResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut json = serde_json::to_string_pretty(self).map_err(|source| ReportError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        json.push('\n');
        fs::write(path, json)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub n_jobs: usize,
    /// Restricts the subject reports; the grand average always covers every
    /// configured subject.
    pub subjects: Option<Vec<String>>,
    pub subject_reports: bool,
    pub grand_average: bool,
}

impl BatchOptions {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            n_jobs: cfg.n_jobs,
            subjects: None,
            subject_reports: true,
            grand_average: true,
        }
    }
}

pub fn plan_tasks(subjects: &[String], sessions: &[Option<String>]) -> Vec<ReportTask> {
    let mut tasks = Vec::with_capacity(subjects.len() * sessions.len());
    for subject in subjects {
        for session in sessions {
            tasks.push(ReportTask {
                subject: subject.clone(),
                session: session.clone(),
            });
        }
    }
    tasks
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `job` for every task on `n_jobs` scoped workers. Errors and panics
/// stay inside their task; records come back in task order.
pub fn run_tasks<F>(tasks: &[ReportTask], n_jobs: usize, job: F) -> Vec<TaskRecord>
where
    F: Fn(&ReportTask) -> ReportResult<TaskOutput> + Sync,
{
    let counter = AtomicUsize::new(0);
    let records: Mutex<Vec<Option<TaskRecord>>> = Mutex::new(vec![None; tasks.len()]);
    let n_workers = n_jobs.clamp(1, tasks.len().max(1));

    thread::scope(|s| {
        for _ in 0..n_workers {
            let counter = &counter;
            let records = &records;
            let job = &job;
            s.spawn(move || {
                loop {
                    let idx = counter.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = tasks.get(idx) else {
                        break;
                    };
                    let span = task_span(&task.subject, task.session.as_deref());
                    let _enter = span.enter();
                    let start = Instant::now();

                    let result = catch_unwind(AssertUnwindSafe(|| job(task)))
                        .unwrap_or_else(|payload| {
                            Err(ReportError::TaskPanicked(panic_message(payload)))
                        });
                    let status = match result {
                        Ok(out) => TaskStatus::Succeeded {
                            report: out.report,
                            statistics: out.statistics,
                            skipped: out.skipped,
                        },
                        Err(err) => {
                            let artifact_missing = err.is_artifact_missing();
                            tracing::error!(artifact_missing, "report failed: {}", err);
                            TaskStatus::Failed {
                                error: err.to_string(),
                                artifact_missing,
                            }
                        }
                    };
                    let record = TaskRecord {
                        subject: task.subject.clone(),
                        session: task.session.clone(),
                        status,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    };
                    records
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())[idx] = Some(record);
                }
            });
        }
    });

    records
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .into_iter()
        .flatten()
        .collect()
}

/// Subject reports in parallel, then one grand average per session once all
/// of them have finished.
pub fn run_batch(cfg: &PipelineConfig, opts: &BatchOptions) -> ReportResult<BatchLog> {
    let derivatives = ArtifactLocator::new(cfg.deriv_root());
    let raw = ArtifactLocator::new(cfg.bids_root.clone());
    let all_subjects = cfg.subjects();
    if all_subjects.is_empty() {
        return Err(ReportError::Configuration(format!(
            "no subjects configured or found under {}",
            cfg.bids_root.display()
        )));
    }
    let sessions = cfg.sessions();
    let mut log = BatchLog::default();

    if opts.subject_reports {
        let subjects = opts.subjects.as_deref().unwrap_or(&all_subjects);
        let tasks = plan_tasks(subjects, &sessions);
        tracing::info!(
            "generating {} reports on {} workers",
            tasks.len(),
            opts.n_jobs
        );
        log.subject_reports = run_tasks(&tasks, opts.n_jobs, |task| {
            run_subject_report(
                cfg,
                &derivatives,
                &raw,
                &task.subject,
                task.session.as_deref(),
            )
            .map(|out| TaskOutput {
                report: out.report.html,
                statistics: Vec::new(),
                skipped: out.skipped,
            })
        });
    }

    if opts.grand_average {
        if cfg.task_is_rest {
            tracing::info!("resting-state task, skipping grand average");
        } else {
            let tasks = plan_tasks(&["average".to_string()], &sessions);
            log.grand_average = run_tasks(&tasks, 1, |task| {
                run_grand_average(
                    cfg,
                    &derivatives,
                    &raw,
                    &all_subjects,
                    task.session.as_deref(),
                )
                .map(|out| TaskOutput {
                    report: out.report.html,
                    statistics: out.statistics,
                    skipped: out.skipped,
                })
            });
        }
    }

    let log_path = batch_log_path(cfg);
    log.write(&log_path)?;
    tracing::info!(
        "{} tasks failed; batch log written to {}",
        log.n_failed(),
        log_path.display()
    );
    Ok(log)
}

pub fn batch_log_path(cfg: &PipelineConfig) -> PathBuf {
    cfg.deriv_root().join("logs").join(BATCH_LOG_NAME)
}

#[cfg(test)]
#[path = "../tests/src_inline/batch.rs"]
mod tests;
