use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::pipeline::stage5_assemble::Phase;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_neuroreport_batch_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn output(report: &str) -> TaskOutput {
    TaskOutput {
        report: PathBuf::from(report),
        statistics: Vec::new(),
        skipped: Vec::new(),
    }
}

fn subjects(n: usize) -> Vec<String> {
    (1..=n).map(|s| format!("{s:02}")).collect()
}

#[test]
fn test_plan_covers_subject_session_pairs() {
    let tasks = plan_tasks(&subjects(2), &[Some("a".to_string()), Some("b".to_string())]);
    assert_eq!(tasks.len(), 4);
    assert_eq!(tasks[0].subject, "01");
    assert_eq!(tasks[1].session.as_deref(), Some("b"));
    assert_eq!(tasks[2].subject, "02");

    let tasks = plan_tasks(&subjects(3), &[None]);
    assert!(tasks.iter().all(|t| t.session.is_none()));
}

#[test]
fn test_failures_and_panics_stay_in_their_task() {
    let tasks = plan_tasks(&subjects(6), &[None]);
    let seen = AtomicUsize::new(0);
    let records = run_tasks(&tasks, 3, |task| {
        seen.fetch_add(1, Ordering::SeqCst);
        match task.subject.as_str() {
            "02" => Err(ReportError::missing("epochs", "/nowhere/epo.fif")),
            "04" => panic!("corrupt artifact"),
            s => Ok(output(&format!("sub-{s}_report.html"))),
        }
    });

    assert_eq!(seen.load(Ordering::SeqCst), 6);
    assert_eq!(records.len(), 6);
    let ids: Vec<&str> = records.iter().map(|r| r.subject.as_str()).collect();
    assert_eq!(ids, vec!["01", "02", "03", "04", "05", "06"]);
    assert!(records[1].failed());
    assert!(matches!(
        records[1].status,
        TaskStatus::Failed {
            artifact_missing: true,
            ..
        }
    ));
    match &records[3].status {
        TaskStatus::Failed {
            error,
            artifact_missing,
        } => {
            assert!(error.contains("corrupt artifact"));
            assert!(!artifact_missing);
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(
        records[4].status,
        TaskStatus::Succeeded {
            report: PathBuf::from("sub-05_report.html"),
            statistics: Vec::new(),
            skipped: Vec::new(),
        }
    );
    assert_eq!(records.iter().filter(|r| r.failed()).count(), 2);
}

#[test]
fn test_more_workers_than_tasks() {
    let tasks = plan_tasks(&subjects(1), &[None]);
    let records = run_tasks(&tasks, 8, |_| Ok(output("r.html")));
    assert_eq!(records.len(), 1);
    assert!(!records[0].failed());
    assert!(run_tasks(&[], 4, |_| Ok(output(""))).is_empty());
}

#[test]
fn test_batch_log_counts_failures() {
    let dir = make_temp_dir();
    let record = |subject: &str, failed: bool| TaskRecord {
        subject: subject.to_string(),
        session: None,
        status: if failed {
            TaskStatus::Failed {
                error: "missing".to_string(),
                artifact_missing: true,
            }
        } else {
            TaskStatus::Succeeded {
                report: PathBuf::from("r.html"),
                statistics: Vec::new(),
                skipped: vec![SkippedStage {
                    stage: "source space".to_string(),
                    phase: Phase::Source,
                    reason: "no coregistration found".to_string(),
                }],
            }
        },
        elapsed_ms: 1,
    };
    let log = BatchLog {
        subject_reports: vec![record("01", false), record("02", true)],
        grand_average: vec![record("average", false)],
    };
    assert_eq!(log.n_failed(), 1);
    assert!(log.has_failures());

    let path = dir.join("logs").join(BATCH_LOG_NAME);
    log.write(&path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["subject_reports"][1]["status"], "failed");
    assert_eq!(json["subject_reports"][1]["error"], "missing");
    assert_eq!(json["subject_reports"][1]["artifact_missing"], true);
    assert_eq!(json["grand_average"][0]["report"], "r.html");
    assert!(json["grand_average"][0].get("statistics").is_none());
    let skipped = &json["subject_reports"][0]["skipped"][0];
    assert_eq!(skipped["stage"], "source space");
    assert_eq!(skipped["phase"], "source");
    assert_eq!(skipped["reason"], "no coregistration found");
}

#[test]
fn test_run_batch_isolates_failing_subjects() {
    let root = make_temp_dir();
    let cfg = PipelineConfig {
        bids_root: root.join("bids"),
        deriv_root: Some(root.join("derivatives")),
        subjects: subjects(3),
        task: Some("av".to_string()),
        task_is_rest: true,
        n_jobs: 2,
        ..PipelineConfig::default()
    };
    let dir = cfg.deriv_root().join("sub-02/meg");
    fs::create_dir_all(&dir).unwrap();
    for name in ["proc-filt_raw.fif", "epo.fif", "proc-clean_epo.fif"] {
        fs::write(dir.join(format!("sub-02_task-av_{name}")), "fif").unwrap();
    }

    let log = run_batch(&cfg, &BatchOptions::from_config(&cfg)).unwrap();
    assert_eq!(log.subject_reports.len(), 3);
    assert!(log.subject_reports[0].failed());
    assert!(!log.subject_reports[1].failed());
    assert!(log.subject_reports[2].failed());
    assert!(log.grand_average.is_empty());
    assert_eq!(log.n_failed(), 2);
    assert!(matches!(
        log.subject_reports[0].status,
        TaskStatus::Failed {
            artifact_missing: true,
            ..
        }
    ));
    match &log.subject_reports[1].status {
        TaskStatus::Succeeded {
            report, skipped, ..
        } => {
            assert_eq!(report, &dir.join("sub-02_task-av_report.html"));
            assert!(
                skipped
                    .iter()
                    .any(|s| s.stage == "source space" && s.phase == Phase::Source)
            );
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert!(dir.join("sub-02_task-av_report.html").is_file());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(batch_log_path(&cfg)).unwrap()).unwrap();
    let listed = json["subject_reports"][1]["skipped"].as_array().unwrap();
    assert!(listed.iter().any(|s| s["stage"] == "source space"));
}

#[test]
fn test_run_batch_without_subjects_is_configuration_error() {
    let root = make_temp_dir();
    let cfg = PipelineConfig {
        bids_root: root.join("empty"),
        deriv_root: Some(root.join("derivatives")),
        ..PipelineConfig::default()
    };
    let err = run_batch(&cfg, &BatchOptions::from_config(&cfg)).unwrap_err();
    assert!(matches!(err, ReportError::Configuration(_)));
}
