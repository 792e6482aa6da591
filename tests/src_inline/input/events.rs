use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_neuroreport_events_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_events(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

#[test]
fn test_count_trial_types() {
    let dir = make_temp_dir();
    let path = dir.join("sub-01_task-av_events.tsv");
    fs::write(
        &path,
        "onset\tduration\ttrial_type\n1.0\t0\tauditory\n2.0\t0\tvisual\n3.0\t0\tauditory\n4.0\t0\tn/a\n\n",
    )
    .unwrap();
    let counts = count_trial_types(&path).unwrap();
    assert_eq!(counts.get("auditory"), Some(&2));
    assert_eq!(counts.get("visual"), Some(&1));
    assert_eq!(counts.len(), 2);
}

#[test]
fn test_count_trial_types_requires_column() {
    let dir = make_temp_dir();
    let path = dir.join("sub-01_events.tsv");
    fs::write(&path, "onset\tduration\n1.0\t0\n").unwrap();
    assert!(matches!(
        count_trial_types(&path),
        Err(ReportError::Parse(_))
    ));

    let empty = dir.join("sub-02_events.tsv");
    fs::write(&empty, "").unwrap();
    assert!(matches!(count_trial_types(&empty), Err(ReportError::Parse(_))));
}

#[test]
fn test_short_rows_are_skipped() {
    let dir = make_temp_dir();
    let path = dir.join("sub-01_events.tsv");
    fs::write(&path, "onset\tduration\ttrial_type\n1.0\t0\n2.0\t0\tvisual\n").unwrap();
    let counts = count_trial_types(&path).unwrap();
    assert_eq!(counts.get("visual"), Some(&1));
    assert_eq!(counts.len(), 1);
}

#[test]
fn test_count_events_across_subjects() {
    let root = make_temp_dir();
    write_events(
        &root,
        "sub-02/meg/sub-02_task-av_run-01_events.tsv",
        "onset\ttrial_type\n1\tvisual\n",
    );
    write_events(
        &root,
        "sub-01/meg/sub-01_task-av_run-01_events.tsv",
        "onset\ttrial_type\n1\tauditory\n2\tauditory\n",
    );
    write_events(
        &root,
        "derivatives/x/sub-01/meg/sub-01_task-av_run-01_events.tsv",
        "onset\ttrial_type\n1\tignored\n",
    );

    let counts = count_events(&root, None).unwrap();
    assert_eq!(counts.trial_types, vec!["auditory", "visual"]);
    assert_eq!(counts.rows.len(), 2);
    assert_eq!(counts.rows[0].subject, "01");
    assert_eq!(counts.rows[0].task.as_deref(), Some("av"));
    assert_eq!(counts.rows[0].run.as_deref(), Some("01"));
    assert_eq!(counts.rows[0].counts.get("auditory"), Some(&2));
    assert_eq!(counts.rows[1].subject, "02");
}

#[test]
fn test_count_events_session_filter() {
    let root = make_temp_dir();
    write_events(
        &root,
        "sub-01/ses-a/meg/sub-01_ses-a_task-av_events.tsv",
        "onset\ttrial_type\n1\tvisual\n",
    );
    write_events(
        &root,
        "sub-01/ses-b/meg/sub-01_ses-b_task-av_events.tsv",
        "onset\ttrial_type\n1\tauditory\n",
    );
    let counts = count_events(&root, Some("b")).unwrap();
    assert_eq!(counts.rows.len(), 1);
    assert_eq!(counts.rows[0].session.as_deref(), Some("b"));
    assert_eq!(counts.trial_types, vec!["auditory"]);

    assert!(matches!(
        count_events(&root, Some("c")),
        Err(ReportError::Parse(_))
    ));
}
