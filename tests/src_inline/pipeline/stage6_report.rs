use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::input::{ArtifactLocator, SubjectId};
use crate::model::config::PipelineConfig;
use crate::report::{ContentItem, Section, Table};

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_neuroreport_sink_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn sample_document() -> ReportDocument {
    let mut doc = ReportDocument::new("sub-01, task-av");
    let mut table = Table::new(["run", "auditory", "total"]);
    table.push_row(vec!["01".to_string(), "72".to_string(), "72".to_string()]);
    doc.push_section(
        Section::new("Events")
            .with_tags(["events"])
            .with_item(ContentItem::table(table).with_caption("Events per run")),
    );
    doc.push_section(
        Section::new("Configuration file")
            .with_tags(["configuration"])
            .with_item(ContentItem::code("json", "{\"n_boot\": 2000}")),
    );
    doc.add_custom_css("section[data-tags~=\"events\"] td { text-align: center; }");
    doc
}

#[test]
fn test_report_paths_for_session() {
    let cfg = PipelineConfig {
        task: Some("av".to_string()),
        ..PipelineConfig::default()
    };
    let locator = ArtifactLocator::new("/deriv");
    let ctx = StageContext::new(
        &cfg,
        &locator,
        &locator,
        SubjectId::Subject("01".to_string()),
        Some("b"),
    );
    let paths = report_paths(&ctx);
    assert_eq!(
        paths.html,
        PathBuf::from("/deriv/sub-01/ses-b/meg/sub-01_ses-b_task-av_report.html")
    );
    assert_eq!(
        paths.json,
        PathBuf::from("/deriv/sub-01/ses-b/meg/sub-01_ses-b_task-av_report.json")
    );

    let avg = StageContext::new(&cfg, &locator, &locator, SubjectId::Average, None);
    let stats = statistics_path(&avg, &Contrast::new("auditory", "visual"));
    assert_eq!(
        stats,
        PathBuf::from(
            "/deriv/sub-average/meg/sub-average_task-av_proc-auditory+visual+TimeByTime+rocauc_decodingstats.json"
        )
    );
}

#[test]
fn test_sink_output_is_deterministic() {
    let dir = make_temp_dir();
    let doc = sample_document();
    let first = ReportPaths {
        html: dir.join("a/report.html"),
        json: dir.join("a/report.json"),
    };
    let second = ReportPaths {
        html: dir.join("b/report.html"),
        json: dir.join("b/report.json"),
    };
    write_reports(&doc, &first).unwrap();
    write_reports(&doc, &second).unwrap();
    assert_eq!(
        fs::read(&first.html).unwrap(),
        fs::read(&second.html).unwrap()
    );
    assert_eq!(
        fs::read(&first.json).unwrap(),
        fs::read(&second.json).unwrap()
    );
}

#[test]
fn test_html_and_json_content() {
    let dir = make_temp_dir();
    let paths = ReportPaths {
        html: dir.join("report.html"),
        json: dir.join("report.json"),
    };
    write_reports(&sample_document(), &paths).unwrap();

    let html = fs::read_to_string(&paths.html).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<title>sub-01, task-av</title>"));
    assert!(html.contains("data-tags=\"events\""));
    assert!(html.contains("text-align: center;"));
    assert!(html.contains("{&quot;n_boot&quot;: 2000}"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(json["tool"], env!("CARGO_PKG_NAME"));
    assert_eq!(json["title"], "sub-01, task-av");
    assert_eq!(json["sections"].as_array().unwrap().len(), 2);
    assert_eq!(json["sections"][0]["items"][0]["content"]["kind"], "table");
}

#[test]
fn test_write_into_missing_parent_fails_cleanly() {
    let dir = make_temp_dir();
    let blocker = dir.join("blocker");
    fs::write(&blocker, "file").unwrap();
    let paths = ReportPaths {
        html: blocker.join("report.html"),
        json: blocker.join("report.json"),
    };
    assert!(matches!(
        write_reports(&sample_document(), &paths),
        Err(ReportError::Io(_))
    ));
}
