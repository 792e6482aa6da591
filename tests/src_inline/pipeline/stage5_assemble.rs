use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::input::scores::ScoreLoader;
use crate::model::contrast::{Contrast, ContrastSpec, DecodingKind};
use crate::report::Section;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_neuroreport_assemble_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn touch(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn study_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        bids_root: root.join("bids"),
        deriv_root: Some(root.join("derivatives")),
        task: Some("av".to_string()),
        conditions: vec!["auditory".to_string(), "visual".to_string()],
        contrasts: vec![ContrastSpec::Pair(
            "auditory".to_string(),
            "visual".to_string(),
        )],
        n_boot: 50,
        cluster_n_permutations: 50,
        ..PipelineConfig::default()
    }
}

fn write_subject_scores(cfg: &PipelineConfig, locator: &ArtifactLocator, subject: &str, peak: f64) {
    let loader = ScoreLoader::new(cfg, locator);
    let id = SubjectId::Subject(subject.to_string());
    let contrast = Contrast::new("auditory", "visual");
    let full = loader.key(&id, None, &contrast, DecodingKind::FullEpochs);
    touch(&locator.path(&full), &format!("{{\"scores\": [{peak}, 0.7, 0.8]}}"));
    let tbt = loader.key(&id, None, &contrast, DecodingKind::TimeByTime);
    let curve: Vec<String> = (0..12)
        .map(|t| {
            let v = if (4..8).contains(&t) { peak } else { 0.5 };
            v.to_string()
        })
        .collect();
    let times: Vec<String> = (0..12).map(|t| format!("{:.2}", -0.1 + t as f64 * 0.05)).collect();
    touch(
        &locator.path(&tbt),
        &format!(
            "{{\"times\": [{}], \"scores\": [[{}], [{}]]}}",
            times.join(", "),
            curve.join(", "),
            curve.join(", ")
        ),
    );
}

/// Preprocessing and sensor artifacts of one subject; no coregistration.
fn write_subject_artifacts(cfg: &PipelineConfig, subject: &str) {
    let deriv = cfg.deriv_root();
    let dir = deriv.join(format!("sub-{subject}/meg"));
    for name in ["proc-filt_raw.fif", "epo.fif", "proc-clean_epo.fif", "ave.fif"] {
        touch(&dir.join(format!("sub-{subject}_task-av_{name}")), "fif");
    }
    touch(
        &cfg.bids_root
            .join(format!("sub-{subject}/meg/sub-{subject}_task-av_events.tsv")),
        "onset\tduration\ttrial_type\n0.5\t0\tauditory\n1.5\t0\tvisual\n2.5\t0\tauditory\n",
    );
    let locator = ArtifactLocator::new(deriv);
    write_subject_scores(cfg, &locator, subject, 0.9);
}

struct AlwaysSkips {
    sneaky: bool,
}

impl ReportStage for AlwaysSkips {
    fn phase(&self) -> Phase {
        Phase::Sensor
    }

    fn name(&self) -> &'static str {
        "always skips"
    }

    fn run(&self, _ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        if self.sneaky {
            doc.push_section(Section::new("unexpected"));
        }
        Ok(StageOutcome::skipped("nothing to add"))
    }
}

#[test]
fn test_state_only_moves_forward() {
    let mut asm = Assembler::new("sub-01");
    assert_eq!(asm.state(), AssemblyState::Empty);
    asm.advance(AssemblyState::Preprocessing).unwrap();
    asm.advance(AssemblyState::Preprocessing).unwrap();
    asm.advance(AssemblyState::Source).unwrap();
    assert!(matches!(
        asm.advance(AssemblyState::Sensor),
        Err(ReportError::Internal(_))
    ));
    asm.advance(AssemblyState::Finalized).unwrap();
    assert!(matches!(
        asm.advance(AssemblyState::Finalized),
        Err(ReportError::Internal(_))
    ));
    assert!(asm.finish().is_ok());
}

#[test]
fn test_finish_requires_finalization() {
    let mut asm = Assembler::new("sub-01");
    asm.advance(AssemblyState::Sensor).unwrap();
    assert!(matches!(asm.finish(), Err(ReportError::Internal(_))));
}

#[test]
fn test_skipped_stage_must_leave_document_untouched() {
    let cfg = PipelineConfig::default();
    let locator = ArtifactLocator::new(make_temp_dir());
    let ctx = StageContext::new(&cfg, &locator, &locator, SubjectId::Average, None);

    let mut asm = Assembler::new("t");
    asm.run_stage(&AlwaysSkips { sneaky: false }, &ctx).unwrap();
    assert_eq!(asm.state(), AssemblyState::Sensor);

    let mut asm = Assembler::new("t");
    assert!(matches!(
        asm.run_stage(&AlwaysSkips { sneaky: true }, &ctx),
        Err(ReportError::Internal(_))
    ));
}

#[test]
fn test_report_title() {
    let cfg = PipelineConfig {
        task: Some("av".to_string()),
        ..PipelineConfig::default()
    };
    let id = SubjectId::Subject("01".to_string());
    assert_eq!(report_title(&cfg, &id, Some("b")), "sub-01, ses-b, task-av");
    assert_eq!(report_title(&cfg, &SubjectId::Average, None), "sub-average, task-av");
}

#[test]
fn test_subject_without_coregistration_skips_source() {
    let root = make_temp_dir();
    let cfg = study_config(&root);
    write_subject_artifacts(&cfg, "01");
    let derivatives = ArtifactLocator::new(cfg.deriv_root());
    let raw = ArtifactLocator::new(cfg.bids_root.clone());

    let ctx = StageContext::new(
        &cfg,
        &derivatives,
        &raw,
        SubjectId::Subject("01".to_string()),
        None,
    );
    let report = assemble("sub-01", &subject_stages(), &ctx).unwrap();
    let skipped = report.skipped();
    let source = skipped
        .iter()
        .find(|s| s.stage == "source space")
        .expect("source space skipped");
    assert_eq!(source.phase, Phase::Source);
    assert!(!source.reason.is_empty());
    let doc = &report.document;
    assert!(doc.section("Raw").is_some());
    assert!(doc.section("Events").is_some());
    assert!(doc.section("Condition: auditory").is_some());
    assert!(doc.section("Contrast: auditory+visual").is_some());
    assert!(doc.section("Decoding performance over time").is_some());
    assert!(doc.section("Sensor alignment").is_none());
    assert_eq!(
        doc.sections().last().map(|s| s.title.as_str()),
        Some("System information")
    );

    let out = run_subject_report(&cfg, &derivatives, &raw, "01", None).unwrap();
    assert!(out.report.html.is_file());
    assert!(out.report.json.is_file());
    assert!(out.report.html.ends_with("sub-01/meg/sub-01_task-av_report.html"));
    assert_eq!(out.skipped, skipped);
}

#[test]
fn test_subject_missing_required_artifact_fails() {
    let root = make_temp_dir();
    let cfg = study_config(&root);
    write_subject_artifacts(&cfg, "01");
    let epochs = cfg
        .deriv_root()
        .join("sub-01/meg/sub-01_task-av_proc-clean_epo.fif");
    fs::remove_file(epochs).unwrap();
    let derivatives = ArtifactLocator::new(cfg.deriv_root());
    let raw = ArtifactLocator::new(cfg.bids_root.clone());

    let err = run_subject_report(&cfg, &derivatives, &raw, "01", None).unwrap_err();
    assert!(err.is_artifact_missing());
    assert!(
        !cfg.deriv_root()
            .join("sub-01/meg/sub-01_task-av_report.html")
            .exists()
    );
}

#[test]
fn test_grand_average_with_missing_subject_scores_writes_nothing() {
    let root = make_temp_dir();
    let cfg = study_config(&root);
    let subjects: Vec<String> = (1..=5).map(|s| format!("0{s}")).collect();
    let derivatives = ArtifactLocator::new(cfg.deriv_root());
    let raw = ArtifactLocator::new(cfg.bids_root.clone());
    for subject in &subjects[..4] {
        write_subject_scores(&cfg, &derivatives, subject, 0.9);
    }

    let err = run_grand_average(&cfg, &derivatives, &raw, &subjects, None).unwrap_err();
    assert!(err.is_artifact_missing());
    assert!(!cfg.deriv_root().join("sub-average").exists());
}

#[test]
fn test_grand_average_writes_report_and_statistics() {
    let root = make_temp_dir();
    let cfg = study_config(&root);
    let subjects: Vec<String> = vec!["01".into(), "02".into(), "03".into()];
    for (i, subject) in subjects.iter().enumerate() {
        write_subject_artifacts(&cfg, subject);
        let locator = ArtifactLocator::new(cfg.deriv_root());
        write_subject_scores(&cfg, &locator, subject, 0.85 + 0.05 * i as f64);
    }
    touch(
        &cfg.deriv_root().join("sub-average/meg/sub-average_task-av_ave.fif"),
        "fif",
    );
    let derivatives = ArtifactLocator::new(cfg.deriv_root());
    let raw = ArtifactLocator::new(cfg.bids_root.clone());

    let out = run_grand_average(&cfg, &derivatives, &raw, &subjects, None).unwrap();
    assert!(out.report.html.is_file());
    assert!(out.report.json.is_file());
    assert_eq!(out.statistics.len(), 1);
    let stats_name = out.statistics[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(stats_name.ends_with("_decodingstats.json"));

    let stats: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out.statistics[0]).unwrap()).unwrap();
    assert_eq!(stats["subjects"].as_array().unwrap().len(), 3);
    let clusters = stats["clusters"]["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["start"], 4);
    assert_eq!(clusters[0]["stop"], 8);

    let html = fs::read_to_string(&out.report.html).unwrap();
    assert!(html.contains("Event counts"));
    assert!(html.contains("Average: auditory"));
    assert!(html.contains("t-values based on decoding scores over time"));
}

#[test]
fn test_grand_average_is_reproducible() {
    let root = make_temp_dir();
    let cfg = study_config(&root);
    let subjects: Vec<String> = vec!["01".into(), "02".into()];
    let derivatives = ArtifactLocator::new(cfg.deriv_root());
    let raw = ArtifactLocator::new(cfg.bids_root.clone());
    write_subject_scores(&cfg, &derivatives, "01", 0.8);
    write_subject_scores(&cfg, &derivatives, "02", 0.9);
    touch(
        &cfg.deriv_root().join("sub-average/meg/sub-average_task-av_ave.fif"),
        "fif",
    );

    let first = run_grand_average(&cfg, &derivatives, &raw, &subjects, None).unwrap();
    let a = fs::read_to_string(&first.statistics[0]).unwrap();
    let second = run_grand_average(&cfg, &derivatives, &raw, &subjects, None).unwrap();
    let b = fs::read_to_string(&second.statistics[0]).unwrap();
    assert_eq!(a, b);
}
