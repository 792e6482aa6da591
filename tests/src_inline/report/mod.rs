use super::figure::{BarChart, Heatmap, Line, LineStyle, Plot, Span, TimeCourse};
use super::html::{escape, render_html};
use super::svg::render_figure;
use super::*;

fn time_course_figure(values: Vec<f64>) -> Figure {
    let x: Vec<f64> = (0..values.len()).map(|i| i as f64 * 0.1).collect();
    Figure {
        title: "Decoding <AUC>".to_string(),
        x_label: "Time (s)".to_string(),
        y_label: "ROC AUC".to_string(),
        plot: Plot::TimeCourse(TimeCourse {
            lines: vec![Line {
                label: Some("mean".to_string()),
                x,
                y: values,
                color: "#1f77b4".to_string(),
                style: LineStyle::Solid,
                width: 2.0,
            }],
            spans: vec![Span {
                start: 0.1,
                stop: 0.2,
                color: "#f2c12e".to_string(),
                label: None,
            }],
            ..TimeCourse::default()
        }),
    }
}

#[test]
fn test_document_appends_in_order() {
    let mut doc = ReportDocument::new("sub-01");
    assert!(doc.is_empty());
    doc.push_section(Section::new("Raw").with_tags(["raw", "run-01"]));
    doc.push_section(Section::new("Events").with_tags(["events"]));
    assert_eq!(doc.len(), 2);
    assert_eq!(doc.sections()[0].title, "Raw");
    assert!(doc.has_tag("run-01"));
    assert!(!doc.has_tag("ica"));
    assert!(doc.section("Events").is_some());
    assert!(doc.section("ICA").is_none());
}

#[test]
fn test_custom_css_is_deduplicated() {
    let mut doc = ReportDocument::new("sub-average");
    doc.add_custom_css("table { margin: 0 auto; }");
    doc.add_custom_css("table { margin: 0 auto; }");
    doc.add_custom_css("td { text-align: center; }");
    assert_eq!(doc.custom_css().len(), 2);
}

#[test]
fn test_format_helpers() {
    assert_eq!(format_num(0.12345), "0.123");
    assert_eq!(format_num(f64::NAN), "n/a");
    assert_eq!(format_num(f64::INFINITY), "inf");
    assert_eq!(format_num(f64::NEG_INFINITY), "-inf");
    assert_eq!(format_bytes(512), "512 B");
    assert_eq!(format_bytes(2048), "2.0 KiB");
    assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
}

#[test]
fn test_escape() {
    assert_eq!(escape("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
}

#[test]
fn test_svg_time_course() {
    let svg = render_figure(&time_course_figure(vec![0.5, 0.6, 0.8, 0.7]));
    assert!(svg.starts_with("<svg"));
    assert!(svg.ends_with("</svg>"));
    assert!(svg.contains("Decoding &lt;AUC&gt;"));
    assert!(svg.contains("#f2c12e"));
    assert!(!svg.contains("NaN"));
}

#[test]
fn test_svg_handles_degenerate_data() {
    let svg = render_figure(&time_course_figure(vec![0.5]));
    assert!(!svg.contains("NaN"));
    let svg = render_figure(&time_course_figure(vec![f64::NAN, f64::INFINITY, 0.5]));
    assert!(!svg.contains("NaN"));
    assert!(!svg.contains("inf"));
}

#[test]
fn test_svg_heatmap_and_bars() {
    let heatmap = Figure {
        title: "TG".to_string(),
        x_label: "Testing time (s)".to_string(),
        y_label: "Training time (s)".to_string(),
        plot: Plot::Heatmap(Heatmap {
            x: vec![0.0, 0.1],
            y: vec![0.0, 0.1],
            values: vec![vec![0.7, 0.5], vec![0.4, 0.6]],
            vmin: 0.3,
            vmax: 0.7,
            colorbar_label: "ROC AUC".to_string(),
            diagonal: true,
        }),
    };
    let svg = render_figure(&heatmap);
    assert!(svg.matches("<rect").count() >= 5);

    let bars = Figure {
        title: "Noisy channels".to_string(),
        x_label: "Channel".to_string(),
        y_label: "Score".to_string(),
        plot: Plot::Bars(BarChart {
            labels: vec!["MEG 0111".to_string(), "MEG 0112".to_string()],
            values: vec![1.0, 7.0],
            highlighted: vec![false, true],
            threshold: Some(5.0),
        }),
    };
    let svg = render_figure(&bars);
    assert!(svg.contains("MEG 0112"));
}

#[test]
fn test_html_groups_and_tags() {
    let mut doc = ReportDocument::new("sub-01");
    doc.push_section(Section::new("Raw").with_tags(["raw"]));
    for title in ["Decoding performance over time", "Time generalization"] {
        doc.push_section(
            Section::new(title)
                .with_group("Time-by-time decoding: a ./. b")
                .with_tags(["decoding"])
                .with_item(ContentItem::figure(time_course_figure(vec![0.5, 0.6]))),
        );
    }
    doc.push_section(
        Section::new("Artifacts").with_item(ContentItem::html("<p>raw html</p>")),
    );

    let html = render_html(&doc);
    assert_eq!(
        html.matches("<h3 class=\"group\">Time-by-time decoding: a ./. b</h3>")
            .count(),
        1
    );
    assert_eq!(html.matches("<section ").count(), 4);
    assert!(html.contains("<span class=\"tag\">decoding</span>"));
    assert!(html.contains("<p>raw html</p>"));
    assert!(html.contains("href=\"#s0-raw\""));
}

#[test]
fn test_empty_document_has_no_navigation() {
    let html = render_html(&ReportDocument::new("sub-01"));
    assert!(!html.contains("<nav>"));
    assert!(html.contains("<main>\n</main>"));
}

#[test]
fn test_artifact_reference_reads_size() {
    let mut path = std::env::temp_dir();
    path.push(format!("kira_neuroreport_artifact_{}.fif", std::process::id()));
    std::fs::write(&path, vec![0u8; 300]).unwrap();
    let artifact = ArtifactRef::new("epochs", path.clone()).with_detail("picks", "meg");
    assert_eq!(artifact.size_bytes, Some(300));
    assert_eq!(artifact.details, vec![("picks".to_string(), "meg".to_string())]);

    let missing = ArtifactRef::new("epochs", path.with_extension("missing"));
    assert_eq!(missing.size_bytes, None);
}
