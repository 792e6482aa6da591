use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{ReportError, ReportResult};
use crate::model::contrast::{Contrast, DecodingKind};
use crate::model::stats::ContrastStatistics;
use crate::report::ReportDocument;
use crate::report::html::render_html;
use crate::report::json::render_report_json;
use crate::sections::StageContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub html: PathBuf,
    pub json: PathBuf,
}

pub fn report_paths(ctx: &StageContext<'_>) -> ReportPaths {
    let key = ctx.key("report", ".html");
    let html = ctx.derivatives.path(&key);
    let json = ctx.derivatives.path(&key.with_extension(".json"));
    ReportPaths { html, json }
}

/// Group statistics of one contrast, next to the grand-average report.
pub fn statistics_path(ctx: &StageContext<'_>, contrast: &Contrast) -> PathBuf {
    let processing = contrast.processing_label(DecodingKind::TimeByTime, &ctx.cfg.decoding_metric);
    let key = ctx
        .key("decodingstats", ".json")
        .with_processing(Some(&processing));
    ctx.derivatives.path(&key)
}

pub fn write_reports(doc: &ReportDocument, paths: &ReportPaths) -> ReportResult<()> {
    for path in [&paths.html, &paths.json] {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
    }
    write_text(&paths.html, &render_html(doc))?;
    let json = render_report_json(doc).map_err(|source| ReportError::Json {
        path: paths.json.clone(),
        source,
    })?;
    write_text(&paths.json, &json)?;
    Ok(())
}

pub fn write_contrast_statistics(stats: &ContrastStatistics, path: &Path) -> ReportResult<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut json = serde_json::to_string_pretty(stats).map_err(|source| ReportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');
    write_text(path, &json)?;
    Ok(())
}

fn write_text(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(contents.as_bytes())?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage6_report.rs"]
mod tests;
