use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::{ReportError, ReportResult};
use crate::input::reader::open_maybe_gz;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCountRow {
    pub subject: String,
    pub session: Option<String>,
    pub task: Option<String>,
    pub run: Option<String>,
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCounts {
    pub trial_types: Vec<String>,
    pub rows: Vec<EventCountRow>,
}

/// Trial-type counts of one BIDS `*_events.tsv` table.
pub fn count_trial_types(path: &Path) -> ReportResult<BTreeMap<String, usize>> {
    let reader = open_maybe_gz(path)?;
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => {
            return Err(ReportError::Parse(format!(
                "{} is empty",
                path.display()
            )));
        }
    };
    let column = header
        .trim_end()
        .split('\t')
        .position(|c| c.trim() == "trial_type")
        .ok_or_else(|| {
            ReportError::Parse(format!("{} has no trial_type column", path.display()))
        })?;

    let mut counts = BTreeMap::new();
    for (line_no, line) in lines.enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let Some(value) = line.split('\t').nth(column) else {
            tracing::warn!(
                "events row without trial_type; skipping (file {}, line {})",
                path.display(),
                line_no + 2
            );
            continue;
        };
        let value = value.trim();
        if value.is_empty() || value == "n/a" {
            continue;
        }
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Counts events of every `*_events.tsv` under `bids_root`, optionally
/// restricted to one session.
pub fn count_events(bids_root: &Path, session: Option<&str>) -> ReportResult<EventCounts> {
    let mut files = Vec::new();
    collect_event_files(bids_root, &mut files)?;
    files.sort();

    let mut rows = Vec::new();
    let mut trial_types = BTreeSet::new();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let entities = parse_entities(&name);
        let Some(subject) = entities.get("sub").cloned() else {
            continue;
        };
        let row_session = entities.get("ses").cloned();
        if session.is_some() && row_session.as_deref() != session {
            continue;
        }
        let counts = count_trial_types(&path)?;
        trial_types.extend(counts.keys().cloned());
        rows.push(EventCountRow {
            subject,
            session: row_session,
            task: entities.get("task").cloned(),
            run: entities.get("run").cloned(),
            counts,
        });
    }

    if rows.is_empty() {
        return Err(ReportError::Parse(format!(
            "no events tables found under {}",
            bids_root.display()
        )));
    }

    Ok(EventCounts {
        trial_types: trial_types.into_iter().collect(),
        rows,
    })
}

fn collect_event_files(dir: &Path, out: &mut Vec<PathBuf>) -> ReportResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if path.is_dir() {
            if name == "derivatives" || name.starts_with('.') {
                continue;
            }
            collect_event_files(&path, out)?;
        } else if name.ends_with("_events.tsv") || name.ends_with("_events.tsv.gz") {
            out.push(path);
        }
    }
    Ok(())
}

fn parse_entities(file_name: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for part in file_name.split('_') {
        if let Some((key, value)) = part.split_once('-') {
            out.insert(key.to_string(), value.to_string());
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/events.rs"]
mod tests;
