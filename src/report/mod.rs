use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;

pub mod figure;
pub mod html;
pub mod json;
pub mod svg;

pub use figure::Figure;

/// Assembled report. Sections are only ever appended; once handed to the sink
/// the document is read through shared references.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    title: String,
    sections: Vec<Section>,
    custom_css: Vec<String>,
}

impl ReportDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sections: Vec::new(),
            custom_css: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn custom_css(&self) -> &[String] {
        &self.custom_css
    }

    pub fn push_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn add_custom_css(&mut self, css: impl Into<String>) {
        let css = css.into();
        if !self.custom_css.contains(&css) {
            self.custom_css.push(css);
        }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

}

#[cfg(test)]
impl ReportDocument {
    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.sections.iter().any(|s| s.tags.contains(tag))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub title: String,
    pub tags: BTreeSet<String>,
    pub group: Option<String>,
    pub items: Vec<ContentItem>,
}

impl Section {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            tags: BTreeSet::new(),
            group: None,
            items: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_item(mut self, item: ContentItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn push(&mut self, item: ContentItem) {
        self.items.push(item);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentItem {
    pub caption: Option<String>,
    pub content: Content,
}

impl ContentItem {
    pub fn figure(figure: Figure) -> Self {
        Self {
            caption: None,
            content: Content::Figure(figure),
        }
    }

    pub fn table(table: Table) -> Self {
        Self {
            caption: None,
            content: Content::Table(table),
        }
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self {
            caption: None,
            content: Content::Html { html: html.into() },
        }
    }

    pub fn code(language: &str, text: impl Into<String>) -> Self {
        Self {
            caption: None,
            content: Content::Code {
                language: language.to_string(),
                text: text.into(),
            },
        }
    }

    pub fn artifact(artifact: ArtifactRef) -> Self {
        Self {
            caption: None,
            content: Content::Artifact(artifact),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Figure(Figure),
    Table(Table),
    Html { html: String },
    Code { language: String, text: String },
    Artifact(ArtifactRef),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

/// Reference to an upstream binary artifact the report describes without
/// decoding it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRef {
    pub label: String,
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
    pub details: Vec<(String, String)>,
}

impl ArtifactRef {
    pub fn new(label: impl Into<String>, path: PathBuf) -> Self {
        let size_bytes = crate::input::reader::file_size(&path);
        Self {
            label: label.into(),
            path,
            size_bytes,
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.push((key.to_string(), value.into()));
        self
    }
}

pub fn format_num(v: f64) -> String {
    if v.is_finite() {
        format!("{:.3}", v)
    } else if v.is_nan() {
        "n/a".to_string()
    } else if v > 0.0 {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

pub fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/mod.rs"]
mod tests;
