use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ReportError, ReportResult};
use crate::model::config::PipelineConfig;

pub mod auto_scores;
pub mod events;
pub mod reader;
pub mod scores;

/// Subject whose artifacts are addressed; `Average` is the grand-average
/// pseudo-subject (`sub-average`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubjectId {
    Subject(String),
    Average,
}

impl SubjectId {
    pub fn label(&self) -> &str {
        match self {
            SubjectId::Subject(s) => s,
            SubjectId::Average => "average",
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured address of one artifact, BIDS style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub subject: SubjectId,
    pub session: Option<String>,
    pub task: Option<String>,
    pub acquisition: Option<String>,
    pub run: Option<String>,
    pub processing: Option<String>,
    pub space: Option<String>,
    pub recording: Option<String>,
    pub datatype: String,
    pub suffix: String,
    pub extension: String,
}

impl ArtifactKey {
    /// Base key of a subject/session: no run, no processing, `.fif`.
    pub fn base(cfg: &PipelineConfig, subject: &SubjectId, session: Option<&str>) -> Self {
        Self {
            subject: subject.clone(),
            session: session.map(str::to_string),
            task: cfg.task.clone(),
            acquisition: cfg.acq.clone(),
            run: None,
            processing: None,
            space: cfg.space.clone(),
            recording: cfg.rec.clone(),
            datatype: cfg.datatype.clone(),
            suffix: String::new(),
            extension: ".fif".to_string(),
        }
    }

    pub fn with_run(mut self, run: Option<&str>) -> Self {
        self.run = run.map(str::to_string);
        self
    }

    pub fn with_task(mut self, task: Option<&str>) -> Self {
        self.task = task.map(str::to_string);
        self
    }

    pub fn with_processing(mut self, processing: Option<&str>) -> Self {
        self.processing = processing.map(str::to_string);
        self
    }

    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.suffix = suffix.to_string();
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    pub fn stem(&self) -> String {
        let mut parts = vec![format!("sub-{}", self.subject.label())];
        let entities = [
            ("ses", &self.session),
            ("task", &self.task),
            ("acq", &self.acquisition),
            ("run", &self.run),
            ("proc", &self.processing),
            ("space", &self.space),
            ("rec", &self.recording),
        ];
        for (name, value) in entities {
            if let Some(v) = value {
                parts.push(format!("{name}-{v}"));
            }
        }
        if !self.suffix.is_empty() {
            parts.push(self.suffix.clone());
        }
        parts.join("_")
    }

    pub fn basename(&self) -> String {
        format!("{}{}", self.stem(), self.extension)
    }

    pub fn directory(&self) -> PathBuf {
        let mut dir = PathBuf::from(format!("sub-{}", self.subject.label()));
        if let Some(ses) = &self.session {
            dir.push(format!("ses-{ses}"));
        }
        dir.push(&self.datatype);
        dir
    }

    pub fn relative_path(&self) -> PathBuf {
        self.directory().join(self.basename())
    }

    fn split_variant(&self) -> PathBuf {
        let stem = self.stem();
        let name = match stem.rsplit_once('_') {
            Some((head, suffix)) => format!("{head}_split-01_{suffix}{}", self.extension),
            None => format!("{stem}_split-01{}", self.extension),
        };
        self.directory().join(name)
    }
}

/// Resolves artifact keys against one root directory. Read-only and shared
/// between report tasks.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    root: PathBuf,
}

impl ArtifactLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Existing file for `key`: the plain name, its gzip sibling for text
    /// formats, or the first split of a split recording.
    pub fn locate(&self, key: &ArtifactKey) -> Option<PathBuf> {
        let plain = self.path(key);
        let mut candidates = vec![plain.clone()];
        if matches!(key.extension.as_str(), ".json" | ".tsv") {
            let mut gz = plain.clone().into_os_string();
            gz.push(".gz");
            candidates.push(PathBuf::from(gz));
        }
        if key.extension == ".fif" {
            candidates.push(self.root.join(key.split_variant()));
        }
        candidates.into_iter().find(|p| p.is_file())
    }

    pub fn exists(&self, key: &ArtifactKey) -> bool {
        self.locate(key).is_some()
    }

    pub fn require(&self, key: &ArtifactKey, what: &str) -> ReportResult<PathBuf> {
        self.locate(key)
            .ok_or_else(|| ReportError::missing(what, self.path(key)))
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
