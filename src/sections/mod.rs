use std::path::PathBuf;

use crate::input::{ArtifactKey, ArtifactLocator, SubjectId};
use crate::model::config::PipelineConfig;
use crate::model::stats::ContrastStatistics;
use crate::pipeline::stage5_assemble::ReportStage;

pub mod decoding;
pub mod grand_average;
pub mod preprocessing;
pub mod sensor;
pub mod source;
pub mod system;

/// Everything a report stage may read. Shared read-only between the stages
/// of one report task.
#[derive(Debug, Clone)]
pub struct StageContext<'a> {
    pub cfg: &'a PipelineConfig,
    pub derivatives: &'a ArtifactLocator,
    pub raw: &'a ArtifactLocator,
    pub subject: SubjectId,
    pub session: Option<String>,
}

impl<'a> StageContext<'a> {
    pub fn new(
        cfg: &'a PipelineConfig,
        derivatives: &'a ArtifactLocator,
        raw: &'a ArtifactLocator,
        subject: SubjectId,
        session: Option<&str>,
    ) -> Self {
        Self {
            cfg,
            derivatives,
            raw,
            subject,
            session: session.map(str::to_string),
        }
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn base_key(&self) -> ArtifactKey {
        ArtifactKey::base(self.cfg, &self.subject, self.session())
    }

    pub fn key(&self, suffix: &str, extension: &str) -> ArtifactKey {
        self.base_key().with_suffix(suffix).with_extension(extension)
    }

    pub fn noise_cov_key(&self) -> ArtifactKey {
        self.key("cov", ".fif")
            .with_processing(self.cfg.noise_cov.processing_label())
    }

    /// Path of a source estimate; the left hemisphere file stands for the
    /// pair.
    pub fn stc_lh_path(&self, suffix: &str) -> PathBuf {
        let key = self.key(suffix, "");
        let mut path = self.derivatives.path(&key).into_os_string();
        path.push("-lh.stc");
        PathBuf::from(path)
    }
}

pub fn subject_stages() -> Vec<Box<dyn ReportStage>> {
    vec![
        Box::new(preprocessing::FilteredRaw),
        Box::new(preprocessing::EmptyRoom),
        Box::new(preprocessing::DataQuality),
        Box::new(preprocessing::Events),
        Box::new(preprocessing::EpochsBeforeCleaning),
        Box::new(preprocessing::Ica),
        Box::new(preprocessing::Ssp),
        Box::new(preprocessing::EpochsAfterCleaning),
        Box::new(sensor::Evokeds),
        Box::new(decoding::FullEpochsDecoding),
        Box::new(decoding::TimeByTimeDecoding),
        Box::new(sensor::TimeFrequency),
        Box::new(source::SourceSpace),
        Box::new(system::Finalize),
    ]
}

pub fn average_stages(statistics: &[ContrastStatistics]) -> Vec<Box<dyn ReportStage + '_>> {
    vec![
        Box::new(grand_average::EventCounts),
        Box::new(grand_average::AverageEvokeds),
        Box::new(grand_average::DecodingGrandAverage { statistics }),
        Box::new(grand_average::MorphedSourceEstimates),
        Box::new(system::Finalize),
    ]
}

#[cfg(test)]
#[path = "../../tests/src_inline/sections/mod.rs"]
mod tests;
