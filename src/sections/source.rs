use crate::error::ReportResult;
use crate::model::contrast::{condition_tag, sanitize_cond_name};
use crate::pipeline::stage5_assemble::{Phase, ReportStage, StageOutcome};
use crate::report::{ArtifactRef, ContentItem, ReportDocument, Section};
use crate::sections::StageContext;

/// Coregistration, noise covariance and source estimates. Without a
/// coregistration there is no source space to report on.
pub struct SourceSpace;

impl ReportStage for SourceSpace {
    fn phase(&self) -> Phase {
        Phase::Source
    }

    fn name(&self) -> &'static str {
        "source space"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        let Some(trans) = ctx.derivatives.locate(&ctx.key("trans", ".fif")) else {
            return Ok(StageOutcome::skipped("no coregistration found"));
        };
        let fs_subject = cfg.fs_subject_for(ctx.subject.label());
        let subjects_dir = cfg
            .fs_subjects_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let info = ctx
            .derivatives
            .path(&ctx.key("epo", ".fif").with_processing(Some("clean")));
        let mut added = 0;

        tracing::info!("adding BEM reference");
        let bem = cfg
            .fs_subjects_dir
            .as_ref()
            .map(|dir| dir.join(&fs_subject).join("bem"))
            .unwrap_or_else(|| fs_subject.clone().into());
        doc.push_section(
            Section::new("BEM").with_tags(["bem"]).with_item(ContentItem::artifact(
                ArtifactRef::new("BEM surfaces", bem)
                    .with_detail("FreeSurfer subject", fs_subject.clone())
                    .with_detail("subjects dir", subjects_dir.clone()),
            )),
        );
        added += 1;

        tracing::info!("adding sensor alignment");
        doc.push_section(
            Section::new("Sensor alignment")
                .with_tags(["coregistration"])
                .with_item(ContentItem::artifact(
                    ArtifactRef::new("transform", trans)
                        .with_detail("info", info.display().to_string())
                        .with_detail("FreeSurfer subject", fs_subject.clone()),
                )),
        );
        added += 1;

        match ctx.derivatives.locate(&ctx.noise_cov_key()) {
            Some(cov) => {
                tracing::info!("adding noise covariance");
                doc.push_section(
                    Section::new("Noise covariance")
                        .with_tags(["covariance"])
                        .with_item(ContentItem::artifact(
                            ArtifactRef::new("noise covariance", cov)
                                .with_detail("info", info.display().to_string()),
                        )),
                );
                added += 1;
            }
            None => tracing::info!("no noise covariance found, not adding it to the report"),
        }

        for condition in &cfg.conditions {
            let cond = sanitize_cond_name(condition);
            let stc = ctx.stc_lh_path(&format!("{cond}+{}+hemi", cfg.inverse_method));
            if !stc.is_file() {
                tracing::debug!("no source estimate for {}", condition);
                continue;
            }
            tracing::info!("adding inverse solution for {}", condition);
            let mut artifact = ArtifactRef::new("source estimate (lh)", stc)
                .with_detail("method", cfg.inverse_method.clone())
                .with_detail("FreeSurfer subject", fs_subject.clone());
            if let Some(n) = cfg.report_stc_n_time_points {
                artifact = artifact.with_detail("time points", n.to_string());
            }
            doc.push_section(
                Section::new(format!("Source: {cond}"))
                    .with_tags(["source-estimate".to_string(), condition_tag(condition)])
                    .with_item(ContentItem::artifact(artifact)),
            );
            added += 1;
        }

        Ok(StageOutcome::Appended { sections: added })
    }
}
