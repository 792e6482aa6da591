use crate::error::{ReportError, ReportResult};
use crate::pipeline::stage5_assemble::{Phase, ReportStage, StageOutcome};
use crate::report::{ContentItem, ReportDocument, Section, Table};
use crate::sections::StageContext;

fn system_table(n_jobs: usize) -> Table {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let mut table = Table::new(["key", "value"]);
    let rows = [
        ("tool", env!("CARGO_PKG_NAME").to_string()),
        ("version", env!("CARGO_PKG_VERSION").to_string()),
        ("os", std::env::consts::OS.to_string()),
        ("arch", std::env::consts::ARCH.to_string()),
        ("cpus", cpus),
        ("n_jobs", n_jobs.to_string()),
    ];
    for (k, v) in rows {
        table.push_row(vec![k.to_string(), v]);
    }
    table
}

/// Configuration listing and system information. Runs for every report.
pub struct Finalize;

impl ReportStage for Finalize {
    fn phase(&self) -> Phase {
        Phase::Finalize
    }

    fn name(&self) -> &'static str {
        "configuration and system information"
    }

    fn run(&self, ctx: &StageContext<'_>, doc: &mut ReportDocument) -> ReportResult<StageOutcome> {
        let cfg = ctx.cfg;
        let listing = serde_json::to_string_pretty(cfg).map_err(|source| ReportError::Json {
            path: cfg.source_path.clone().unwrap_or_default(),
            source,
        })?;
        let mut item = ContentItem::code("json", listing);
        if let Some(path) = &cfg.source_path {
            item = item.with_caption(path.display().to_string());
        }
        doc.push_section(
            Section::new("Configuration file")
                .with_tags(["configuration"])
                .with_item(item),
        );
        doc.push_section(
            Section::new("System information").with_item(ContentItem::table(system_table(cfg.n_jobs))),
        );
        Ok(StageOutcome::Appended { sections: 2 })
    }
}
