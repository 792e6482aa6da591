use serde::Serialize;

use crate::report::ReportDocument;

#[derive(Serialize)]
struct Sidecar<'a> {
    tool: &'static str,
    version: &'static str,
    #[serde(flatten)]
    document: &'a ReportDocument,
}

/// Machine-readable companion of the HTML report.
pub fn render_report_json(doc: &ReportDocument) -> serde_json::Result<String> {
    let sidecar = Sidecar {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        document: doc,
    };
    let mut json = serde_json::to_string_pretty(&sidecar)?;
    json.push('\n');
    Ok(json)
}
