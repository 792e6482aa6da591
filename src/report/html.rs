use std::collections::BTreeSet;
use std::fmt::Write;

use crate::report::svg::render_figure;
use crate::report::{
    ArtifactRef, Content, ContentItem, ReportDocument, Section, Table, format_bytes,
};

const BASE_CSS: &str = "\
body { font-family: sans-serif; margin: 0; color: #222; }
header { background: #2c3e50; color: white; padding: 12px 24px; }
nav { padding: 8px 24px; border-bottom: 1px solid #ccc; }
nav .tag { display: inline-block; margin: 2px 4px; padding: 1px 6px; border-radius: 8px; background: #eee; font-size: 12px; }
main { padding: 0 24px 24px 24px; }
section { margin-top: 24px; }
h3.group { margin-top: 32px; border-bottom: 2px solid #2c3e50; }
table { border-collapse: collapse; margin: 8px 0; }
th, td { border: 1px solid #ccc; padding: 2px 8px; font-size: 13px; }
th { background: #f4f4f4; }
figcaption, .caption { font-size: 12px; color: #555; }
pre { background: #f8f8f8; padding: 8px; overflow-x: auto; }
dl.artifact { display: grid; grid-template-columns: max-content auto; gap: 2px 12px; }
";

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn anchor(index: usize, title: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("s{index}-{}", slug.trim_matches('-'))
}

/// Standalone HTML page; figures are inlined as SVG.
pub fn render_html(doc: &ReportDocument) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", escape(doc.title()));
    out.push_str("<style>\n");
    out.push_str(BASE_CSS);
    for css in doc.custom_css() {
        out.push_str(css);
        out.push('\n');
    }
    out.push_str("</style>\n</head>\n<body>\n");
    let _ = writeln!(out, "<header><h1>{}</h1></header>", escape(doc.title()));

    render_nav(&mut out, doc);

    out.push_str("<main>\n");
    let mut current_group: Option<&str> = None;
    for (idx, section) in doc.sections().iter().enumerate() {
        let group = section.group.as_deref();
        if group.is_some() && group != current_group {
            let _ = writeln!(
                out,
                "<h3 class=\"group\">{}</h3>",
                escape(group.unwrap_or_default())
            );
        }
        current_group = group;
        render_section(&mut out, idx, section);
    }
    out.push_str("</main>\n</body>\n</html>\n");
    out
}

fn render_nav(out: &mut String, doc: &ReportDocument) {
    if doc.is_empty() {
        return;
    }
    let tags: BTreeSet<&str> = doc
        .sections()
        .iter()
        .flat_map(|s| s.tags.iter().map(String::as_str))
        .collect();
    out.push_str("<nav>\n<ul>\n");
    for (idx, section) in doc.sections().iter().enumerate() {
        let _ = writeln!(
            out,
            "<li><a href=\"#{}\">{}</a></li>",
            anchor(idx, &section.title),
            escape(&section.title)
        );
    }
    out.push_str("</ul>\n<div class=\"tags\">");
    for tag in tags {
        let _ = write!(out, "<span class=\"tag\">{}</span>", escape(tag));
    }
    out.push_str("</div>\n</nav>\n");
}

fn render_section(out: &mut String, idx: usize, section: &Section) {
    let tags: Vec<&str> = section.tags.iter().map(String::as_str).collect();
    let _ = writeln!(
        out,
        "<section id=\"{}\" data-tags=\"{}\">",
        anchor(idx, &section.title),
        escape(&tags.join(" "))
    );
    let _ = writeln!(out, "<h2>{}</h2>", escape(&section.title));
    for item in &section.items {
        render_item(out, item);
    }
    out.push_str("</section>\n");
}

fn render_item(out: &mut String, item: &ContentItem) {
    match &item.content {
        Content::Figure(fig) => {
            out.push_str("<figure>\n");
            out.push_str(&render_figure(fig));
            out.push('\n');
            if let Some(caption) = &item.caption {
                let _ = writeln!(out, "<figcaption>{}</figcaption>", escape(caption));
            }
            out.push_str("</figure>\n");
            return;
        }
        Content::Table(table) => render_table(out, table),
        Content::Html { html } => {
            out.push_str(html);
            out.push('\n');
        }
        Content::Code { language, text } => {
            let _ = writeln!(
                out,
                "<pre><code class=\"language-{}\">{}</code></pre>",
                escape(language),
                escape(text)
            );
        }
        Content::Artifact(artifact) => render_artifact(out, artifact),
    }
    if let Some(caption) = &item.caption {
        let _ = writeln!(out, "<p class=\"caption\">{}</p>", escape(caption));
    }
}

fn render_table(out: &mut String, table: &Table) {
    out.push_str("<table>\n<thead><tr>");
    for col in &table.columns {
        let _ = write!(out, "<th>{}</th>", escape(col));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in &table.rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape(cell));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
}

fn render_artifact(out: &mut String, artifact: &ArtifactRef) {
    out.push_str("<dl class=\"artifact\">\n");
    let _ = writeln!(
        out,
        "<dt>{}</dt><dd><code>{}</code></dd>",
        escape(&artifact.label),
        escape(&artifact.path.display().to_string())
    );
    if let Some(size) = artifact.size_bytes {
        let _ = writeln!(out, "<dt>size</dt><dd>{}</dd>", format_bytes(size));
    }
    for (key, value) in &artifact.details {
        let _ = writeln!(out, "<dt>{}</dt><dd>{}</dd>", escape(key), escape(value));
    }
    out.push_str("</dl>\n");
}
