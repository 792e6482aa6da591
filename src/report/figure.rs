use serde::Serialize;

/// Declarative figure. Rendering is left to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub plot: Plot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Plot {
    TimeCourse(TimeCourse),
    Heatmap(Heatmap),
    Strip(StripPlot),
    Bars(BarChart),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub label: Option<String>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub color: String,
    pub style: LineStyle,
    pub width: f64,
}

/// Filled area between two curves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub label: Option<String>,
    pub x: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub color: String,
    pub opacity: f64,
}

/// Shaded x interval, e.g. a significant cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub start: f64,
    pub stop: f64,
    pub color: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefLine {
    pub value: f64,
    pub color: String,
    pub style: LineStyle,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TimeCourse {
    pub lines: Vec<Line>,
    pub bands: Vec<Band>,
    pub spans: Vec<Span>,
    pub hlines: Vec<RefLine>,
    pub vlines: Vec<RefLine>,
    pub annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// `values[row][col]`, row indexed by `y`.
    pub values: Vec<Vec<f64>>,
    pub vmin: f64,
    pub vmax: f64,
    pub colorbar_label: String,
    pub diagonal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StripCategory {
    pub label: String,
    pub points: Vec<f64>,
    pub mean: Option<f64>,
    pub summary: Option<BoxSummary>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StripPlot {
    pub categories: Vec<StripCategory>,
    pub hlines: Vec<RefLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub highlighted: Vec<bool>,
    pub threshold: Option<f64>,
}
