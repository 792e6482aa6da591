use std::fmt::Write;

use crate::report::figure::{
    BarChart, Figure, Heatmap, LineStyle, Plot, RefLine, StripPlot, TimeCourse,
};
use crate::report::html::escape;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 380.0;
const MARGIN_LEFT: f64 = 68.0;
const MARGIN_RIGHT: f64 = 28.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 64.0;
const N_TICKS: usize = 5;

#[derive(Debug, Clone, Copy)]
struct Scale {
    d0: f64,
    d1: f64,
    r0: f64,
    r1: f64,
}

impl Scale {
    fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self {
            d0: domain.0,
            d1: domain.1,
            r0: range.0,
            r1: range.1,
        }
    }

    /// Non-finite values are pinned to the nearest edge of the plot area.
    fn map(&self, v: f64) -> f64 {
        let (lo, hi) = if self.d0 <= self.d1 {
            (self.d0, self.d1)
        } else {
            (self.d1, self.d0)
        };
        let v = if v.is_nan() { self.d0 } else { v.clamp(lo, hi) };
        let span = self.d1 - self.d0;
        if span == 0.0 {
            return (self.r0 + self.r1) / 2.0;
        }
        self.r0 + (v - self.d0) / span * (self.r1 - self.r0)
    }

    fn ticks(&self) -> Vec<f64> {
        (0..N_TICKS)
            .map(|i| self.d0 + (self.d1 - self.d0) * i as f64 / (N_TICKS - 1) as f64)
            .collect()
    }
}

fn extent(values: impl IntoIterator<Item = f64>, padded: bool) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if lo == hi {
        return (lo - 0.5, hi + 0.5);
    }
    if !padded {
        return (lo, hi);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

fn fmt_tick(v: f64) -> String {
    let a = v.abs();
    if a != 0.0 && (a < 0.01 || a >= 1e4) {
        format!("{v:.1e}")
    } else {
        format!("{v:.2}")
    }
}

fn dasharray(style: LineStyle) -> &'static str {
    match style {
        LineStyle::Solid => "",
        LineStyle::Dashed => " stroke-dasharray=\"6 4\"",
        LineStyle::Dotted => " stroke-dasharray=\"2 3\"",
    }
}

fn plot_area() -> (f64, f64, f64, f64) {
    (
        MARGIN_LEFT,
        WIDTH - MARGIN_RIGHT,
        MARGIN_TOP,
        HEIGHT - MARGIN_BOTTOM,
    )
}

pub fn render_figure(fig: &Figure) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" class=\"figure\" viewBox=\"0 0 {WIDTH} {HEIGHT}\" width=\"{WIDTH}\" height=\"{HEIGHT}\">"
    );
    out.push_str("<rect width=\"100%\" height=\"100%\" fill=\"white\"/>");
    let _ = write!(
        out,
        "<text x=\"{:.1}\" y=\"22\" text-anchor=\"middle\" font-size=\"14\" font-weight=\"bold\">{}</text>",
        WIDTH / 2.0,
        escape(&fig.title)
    );

    match &fig.plot {
        Plot::TimeCourse(tc) => render_time_course(&mut out, tc),
        Plot::Heatmap(hm) => render_heatmap(&mut out, hm),
        Plot::Strip(sp) => render_strip(&mut out, sp),
        Plot::Bars(bc) => render_bars(&mut out, bc),
    }

    let (x0, x1, _, y1) = plot_area();
    let _ = write!(
        out,
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"12\">{}</text>",
        (x0 + x1) / 2.0,
        HEIGHT - 12.0,
        escape(&fig.x_label)
    );
    let _ = write!(
        out,
        "<text x=\"16\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"12\" transform=\"rotate(-90 16 {:.1})\">{}</text>",
        (MARGIN_TOP + y1) / 2.0,
        (MARGIN_TOP + y1) / 2.0,
        escape(&fig.y_label)
    );
    out.push_str("</svg>");
    out
}

fn render_axes(out: &mut String, xs: Option<&Scale>, ys: &Scale) {
    let (x0, x1, y0, y1) = plot_area();
    let _ = write!(
        out,
        "<rect x=\"{x0:.1}\" y=\"{y0:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"none\" stroke=\"#333\"/>",
        x1 - x0,
        y1 - y0
    );
    for t in ys.ticks() {
        let y = ys.map(t);
        let _ = write!(
            out,
            "<line x1=\"{:.1}\" x2=\"{x0:.1}\" y1=\"{y:.2}\" y2=\"{y:.2}\" stroke=\"#333\"/><text x=\"{:.1}\" y=\"{:.2}\" text-anchor=\"end\" font-size=\"10\">{}</text>",
            x0 - 4.0,
            x0 - 6.0,
            y + 3.0,
            fmt_tick(t)
        );
    }
    if let Some(xs) = xs {
        for t in xs.ticks() {
            let x = xs.map(t);
            let _ = write!(
                out,
                "<line x1=\"{x:.2}\" x2=\"{x:.2}\" y1=\"{y1:.1}\" y2=\"{:.1}\" stroke=\"#333\"/><text x=\"{x:.2}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"10\">{}</text>",
                y1 + 4.0,
                y1 + 16.0,
                fmt_tick(t)
            );
        }
    }
}

fn render_hline(out: &mut String, line: &RefLine, ys: &Scale) {
    let (x0, x1, _, _) = plot_area();
    let y = ys.map(line.value);
    let _ = write!(
        out,
        "<line x1=\"{x0:.1}\" x2=\"{x1:.1}\" y1=\"{y:.2}\" y2=\"{y:.2}\" stroke=\"{}\"{}/>",
        line.color,
        dasharray(line.style)
    );
    if let Some(label) = &line.label {
        let _ = write!(
            out,
            "<text x=\"{:.1}\" y=\"{:.2}\" text-anchor=\"end\" font-size=\"10\" fill=\"{}\">{}</text>",
            x1 - 4.0,
            y - 4.0,
            line.color,
            escape(label)
        );
    }
}

fn polyline_points(x: &[f64], y: &[f64], xs: &Scale, ys: &Scale) -> String {
    let mut pts = String::new();
    for (a, b) in x.iter().zip(y) {
        let _ = write!(pts, "{:.2},{:.2} ", xs.map(*a), ys.map(*b));
    }
    pts.trim_end().to_string()
}

fn render_time_course(out: &mut String, tc: &TimeCourse) {
    let xs_all = tc
        .lines
        .iter()
        .flat_map(|l| l.x.iter().copied())
        .chain(tc.bands.iter().flat_map(|b| b.x.iter().copied()));
    // Time axes are drawn edge to edge.
    let (xmin, xmax) = extent(xs_all, false);
    let ys_all = tc
        .lines
        .iter()
        .flat_map(|l| l.y.iter().copied())
        .chain(tc.bands.iter().flat_map(|b| b.lower.iter().chain(&b.upper).copied()))
        .chain(tc.hlines.iter().map(|h| h.value));
    let (ymin, ymax) = extent(ys_all, true);

    let (x0, x1, y0, y1) = plot_area();
    let xs = Scale::new((xmin, xmax), (x0, x1));
    let ys = Scale::new((ymin, ymax), (y1, y0));

    for span in &tc.spans {
        let a = xs.map(span.start);
        let b = xs.map(span.stop);
        let _ = write!(
            out,
            "<rect class=\"span\" x=\"{:.2}\" y=\"{y0:.1}\" width=\"{:.2}\" height=\"{:.1}\" fill=\"{}\" fill-opacity=\"0.25\"/>",
            a.min(b),
            (b - a).abs().max(1.0),
            y1 - y0,
            span.color
        );
    }

    for band in &tc.bands {
        let mut pts = String::new();
        for (x, u) in band.x.iter().zip(&band.upper) {
            let _ = write!(pts, "{:.2},{:.2} ", xs.map(*x), ys.map(*u));
        }
        for (x, l) in band.x.iter().zip(&band.lower).rev() {
            let _ = write!(pts, "{:.2},{:.2} ", xs.map(*x), ys.map(*l));
        }
        let _ = write!(
            out,
            "<polygon points=\"{}\" fill=\"{}\" fill-opacity=\"{:.2}\" stroke=\"none\"/>",
            pts.trim_end(),
            band.color,
            band.opacity
        );
    }

    for h in &tc.hlines {
        render_hline(out, h, &ys);
    }
    for v in &tc.vlines {
        let x = xs.map(v.value);
        let _ = write!(
            out,
            "<line x1=\"{x:.2}\" x2=\"{x:.2}\" y1=\"{y0:.1}\" y2=\"{y1:.1}\" stroke=\"{}\"{}/>",
            v.color,
            dasharray(v.style)
        );
    }

    for line in &tc.lines {
        let _ = write!(
            out,
            "<polyline points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{:.1}\"{}/>",
            polyline_points(&line.x, &line.y, &xs, &ys),
            line.color,
            line.width,
            dasharray(line.style)
        );
    }

    render_axes(out, Some(&xs), &ys);

    let mut legend_y = y0 + 14.0;
    for line in tc.lines.iter().filter(|l| l.label.is_some()) {
        let label = line.label.as_deref().unwrap_or_default();
        let _ = write!(
            out,
            "<line x1=\"{:.1}\" x2=\"{:.1}\" y1=\"{:.1}\" y2=\"{:.1}\" stroke=\"{}\" stroke-width=\"2\"{}/><text x=\"{:.1}\" y=\"{:.1}\" font-size=\"10\">{}</text>",
            x0 + 8.0,
            x0 + 26.0,
            legend_y - 3.0,
            legend_y - 3.0,
            line.color,
            dasharray(line.style),
            x0 + 30.0,
            legend_y,
            escape(label)
        );
        legend_y += 14.0;
    }

    if let Some(text) = &tc.annotation {
        let _ = write!(
            out,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"11\">{}</text>",
            x1 - 6.0,
            y0 + 14.0,
            escape(text)
        );
    }
}

/// Diverging blue-white-red map over [0, 1].
fn diverging_color(t: f64) -> String {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    let (r, g, b) = if t < 0.5 {
        let k = t / 0.5;
        (
            33.0 + (255.0 - 33.0) * k,
            102.0 + (255.0 - 102.0) * k,
            172.0 + (255.0 - 172.0) * k,
        )
    } else {
        let k = (t - 0.5) / 0.5;
        (
            255.0 - (255.0 - 178.0) * k,
            255.0 - (255.0 - 24.0) * k,
            255.0 - (255.0 - 43.0) * k,
        )
    };
    format!("#{:02x}{:02x}{:02x}", r as u8, g as u8, b as u8)
}

fn render_heatmap(out: &mut String, hm: &Heatmap) {
    let (x0, x1, y0, y1) = plot_area();
    let x1 = x1 - 56.0;
    let n_rows = hm.values.len();
    let n_cols = hm.values.first().map_or(0, Vec::len);
    if n_rows == 0 || n_cols == 0 {
        return;
    }
    let cw = (x1 - x0) / n_cols as f64;
    let ch = (y1 - y0) / n_rows as f64;
    let span = hm.vmax - hm.vmin;

    for (r, row) in hm.values.iter().enumerate() {
        // Row 0 sits at the bottom.
        let y = y1 - (r + 1) as f64 * ch;
        for (c, v) in row.iter().enumerate() {
            let t = if span > 0.0 { (v - hm.vmin) / span } else { 0.5 };
            let _ = write!(
                out,
                "<rect x=\"{:.2}\" y=\"{y:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\"/>",
                x0 + c as f64 * cw,
                cw + 0.05,
                ch + 0.05,
                diverging_color(t)
            );
        }
    }

    if hm.diagonal {
        let _ = write!(
            out,
            "<line x1=\"{x0:.1}\" y1=\"{y1:.1}\" x2=\"{x1:.1}\" y2=\"{y0:.1}\" stroke=\"black\" stroke-dasharray=\"4 3\"/>"
        );
    }

    let xs = Scale::new(
        (
            hm.x.first().copied().unwrap_or(0.0),
            hm.x.last().copied().unwrap_or(1.0),
        ),
        (x0 + cw / 2.0, x1 - cw / 2.0),
    );
    let ys = Scale::new(
        (
            hm.y.first().copied().unwrap_or(0.0),
            hm.y.last().copied().unwrap_or(1.0),
        ),
        (y1 - ch / 2.0, y0 + ch / 2.0),
    );
    for t in xs.ticks() {
        let x = xs.map(t);
        let _ = write!(
            out,
            "<text x=\"{x:.2}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"10\">{}</text>",
            y1 + 16.0,
            fmt_tick(t)
        );
    }
    for t in ys.ticks() {
        let y = ys.map(t);
        let _ = write!(
            out,
            "<text x=\"{:.1}\" y=\"{:.2}\" text-anchor=\"end\" font-size=\"10\">{}</text>",
            x0 - 6.0,
            y + 3.0,
            fmt_tick(t)
        );
    }

    let bar_x = x1 + 16.0;
    let steps = 32;
    let step_h = (y1 - y0) / steps as f64;
    for i in 0..steps {
        let t = (i as f64 + 0.5) / steps as f64;
        let _ = write!(
            out,
            "<rect x=\"{bar_x:.1}\" y=\"{:.2}\" width=\"12\" height=\"{:.2}\" fill=\"{}\"/>",
            y1 - (i + 1) as f64 * step_h,
            step_h + 0.05,
            diverging_color(t)
        );
    }
    let _ = write!(
        out,
        "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"10\">{}</text><text x=\"{:.1}\" y=\"{:.1}\" font-size=\"10\">{}</text>",
        bar_x + 14.0,
        y0 + 8.0,
        fmt_tick(hm.vmax),
        bar_x + 14.0,
        y1,
        fmt_tick(hm.vmin)
    );
    let _ = write!(
        out,
        "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"10\" text-anchor=\"middle\">{}</text>",
        bar_x + 6.0,
        y0 - 6.0,
        escape(&hm.colorbar_label)
    );
}

fn render_strip(out: &mut String, sp: &StripPlot) {
    let (x0, x1, y0, y1) = plot_area();
    let values = sp
        .categories
        .iter()
        .flat_map(|c| {
            c.points
                .iter()
                .copied()
                .chain(c.mean)
                .chain(c.summary.iter().flat_map(|s| [s.whisker_low, s.whisker_high]))
        })
        .chain(sp.hlines.iter().map(|h| h.value));
    let ys = Scale::new(extent(values, true), (y1, y0));
    let n = sp.categories.len().max(1);
    let slot = (x1 - x0) / n as f64;

    for h in &sp.hlines {
        render_hline(out, h, &ys);
    }

    for (i, cat) in sp.categories.iter().enumerate() {
        let cx = x0 + slot * (i as f64 + 0.5);
        if let Some(s) = &cat.summary {
            let half = (slot * 0.2).min(40.0);
            let _ = write!(
                out,
                "<line x1=\"{cx:.2}\" x2=\"{cx:.2}\" y1=\"{:.2}\" y2=\"{:.2}\" stroke=\"#555\"/>",
                ys.map(s.whisker_low),
                ys.map(s.whisker_high)
            );
            let top = ys.map(s.q3);
            let bottom = ys.map(s.q1);
            let _ = write!(
                out,
                "<rect x=\"{:.2}\" y=\"{top:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"#ddd\" stroke=\"#555\"/>",
                cx - half,
                half * 2.0,
                (bottom - top).max(0.5)
            );
            let my = ys.map(s.median);
            let _ = write!(
                out,
                "<line x1=\"{:.2}\" x2=\"{:.2}\" y1=\"{my:.2}\" y2=\"{my:.2}\" stroke=\"#222\" stroke-width=\"2\"/>",
                cx - half,
                cx + half
            );
        }
        for (j, v) in cat.points.iter().enumerate() {
            // Deterministic jitter.
            let offset = ((j % 7) as f64 - 3.0) * slot * 0.03;
            let _ = write!(
                out,
                "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"3.5\" fill=\"#1f77b4\" fill-opacity=\"0.8\"/>",
                cx + offset,
                ys.map(*v)
            );
        }
        if let Some(m) = cat.mean {
            let my = ys.map(m);
            let _ = write!(
                out,
                "<line class=\"mean\" x1=\"{:.2}\" x2=\"{:.2}\" y1=\"{my:.2}\" y2=\"{my:.2}\" stroke=\"#d62728\" stroke-width=\"3\"/>",
                cx - slot * 0.25,
                cx + slot * 0.25
            );
        }
        for (k, part) in cat.label.lines().enumerate() {
            let _ = write!(
                out,
                "<text x=\"{cx:.2}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"10\">{}</text>",
                y1 + 16.0 + k as f64 * 12.0,
                escape(part)
            );
        }
    }

    render_axes(out, None, &ys);
}

fn render_bars(out: &mut String, bc: &BarChart) {
    let (x0, x1, y0, y1) = plot_area();
    let values = bc
        .values
        .iter()
        .copied()
        .chain(std::iter::once(0.0))
        .chain(bc.threshold);
    let ys = Scale::new(extent(values, true), (y1, y0));
    let n = bc.values.len().max(1);
    let slot = (x1 - x0) / n as f64;
    let base = ys.map(0.0);

    for (i, v) in bc.values.iter().enumerate() {
        let top = ys.map(*v);
        let color = if bc.highlighted.get(i).copied().unwrap_or(false) {
            "#d62728"
        } else {
            "#1f77b4"
        };
        let _ = write!(
            out,
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{color}\"/>",
            x0 + slot * i as f64 + slot * 0.1,
            top.min(base),
            slot * 0.8,
            (base - top).abs()
        );
    }
    // Labels only when they stay legible.
    if n <= 40 {
        for (i, label) in bc.labels.iter().enumerate() {
            let x = x0 + slot * (i as f64 + 0.5);
            let _ = write!(
                out,
                "<text x=\"{x:.2}\" y=\"{:.1}\" font-size=\"8\" text-anchor=\"end\" transform=\"rotate(-60 {x:.2} {:.1})\">{}</text>",
                y1 + 10.0,
                y1 + 10.0,
                escape(label)
            );
        }
    }
    if let Some(t) = bc.threshold {
        render_hline(
            out,
            &RefLine {
                value: t,
                color: "#d62728".to_string(),
                style: LineStyle::Dashed,
                label: Some("limit".to_string()),
            },
            &ys,
        );
    }
    render_axes(out, None, &ys);
}
