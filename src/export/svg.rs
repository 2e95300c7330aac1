use super::raster::{chart_fonts, rasterize, RasterImage};
use super::scene::{ChartScene, LineStyle, SeriesSpec};
use super::Renderer;
use crate::errors::AppResult;
use resvg::usvg::fontdb;
use std::fmt::Write as _;
use std::sync::Arc;

const MARGIN_LEFT: f64 = 72.0;
const MARGIN_RIGHT: f64 = 32.0;
const MARGIN_TOP: f64 = 84.0;
const MARGIN_BOTTOM: f64 = 84.0;
const MIN_LABEL_SPACING: f64 = 36.0;
const SMOOTHING: f64 = 0.2;
const FONT: &str = "DejaVu Sans, sans-serif";

#[derive(Debug, Clone, Copy)]
struct Plot {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    y_max: f64,
}

impl Plot {
    fn new(scene: &ChartScene) -> Self {
        let width = (f64::from(scene.width) - MARGIN_LEFT - MARGIN_RIGHT).max(1.0);
        let height = (f64::from(scene.height) - MARGIN_TOP - MARGIN_BOTTOM).max(1.0);
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width,
            height,
            y_max: scene.y_max.max(f64::EPSILON),
        }
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn x(&self, index: usize, count: usize) -> f64 {
        if count <= 1 {
            return self.left + self.width / 2.0;
        }
        self.left + self.width * index as f64 / (count - 1) as f64
    }

    fn y(&self, value: f64) -> f64 {
        let ratio = (value / self.y_max).clamp(0.0, 1.0);
        self.bottom() - self.height * ratio
    }
}

/// Writes the chart as a standalone SVG document and rasterizes that same
/// document for PNG output with the bundled chart fonts.
#[derive(Clone)]
pub struct SvgRenderer {
    fonts: Arc<fontdb::Database>,
}

impl SvgRenderer {
    pub fn new(fonts: Arc<fontdb::Database>) -> Self {
        Self { fonts }
    }
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self::new(chart_fonts())
    }
}

impl Renderer for SvgRenderer {
    fn render_vector(&self, scene: &ChartScene) -> AppResult<String> {
        Ok(write_svg(scene))
    }

    fn render_raster(&self, scene: &ChartScene) -> AppResult<RasterImage> {
        let svg = write_svg(scene);
        rasterize(&svg, scene.width, scene.height, &self.fonts)
    }
}

fn write_svg(scene: &ChartScene) -> String {
    let plot = Plot::new(scene);
    let width = scene.width;
    let height = scene.height;
    let center = f64::from(width) / 2.0;
    let mut out = String::with_capacity(16 * 1024);

    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    let _ = writeln!(out, r##"<rect x="0" y="0" width="{width}" height="{height}" fill="#ffffff"/>"##);
    let _ = writeln!(
        out,
        r##"<text x="{center:.1}" y="34" text-anchor="middle" font-family="{FONT}" font-size="20" font-weight="bold" fill="#111827">{}</text>"##,
        escape_xml(&scene.title)
    );
    let _ = writeln!(
        out,
        r##"<text x="{center:.1}" y="58" text-anchor="middle" font-family="{FONT}" font-size="13" fill="#4b5563">{}</text>"##,
        escape_xml(&scene.subtitle)
    );

    write_y_axis(&mut out, scene, &plot);
    write_x_axis(&mut out, scene, &plot);

    for series in &scene.series {
        write_series(&mut out, series, &plot);
    }
    write_legend(&mut out, scene, &plot);

    out.push_str("</svg>\n");
    out
}

fn write_y_axis(out: &mut String, scene: &ChartScene, plot: &Plot) {
    let step = if scene.y_step > 0.0 { scene.y_step } else { scene.y_max.max(1.0) };
    let ticks = (scene.y_max / step).round().max(1.0) as usize;
    let right = plot.left + plot.width;

    for tick in 0..=ticks {
        let value = step * tick as f64;
        let y = plot.y(value);
        let _ = writeln!(
            out,
            r##"<line x1="{:.2}" y1="{y:.2}" x2="{right:.2}" y2="{y:.2}" stroke="#e5e7eb" stroke-width="1"/>"##,
            plot.left
        );
        let _ = writeln!(
            out,
            r##"<text x="{:.2}" y="{:.2}" text-anchor="end" font-family="{FONT}" font-size="12" fill="#374151">{}</text>"##,
            plot.left - 8.0,
            y + 4.0,
            format_tick(value)
        );
    }

    let label_x = 20.0;
    let label_y = plot.top + plot.height / 2.0;
    let _ = writeln!(
        out,
        r##"<text x="{label_x:.2}" y="{label_y:.2}" transform="rotate(-90 {label_x:.2} {label_y:.2})" text-anchor="middle" font-family="{FONT}" font-size="13" fill="#374151">{}</text>"##,
        escape_xml(&scene.y_axis_label)
    );
    let _ = writeln!(
        out,
        r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="#6b7280" stroke-width="1"/>"##,
        plot.left,
        plot.top,
        plot.left,
        plot.bottom()
    );
}

fn write_x_axis(out: &mut String, scene: &ChartScene, plot: &Plot) {
    let count = scene.x_labels.len();
    let _ = writeln!(
        out,
        r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="#6b7280" stroke-width="1"/>"##,
        plot.left,
        plot.bottom(),
        plot.left + plot.width,
        plot.bottom()
    );

    let every = label_interval(count, plot.width);
    for (index, label) in scene.x_labels.iter().enumerate() {
        if index % every != 0 && index + 1 != count {
            continue;
        }
        let _ = writeln!(
            out,
            r##"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="{FONT}" font-size="12" fill="#374151">{}</text>"##,
            plot.x(index, count),
            plot.bottom() + 20.0,
            escape_xml(label)
        );
    }
}

fn label_interval(count: usize, width: f64) -> usize {
    if count <= 1 {
        return 1;
    }
    let fits = (width / MIN_LABEL_SPACING).floor().max(1.0) as usize;
    count.div_ceil(fits).max(1)
}

fn write_series(out: &mut String, series: &SeriesSpec, plot: &Plot) {
    let count = series.values.len();
    if count == 0 {
        return;
    }
    let points = series
        .values
        .iter()
        .enumerate()
        .map(|(index, value)| (plot.x(index, count), plot.y(*value)))
        .collect::<Vec<_>>();

    match series.style {
        LineStyle::Dashed => {
            let _ = writeln!(
                out,
                r#"<path d="{}" fill="none" stroke="{}" stroke-width="2" stroke-dasharray="8 6"/>"#,
                straight_path(&points),
                series.color
            );
        }
        LineStyle::Smooth => {
            let _ = writeln!(
                out,
                r#"<path d="{}" fill="none" stroke="{}" stroke-width="3" stroke-linejoin="round"/>"#,
                smooth_path(&points),
                series.color
            );
        }
    }

    // Ideal points keep a tooltip target but draw nothing.
    let (radius, fill) = match series.style {
        LineStyle::Dashed => (6.0, "none"),
        LineStyle::Smooth => (4.0, series.color),
    };
    for ((x, y), value) in points.iter().zip(&series.values) {
        let _ = writeln!(
            out,
            r##"<circle cx="{x:.2}" cy="{y:.2}" r="{radius}" fill="{fill}" stroke="{}" stroke-width="{}" pointer-events="all"><title>{}</title></circle>"##,
            if fill == "none" { "none" } else { "#ffffff" },
            if fill == "none" { 0 } else { 1 },
            escape_xml(&ChartScene::tooltip(&series.label, *value))
        );
    }
}

fn straight_path(points: &[(f64, f64)]) -> String {
    let mut d = String::new();
    for (index, (x, y)) in points.iter().enumerate() {
        let command = if index == 0 { 'M' } else { 'L' };
        let _ = write!(d, "{command}{x:.2},{y:.2} ");
    }
    d.trim_end().to_string()
}

/// Catmull-Rom segments converted to cubic Béziers. Each control point stays
/// between its segment's endpoints vertically, so flat stretches stay flat
/// and the curve never overshoots a value it passes through.
fn smooth_path(points: &[(f64, f64)]) -> String {
    let Some(first) = points.first() else {
        return String::new();
    };
    let mut d = format!("M{:.2},{:.2}", first.0, first.1);
    let last = points.len() - 1;

    for index in 0..last {
        let previous = points[index.saturating_sub(1)];
        let current = points[index];
        let next = points[index + 1];
        let after = points[(index + 2).min(last)];

        let low = current.1.min(next.1);
        let high = current.1.max(next.1);

        let c1 = (
            current.0 + (next.0 - previous.0) * SMOOTHING,
            (current.1 + (next.1 - previous.1) * SMOOTHING).clamp(low, high),
        );
        let c2 = (
            next.0 - (after.0 - current.0) * SMOOTHING,
            (next.1 - (after.1 - current.1) * SMOOTHING).clamp(low, high),
        );
        let _ = write!(
            d,
            " C{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}",
            c1.0, c1.1, c2.0, c2.1, next.0, next.1
        );
    }
    d
}

fn write_legend(out: &mut String, scene: &ChartScene, plot: &Plot) {
    let y = f64::from(scene.height) - 24.0;
    let entry_width = 120.0;
    let total = entry_width * scene.series.len() as f64;
    let mut x = plot.left + (plot.width - total) / 2.0;

    for series in &scene.series {
        let dash = match series.style {
            LineStyle::Dashed => r#" stroke-dasharray="8 6""#,
            LineStyle::Smooth => "",
        };
        let _ = writeln!(
            out,
            r#"<line x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{}" stroke-width="3"{dash}/>"#,
            x,
            x + 32.0,
            series.color
        );
        let _ = writeln!(
            out,
            r##"<text x="{:.2}" y="{:.2}" font-family="{FONT}" font-size="13" fill="#111827">{}</text>"##,
            x + 40.0,
            y + 4.0,
            escape_xml(&series.label)
        );
        x += entry_width;
    }
}

fn format_tick(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.1}", value)
    }
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
