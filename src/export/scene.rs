use crate::models::BurndownChart;
use chrono::Datelike;

pub const IDEAL_COLOR: &str = "#94a3b8";
pub const ACTUAL_COLOR: &str = "#2563eb";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    /// Straight dashed segments, no point markers.
    Dashed,
    /// Solid smoothed curve with a circle on every point.
    Smooth,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSpec {
    pub label: String,
    pub color: &'static str,
    pub style: LineStyle,
    pub values: Vec<f64>,
}

/// Everything a renderer needs to draw one burndown chart, independent of
/// the output format.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartScene {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub subtitle: String,
    pub x_labels: Vec<String>,
    pub y_axis_label: String,
    pub y_max: f64,
    pub y_step: f64,
    pub series: Vec<SeriesSpec>,
}

impl ChartScene {
    pub fn from_chart(chart: &BurndownChart, width: u32, height: u32) -> Self {
        let status = if chart.summary.is_on_track { "En tiempo" } else { "En riesgo" };
        let subtitle = if chart.sprint_info.goal.trim().is_empty() {
            format!("{:.1}% completado · {}", chart.summary.percentage_complete, status)
        } else {
            format!(
                "{} · {:.1}% completado · {}",
                chart.sprint_info.goal.trim(),
                chart.summary.percentage_complete,
                status
            )
        };

        let data = &chart.chart_data;
        let peak = data
            .ideal_line
            .iter()
            .chain(data.actual_line.iter())
            .copied()
            .fold(data.effort_committed, f64::max);
        let (y_max, y_step) = nice_axis(peak);

        Self {
            width,
            height,
            title: chart.sprint_info.name.clone(),
            subtitle,
            x_labels: data.dates.iter().map(|date| date.day().to_string()).collect(),
            y_axis_label: "Horas".to_string(),
            y_max,
            y_step,
            series: vec![
                SeriesSpec {
                    label: "Ideal".to_string(),
                    color: IDEAL_COLOR,
                    style: LineStyle::Dashed,
                    values: data.ideal_line.clone(),
                },
                SeriesSpec {
                    label: "Real".to_string(),
                    color: ACTUAL_COLOR,
                    style: LineStyle::Smooth,
                    values: data.actual_line.clone(),
                },
            ],
        }
    }

    pub fn tooltip(label: &str, value: f64) -> String {
        format!("{}: {:.1} horas", label, value)
    }
}

/// Rounds `peak` up to a readable axis top and picks a 1/2/5 step that
/// gives roughly five gridlines. Empty or non-positive data gets a 0..5 axis.
pub fn nice_axis(peak: f64) -> (f64, f64) {
    if !peak.is_finite() || peak <= 0.0 {
        return (5.0, 1.0);
    }
    let raw_step = peak / 5.0;
    let magnitude = 10f64.powf(raw_step.log10().floor());
    let normalized = raw_step / magnitude;
    let step = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    } * magnitude;
    ((peak / step).ceil() * step, step)
}
