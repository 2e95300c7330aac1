//! Burndown chart export to SVG, PNG and PDF.

mod pdf;
mod raster;
mod scene;
mod svg;

pub use pdf::DocumentComposer;
pub use raster::{chart_fonts, rasterize, RasterImage, CHART_FONT_FAMILY};
pub use scene::{nice_axis, ChartScene, LineStyle, SeriesSpec};
pub use svg::SvgRenderer;

use crate::clock::Clock;
use crate::config::clamp_export_side;
use crate::errors::AppResult;
use crate::models::BurndownChart;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_WIDTH: u32 = 1200;
pub const DEFAULT_HEIGHT: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Png,
    Svg,
    Pdf,
}

impl ExportKind {
    pub const ALL: [ExportKind; 3] = [ExportKind::Png, ExportKind::Svg, ExportKind::Pdf];

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
            Self::Pdf => "pdf",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "svg" => Some(Self::Svg),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

pub fn export_filename(sprint_number: i64, kind: ExportKind) -> String {
    format!("burndown-sprint-{}.{}", sprint_number, kind.extension())
}

/// Draws a [`ChartScene`]. Swapping the renderer changes how charts look
/// without touching export dispatch or the PDF layout.
pub trait Renderer: Send + Sync {
    fn render_vector(&self, scene: &ChartScene) -> AppResult<String>;

    fn render_raster(&self, scene: &ChartScene) -> AppResult<RasterImage>;
}

#[derive(Clone)]
pub struct ChartExporter {
    renderer: Arc<dyn Renderer>,
    composer: DocumentComposer,
    clock: Arc<dyn Clock>,
}

impl ChartExporter {
    pub fn new(clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self::with_renderer(Arc::new(SvgRenderer::default()), clock, offset)
    }

    pub fn with_renderer(renderer: Arc<dyn Renderer>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self {
            renderer,
            composer: DocumentComposer::new(offset),
            clock,
        }
    }

    /// Renders the chart in memory. Width and height fall back to 1200x600
    /// and are clamped to 200..=4000 pixels.
    pub fn export_burndown_chart(
        &self,
        chart: &BurndownChart,
        kind: ExportKind,
        width: Option<u32>,
        height: Option<u32>,
    ) -> AppResult<Vec<u8>> {
        let width = clamp_export_side(width.unwrap_or(DEFAULT_WIDTH));
        let height = clamp_export_side(height.unwrap_or(DEFAULT_HEIGHT));
        let scene = ChartScene::from_chart(chart, width, height);

        let bytes = match kind {
            ExportKind::Svg => self.renderer.render_vector(&scene)?.into_bytes(),
            ExportKind::Png => self.renderer.render_raster(&scene)?.png,
            ExportKind::Pdf => {
                let raster = self.renderer.render_raster(&scene)?;
                self.composer.compose(chart, &raster, self.clock.now())?
            }
        };

        tracing::info!(
            sprint_id = %chart.sprint_info.id,
            format = kind.extension(),
            width,
            height,
            bytes = bytes.len(),
            "burndown chart exported"
        );
        Ok(bytes)
    }
}
