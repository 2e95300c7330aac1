use crate::errors::{AppError, AppResult};
use resvg::tiny_skia;
use resvg::usvg;
use resvg::usvg::fontdb;
use std::sync::{Arc, OnceLock};

/// Family name of the bundled chart font. Charts never depend on whatever
/// fonts the host happens to have.
pub const CHART_FONT_FAMILY: &str = "DejaVu Sans";

const REGULAR_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
const BOLD_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

static CHART_FONTS: OnceLock<Arc<fontdb::Database>> = OnceLock::new();

/// Font database holding only the bundled faces, built on first use and
/// shared afterwards.
pub fn chart_fonts() -> Arc<fontdb::Database> {
    CHART_FONTS
        .get_or_init(|| {
            let mut db = fontdb::Database::new();
            db.load_font_data(REGULAR_FONT.to_vec());
            db.load_font_data(BOLD_FONT.to_vec());
            db.set_sans_serif_family(CHART_FONT_FAMILY);
            tracing::debug!(faces = db.len(), "chart fonts loaded");
            Arc::new(db)
        })
        .clone()
}

/// A rendered chart: the encoded PNG plus the same pixels as packed RGB for
/// embedding into documents.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
    pub rgb: Vec<u8>,
}

pub fn rasterize(svg: &str, width: u32, height: u32, fonts: &Arc<fontdb::Database>) -> AppResult<RasterImage> {
    let mut options = usvg::Options::default();
    options.font_family = CHART_FONT_FAMILY.to_string();
    options.fontdb = fonts.clone();

    let tree = usvg::Tree::from_str(svg, &options).map_err(|error| AppError::Render(error.to_string()))?;
    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| AppError::Render(format!("cannot allocate a {}x{} canvas", width, height)))?;
    pixmap.fill(tiny_skia::Color::WHITE);

    let size = tree.size();
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width().max(1.0),
        height as f32 / size.height().max(1.0),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let png = pixmap.encode_png().map_err(|error| AppError::Render(error.to_string()))?;
    // The canvas is filled opaque first, so premultiplied RGBA equals RGBA.
    let rgb = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
        .collect::<Vec<_>>();

    tracing::debug!(width, height, png_bytes = png.len(), "chart rasterized");
    Ok(RasterImage {
        width,
        height,
        png,
        rgb,
    })
}
