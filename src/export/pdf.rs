use super::raster::RasterImage;
use crate::errors::{AppError, AppResult};
use crate::models::BurndownChart;
use chrono::{DateTime, FixedOffset, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

const PAGE_WIDTH: f32 = 842.0;
const PAGE_HEIGHT: f32 = 595.0;
const MARGIN: f32 = 50.0;
const CHART_BOX_WIDTH: f32 = 500.0;
const CHART_BOX_HEIGHT: f32 = 380.0;
const SUMMARY_X: f32 = 580.0;
const DATA_LINE_HEIGHT: f32 = 14.0;
const DATA_COLUMN_WIDTH: f32 = 245.0;
const DATA_COLUMNS: usize = 3;

/// Lays the burndown report out on A4 landscape pages: the chart with its
/// summary on the first page, the day-by-day figures after it.
#[derive(Debug, Clone, Copy)]
pub struct DocumentComposer {
    offset: FixedOffset,
}

impl DocumentComposer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn compose(&self, chart: &BurndownChart, raster: &RasterImage, generated_at: DateTime<Utc>) -> AppResult<Vec<u8>> {
        if raster.rgb.len() != raster.width as usize * raster.height as usize * 3 {
            return Err(AppError::Render(format!(
                "raster buffer holds {} bytes, expected {}x{} RGB",
                raster.rgb.len(),
                raster.width,
                raster.height
            )));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(raster.width),
                "Height" => i64::from(raster.height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
            },
            raster.rgb.clone(),
        );
        image.compress().map_err(render_error)?;
        let image_id = doc.add_object(image);

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "Im1" => image_id },
        });

        let footer = format!(
            "Generado el {}",
            generated_at.with_timezone(&self.offset).format("%d/%m/%Y %H:%M")
        );

        let mut page_ids = Vec::new();
        let first = self.chart_page(chart, raster, &footer);
        page_ids.push(add_page(&mut doc, pages_id, first)?);
        for operations in data_pages(chart, &footer) {
            page_ids.push(add_page(&mut doc, pages_id, operations)?);
        }

        let count = page_ids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.into_iter().map(Object::from).collect::<Vec<_>>(),
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::from(0i64),
                Object::from(0i64),
                Object::from(PAGE_WIDTH as i64),
                Object::from(PAGE_HEIGHT as i64),
            ],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut out = Vec::new();
        doc.save_to(&mut out).map_err(render_error)?;
        tracing::debug!(bytes = out.len(), pages = count, "burndown document composed");
        Ok(out)
    }

    fn chart_page(&self, chart: &BurndownChart, raster: &RasterImage, footer: &str) -> Vec<Operation> {
        let info = &chart.sprint_info;
        let summary = &chart.summary;
        let mut ops = Vec::new();

        let title = format!("Burndown Chart - {}", info.name);
        text(&mut ops, 20.0, centered_x(&title, 20.0), PAGE_HEIGHT - MARGIN, &title);

        let header = if info.goal.trim().is_empty() {
            format!("Sprint {}", info.number)
        } else {
            format!("Sprint {} | {}", info.number, info.goal.trim())
        };
        text(&mut ops, 12.0, MARGIN, PAGE_HEIGHT - MARGIN - 26.0, &header);
        let range = format!(
            "Duración: {} - {}",
            info.start_date.with_timezone(&self.offset).format("%d/%m/%Y"),
            info.end_date.with_timezone(&self.offset).format("%d/%m/%Y")
        );
        text(&mut ops, 12.0, MARGIN, PAGE_HEIGHT - MARGIN - 42.0, &range);

        let scale = (CHART_BOX_WIDTH / raster.width as f32).min(CHART_BOX_HEIGHT / raster.height as f32);
        let drawn_width = raster.width as f32 * scale;
        let drawn_height = raster.height as f32 * scale;
        let image_top = PAGE_HEIGHT - MARGIN - 60.0;
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                drawn_width.into(),
                0i64.into(),
                0i64.into(),
                drawn_height.into(),
                MARGIN.into(),
                (image_top - drawn_height).into(),
            ],
        ));
        ops.push(Operation::new("Do", vec!["Im1".into()]));
        ops.push(Operation::new("Q", vec![]));

        let mut y = image_top - 10.0;
        text(&mut ops, 14.0, SUMMARY_X, y, "Resumen de Métricas:");
        y -= 24.0;
        let status = if summary.is_on_track { "En tiempo" } else { "Retrasado" };
        let bullets = [
            format!("• Esfuerzo Comprometido: {:.1} horas", summary.effort_committed),
            format!("• Esfuerzo Completado: {:.1} horas", summary.effort_completed),
            format!("• Esfuerzo Restante: {:.1} horas", summary.effort_remaining),
            format!("• Progreso: {:.1}%", summary.percentage_complete),
            format!("• Días Restantes: {}", summary.days_remaining),
            format!("• Velocidad Necesaria: {:.2} horas/día", summary.velocity_needed),
            format!("• Estado: {}", status),
        ];
        for bullet in &bullets {
            text(&mut ops, 11.0, SUMMARY_X, y, bullet);
            y -= 18.0;
        }

        text(&mut ops, 9.0, centered_x(footer, 9.0), 30.0, footer);
        ops
    }
}

fn data_pages(chart: &BurndownChart, footer: &str) -> Vec<Vec<Operation>> {
    let data = &chart.chart_data;
    let lines = data
        .dates
        .iter()
        .enumerate()
        .map(|(index, date)| {
            let ideal = data
                .ideal_line
                .get(index)
                .map(|value| format!("{:.1}h", value))
                .unwrap_or_else(|| "N/A".to_string());
            let actual = data
                .actual_line
                .get(index)
                .map(|value| format!("{:.1}h", value))
                .unwrap_or_else(|| "N/A".to_string());
            format!("{}: Ideal={}, Real={}", date.format("%d/%m/%Y"), ideal, actual)
        })
        .collect::<Vec<_>>();
    if lines.is_empty() {
        return Vec::new();
    }

    let heading_y = PAGE_HEIGHT - MARGIN;
    let first_line_y = heading_y - 28.0;
    let per_column = (((first_line_y - MARGIN) / DATA_LINE_HEIGHT).floor() as usize).max(1);
    let per_page = per_column * DATA_COLUMNS;

    lines
        .chunks(per_page)
        .map(|page_lines| {
            let mut ops = Vec::new();
            text(&mut ops, 14.0, MARGIN, heading_y, "Datos del Burndown:");
            for (index, line) in page_lines.iter().enumerate() {
                let column = index / per_column;
                let row = index % per_column;
                let x = MARGIN + DATA_COLUMN_WIDTH * column as f32;
                let y = first_line_y - DATA_LINE_HEIGHT * row as f32;
                text(&mut ops, 10.0, x, y, line);
            }
            text(&mut ops, 9.0, centered_x(footer, 9.0), 30.0, footer);
            ops
        })
        .collect()
}

fn add_page(doc: &mut Document, pages_id: ObjectId, operations: Vec<Operation>) -> AppResult<ObjectId> {
    let content = Content { operations };
    let encoded = content.encode().map_err(render_error)?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    }))
}

fn text(ops: &mut Vec<Operation>, size: f32, x: f32, y: f32, value: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec!["F1".into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(value))]));
    ops.push(Operation::new("ET", vec![]));
}

/// Rough Helvetica width; good enough to center a heading.
fn centered_x(value: &str, size: f32) -> f32 {
    let estimated = value.chars().count() as f32 * size * 0.5;
    ((PAGE_WIDTH - estimated) / 2.0).max(MARGIN)
}

/// Encodes text for the standard Type1 fonts. Latin-1 maps directly; the
/// few typographic marks used in reports get their WinAnsi code points and
/// anything else becomes '?'.
fn win_ansi(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|ch| match ch {
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            _ => u8::try_from(u32::from(ch))
                .ok()
                .filter(|byte| !(0x80..0xA0).contains(byte))
                .unwrap_or(b'?'),
        })
        .collect()
}

fn render_error(error: impl std::fmt::Display) -> AppError {
    AppError::Render(error.to_string())
}
