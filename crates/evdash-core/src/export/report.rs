//! PDF report export
//!
//! Landscape A4. The first page carries the title block, the chart and as
//! many table rows as fit below it; remaining rows continue on further pages
//! with the header row repeated.

use printpdf::{
    image_crate, BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm,
    PdfDocument, PdfLayerReference, Point, Rgb,
};
use tracing::debug;

use super::{check_exportable, ColumnSpec, ExportError, ReportMeta};
use crate::analytics::AnalyticsSeries;

pub const PAGE_WIDTH_MM: f32 = 297.0;
pub const PAGE_HEIGHT_MM: f32 = 210.0;

const MARGIN_MM: f32 = 15.0;
const CHART_TOP_MM: f32 = 172.0;
const CHART_HEIGHT_MM: f32 = 80.0;
const ROW_HEIGHT_MM: f32 = 6.5;
const TABLE_FONT_SIZE: f32 = 9.0;
const IMAGE_DPI: f32 = 150.0;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Render a series as a PDF report with the given chart image (PNG, JPEG, ...)
pub fn to_report(
    series: &AnalyticsSeries,
    chart_image: &[u8],
    columns: &ColumnSpec,
    meta: &ReportMeta,
) -> Result<Vec<u8>, ExportError> {
    check_exportable(series, columns)?;
    let chart = image_crate::load_from_memory(chart_image)
        .map_err(|e| ExportError::InvalidImage(e.to_string()))?;

    let (doc, page, layer) = PdfDocument::new(
        meta.title.as_str(),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Report",
    );
    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_error)?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?,
    };

    let first = doc.get_page(page).get_layer(layer);
    let top = PAGE_HEIGHT_MM - MARGIN_MM;

    first.use_text(meta.title.as_str(), 18.0, Mm(MARGIN_MM), Mm(top - 6.0), &fonts.bold);
    first.use_text(meta.subtitle.as_str(), 11.0, Mm(MARGIN_MM), Mm(top - 14.0), &fonts.regular);
    if let Some(note) = &meta.note {
        first.use_text(note.as_str(), 9.0, Mm(MARGIN_MM), Mm(top - 20.0), &fonts.regular);
    }

    let chart_y = chart_top(meta);
    place_chart(&first, chart, chart_y);

    let widths = column_widths(columns);
    let rows: Vec<Vec<String>> = series.rows.iter().map(|r| columns.cells(r)).collect();

    let mut pages = 1;
    let mut remaining = draw_table_page(
        &first,
        &fonts,
        columns,
        &widths,
        &rows,
        chart_y - CHART_HEIGHT_MM - 6.0,
    );

    while !remaining.is_empty() {
        let (page, layer) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Report");
        let current = doc.get_page(page).get_layer(layer);
        pages += 1;
        remaining = draw_table_page(
            &current,
            &fonts,
            columns,
            &widths,
            remaining,
            PAGE_HEIGHT_MM - MARGIN_MM,
        );
    }

    debug!(rows = rows.len(), pages, "Report rendered");
    doc.save_to_bytes().map_err(pdf_error)
}

/// Rows that fit on one page below `top`, header included
pub fn rows_per_page(top: f32) -> usize {
    let usable = top - MARGIN_MM - ROW_HEIGHT_MM;
    (usable / ROW_HEIGHT_MM).floor().max(1.0) as usize
}

/// Number of pages a report with `rows` table rows takes
pub fn page_count(rows: usize, meta: &ReportMeta) -> usize {
    let first = rows_per_page(chart_top(meta) - CHART_HEIGHT_MM - 6.0);
    if rows <= first {
        return 1;
    }
    let per_page = rows_per_page(PAGE_HEIGHT_MM - MARGIN_MM);
    1 + (rows - first).div_ceil(per_page)
}

/// Top edge of the chart box, below the title block
fn chart_top(meta: &ReportMeta) -> f32 {
    let title_block = if meta.note.is_some() { 24.0 } else { 18.0 };
    (PAGE_HEIGHT_MM - MARGIN_MM - title_block).min(CHART_TOP_MM)
}

fn pdf_error(e: printpdf::Error) -> ExportError {
    ExportError::Pdf(e.to_string())
}

/// Scale the chart into the chart box below `top`, keeping its aspect ratio
fn place_chart(layer: &PdfLayerReference, chart: image_crate::DynamicImage, top: f32) {
    let px_to_mm = 25.4 / IMAGE_DPI;
    let natural_w = chart.width() as f32 * px_to_mm;
    let natural_h = chart.height() as f32 * px_to_mm;
    let box_w = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
    let scale = (box_w / natural_w).min(CHART_HEIGHT_MM / natural_h);
    let drawn_w = natural_w * scale;
    let drawn_h = natural_h * scale;

    let image = Image::from_dynamic_image(&chart);
    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(MARGIN_MM + (box_w - drawn_w) / 2.0)),
            translate_y: Some(Mm(top - drawn_h)),
            scale_x: Some(scale),
            scale_y: Some(scale),
            dpi: Some(IMAGE_DPI),
            ..Default::default()
        },
    );
}

/// Column widths in mm; time gets a wider share
fn column_widths(columns: &ColumnSpec) -> Vec<f32> {
    let weights: Vec<f32> = columns
        .columns
        .iter()
        .map(|c| if c.source == super::Column::Time { 1.6 } else { 1.0 })
        .collect();
    let total: f32 = weights.iter().sum();
    let table_w = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
    weights.iter().map(|w| table_w * w / total).collect()
}

/// Draw the header and as many rows as fit; returns the rows left over
fn draw_table_page<'a>(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    columns: &ColumnSpec,
    widths: &[f32],
    rows: &'a [Vec<String>],
    top: f32,
) -> &'a [Vec<String>] {
    let count = rows_per_page(top).min(rows.len());
    let (page_rows, rest) = rows.split_at(count);

    draw_row(layer, &fonts.bold, widths, columns.headers().into_iter(), top);
    for (i, row) in page_rows.iter().enumerate() {
        let row_top = top - ROW_HEIGHT_MM * (i + 1) as f32;
        draw_row(layer, &fonts.regular, widths, row.iter().map(String::as_str), row_top);
    }

    let bottom = top - ROW_HEIGHT_MM * (count + 1) as f32;
    draw_grid(layer, widths, top, bottom, count + 1);
    rest
}

fn draw_row<'a>(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    widths: &[f32],
    cells: impl Iterator<Item = &'a str>,
    row_top: f32,
) {
    let mut x = MARGIN_MM;
    for (cell, width) in cells.zip(widths) {
        layer.use_text(
            cell,
            TABLE_FONT_SIZE,
            Mm(x + 1.5),
            Mm(row_top - ROW_HEIGHT_MM + 2.0),
            font,
        );
        x += width;
    }
}

fn draw_grid(layer: &PdfLayerReference, widths: &[f32], top: f32, bottom: f32, rows: usize) {
    layer.set_outline_color(Color::Rgb(Rgb::new(0.6, 0.6, 0.6, None)));
    layer.set_outline_thickness(0.3);

    let left = MARGIN_MM;
    let right = MARGIN_MM + widths.iter().sum::<f32>();
    for i in 0..=rows {
        let y = top - ROW_HEIGHT_MM * i as f32;
        layer.add_line(segment((left, y), (right, y)));
    }

    let mut x = left;
    layer.add_line(segment((x, top), (x, bottom)));
    for width in widths {
        x += width;
        layer.add_line(segment((x, top), (x, bottom)));
    }
}

fn segment(from: (f32, f32), to: (f32, f32)) -> Line {
    Line {
        points: vec![
            (Point::new(Mm(from.0), Mm(from.1)), false),
            (Point::new(Mm(to.0), Mm(to.1)), false),
        ],
        is_closed: false,
    }
}
