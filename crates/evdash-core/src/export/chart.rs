//! Line chart raster
//!
//! A minimal PNG line chart for reports when the host has no chart renderer
//! of its own. Each numeric column is scaled to its own min/max and drawn in
//! its own colour; a row of colour swatches in column order sits above the
//! plot.

use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use super::{check_exportable, ColumnSpec, ExportError};
use crate::analytics::AnalyticsSeries;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([120, 120, 120]);
const GRID: Rgb<u8> = Rgb([228, 228, 228]);

/// Series colours, in column order
const PALETTE: [Rgb<u8>; 6] = [
    Rgb([54, 162, 235]),
    Rgb([255, 99, 132]),
    Rgb([75, 192, 192]),
    Rgb([255, 159, 64]),
    Rgb([153, 102, 255]),
    Rgb([201, 203, 207]),
];

const MARGIN: u32 = 24;
const LEGEND_HEIGHT: u32 = 16;

/// Render the numeric columns of a series as a PNG line chart
pub fn render_line_chart(
    series: &AnalyticsSeries,
    columns: &ColumnSpec,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, ExportError> {
    check_exportable(series, columns)?;
    let width = width.max(MARGIN * 4);
    let height = height.max(MARGIN * 4 + LEGEND_HEIGHT);

    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    let plot = PlotArea {
        left: MARGIN as i64,
        top: (MARGIN + LEGEND_HEIGHT) as i64,
        right: (width - MARGIN) as i64,
        bottom: (height - MARGIN) as i64,
    };

    for i in 1..4 {
        let y = plot.top + (plot.bottom - plot.top) * i / 4;
        draw_line(&mut img, (plot.left, y), (plot.right, y), GRID, 1);
    }
    draw_line(&mut img, (plot.left, plot.bottom), (plot.right, plot.bottom), AXIS, 1);
    draw_line(&mut img, (plot.left, plot.top), (plot.left, plot.bottom), AXIS, 1);

    for (i, column) in columns.numeric().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let swatch_x = plot.left + i as i64 * 24;
        fill_rect(&mut img, swatch_x, MARGIN as i64 / 2, 16, 8, color);

        let values: Vec<Option<f64>> = series
            .rows
            .iter()
            .map(|row| column.value(row).filter(|v| v.is_finite()))
            .collect();
        let Some((min, max)) = bounds(&values) else {
            continue;
        };

        let mut previous: Option<(i64, i64)> = None;
        for (index, value) in values.iter().enumerate() {
            let Some(value) = value else {
                previous = None;
                continue;
            };
            let point = plot.point(index, values.len(), (value - min) / (max - min));
            match previous {
                Some(from) => draw_line(&mut img, from, point, color, 2),
                None => fill_rect(&mut img, point.0 - 1, point.1 - 1, 3, 3, color),
            }
            previous = Some(point);
        }
    }

    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| ExportError::ImageEncode(e.to_string()))?;
    Ok(out)
}

struct PlotArea {
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
}

impl PlotArea {
    /// Pixel for row `index` of `count` at `fraction` of the value range
    fn point(&self, index: usize, count: usize, fraction: f64) -> (i64, i64) {
        let span_x = (self.right - self.left) as f64;
        let x = if count > 1 {
            self.left as f64 + span_x * index as f64 / (count - 1) as f64
        } else {
            self.left as f64 + span_x / 2.0
        };
        let y = self.bottom as f64 - (self.bottom - self.top) as f64 * fraction.clamp(0.0, 1.0);
        (x.round() as i64, y.round() as i64)
    }
}

/// Value range of a column, widened when flat
fn bounds(values: &[Option<f64>]) -> Option<(f64, f64)> {
    let mut present = values.iter().flatten();
    let first = *present.next()?;
    let (min, max) = present.fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if max - min < f64::EPSILON {
        Some((min - 1.0, max + 1.0))
    } else {
        Some((min, max))
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn fill_rect(img: &mut RgbImage, x: i64, y: i64, w: i64, h: i64, color: Rgb<u8>) {
    for dy in 0..h {
        for dx in 0..w {
            put(img, x + dx, y + dy, color);
        }
    }
}

/// Bresenham line, `thickness` pixels tall
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>, thickness: i64) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        for t in 0..thickness {
            put(img, x, y + t, color);
        }
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::MetricSet;
    use crate::telemetry::{HistoricalRow, PartialSample};
    use chrono::NaiveDate;

    fn thermal_series() -> AnalyticsSeries {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let rows = (0..20)
            .map(|i| {
                HistoricalRow::new(
                    day.and_hms_opt(8, i, 0).unwrap(),
                    PartialSample {
                        volt: Some(50.0),
                        amp: Some(i as f64),
                        btemp: Some(25.0 + i as f64 * 0.2),
                        mtemp: if i % 5 == 0 { None } else { Some(40.0) },
                        ..PartialSample::default()
                    },
                )
            })
            .collect();
        AnalyticsSeries::from_rows(MetricSet::Thermal, None, rows)
    }

    #[test]
    fn test_chart_is_png_of_requested_size() {
        let spec = ColumnSpec::for_metric(MetricSet::Thermal).unwrap();
        let png = render_line_chart(&thermal_series(), &spec, 640, 320).unwrap();

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 320));

        // First series colour appears in the plot
        let rgb = decoded.to_rgb8();
        assert!(rgb.pixels().any(|p| *p == PALETTE[0]));
    }

    #[test]
    fn test_bounds() {
        assert_eq!(bounds(&[None, Some(2.0), Some(-1.0)]), Some((-1.0, 2.0)));
        assert_eq!(bounds(&[Some(3.0), Some(3.0)]), Some((2.0, 4.0)));
        assert_eq!(bounds(&[None]), None);
    }

    #[test]
    fn test_empty_series_refused() {
        let spec = ColumnSpec::for_metric(MetricSet::Thermal).unwrap();
        let empty = AnalyticsSeries::from_rows(MetricSet::Thermal, None, Vec::new());
        assert!(matches!(
            render_line_chart(&empty, &spec, 100, 100),
            Err(ExportError::EmptySeries)
        ));
    }
}
