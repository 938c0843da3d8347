//! Raster heatmaps of vega maps.
//!
//! Tenor runs left to right, strike bottom to top, one uniform block per
//! cell. The color scale diverges around zero with bounds at the largest
//! finite magnitude of the run. The average-life marker is vertical, the
//! barrier marker horizontal, and a dot marks where they cross.

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};

use vegamap_engine::ComputationRun;

use crate::error::ExportResult;

const NEGATIVE: [u8; 3] = [59, 76, 192];
const CENTER: [u8; 3] = [247, 247, 247];
const POSITIVE: [u8; 3] = [180, 4, 38];

/// Pixel layout and marker colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatmapStyle {
    /// Width of one tenor column.
    pub cell_width: u32,
    /// Height of one strike row.
    pub cell_height: u32,
    /// Thickness of the marker lines.
    pub marker_thickness: u32,
    /// Radius of the intersection dot.
    pub dot_radius: u32,
    /// Marker and dot color.
    pub marker_color: Rgb<u8>,
    /// Color of failed cells.
    pub nan_color: Rgb<u8>,
}

impl Default for HeatmapStyle {
    fn default() -> Self {
        Self {
            cell_width: 48,
            cell_height: 32,
            marker_thickness: 2,
            dot_radius: 5,
            marker_color: Rgb([20, 20, 20]),
            nan_color: Rgb([160, 160, 160]),
        }
    }
}

/// Color of `value` on a scale symmetric about zero with limits `±bound`.
///
/// Values beyond the bound saturate. A zero or missing bound maps every
/// finite value to the center color.
pub fn diverging_color(value: f64, bound: f64) -> Rgb<u8> {
    if !(bound.is_finite() && bound > 0.0) {
        return Rgb(CENTER);
    }
    let t = (value / bound).clamp(-1.0, 1.0);
    let target = if t < 0.0 { NEGATIVE } else { POSITIVE };
    let t = t.abs();
    let mut rgb = [0u8; 3];
    for (channel, (c, e)) in rgb.iter_mut().zip(CENTER.iter().zip(target.iter())) {
        *channel = (f64::from(*c) + (f64::from(*e) - f64::from(*c)) * t).round() as u8;
    }
    Rgb(rgb)
}

/// Fractional bucket position of `value` along `edges`, `None` outside.
fn axis_position(edges: &[f64], value: f64) -> Option<f64> {
    let (first, last) = (*edges.first()?, *edges.last()?);
    if !value.is_finite() || value < first || value > last {
        return None;
    }
    let buckets = edges.len() - 1;
    for (i, pair) in edges.windows(2).enumerate() {
        if value < pair[1] || i + 1 == buckets {
            return Some(i as f64 + (value - pair[0]) / (pair[1] - pair[0]));
        }
    }
    None
}

/// Render a run into an image.
pub fn render(run: &ComputationRun, style: &HeatmapStyle) -> RgbImage {
    let matrix = run.matrix();
    let (rows, cols) = (matrix.rows() as u32, matrix.cols() as u32);
    let width = (cols * style.cell_width).max(1);
    let height = (rows * style.cell_height).max(1);
    let bound = matrix.max_abs_finite().unwrap_or(0.0);

    let mut image = RgbImage::from_pixel(width, height, Rgb(CENTER));
    for row in 0..rows {
        for col in 0..cols {
            let color = match matrix.get(row as usize, col as usize) {
                Some(v) if v.is_finite() => diverging_color(v, bound),
                _ => style.nan_color,
            };
            let top = height - (row + 1) * style.cell_height;
            for y in top..top + style.cell_height {
                for x in col * style.cell_width..(col + 1) * style.cell_width {
                    image.put_pixel(x, y, color);
                }
            }
        }
    }

    // Average life is in years, the tenor axis in months.
    let marker_x = run
        .average_life()
        .and_then(|years| axis_position(run.axes().tenor().edges(), years * 12.0))
        .map(|p| clamp_pixel(p * f64::from(style.cell_width), width));
    let marker_y = axis_position(run.axes().strike().edges(), run.barrier_level())
        .map(|p| clamp_pixel(f64::from(height) - 1.0 - p * f64::from(style.cell_height), height));

    let half = style.marker_thickness / 2;
    if let Some(x) = marker_x {
        for px in x.saturating_sub(half)..(x + style.marker_thickness - half).min(width) {
            for y in 0..height {
                image.put_pixel(px, y, style.marker_color);
            }
        }
    }
    if let Some(y) = marker_y {
        for py in y.saturating_sub(half)..(y + style.marker_thickness - half).min(height) {
            for x in 0..width {
                image.put_pixel(x, py, style.marker_color);
            }
        }
    }
    if let (Some(x), Some(y)) = (marker_x, marker_y) {
        draw_dot(&mut image, x, y, style.dot_radius, style.marker_color);
    }
    image
}

fn clamp_pixel(position: f64, extent: u32) -> u32 {
    (position.floor().max(0.0) as u32).min(extent.saturating_sub(1))
}

fn draw_dot(image: &mut RgbImage, cx: u32, cy: u32, radius: u32, color: Rgb<u8>) {
    let r = i64::from(radius);
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let (x, y) = (i64::from(cx) + dx, i64::from(cy) + dy);
            if x >= 0 && y >= 0 && x < i64::from(image.width()) && y < i64::from(image.height()) {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// PNG encoding of a run's heatmap.
pub fn png_bytes(run: &ComputationRun, style: &HeatmapStyle) -> ExportResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    render(run, style).write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Write a run's heatmap as PNG.
pub fn write_png(run: &ComputationRun, style: &HeatmapStyle, path: impl AsRef<Path>) -> ExportResult<()> {
    render(run, style).save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
