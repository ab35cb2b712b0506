use std::path::Path;

use ab_glyph::FontRef;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

use super::colormap::{ndvi_color, NDVI_MAX, NDVI_MIN};
use super::text::{draw_centered, label_font, label_size};
use super::YearRaster;
use crate::commons::geotiff::write_bytes_atomic;
use crate::error::{NdviError, Result};

pub const FRAME_DELAY_MS: u32 = 1000;
/// Longest side of the map area; larger rasters are downsampled to it
const TARGET_SIDE: usize = 480;
/// Upscaling limit for small rasters, in pixels per cell
const MAX_CELL: usize = 16;
const MARGIN: u32 = 8;
const TITLE_HEIGHT: u32 = 28;
const TITLE_SIZE: f32 = 18.0;
const LABEL_SIZE: f32 = 12.0;
const COLORBAR_GAP: u32 = 12;
const COLORBAR_WIDTH: u32 = 16;
/// Bar, tick labels and the "NDVI" caption
const LEGEND_WIDTH: u32 = COLORBAR_GAP + COLORBAR_WIDTH + 44;
const LEGEND_MIN_HEIGHT: u32 = 160;
/// Room above the bar for its caption
const LEGEND_CAPTION: u32 = 18;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([20, 20, 20, 255]);

/// Output pixels per raster cell
///
/// Small rasters are blown up by a whole number of pixels per cell, large ones are
/// scaled down so their longest side is `TARGET_SIDE`.
fn map_scale(max_side: usize) -> f64 {
    let max_side = max_side.max(1);
    if max_side <= TARGET_SIDE {
        (TARGET_SIDE / max_side).clamp(1, MAX_CELL) as f64
    } else {
        TARGET_SIDE as f64 / max_side as f64
    }
}

fn scaled(len: usize, scale: f64) -> u32 {
    ((len as f64 * scale).round() as u32).max(1)
}

pub fn frame_title(city: &str, year: i32) -> String {
    format!("NDVI - {} - {}", city, year)
}

/// Where things go on the canvas shared by every frame
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameLayout {
    pub canvas_width: u32,
    pub canvas_height: u32,
    scale: f64,
    map_x: u32,
    map_y: u32,
    map_width: u32,
    map_height: u32,
    pub colorbar: Rect,
}

impl FrameLayout {
    pub(crate) fn fit(rasters: &[YearRaster], city: &str, font: &FontRef) -> Self {
        let max_width = rasters.iter().map(|r| r.raster.width).max().unwrap_or(1);
        let max_height = rasters.iter().map(|r| r.raster.height).max().unwrap_or(1);
        let scale = map_scale(max_width.max(max_height));
        let map_width = scaled(max_width, scale);
        let map_height = scaled(max_height, scale);

        let title_width = rasters
            .iter()
            .map(|r| label_size(font, TITLE_SIZE, &frame_title(city, r.year)).0)
            .max()
            .unwrap_or(0);
        let block_width = map_width + LEGEND_WIDTH;
        let canvas_width = (block_width + 2 * MARGIN).max(title_width + 2 * MARGIN);
        let body_height = map_height.max(LEGEND_MIN_HEIGHT);
        let canvas_height = TITLE_HEIGHT + body_height + 2 * MARGIN;

        let map_x = (canvas_width - block_width) / 2;
        let body_y = TITLE_HEIGHT + MARGIN;
        let map_y = body_y + (body_height - map_height) / 2;

        let bar_top = body_y + LEGEND_CAPTION;
        let colorbar = Rect::at((map_x + map_width + COLORBAR_GAP) as i32, bar_top as i32)
            .of_size(COLORBAR_WIDTH, body_y + body_height - bar_top - LABEL_SIZE as u32 / 2);

        FrameLayout {
            canvas_width,
            canvas_height,
            scale,
            map_x,
            map_y,
            map_width,
            map_height,
            colorbar,
        }
    }

    /// Top-left corner and size of a raster's map, centred in the map area
    pub(crate) fn map_rect(&self, width: usize, height: usize) -> (u32, u32, u32, u32) {
        let w = scaled(width, self.scale).min(self.map_width);
        let h = scaled(height, self.scale).min(self.map_height);
        (
            self.map_x + (self.map_width - w) / 2,
            self.map_y + (self.map_height - h) / 2,
            w,
            h,
        )
    }
}

fn draw_map(frame: &mut RgbaImage, layout: &FrameLayout, year: &YearRaster) {
    let raster = &year.raster;
    if raster.width == 0 || raster.height == 0 {
        return;
    }
    let (x0, y0, w, h) = layout.map_rect(raster.width, raster.height);
    // Nearest cell under each output pixel
    for y in 0..h {
        let row = (y as usize * raster.height / h as usize).min(raster.height - 1);
        for x in 0..w {
            let col = (x as usize * raster.width / w as usize).min(raster.width - 1);
            let [r, g, b] = ndvi_color(raster.data[row * raster.width + col]).0;
            frame.put_pixel(x0 + x, y0 + y, Rgba([r, g, b, 255]));
        }
    }
}

fn draw_colorbar(frame: &mut RgbaImage, layout: &FrameLayout, font: &FontRef) {
    let bar = layout.colorbar;
    let rows = bar.height().max(2);
    for i in 0..rows {
        let t = i as f32 / (rows - 1) as f32;
        let value = NDVI_MAX - (NDVI_MAX - NDVI_MIN) * t;
        let [r, g, b] = ndvi_color(value).0;
        draw_filled_rect_mut(
            frame,
            Rect::at(bar.left(), bar.top() + i as i32).of_size(bar.width(), 1),
            Rgba([r, g, b, 255]),
        );
    }

    let label_x = bar.right() + 6;
    let half = LABEL_SIZE as i32 / 2;
    let ticks = [(NDVI_MAX, bar.top()), (0.0, bar.top() + bar.height() as i32 / 2), (NDVI_MIN, bar.bottom())];
    for (value, y) in ticks {
        let text = format!("{:.1}", value);
        let (w, _) = label_size(font, LABEL_SIZE, &text);
        draw_centered(frame, INK, label_x + w as i32 / 2, y - half, LABEL_SIZE, font, &text);
    }
    draw_centered(
        frame,
        INK,
        bar.left() + bar.width() as i32 / 2,
        bar.top() - LEGEND_CAPTION as i32 + 2,
        LABEL_SIZE,
        font,
        "NDVI",
    );
}

/// One frame per year on a shared canvas: a title naming the place and year, the
/// colour-mapped raster and an NDVI colour bar
fn render_frames(rasters: &[YearRaster], city: &str) -> Result<Vec<RgbaImage>> {
    let font = label_font()?;
    let layout = FrameLayout::fit(rasters, city, &font);

    Ok(rasters
        .iter()
        .map(|year| {
            let mut frame = RgbaImage::from_pixel(layout.canvas_width, layout.canvas_height, BACKGROUND);
            draw_centered(
                &mut frame,
                INK,
                layout.canvas_width as i32 / 2,
                (MARGIN / 2) as i32 + 2,
                TITLE_SIZE,
                &font,
                &frame_title(city, year.year),
            );
            draw_map(&mut frame, &layout, year);
            draw_colorbar(&mut frame, &layout, &font);
            frame
        })
        .collect())
}

/// Animated GIF with one frame per raster, in the given order, looping forever
/// Returns the number of frames written
pub fn render_gif(rasters: &[YearRaster], city: &str, path: &Path) -> Result<usize> {
    if rasters.is_empty() {
        return Err(NdviError::AggregationInput("no frames to animate".to_string()));
    }

    let frames = render_frames(rasters, city)?;
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder.set_repeat(Repeat::Infinite)?;
        for image in frames {
            let delay = Delay::from_numer_denom_ms(FRAME_DELAY_MS, 1);
            encoder.encode_frame(Frame::from_parts(image, 0, 0, delay))?;
        }
    }
    write_bytes_atomic(path, &bytes)?;
    debug!(path = %path.display(), frames = rasters.len(), "wrote GIF");
    Ok(rasters.len())
}
