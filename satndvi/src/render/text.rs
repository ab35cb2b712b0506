//! Label drawing with the bundled DejaVu Sans Mono font

use ab_glyph::{FontRef, PxScale};
use image::Pixel;
use imageproc::definitions::Clamp;
use imageproc::drawing::{draw_text_mut, text_size, Canvas};

use crate::error::Result;

static LABEL_FONT: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");

pub fn label_font() -> Result<FontRef<'static>> {
    Ok(FontRef::try_from_slice(LABEL_FONT)?)
}

/// Pixel width and height of `text` at `size`
pub fn label_size(font: &FontRef, size: f32, text: &str) -> (u32, u32) {
    text_size(PxScale::from(size), font, text)
}

/// Draw `text` with its top edge at `y`, horizontally centred on `centre_x`
pub fn draw_centered<C>(canvas: &mut C, color: C::Pixel, centre_x: i32, y: i32, size: f32, font: &FontRef, text: &str)
where
    C: Canvas,
    <C::Pixel as Pixel>::Subpixel: Into<f32> + Clamp<f32>,
{
    let (width, _) = label_size(font, size, text);
    draw_text_mut(canvas, color, centre_x - width as i32 / 2, y, PxScale::from(size), font, text);
}

/// Draw `text` so that it ends at `right_x`
pub fn draw_right_aligned<C>(canvas: &mut C, color: C::Pixel, right_x: i32, y: i32, size: f32, font: &FontRef, text: &str)
where
    C: Canvas,
    <C::Pixel as Pixel>::Subpixel: Into<f32> + Clamp<f32>,
{
    let (width, _) = label_size(font, size, text);
    draw_text_mut(canvas, color, right_x - width as i32, y, PxScale::from(size), font, text);
}
