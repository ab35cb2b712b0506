use std::io::Cursor;
use std::path::Path;

use ab_glyph::FontRef;
use image::imageops::{overlay, rotate270};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use super::text::{draw_centered, draw_right_aligned, label_font, label_size};
use super::TrendPoint;
use crate::commons::geotiff::write_bytes_atomic;
use crate::error::{NdviError, Result};

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 600;
const LEFT: f32 = 80.0;
const RIGHT: f32 = 30.0;
const TOP: f32 = 40.0;
const BOTTOM: f32 = 60.0;
const MARKER_RADIUS: i32 = 5;
const Y_TICKS: usize = 5;
const TITLE_SIZE: f32 = 20.0;
const AXIS_LABEL_SIZE: f32 = 16.0;
const TICK_LABEL_SIZE: f32 = 13.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const LINE: Rgb<u8> = Rgb([0, 0, 255]);

/// Data-to-pixel mapping of the plot area
#[derive(Debug, Clone, Copy)]
struct Axes {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Axes {
    fn fit(points: &[(i32, f64)], years: &[i32]) -> Self {
        let (mut x_min, mut x_max) = years
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &y| (lo.min(y as f64), hi.max(y as f64)));
        if x_min > x_max {
            (x_min, x_max) = (0.0, 1.0);
        }
        if x_max - x_min < 1.0 {
            x_min -= 1.0;
            x_max += 1.0;
        }

        let (mut y_min, mut y_max) = points
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &(_, v)| (lo.min(v), hi.max(v)));
        if y_min > y_max {
            (y_min, y_max) = (-1.0, 1.0);
        }
        let pad = ((y_max - y_min) * 0.1).max(0.05);
        Axes {
            x_min,
            x_max,
            y_min: y_min - pad,
            y_max: y_max + pad,
        }
    }

    fn to_pixel(&self, x: f64, y: f64) -> (f32, f32) {
        let plot_w = WIDTH as f32 - LEFT - RIGHT;
        let plot_h = HEIGHT as f32 - TOP - BOTTOM;
        let px = LEFT + ((x - self.x_min) / (self.x_max - self.x_min)) as f32 * plot_w;
        let py = TOP + plot_h - ((y - self.y_min) / (self.y_max - self.y_min)) as f32 * plot_h;
        (px, py)
    }
}

pub fn plot_title(city: &str) -> String {
    format!("Average NDVI Over Time - {}", city)
}

fn draw_frame(img: &mut RgbImage, axes: &Axes, years: &[i32], font: &FontRef) {
    let bottom = HEIGHT as f32 - BOTTOM;
    let right = WIDTH as f32 - RIGHT;

    // Vertical grid at every year, thinned out for long series
    let step = (years.len() / 20).max(1);
    for &year in years.iter().step_by(step) {
        let (x, _) = axes.to_pixel(year as f64, axes.y_min);
        draw_line_segment_mut(img, (x, TOP), (x, bottom), GRID);
        draw_line_segment_mut(img, (x, bottom), (x, bottom + 6.0), BLACK);
        draw_centered(img, BLACK, x.round() as i32, bottom as i32 + 9, TICK_LABEL_SIZE, font, &year.to_string());
    }
    for i in 0..=Y_TICKS {
        let value = axes.y_min + (axes.y_max - axes.y_min) * i as f64 / Y_TICKS as f64;
        let (_, y) = axes.to_pixel(axes.x_min, value);
        draw_line_segment_mut(img, (LEFT, y), (right, y), GRID);
        draw_line_segment_mut(img, (LEFT - 6.0, y), (LEFT, y), BLACK);
        let half = TICK_LABEL_SIZE as i32 / 2;
        draw_right_aligned(img, BLACK, LEFT as i32 - 9, y.round() as i32 - half, TICK_LABEL_SIZE, font, &format!("{:.2}", value));
    }

    let plot = Rect::at(LEFT as i32, TOP as i32)
        .of_size((right - LEFT) as u32, (bottom - TOP) as u32);
    draw_hollow_rect_mut(img, plot, BLACK);
}

/// "Year" under the x ticks, "Average NDVI" read bottom to top along the y axis
fn draw_axis_labels(img: &mut RgbImage, font: &FontRef) {
    let centre_x = (LEFT + (WIDTH as f32 - LEFT - RIGHT) / 2.0) as i32;
    draw_centered(img, BLACK, centre_x, HEIGHT as i32 - 26, AXIS_LABEL_SIZE, font, "Year");

    let text = "Average NDVI";
    let (w, h) = label_size(font, AXIS_LABEL_SIZE, text);
    let mut label = RgbImage::from_pixel(w + 2, h + 2, WHITE);
    draw_centered(&mut label, BLACK, (w as i32 + 2) / 2, 1, AXIS_LABEL_SIZE, font, text);
    let label = rotate270(&label);
    let centre_y = TOP + (HEIGHT as f32 - TOP - BOTTOM) / 2.0;
    overlay(img, &label, 4, (centre_y as i64) - label.height() as i64 / 2);
}

/// Line-and-marker plot of average NDVI per year, written as PNG, titled with the place
///
/// Years without a defined mean keep their grid line but get no point; the line
/// joins the remaining points. Returns the plotted `(year, mean)` points.
pub fn render_trend_plot(trend: &[TrendPoint], city: &str, path: &Path) -> Result<Vec<(i32, f64)>> {
    if trend.is_empty() {
        return Err(NdviError::AggregationInput("no years to plot".to_string()));
    }

    let years: Vec<i32> = trend.iter().map(|p| p.year).collect();
    let points: Vec<(i32, f64)> = trend
        .iter()
        .filter_map(|p| p.mean.map(|m| (p.year, m)))
        .collect();
    for p in trend.iter().filter(|p| p.mean.is_none()) {
        warn!(year = p.year, "no valid pixel, year left out of the plot");
    }

    let font = label_font()?;
    let axes = Axes::fit(&points, &years);
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, WHITE);
    draw_frame(&mut img, &axes, &years, &font);
    draw_axis_labels(&mut img, &font);
    draw_centered(&mut img, BLACK, WIDTH as i32 / 2, 10, TITLE_SIZE, &font, &plot_title(city));

    let pixels: Vec<(f32, f32)> = points
        .iter()
        .map(|&(year, mean)| axes.to_pixel(year as f64, mean))
        .collect();
    for pair in pixels.windows(2) {
        draw_line_segment_mut(&mut img, pair[0], pair[1], LINE);
    }
    for &(x, y) in &pixels {
        draw_filled_circle_mut(&mut img, (x.round() as i32, y.round() as i32), MARKER_RADIUS, LINE);
    }

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    write_bytes_atomic(path, &bytes)?;
    debug!(path = %path.display(), points = points.len(), "wrote trend plot");
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(year: i32, mean: Option<f64>) -> TrendPoint {
        TrendPoint { year, mean }
    }

    #[test]
    fn test_points_and_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("average_ndvi.png");
        let trend = [point(2020, Some(0.3)), point(2021, None), point(2022, Some(0.5))];
        let points = render_trend_plot(&trend, "Lyon", &path).unwrap();
        assert_eq!(points, vec![(2020, 0.3), (2022, 0.5)]);

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));

        let axes = Axes::fit(&points, &[2020, 2021, 2022]);
        let (x, y) = axes.to_pixel(2022.0, 0.5);
        assert_eq!(*img.get_pixel(x.round() as u32, y.round() as u32), LINE);
    }

    #[test]
    fn test_axes_cover_points() {
        let axes = Axes::fit(&[(2000, -0.2), (2010, 0.6)], &[2000, 2010]);
        let (x0, y0) = axes.to_pixel(2000.0, -0.2);
        let (x1, y1) = axes.to_pixel(2010.0, 0.6);
        assert_eq!(x0, LEFT);
        assert_eq!(x1, WIDTH as f32 - RIGHT);
        assert!(y1 < y0);
        assert!(y0 < HEIGHT as f32 - BOTTOM && y1 > TOP);
    }

    #[test]
    fn test_single_year_is_centred() {
        let axes = Axes::fit(&[(2015, 0.4)], &[2015]);
        let (x, _) = axes.to_pixel(2015.0, 0.4);
        assert!((x - (LEFT + (WIDTH as f32 - LEFT - RIGHT) / 2.0)).abs() < 1e-3);
    }

    #[test]
    fn test_all_years_undefined_still_plots_axes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("average_ndvi.png");
        let points = render_trend_plot(&[point(2001, None)], "Lyon", &path).unwrap();
        assert!(points.is_empty());
        assert!(path.is_file());
    }

    fn dark_pixels(img: &RgbImage, x: std::ops::Range<u32>, y: std::ops::Range<u32>) -> usize {
        y.flat_map(|row| x.clone().map(move |col| (col, row)))
            .filter(|&(col, row)| img.get_pixel(col, row).0[0] < 100)
            .count()
    }

    #[test]
    fn test_plot_is_titled_and_labelled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("average_ndvi.png");
        render_trend_plot(&[point(2019, Some(0.2)), point(2020, Some(0.4))], "Lyon", &path).unwrap();
        let img = image::open(&path).unwrap().to_rgb8();

        let font = label_font().unwrap();
        let (title_w, _) = label_size(&font, TITLE_SIZE, &plot_title("Lyon"));
        let title_x = (WIDTH - title_w) / 2;
        // Title above the plot area
        assert!(dark_pixels(&img, title_x..title_x + title_w, 0..TOP as u32) > 0);
        // Year ticks and "Year" under it
        assert!(dark_pixels(&img, LEFT as u32..WIDTH - RIGHT as u32, HEIGHT - BOTTOM as u32 + 8..HEIGHT) > 0);
        // Value ticks and the vertical axis label left of it
        assert!(dark_pixels(&img, 0..24, TOP as u32..HEIGHT - BOTTOM as u32) > 0);
        assert!(dark_pixels(&img, 24..LEFT as u32 - 8, TOP as u32..HEIGHT - BOTTOM as u32) > 0);
    }
}
