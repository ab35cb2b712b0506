//! Red-Yellow-Green diverging scheme for NDVI frames

use image::Rgb;

/// Value range mapped onto the scheme; values outside are clamped for display only
pub const NDVI_MIN: f32 = -1.0;
pub const NDVI_MAX: f32 = 1.0;

/// Colour of no-data pixels
pub const NO_DATA: Rgb<u8> = Rgb([128, 128, 128]);

#[derive(Debug, Clone, Copy)]
struct ColorStop {
    t: f32,
    color: [u8; 3],
}

impl ColorStop {
    const fn new(t: f32, r: u8, g: u8, b: u8) -> Self {
        ColorStop { t, color: [r, g, b] }
    }
}

// ColorBrewer RdYlGn, 11 classes
const RD_YL_GN: &[ColorStop] = &[
    ColorStop::new(0.0, 165, 0, 38),
    ColorStop::new(0.1, 215, 48, 39),
    ColorStop::new(0.2, 244, 109, 67),
    ColorStop::new(0.3, 253, 174, 97),
    ColorStop::new(0.4, 254, 224, 139),
    ColorStop::new(0.5, 255, 255, 191),
    ColorStop::new(0.6, 217, 239, 139),
    ColorStop::new(0.7, 166, 217, 106),
    ColorStop::new(0.8, 102, 189, 99),
    ColorStop::new(0.9, 26, 152, 80),
    ColorStop::new(1.0, 0, 104, 55),
];

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round() as u8
}

fn multi_stop(stops: &[ColorStop], t: f32) -> [u8; 3] {
    let first = stops[0];
    let last = stops[stops.len() - 1];
    if t <= first.t {
        return first.color;
    }
    if t >= last.t {
        return last.color;
    }
    for pair in stops.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if t <= hi.t {
            let ratio = (t - lo.t) / (hi.t - lo.t);
            return [
                lerp(lo.color[0], hi.color[0], ratio),
                lerp(lo.color[1], hi.color[1], ratio),
                lerp(lo.color[2], hi.color[2], ratio),
            ];
        }
    }
    last.color
}

/// Colour of an NDVI value
pub fn ndvi_color(value: f32) -> Rgb<u8> {
    if value.is_nan() {
        return NO_DATA;
    }
    let t = (value.clamp(NDVI_MIN, NDVI_MAX) - NDVI_MIN) / (NDVI_MAX - NDVI_MIN);
    Rgb(multi_stop(RD_YL_GN, t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_ends() {
        assert_eq!(ndvi_color(-1.0), Rgb([165, 0, 38]));
        assert_eq!(ndvi_color(0.0), Rgb([255, 255, 191]));
        assert_eq!(ndvi_color(1.0), Rgb([0, 104, 55]));
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(ndvi_color(-3.0), ndvi_color(-1.0));
        assert_eq!(ndvi_color(1.5), ndvi_color(1.0));
        assert_eq!(ndvi_color(f32::INFINITY), ndvi_color(1.0));
    }

    #[test]
    fn test_nan_is_grey() {
        assert_eq!(ndvi_color(f32::NAN), NO_DATA);
    }

    #[test]
    fn test_greener_with_higher_ndvi() {
        let low = ndvi_color(0.2);
        let high = ndvi_color(0.8);
        assert!(high.0[1] as i32 - high.0[0] as i32 > low.0[1] as i32 - low.0[0] as i32);
    }
}
