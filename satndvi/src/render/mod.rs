//! Turns the yearly NDVI GeoTIFFs into an animated GIF and an average-NDVI trend plot

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::collect::global_variables::{GIF_FILE_NAME, NDVI_FILE_SUFFIX, PLOT_FILE_NAME};
use crate::commons::basic_functions::parse_ndvi_file_name;
use crate::commons::geotiff::{read_geotiff, GeoRaster};
use crate::error::{NdviError, Result};

pub mod colormap;
pub mod gif;
pub mod plot;
mod text;

/// NDVI raster of one year, as read back from disk
#[derive(Debug, Clone)]
pub struct YearRaster {
    pub year: i32,
    pub path: PathBuf,
    pub raster: GeoRaster,
}

/// Mean NDVI of a year; `None` when every pixel is no-data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub year: i32,
    pub mean: Option<f64>,
}

#[derive(Debug)]
pub struct RenderOutputs {
    pub gif: PathBuf,
    pub plot: PathBuf,
    pub frames: usize,
    /// Points drawn on the plot, in year order
    pub points: Vec<(i32, f64)>,
}

/// Read every `ndvi_<year>.tif` of `tiff_dir`, sorted by year
///
/// Fails on an empty directory and on a `.tif` whose name does not carry a year.
/// Other files are ignored.
pub fn collect_year_rasters(tiff_dir: &Path) -> Result<Vec<YearRaster>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(tiff_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(NDVI_FILE_SUFFIX) {
            continue;
        }
        let year = parse_ndvi_file_name(name).ok_or_else(|| {
            NdviError::AggregationInput(format!("{} is not named ndvi_<year>.tif", path.display()))
        })?;
        entries.push((year, path));
    }

    if entries.is_empty() {
        return Err(NdviError::AggregationInput(format!(
            "no NDVI rasters in {}",
            tiff_dir.display()
        )));
    }
    entries.sort_by_key(|(year, _)| *year);

    entries
        .into_iter()
        .map(|(year, path)| {
            let raster = read_geotiff(&path)?;
            debug!(year, width = raster.width, height = raster.height, "read NDVI raster");
            Ok(YearRaster { year, path, raster })
        })
        .collect()
}

/// Mean of the non-NaN pixels
pub fn average_ndvi(raster: &GeoRaster) -> Option<f64> {
    let (sum, count) = raster
        .data
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0f64, 0usize), |(sum, count), &v| (sum + v as f64, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub fn trend_points(rasters: &[YearRaster]) -> Vec<TrendPoint> {
    rasters
        .iter()
        .map(|r| TrendPoint {
            year: r.year,
            mean: average_ndvi(&r.raster),
        })
        .collect()
}

/// Render `city_dir/ndvi_over_time.gif` and `city_dir/average_ndvi.png`
/// from the rasters in `tiff_dir`
pub fn render_all(tiff_dir: &Path, city_dir: &Path, city: &str) -> Result<RenderOutputs> {
    let rasters = collect_year_rasters(tiff_dir)?;
    info!(city, years = rasters.len(), "rendering NDVI outputs");

    let gif_path = city_dir.join(GIF_FILE_NAME);
    let frames = gif::render_gif(&rasters, city, &gif_path)?;

    let plot_path = city_dir.join(PLOT_FILE_NAME);
    let points = plot::render_trend_plot(&trend_points(&rasters), city, &plot_path)?;

    info!(gif = %gif_path.display(), plot = %plot_path.display(), "rendered");
    Ok(RenderOutputs {
        gif: gif_path,
        plot: plot_path,
        frames,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::geotiff::{write_geotiff_atomic, GeoTransform};

    fn write_raster(dir: &Path, name: &str, data: Vec<f32>) {
        let raster = GeoRaster::new(2, 2, GeoTransform::new(0.0, 2.0, 1.0, -1.0), data).unwrap();
        write_geotiff_atomic(&raster, &dir.join(name)).unwrap();
    }

    #[test]
    fn test_average_ignores_nan() {
        let raster = GeoRaster::new(
            2,
            2,
            GeoTransform::new(0.0, 0.0, 1.0, -1.0),
            vec![0.2, f32::NAN, 0.4, f32::NAN],
        )
        .unwrap();
        assert!((average_ndvi(&raster).unwrap() - 0.3).abs() < 1e-6);

        let empty = GeoRaster::new(1, 1, GeoTransform::new(0.0, 0.0, 1.0, -1.0), vec![f32::NAN]).unwrap();
        assert_eq!(average_ndvi(&empty), None);
    }

    #[test]
    fn test_rasters_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        write_raster(dir.path(), "ndvi_2010.tif", vec![0.1; 4]);
        write_raster(dir.path(), "ndvi_999.tif", vec![0.2; 4]);
        write_raster(dir.path(), "ndvi_2009.tif", vec![0.3; 4]);
        std::fs::write(dir.path().join("notes.txt"), "not a raster").unwrap();

        let rasters = collect_year_rasters(dir.path()).unwrap();
        let years: Vec<i32> = rasters.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![999, 2009, 2010]);
    }

    #[test]
    fn test_empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            collect_year_rasters(dir.path()),
            Err(NdviError::AggregationInput(_))
        ));
    }

    #[test]
    fn test_badly_named_raster_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_raster(dir.path(), "ndvi_2010.tif", vec![0.1; 4]);
        write_raster(dir.path(), "ndvi_latest.tif", vec![0.1; 4]);
        assert!(matches!(
            collect_year_rasters(dir.path()),
            Err(NdviError::AggregationInput(_))
        ));
    }

    #[test]
    fn test_render_all_writes_both_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let tiff_dir = dir.path().join("tiff");
        std::fs::create_dir_all(&tiff_dir).unwrap();
        write_raster(&tiff_dir, "ndvi_2001.tif", vec![0.5; 4]);
        write_raster(&tiff_dir, "ndvi_2002.tif", vec![f32::NAN; 4]);

        let outputs = render_all(&tiff_dir, dir.path(), "Testville").unwrap();
        assert_eq!(outputs.frames, 2);
        assert_eq!(outputs.points.len(), 1);
        assert_eq!(outputs.points[0].0, 2001);
        assert!(outputs.gif.is_file());
        assert!(outputs.plot.is_file());
    }

    #[test]
    fn test_three_years_end_to_end() {
        use crate::collect::global_variables::LANDSAT_8_SR;
        use crate::collect::memory_catalog::{MemoryCatalog, Scene};
        use crate::geo_core::{BoundingBox, Roi};
        use crate::geometric::time_series::run_all;
        use chrono::NaiveDate;
        use image::codecs::gif::GifDecoder;
        use image::AnimationDecoder;

        let bbox = BoundingBox::new(4.0, 45.0, 5.0, 46.0);
        let mut catalog = MemoryCatalog::covering(&bbox, 2, 2);
        let ndvi = [(2020, 0.3, 0.5), (2021, 0.5, 0.5), (2022, 0.8, 0.2)];
        for (year, nir, red) in ndvi {
            let day = NaiveDate::from_ymd_opt(year, 5, 15).unwrap();
            let scene = Scene::new(LANDSAT_8_SR, day, bbox)
                .with_uniform_band("SR_B5", nir, 4)
                .with_uniform_band("SR_B4", red, 4);
            catalog.add_scene(scene).unwrap();
        }
        let roi = Roi::from_geometry("Lyon", geo::Geometry::Rect(bbox.to_rect())).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let city_dir = dir.path().join("Lyon");
        let tiff_dir = city_dir.join("tiff");
        std::fs::create_dir_all(&tiff_dir).unwrap();

        let report = run_all(&catalog, &[2020, 2021, 2022], &roi, &tiff_dir, 100, 3).unwrap();
        assert!(report.is_success());
        assert_eq!(std::fs::read_dir(&tiff_dir).unwrap().count(), 3);

        let outputs = render_all(&tiff_dir, &city_dir, "Lyon").unwrap();
        assert_eq!(outputs.gif, city_dir.join("ndvi_over_time.gif"));
        assert_eq!(outputs.plot, city_dir.join("average_ndvi.png"));
        let years: Vec<i32> = outputs.points.iter().map(|(y, _)| *y).collect();
        assert_eq!(years, vec![2020, 2021, 2022]);
        assert!((outputs.points[0].1 + 0.25).abs() < 1e-6);
        assert!((outputs.points[2].1 - 0.6).abs() < 1e-6);

        // Frames come in year order: compare the first map cell with the expected colour
        let rasters = collect_year_rasters(&tiff_dir).unwrap();
        let font = text::label_font().unwrap();
        let layout = gif::FrameLayout::fit(&rasters, "Lyon", &font);
        let (map_x, map_y, map_w, _) = layout.map_rect(2, 2);
        let cell = map_w / 2;
        let file = std::io::BufReader::new(std::fs::File::open(&outputs.gif).unwrap());
        let frames = GifDecoder::new(file).unwrap().into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 3);
        for (frame, expected) in frames.iter().zip([-0.25f32, 0.0, 0.6]) {
            let pixel = frame.buffer().get_pixel(map_x + cell / 2, map_y + cell / 2).0;
            let want = colormap::ndvi_color(expected).0;
            for c in 0..3 {
                assert!(
                    (pixel[c] as i32 - want[c] as i32).abs() <= 16,
                    "{:?} vs {:?}",
                    pixel,
                    want
                );
            }
        }
    }
}
