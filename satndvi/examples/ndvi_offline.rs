use anyhow::Result;
use chrono::NaiveDate;
use satndvi::collect::memory_catalog::{MemoryCatalog, Scene};
use satndvi::geo_core::{BoundingBox, Roi};
use satndvi::geometric::landsat;
use satndvi::geometric::time_series::NdviTimeSeries;
use satndvi::render;

/// Example: the whole pipeline on a synthetic in-memory catalog, no network needed
/// Vegetation slowly greens up over 1995-2015, with two scenes per year
fn main() -> Result<()> {
    println!("=== Example: offline NDVI time series ===\n");

    // La Rochelle, France
    let bbox = BoundingBox::new(-1.2462, 46.1413, -1.1135, 46.1877);
    let roi = Roi::from_geometry("La Rochelle", geo::Geometry::Rect(bbox.to_rect()))?;
    let (width, height) = (40, 20);

    let mut catalog = MemoryCatalog::covering(&bbox, width, height);
    for year in 1995..=2015 {
        let dataset = landsat::select(year);
        let trend = (year - 1995) as f32 / 20.0;
        for (month, haze) in [(4, 0.02f32), (8, 0.0)] {
            let nir: Vec<f32> = (0..width * height)
                .map(|i| 0.25 + 0.3 * trend + 0.1 * ((i % width) as f32 / width as f32) - haze)
                .collect();
            let red = vec![0.12 + haze; width * height];
            let day = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| anyhow::anyhow!("bad date"))?;
            let scene = Scene::new(dataset.catalog_id, day, bbox)
                .with_band(dataset.bands.nir, nir)
                .with_band(dataset.bands.red, red);
            catalog.add_scene(scene)?;
        }
    }
    println!("Catalog: {} scenes on a {}x{} grid", catalog.scenes().len(), width, height);

    let city_dir = std::path::Path::new("./output/ndvi_offline/La Rochelle");
    let tiff_dir = city_dir.join("tiff");
    std::fs::create_dir_all(&tiff_dir)?;

    let mut series = NdviTimeSeries::new(roi, &tiff_dir);
    series.set_years(1995, 2015);
    series.set_scale(30);
    series.set_workers(4);
    let report = series.run(&catalog)?;
    for (year, path) in report.succeeded() {
        println!("  - {}: {}", year, path.display());
    }
    report.into_result()?;

    let outputs = render::render_all(&tiff_dir, city_dir, "La Rochelle")?;
    println!("\nGIF: {} ({} frames)", outputs.gif.display(), outputs.frames);
    println!("Plot: {}", outputs.plot.display());
    for (year, mean) in &outputs.points {
        println!("  - {}: mean NDVI {:.3}", year, mean);
    }

    Ok(())
}
