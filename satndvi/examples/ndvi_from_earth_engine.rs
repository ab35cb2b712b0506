use anyhow::{Context, Result};
use satndvi::collect::earth_engine::{EarthEngineConfig, EarthEngineConnector};
use satndvi::collect::nominatim::{NominatimConfig, NominatimResolver};
use satndvi::collect::{BoundaryResolver, SessionFactory};
use satndvi::geometric::vegetation;

/// Example: NDVI of a single year on Earth Engine
/// Needs EE_PROJECT_NAME, and EE_ACCESS_TOKEN or a logged-in gcloud
fn main() -> Result<()> {
    println!("=== Example: NDVI of Lyon for 2020 on Earth Engine ===\n");

    let resolver = NominatimResolver::new(NominatimConfig::from_env()?)?;
    let roi = resolver.resolve("Lyon, France")?;
    let bbox = roi.bbox();
    println!(
        "Boundary: {:.4}, {:.4} to {:.4}, {:.4}",
        bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
    );

    let connector = EarthEngineConnector::new(EarthEngineConfig::from_env(None)?);
    let session = connector
        .connect()
        .context("Failed to open an Earth Engine session")?;

    let tiff_dir = std::path::Path::new("./output/ndvi_from_earth_engine");
    std::fs::create_dir_all(tiff_dir)?;
    let path = vegetation::run_year(&session, 2020, &roi, tiff_dir, 100)?;

    println!("NDVI written to {}", path.display());
    Ok(())
}
