use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::collect::global_variables::{NIR_BAND, RED_BAND};
use crate::collect::ImageryService;
use crate::commons::basic_functions::{ndvi_file_name, DateRange};
use crate::error::{NdviError, Result};
use crate::geo_core::Roi;
use crate::geometric::landsat::{self, Composite};

/// NDVI = (NIR - Red) / (NIR + Red)
/// A zero denominator gives NaN; the result is not clamped
#[inline]
pub fn normalized_difference(nir: f32, red: f32) -> f32 {
    let sum = nir + red;
    if sum == 0.0 {
        f32::NAN
    } else {
        (nir - red) / sum
    }
}

/// Single-band NDVI image of a year, band named `NDVI_<year>`
#[derive(Debug, Clone)]
pub struct IndexRaster<I> {
    pub year: i32,
    pub image: I,
}

pub fn band_name(year: i32) -> String {
    format!("NDVI_{}", year)
}

/// NDVI of a composite's `NIR` and `RED` bands
pub fn compute<S>(service: &S, composite: Composite<S::Image>) -> Result<IndexRaster<S::Image>>
where
    S: ImageryService + ?Sized,
{
    let year = composite.year;
    let image = service
        .normalized_difference(composite.image, NIR_BAND, RED_BAND, &band_name(year))
        .map_err(|source| NdviError::Query { year, source })?;
    Ok(IndexRaster { year, image })
}

/// Compute one year's NDVI and export it to `tiff_dir/ndvi_<year>.tif`
///
/// A previous file for the same year is replaced. Export failures are not retried.
pub fn run_year<S>(service: &S, year: i32, roi: &Roi, tiff_dir: &Path, scale: u32) -> Result<PathBuf>
where
    S: ImageryService + ?Sized,
{
    debug!(year, "processing year");
    let range = DateRange::year(year)?;
    let composite = landsat::build(service, roi, range.start(), range.end())?;
    let dataset = composite.dataset.name;
    let ndvi = compute(service, composite)?;

    let output_path = tiff_dir.join(ndvi_file_name(year));
    debug!(year, path = %output_path.display(), "exporting NDVI image");
    service
        .export(&ndvi.image, &output_path, scale, roi)
        .map_err(|source| NdviError::Export { year, source })?;

    info!(year, dataset, path = %output_path.display(), "exported NDVI");
    Ok(output_path)
}
