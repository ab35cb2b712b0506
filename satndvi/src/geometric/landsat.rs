use chrono::NaiveDate;
use tracing::debug;

use crate::collect::global_variables::{
    LANDSAT_5_SR, LANDSAT_7_SR, LANDSAT_8_SR, NIR_BAND, RED_BAND,
};
use crate::collect::ImageryService;
use crate::commons::basic_functions::DateRange;
use crate::error::{NdviError, Result};
use crate::geo_core::Roi;

/// Near-infrared and red source bands of a dataset, in that order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandPair {
    pub nir: &'static str,
    pub red: &'static str,
}

/// Surface reflectance collection of one Landsat generation
#[derive(Debug, PartialEq, Eq)]
pub struct LandsatDataset {
    pub name: &'static str,
    pub catalog_id: &'static str,
    pub bands: BandPair,
}

pub static LANDSAT_8: LandsatDataset = LandsatDataset {
    name: "Landsat 8",
    catalog_id: LANDSAT_8_SR,
    bands: BandPair {
        nir: "SR_B5",
        red: "SR_B4",
    },
};

pub static LANDSAT_7: LandsatDataset = LandsatDataset {
    name: "Landsat 7",
    catalog_id: LANDSAT_7_SR,
    bands: BandPair {
        nir: "SR_B4",
        red: "SR_B3",
    },
};

pub static LANDSAT_5: LandsatDataset = LandsatDataset {
    name: "Landsat 5",
    catalog_id: LANDSAT_5_SR,
    bands: BandPair {
        nir: "SR_B4",
        red: "SR_B3",
    },
};

/// Landsat generation used for a year
/// - Landsat 8 from 2013 onwards
/// - Landsat 7 from 1999 to 2012
/// - Landsat 5 before 1999
pub fn select(year: i32) -> &'static LandsatDataset {
    if year >= 2013 {
        &LANDSAT_8
    } else if year >= 1999 {
        &LANDSAT_7
    } else {
        &LANDSAT_5
    }
}

/// Median composite of a year, with bands `NIR` and `RED`
#[derive(Debug, Clone)]
pub struct Composite<I> {
    pub year: i32,
    pub dataset: &'static LandsatDataset,
    pub image: I,
}

/// Build the median composite of the images intersecting `roi` between `start` and `end`
///
/// Both dates must fall in the same year. A window without any image is not an
/// error: the composite is then all no-data.
pub fn build<S>(service: &S, roi: &Roi, start: NaiveDate, end: NaiveDate) -> Result<Composite<S::Image>>
where
    S: ImageryService + ?Sized,
{
    let range = DateRange::new(start, end)?;
    let year = range.calendar_year();
    let dataset = select(year);
    debug!(year, dataset = dataset.name, "building composite");

    let query_failed = |source| NdviError::Query { year, source };

    let images = service
        .query(dataset.catalog_id, roi, &range)
        .map_err(query_failed)?;
    let images = service
        .select_bands(
            images,
            &[dataset.bands.nir, dataset.bands.red],
            &[NIR_BAND, RED_BAND],
        )
        .map_err(query_failed)?;
    let image = service.reduce_median(images).map_err(query_failed)?;

    Ok(Composite {
        year,
        dataset,
        image,
    })
}
