//! Collaborators the pipeline talks to: the imagery catalog and the boundary lookup

use std::path::Path;

use crate::commons::basic_functions::DateRange;
use crate::error::{Result, ServiceError};
use crate::geo_core::Roi;

pub mod earth_engine;
pub mod global_variables;
pub mod memory_catalog;
pub mod nominatim;

/// Remote imagery catalog
///
/// `ImageSet` and `Image` are whatever the provider uses to stand for a filtered
/// collection and a single (possibly not yet computed) image. A session is used by
/// one worker at a time and is never shared across threads.
pub trait ImageryService {
    type ImageSet;
    type Image;

    /// Images of `dataset_id` whose footprint intersects `roi` and whose
    /// acquisition date lies in `range`
    fn query(
        &self,
        dataset_id: &str,
        roi: &Roi,
        range: &DateRange,
    ) -> std::result::Result<Self::ImageSet, ServiceError>;

    /// Keep `bands` only, renamed position-wise to `names`
    fn select_bands(
        &self,
        images: Self::ImageSet,
        bands: &[&str],
        names: &[&str],
    ) -> std::result::Result<Self::ImageSet, ServiceError>;

    /// Per-pixel median of the set; an empty set gives an all no-data image
    fn reduce_median(&self, images: Self::ImageSet) -> std::result::Result<Self::Image, ServiceError>;

    /// `(first - second) / (first + second)` as a single band named `output`
    fn normalized_difference(
        &self,
        image: Self::Image,
        first: &str,
        second: &str,
        output: &str,
    ) -> std::result::Result<Self::Image, ServiceError>;

    /// Write `image` to `path` as a GeoTIFF at `scale` metres per pixel over `region`
    fn export(
        &self,
        image: &Self::Image,
        path: &Path,
        scale: u32,
        region: &Roi,
    ) -> std::result::Result<(), ServiceError>;
}

/// Opens imagery sessions; called once inside each worker
pub trait SessionFactory: Sync {
    type Session: ImageryService;

    fn connect(&self) -> std::result::Result<Self::Session, ServiceError>;
}

/// Resolves a place name to its boundary
pub trait BoundaryResolver {
    fn resolve(&self, place: &str) -> Result<Roi>;
}
