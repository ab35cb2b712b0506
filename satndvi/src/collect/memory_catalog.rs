use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::collect::{ImageryService, SessionFactory};
use crate::commons::basic_functions::DateRange;
use crate::commons::geotiff::{write_geotiff_atomic, GeoRaster, GeoTransform};
use crate::error::ServiceError;
use crate::geo_core::{BoundingBox, Roi};
use crate::geometric::vegetation::normalized_difference;

type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// One named band of a local image
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBand {
    pub name: String,
    pub data: Vec<f32>,
}

/// Image whose pixels live in memory, on the catalog grid
#[derive(Debug, Clone, PartialEq)]
pub struct LocalImage {
    pub bands: Vec<LocalBand>,
}

impl LocalImage {
    pub fn band(&self, name: &str) -> Option<&LocalBand> {
        self.bands.iter().find(|b| b.name == name)
    }
}

/// Filtered images, plus the band names a selection promised even when nothing matched
#[derive(Debug, Clone)]
pub struct LocalImageSet {
    pub band_names: Option<Vec<String>>,
    pub images: Vec<LocalImage>,
}

/// Catalog entry
#[derive(Debug, Clone)]
pub struct Scene {
    pub dataset_id: String,
    pub date: NaiveDate,
    pub footprint: BoundingBox,
    pub image: LocalImage,
}

impl Scene {
    pub fn new(dataset_id: &str, date: NaiveDate, footprint: BoundingBox) -> Self {
        Scene {
            dataset_id: dataset_id.to_string(),
            date,
            footprint,
            image: LocalImage { bands: Vec::new() },
        }
    }

    pub fn with_band(mut self, name: &str, data: Vec<f32>) -> Self {
        self.image.bands.push(LocalBand {
            name: name.to_string(),
            data,
        });
        self
    }

    /// Band filled with a single value
    pub fn with_uniform_band(self, name: &str, value: f32, pixels: usize) -> Self {
        self.with_band(name, vec![value; pixels])
    }
}

/// In-process imagery catalog
///
/// Scenes share one grid. Filtering, band selection, the median and the band
/// math run locally, so the whole pipeline can be exercised without network access.
/// Sessions are cheap clones sharing the scene list.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    width: usize,
    height: usize,
    transform: GeoTransform,
    scenes: Arc<Vec<Scene>>,
}

impl MemoryCatalog {
    pub fn new(width: usize, height: usize, transform: GeoTransform) -> Self {
        MemoryCatalog {
            width,
            height,
            transform,
            scenes: Arc::new(Vec::new()),
        }
    }

    /// Catalog whose grid spans `bbox`
    pub fn covering(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self::new(width, height, GeoTransform::covering(bbox, width, height))
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Add a scene; every band must match the grid
    pub fn add_scene(&mut self, scene: Scene) -> ServiceResult<()> {
        if let Some(band) = scene
            .image
            .bands
            .iter()
            .find(|b| b.data.len() != self.pixel_count())
        {
            return Err(ServiceError::Invalid(format!(
                "band {} of {} has {} pixels, grid has {}",
                band.name,
                scene.dataset_id,
                band.data.len(),
                self.pixel_count()
            )));
        }
        Arc::make_mut(&mut self.scenes).push(scene);
        Ok(())
    }

    pub fn with_scene(mut self, scene: Scene) -> ServiceResult<Self> {
        self.add_scene(scene)?;
        Ok(self)
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }
}

/// Median of the non-NaN values, NaN when there are none
fn nan_median(values: &mut Vec<f32>) -> f32 {
    values.retain(|v| !v.is_nan());
    if values.is_empty() {
        return f32::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

impl ImageryService for MemoryCatalog {
    type ImageSet = LocalImageSet;
    type Image = LocalImage;

    fn query(&self, dataset_id: &str, roi: &Roi, range: &DateRange) -> ServiceResult<LocalImageSet> {
        let images: Vec<LocalImage> = self
            .scenes
            .iter()
            .filter(|s| s.dataset_id == dataset_id)
            .filter(|s| range.contains(s.date))
            .filter(|s| roi.intersects_bbox(&s.footprint))
            .map(|s| s.image.clone())
            .collect();
        debug!(dataset_id, matched = images.len(), "queried memory catalog");
        Ok(LocalImageSet {
            band_names: None,
            images,
        })
    }

    fn select_bands(
        &self,
        images: LocalImageSet,
        bands: &[&str],
        names: &[&str],
    ) -> ServiceResult<LocalImageSet> {
        if bands.len() != names.len() {
            return Err(ServiceError::Invalid(format!(
                "{} bands cannot be renamed to {} names",
                bands.len(),
                names.len()
            )));
        }

        let mut selected = Vec::with_capacity(images.images.len());
        for image in images.images {
            let mut renamed = Vec::with_capacity(bands.len());
            for (band, name) in bands.iter().zip(names) {
                let source = image
                    .band(band)
                    .ok_or_else(|| ServiceError::Invalid(format!("image has no band {}", band)))?;
                renamed.push(LocalBand {
                    name: name.to_string(),
                    data: source.data.clone(),
                });
            }
            selected.push(LocalImage { bands: renamed });
        }

        Ok(LocalImageSet {
            band_names: Some(names.iter().map(|n| n.to_string()).collect()),
            images: selected,
        })
    }

    fn reduce_median(&self, images: LocalImageSet) -> ServiceResult<LocalImage> {
        let names: Vec<String> = match images.band_names {
            Some(names) => names,
            None => images
                .images
                .first()
                .map(|img| img.bands.iter().map(|b| b.name.clone()).collect())
                .unwrap_or_default(),
        };

        let pixels = self.pixel_count();
        let mut bands = Vec::with_capacity(names.len());
        for name in names {
            let stack: Vec<&LocalBand> = images
                .images
                .iter()
                .filter_map(|img| img.band(&name))
                .collect();
            if let Some(short) = stack.iter().find(|band| band.data.len() != pixels) {
                return Err(ServiceError::Invalid(format!(
                    "band {} holds {} values, grid has {}",
                    name,
                    short.data.len(),
                    pixels
                )));
            }
            let mut column = Vec::with_capacity(stack.len());
            let data = (0..pixels)
                .map(|i| {
                    column.clear();
                    column.extend(stack.iter().map(|band| band.data[i]));
                    nan_median(&mut column)
                })
                .collect();
            bands.push(LocalBand { name, data });
        }

        Ok(LocalImage { bands })
    }

    fn normalized_difference(
        &self,
        image: LocalImage,
        first: &str,
        second: &str,
        output: &str,
    ) -> ServiceResult<LocalImage> {
        let a = image
            .band(first)
            .ok_or_else(|| ServiceError::Invalid(format!("image has no band {}", first)))?;
        let b = image
            .band(second)
            .ok_or_else(|| ServiceError::Invalid(format!("image has no band {}", second)))?;
        if a.data.len() != b.data.len() {
            return Err(ServiceError::Invalid(format!(
                "bands {} and {} differ in length ({} vs {})",
                first,
                second,
                a.data.len(),
                b.data.len()
            )));
        }

        let data = a
            .data
            .iter()
            .zip(&b.data)
            .map(|(&x, &y)| normalized_difference(x, y))
            .collect();

        Ok(LocalImage {
            bands: vec![LocalBand {
                name: output.to_string(),
                data,
            }],
        })
    }

    /// Writes the first band on the catalog's native grid, NaN outside `region`
    /// `scale` is only validated; the grid resolution is fixed by the catalog
    fn export(&self, image: &LocalImage, path: &Path, scale: u32, region: &Roi) -> ServiceResult<()> {
        if scale == 0 {
            return Err(ServiceError::Invalid("scale must be positive".to_string()));
        }
        let band = image
            .bands
            .first()
            .ok_or_else(|| ServiceError::Invalid("cannot export an image without bands".to_string()))?;
        if band.data.len() != self.pixel_count() {
            return Err(ServiceError::Invalid(format!(
                "band {} holds {} values, grid has {}",
                band.name,
                band.data.len(),
                self.pixel_count()
            )));
        }

        let mut data = band.data.clone();
        for row in 0..self.height {
            for col in 0..self.width {
                let (lon, lat) = self.transform.pixel_center(col, row);
                if !region.covers(lon, lat) {
                    data[row * self.width + col] = f32::NAN;
                }
            }
        }

        let raster = GeoRaster::new(self.width, self.height, self.transform, data)?;
        write_geotiff_atomic(&raster, path)?;
        debug!(path = %path.display(), "exported image");
        Ok(())
    }
}

impl SessionFactory for MemoryCatalog {
    type Session = MemoryCatalog;

    fn connect(&self) -> ServiceResult<MemoryCatalog> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 2.0, 2.0)
    }

    fn roi() -> Roi {
        Roi::from_geometry("grid", geo::Geometry::Rect(bbox().to_rect())).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn scene(dataset: &str, day: NaiveDate, nir: f32, red: f32) -> Scene {
        Scene::new(dataset, day, bbox())
            .with_uniform_band("B5", nir, 4)
            .with_uniform_band("B4", red, 4)
    }

    #[test]
    fn test_median_ignores_nan() {
        assert_eq!(nan_median(&mut vec![3.0, f32::NAN, 1.0, 2.0]), 2.0);
        assert_eq!(nan_median(&mut vec![4.0, 1.0]), 2.5);
        assert!(nan_median(&mut vec![f32::NAN]).is_nan());
        assert!(nan_median(&mut Vec::new()).is_nan());
    }

    #[test]
    fn test_query_filters_dataset_date_and_footprint() {
        let far = BoundingBox::new(50.0, 50.0, 51.0, 51.0);
        let catalog = MemoryCatalog::covering(&bbox(), 2, 2)
            .with_scene(scene("L8", date(2020, 3, 1), 0.5, 0.1))
            .unwrap()
            .with_scene(scene("L8", date(2021, 3, 1), 0.5, 0.1))
            .unwrap()
            .with_scene(scene("L7", date(2020, 3, 1), 0.5, 0.1))
            .unwrap()
            .with_scene(Scene::new("L8", date(2020, 5, 1), far).with_uniform_band("B5", 0.1, 4))
            .unwrap();

        let range = DateRange::year(2020).unwrap();
        let set = catalog.query("L8", &roi(), &range).unwrap();
        assert_eq!(set.images.len(), 1);
    }

    #[test]
    fn test_median_composite_of_three_scenes() {
        let catalog = MemoryCatalog::covering(&bbox(), 2, 2)
            .with_scene(scene("L8", date(2020, 1, 1), 0.2, 0.1))
            .unwrap()
            .with_scene(scene("L8", date(2020, 6, 1), 0.9, 0.3))
            .unwrap()
            .with_scene(scene("L8", date(2020, 12, 31), 0.4, 0.2))
            .unwrap();

        let range = DateRange::year(2020).unwrap();
        let set = catalog.query("L8", &roi(), &range).unwrap();
        let set = catalog.select_bands(set, &["B5", "B4"], &["NIR", "RED"]).unwrap();
        let composite = catalog.reduce_median(set).unwrap();
        assert_eq!(composite.band("NIR").unwrap().data, vec![0.4; 4]);
        assert_eq!(composite.band("RED").unwrap().data, vec![0.2; 4]);
    }

    #[test]
    fn test_empty_selection_gives_no_data_bands() {
        let catalog = MemoryCatalog::covering(&bbox(), 2, 2);
        let range = DateRange::year(1990).unwrap();
        let set = catalog.query("L5", &roi(), &range).unwrap();
        let set = catalog.select_bands(set, &["B4", "B3"], &["NIR", "RED"]).unwrap();
        let composite = catalog.reduce_median(set).unwrap();
        assert_eq!(composite.bands.len(), 2);
        assert!(composite.band("NIR").unwrap().data.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_missing_band_is_rejected() {
        let catalog = MemoryCatalog::covering(&bbox(), 2, 2)
            .with_scene(scene("L8", date(2020, 1, 1), 0.2, 0.1))
            .unwrap();
        let range = DateRange::year(2020).unwrap();
        let set = catalog.query("L8", &roi(), &range).unwrap();
        assert!(catalog.select_bands(set, &["B7"], &["NIR"]).is_err());
    }

    #[test]
    fn test_scene_must_match_grid() {
        let catalog = MemoryCatalog::covering(&bbox(), 2, 2);
        let bad = Scene::new("L8", date(2020, 1, 1), bbox()).with_uniform_band("B5", 0.1, 3);
        assert!(catalog.with_scene(bad).is_err());
    }

    #[test]
    fn test_export_masks_outside_region() {
        let catalog = MemoryCatalog::covering(&bbox(), 2, 2);
        let half = Roi::from_geometry(
            "left half",
            geo::Geometry::Rect(BoundingBox::new(0.0, 0.0, 1.0, 2.0).to_rect()),
        )
        .unwrap();
        let image = LocalImage {
            bands: vec![LocalBand {
                name: "NDVI".to_string(),
                data: vec![0.5; 4],
            }],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndvi_2020.tif");
        catalog.export(&image, &path, 100, &half).unwrap();

        let raster = crate::commons::geotiff::read_geotiff(&path).unwrap();
        assert_eq!(raster.get(0, 0), Some(0.5));
        assert!(raster.get(1, 0).unwrap().is_nan());
    }

    fn ndvi_image(len: usize) -> LocalImage {
        LocalImage {
            bands: vec![LocalBand {
                name: "NDVI".to_string(),
                data: vec![0.5; len],
            }],
        }
    }

    #[test]
    fn test_export_rejects_band_smaller_than_grid() {
        let catalog = MemoryCatalog::covering(&bbox(), 2, 2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndvi_2020.tif");
        assert!(matches!(
            catalog.export(&ndvi_image(1), &path, 100, &roi()),
            Err(ServiceError::Invalid(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_band_math_rejects_unequal_bands() {
        let catalog = MemoryCatalog::covering(&bbox(), 2, 2);
        let image = LocalImage {
            bands: vec![
                LocalBand {
                    name: "NIR".to_string(),
                    data: vec![0.5; 4],
                },
                LocalBand {
                    name: "RED".to_string(),
                    data: vec![0.1; 1],
                },
            ],
        };
        assert!(matches!(
            catalog.normalized_difference(image, "NIR", "RED", "NDVI"),
            Err(ServiceError::Invalid(_))
        ));
    }

    #[test]
    fn test_median_rejects_band_off_grid() {
        let catalog = MemoryCatalog::covering(&bbox(), 2, 2);
        let set = LocalImageSet {
            band_names: None,
            images: vec![ndvi_image(3)],
        };
        assert!(catalog.reduce_median(set).is_err());
    }
}
