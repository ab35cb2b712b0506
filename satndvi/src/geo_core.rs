use geo::{BoundingRect, Geometry as GeoGeometry, Intersects, MultiPolygon, Rect};
use geojson::{GeoJson, Geometry};

use crate::error::{NdviError, Result};

/// Region of interest for a run
/// Polygon or multipolygon boundary in EPSG:4326, built once and shared read-only
/// by every per-year task
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    /// Place the boundary was resolved for
    name: String,
    /// Boundary geometry (lon/lat)
    geometry: MultiPolygon<f64>,
    /// Cached bounding box of `geometry`
    bbox: BoundingBox,
}

impl Roi {
    /// Create a Roi from a geo geometry
    /// Only polygonal geometries describe an area; anything else (or an empty
    /// multipolygon) is reported as `GeocodeNotFound` for `name`
    pub fn from_geometry(name: &str, geometry: GeoGeometry<f64>) -> Result<Self> {
        let not_found = || NdviError::GeocodeNotFound {
            place: name.to_string(),
        };

        let multipolygon = match geometry {
            GeoGeometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            GeoGeometry::MultiPolygon(multipolygon) => multipolygon,
            GeoGeometry::Rect(rect) => MultiPolygon::new(vec![rect.to_polygon()]),
            _ => return Err(not_found()),
        };

        let rect = multipolygon.bounding_rect().ok_or_else(not_found)?;

        Ok(Roi {
            name: name.to_string(),
            geometry: multipolygon,
            bbox: BoundingBox::from(rect),
        })
    }

    /// Create a Roi from a GeoJSON geometry
    pub fn from_geojson(name: &str, geometry: &Geometry) -> Result<Self> {
        let geo_geom = GeoGeometry::<f64>::try_from(&geometry.value).map_err(|_: geojson::Error| {
            NdviError::GeocodeNotFound {
                place: name.to_string(),
            }
        })?;
        Self::from_geometry(name, geo_geom)
    }

    /// Create a Roi from any GeoJSON document
    /// Uses the first polygonal geometry found (bare geometry, feature, or feature collection)
    pub fn from_geojson_document(name: &str, geojson: &GeoJson) -> Result<Self> {
        let candidates: Vec<&Geometry> = match geojson {
            GeoJson::Geometry(geometry) => vec![geometry],
            GeoJson::Feature(feature) => feature.geometry.iter().collect(),
            GeoJson::FeatureCollection(fc) => fc
                .features
                .iter()
                .filter_map(|feature| feature.geometry.as_ref())
                .collect(),
        };

        candidates
            .into_iter()
            .find_map(|geometry| Self::from_geojson(name, geometry).ok())
            .ok_or_else(|| NdviError::GeocodeNotFound {
                place: name.to_string(),
            })
    }

    /// Place name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Boundary geometry
    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Bounding box of the boundary
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Boundary as a GeoJSON geometry (MultiPolygon)
    pub fn to_geojson(&self) -> Geometry {
        Geometry::new(geojson::Value::from(&self.geometry))
    }

    /// Whether a footprint touches the boundary
    pub fn intersects_bbox(&self, bbox: &BoundingBox) -> bool {
        self.geometry.intersects(&bbox.to_rect())
    }

    /// Whether a lon/lat point lies on or inside the boundary
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        self.geometry.intersects(&geo::Point::new(lon, lat))
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            geo::coord! { x: self.min_x, y: self.min_y },
            geo::coord! { x: self.max_x, y: self.max_y },
        )
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square() -> GeoGeometry<f64> {
        GeoGeometry::Polygon(polygon![
            (x: 2.0, y: 48.0),
            (x: 3.0, y: 48.0),
            (x: 3.0, y: 49.0),
            (x: 2.0, y: 49.0),
            (x: 2.0, y: 48.0),
        ])
    }

    #[test]
    fn test_bounding_box() {
        let bbox: BoundingBox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_x, 1.0);
        assert_eq!(bbox.width(), 1.0);
    }

    #[test]
    fn test_roi_from_polygon() {
        let roi = Roi::from_geometry("Paris", square()).unwrap();
        assert_eq!(roi.name(), "Paris");
        assert_eq!(roi.bbox(), BoundingBox::new(2.0, 48.0, 3.0, 49.0));
        assert!(roi.covers(2.5, 48.5));
        assert!(!roi.covers(5.0, 48.5));
    }

    #[test]
    fn test_roi_rejects_point() {
        let err = Roi::from_geometry("Nowhere", GeoGeometry::Point(geo::Point::new(1.0, 1.0)))
            .unwrap_err();
        assert!(matches!(err, NdviError::GeocodeNotFound { .. }));
    }

    #[test]
    fn test_roi_geojson_roundtrip_keeps_bbox() {
        let roi = Roi::from_geometry("Paris", square()).unwrap();
        let back = Roi::from_geojson("Paris", &roi.to_geojson()).unwrap();
        assert_eq!(back.bbox(), roi.bbox());
    }

    #[test]
    fn test_roi_intersects_footprint() {
        let roi = Roi::from_geometry("Paris", square()).unwrap();
        assert!(roi.intersects_bbox(&BoundingBox::new(2.9, 48.9, 4.0, 50.0)));
        assert!(!roi.intersects_bbox(&BoundingBox::new(10.0, 10.0, 11.0, 11.0)));
    }

    #[test]
    fn test_roi_from_feature_collection_skips_points() {
        let doc: GeoJson = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [2.3, 48.8]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon",
                    "coordinates": [[[2.0, 48.0], [3.0, 48.0], [3.0, 49.0], [2.0, 48.0]]]}}
            ]
        }"#
        .parse()
        .unwrap();
        let roi = Roi::from_geojson_document("Paris", &doc).unwrap();
        assert_eq!(roi.bbox().max_y, 49.0);
    }
}
