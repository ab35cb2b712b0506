use std::path::PathBuf;
use std::time::Duration;

use geojson::GeoJson;
use reqwest::blocking::Client;
use tracing::{debug, info};
use url::Url;

use crate::collect::global_variables::{NOMINATIM_TIMEOUT, NOMINATIM_URL, NOMINATIM_URL_ENV, USER_AGENT};
use crate::collect::BoundaryResolver;
use crate::error::{NdviError, Result, ServiceError};
use crate::geo_core::Roi;

/// Nominatim endpoint settings
#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: Url,
    /// Nominatim's usage policy requires an identifying User-Agent
    pub user_agent: String,
    pub timeout: Duration,
}

impl NominatimConfig {
    /// Public OpenStreetMap instance, or `NOMINATIM_URL` when set
    pub fn from_env() -> std::result::Result<Self, ServiceError> {
        let base = std::env::var(NOMINATIM_URL_ENV).unwrap_or_else(|_| NOMINATIM_URL.to_string());
        let base_url = Url::parse(&base)
            .map_err(|e| ServiceError::Invalid(format!("bad Nominatim URL {}: {}", base, e)))?;
        Ok(NominatimConfig {
            base_url,
            user_agent: USER_AGENT.to_string(),
            timeout: NOMINATIM_TIMEOUT,
        })
    }

    pub fn search_url(&self) -> std::result::Result<Url, ServiceError> {
        self.base_url
            .join("search")
            .map_err(|e| ServiceError::Invalid(format!("bad Nominatim search URL: {}", e)))
    }
}

/// Place boundary lookup through OpenStreetMap Nominatim
pub struct NominatimResolver {
    client: Client,
    config: NominatimConfig,
}

impl NominatimResolver {
    pub fn new(config: NominatimConfig) -> std::result::Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(NominatimResolver { client, config })
    }

    fn search(&self, place: &str) -> std::result::Result<String, ServiceError> {
        let url = self.config.search_url()?;
        debug!(%url, place, "querying Nominatim");

        let response = self
            .client
            .get(url)
            .query(&[
                ("q", place),
                ("format", "geojson"),
                ("polygon_geojson", "1"),
                ("limit", "5"),
            ])
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Api { status, body });
        }

        Ok(response.text()?)
    }
}

impl BoundaryResolver for NominatimResolver {
    fn resolve(&self, place: &str) -> Result<Roi> {
        let body = self.search(place).map_err(NdviError::Geocode)?;
        let roi = parse_boundary(place, &body)?;
        info!(place, bbox = ?roi.bbox(), "resolved boundary");
        Ok(roi)
    }
}

/// First polygonal result of a Nominatim GeoJSON answer
/// Results that are only points (e.g. a city node) are skipped
pub fn parse_boundary(place: &str, body: &str) -> Result<Roi> {
    let geojson: GeoJson = body.parse().map_err(|e: geojson::Error| {
        NdviError::Geocode(ServiceError::Invalid(format!(
            "Nominatim answer is not GeoJSON: {}",
            e
        )))
    })?;
    Roi::from_geojson_document(place, &geojson)
}

/// Boundary read from a local GeoJSON file instead of a geocoding service
pub struct GeoJsonFileResolver {
    path: PathBuf,
}

impl GeoJsonFileResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        GeoJsonFileResolver { path: path.into() }
    }
}

impl BoundaryResolver for GeoJsonFileResolver {
    fn resolve(&self, place: &str) -> Result<Roi> {
        let text = std::fs::read_to_string(&self.path)?;
        let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| {
            NdviError::Geocode(ServiceError::Invalid(format!(
                "{} is not GeoJSON: {}",
                self.path.display(),
                e
            )))
        })?;
        let roi = Roi::from_geojson_document(place, &geojson)?;
        info!(place, path = %self.path.display(), "loaded boundary from file");
        Ok(roi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOMINATIM_ANSWER: &str = r#"{
        "type": "FeatureCollection",
        "licence": "Data © OpenStreetMap contributors, ODbL 1.0.",
        "features": [
            {
                "type": "Feature",
                "properties": {"place_id": 1, "osm_type": "relation", "display_name": "La Rochelle"},
                "bbox": [-1.2462, 46.1413, -1.1135, 46.1877],
                "geometry": {"type": "Polygon", "coordinates": [[
                    [-1.2462, 46.1413], [-1.1135, 46.1413], [-1.1135, 46.1877],
                    [-1.2462, 46.1877], [-1.2462, 46.1413]
                ]]}
            }
        ]
    }"#;

    #[test]
    fn test_parse_boundary() {
        let roi = parse_boundary("La Rochelle", NOMINATIM_ANSWER).unwrap();
        assert_eq!(roi.name(), "La Rochelle");
        assert_eq!(roi.bbox().min_x, -1.2462);
        assert_eq!(roi.bbox().max_y, 46.1877);
    }

    #[test]
    fn test_no_result_is_geocode_not_found() {
        let err = parse_boundary("Atlantis", r#"{"type": "FeatureCollection", "features": []}"#)
            .unwrap_err();
        assert!(matches!(err, NdviError::GeocodeNotFound { ref place } if place == "Atlantis"));
    }

    #[test]
    fn test_garbage_answer() {
        let err = parse_boundary("X", "<html>rate limited</html>").unwrap_err();
        assert!(matches!(err, NdviError::Geocode(_)));
    }

    #[test]
    fn test_search_url() {
        let config = NominatimConfig {
            base_url: Url::parse("https://nominatim.example.org/").unwrap(),
            user_agent: USER_AGENT.to_string(),
            timeout: NOMINATIM_TIMEOUT,
        };
        assert_eq!(config.search_url().unwrap().as_str(), "https://nominatim.example.org/search");
    }

    #[test]
    fn test_file_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundary.geojson");
        std::fs::write(&path, NOMINATIM_ANSWER).unwrap();
        let roi = GeoJsonFileResolver::new(&path).resolve("La Rochelle").unwrap();
        assert_eq!(roi.bbox().max_x, -1.1135);

        let missing = GeoJsonFileResolver::new(dir.path().join("missing.geojson"));
        assert!(matches!(missing.resolve("X"), Err(NdviError::Io(_))));
    }

    fn resolver_for(server: &mockito::Server) -> NominatimResolver {
        NominatimResolver::new(NominatimConfig {
            base_url: Url::parse(&server.url()).unwrap(),
            user_agent: USER_AGENT.to_string(),
            timeout: NOMINATIM_TIMEOUT,
        })
        .unwrap()
    }

    #[test]
    fn test_resolver_asks_for_polygon_geojson() {
        use mockito::Matcher;

        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "La Rochelle, France".into()),
                Matcher::UrlEncoded("format".into(), "geojson".into()),
                Matcher::UrlEncoded("polygon_geojson".into(), "1".into()),
                Matcher::UrlEncoded("limit".into(), "5".into()),
            ]))
            .match_header("user-agent", USER_AGENT)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(NOMINATIM_ANSWER)
            .create();

        let roi = resolver_for(&server).resolve("La Rochelle, France").unwrap();
        mock.assert();
        assert_eq!(roi.name(), "La Rochelle, France");
        assert_eq!(roi.bbox().min_y, 46.1413);
    }

    #[test]
    fn test_resolver_reports_http_errors() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/search")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .with_body("overloaded")
            .create();

        let err = resolver_for(&server).resolve("Lyon").unwrap_err();
        mock.assert();
        assert!(matches!(
            err,
            NdviError::Geocode(ServiceError::Api { status: 503, ref body }) if body == "overloaded"
        ));
    }
}
