use std::path::Path;
use std::process::Command;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::expression::{self, Node};
use crate::collect::global_variables::{
    EE_ACCESS_TOKEN_ENV, EE_API_BASE, EE_API_BASE_ENV, EE_MAX_GRID_DIMENSION, EE_PROJECT_ENV,
    EE_REQUEST_TIMEOUT, METRES_PER_DEGREE, USER_AGENT,
};
use crate::collect::{ImageryService, SessionFactory};
use crate::commons::basic_functions::DateRange;
use crate::commons::geotiff::write_bytes_atomic;
use crate::error::ServiceError;
use crate::geo_core::Roi;

type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Floor for cos(latitude) so polar regions keep a finite longitude step
const MIN_COS_LATITUDE: f64 = 0.01;

/// Google API error envelope
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

/// Keep only status and message of a Google error body; other bodies are kept as is
fn api_error(status: u16, body: String) -> ServiceError {
    let body = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(parsed) => format!("{} {}", parsed.error.status, parsed.error.message)
            .trim()
            .to_string(),
        Err(_) => body,
    };
    ServiceError::Api { status, body }
}

/// Earth Engine connection settings
#[derive(Debug, Clone)]
pub struct EarthEngineConfig {
    /// Cloud project the requests are billed to
    pub project: String,
    /// REST root, `https://earthengine.googleapis.com` unless overridden
    pub api_base: Url,
    /// OAuth access token; when None each session asks `gcloud` for one
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl EarthEngineConfig {
    pub fn new(project: &str) -> ServiceResult<Self> {
        let api_base = Url::parse(EE_API_BASE)
            .map_err(|e| ServiceError::Invalid(format!("bad Earth Engine URL: {}", e)))?;
        Ok(EarthEngineConfig {
            project: project.to_string(),
            api_base,
            access_token: None,
            timeout: EE_REQUEST_TIMEOUT,
        })
    }

    /// Build the configuration from the environment
    /// `project` wins over `EE_PROJECT_NAME`; one of them must be set
    pub fn from_env(project: Option<String>) -> ServiceResult<Self> {
        let project = project
            .or_else(|| std::env::var(EE_PROJECT_ENV).ok())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::Auth(format!(
                    "no Earth Engine project: pass --project or set {}",
                    EE_PROJECT_ENV
                ))
            })?;

        let mut config = Self::new(&project)?;
        if let Ok(base) = std::env::var(EE_API_BASE_ENV) {
            config.api_base = Url::parse(&base)
                .map_err(|e| ServiceError::Invalid(format!("bad {}: {}", EE_API_BASE_ENV, e)))?;
        }
        config.access_token = std::env::var(EE_ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Ok(config)
    }

    /// `v1/projects/{project}/image:computePixels`
    pub fn compute_pixels_url(&self) -> ServiceResult<Url> {
        self.api_base
            .join(&format!("v1/projects/{}/image:computePixels", self.project))
            .map_err(|e| ServiceError::Invalid(format!("bad computePixels URL: {}", e)))
    }
}

/// Hands out one authenticated session per worker
pub struct EarthEngineConnector {
    config: EarthEngineConfig,
}

impl EarthEngineConnector {
    pub fn new(config: EarthEngineConfig) -> Self {
        EarthEngineConnector { config }
    }

    pub fn config(&self) -> &EarthEngineConfig {
        &self.config
    }

    fn access_token(&self) -> ServiceResult<String> {
        if let Some(ref token) = self.config.access_token {
            return Ok(token.clone());
        }

        // Same credentials the Earth Engine CLI uses
        let output = Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .map_err(|e| {
                ServiceError::Auth(format!(
                    "failed to run gcloud ({}); set {} or install the Google Cloud SDK",
                    e, EE_ACCESS_TOKEN_ENV
                ))
            })?;

        if !output.status.success() {
            return Err(ServiceError::Auth(format!(
                "gcloud auth print-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(ServiceError::Auth("gcloud returned an empty token".to_string()));
        }
        Ok(token)
    }
}

impl SessionFactory for EarthEngineConnector {
    type Session = EarthEngineSession;

    fn connect(&self) -> ServiceResult<EarthEngineSession> {
        let token = self.access_token()?;
        let client = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        debug!(project = %self.config.project, "opened Earth Engine session");
        Ok(EarthEngineSession {
            client,
            token,
            project: self.config.project.clone(),
            compute_pixels_url: self.config.compute_pixels_url()?,
        })
    }
}

/// Authenticated Earth Engine session
/// Images are lazy expression graphs; nothing runs server-side until `export`
pub struct EarthEngineSession {
    client: Client,
    token: String,
    project: String,
    compute_pixels_url: Url,
}

impl EarthEngineSession {
    fn post_compute_pixels(&self, body: &Value) -> ServiceResult<Vec<u8>> {
        debug!(url = %self.compute_pixels_url, "requesting computePixels");
        let response = self
            .client
            .post(self.compute_pixels_url.clone())
            .bearer_auth(&self.token)
            .header("x-goog-user-project", &self.project)
            .json(body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(api_error(status, body));
        }

        Ok(response.bytes()?.to_vec())
    }
}

/// computePixels request exporting `image` over the region at `scale` metres per pixel
pub fn compute_pixels_request(image: &Node, region: &Roi, scale: u32) -> ServiceResult<Value> {
    if scale == 0 {
        return Err(ServiceError::Invalid("scale must be positive".to_string()));
    }
    let bbox = region.bbox();
    let step_y = scale as f64 / METRES_PER_DEGREE;
    // A degree of longitude shrinks with latitude; size pixels at the region's centre
    let centre_lat = (bbox.min_y + bbox.max_y) / 2.0;
    let step_x = step_y / centre_lat.to_radians().cos().max(MIN_COS_LATITUDE);
    let width = ((bbox.width() / step_x).ceil() as usize).max(1);
    let height = ((bbox.height() / step_y).ceil() as usize).max(1);

    if width > EE_MAX_GRID_DIMENSION || height > EE_MAX_GRID_DIMENSION {
        return Err(ServiceError::Invalid(format!(
            "export grid {}x{} exceeds {} pixels per side, use a coarser scale",
            width, height, EE_MAX_GRID_DIMENSION
        )));
    }

    let expression = expression::export_image(image.clone(), region).to_expression();

    Ok(json!({
        "expression": expression,
        "fileFormat": "GEO_TIFF",
        "grid": {
            "dimensions": { "width": width, "height": height },
            "affineTransform": {
                "scaleX": step_x,
                "shearX": 0.0,
                "translateX": bbox.min_x,
                "shearY": 0.0,
                "scaleY": -step_y,
                "translateY": bbox.max_y,
            },
            "crsCode": "EPSG:4326",
        },
    }))
}

impl ImageryService for EarthEngineSession {
    type ImageSet = Node;
    type Image = Node;

    fn query(&self, dataset_id: &str, roi: &Roi, range: &DateRange) -> ServiceResult<Node> {
        Ok(expression::filtered_collection(dataset_id, roi, range))
    }

    fn select_bands(&self, images: Node, bands: &[&str], names: &[&str]) -> ServiceResult<Node> {
        if bands.len() != names.len() {
            return Err(ServiceError::Invalid(format!(
                "{} bands cannot be renamed to {} names",
                bands.len(),
                names.len()
            )));
        }
        Ok(expression::select_bands(images, bands, names))
    }

    fn reduce_median(&self, images: Node) -> ServiceResult<Node> {
        Ok(expression::median(images))
    }

    fn normalized_difference(
        &self,
        image: Node,
        first: &str,
        second: &str,
        output: &str,
    ) -> ServiceResult<Node> {
        Ok(expression::normalized_difference(image, first, second, output))
    }

    fn export(&self, image: &Node, path: &Path, scale: u32, region: &Roi) -> ServiceResult<()> {
        let request = compute_pixels_request(image, region, scale)?;
        let bytes = self.post_compute_pixels(&request)?;
        write_bytes_atomic(path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "exported image");
        Ok(())
    }
}
