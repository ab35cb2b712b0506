use std::time::Duration;

/// Landsat 8 Collection 2 Level 2 surface reflectance
pub const LANDSAT_8_SR: &str = "LANDSAT/LC08/C02/T1_L2";
/// Landsat 7 Collection 2 Level 2 surface reflectance
pub const LANDSAT_7_SR: &str = "LANDSAT/LE07/C02/T1_L2";
/// Landsat 5 Collection 2 Level 2 surface reflectance
pub const LANDSAT_5_SR: &str = "LANDSAT/LT05/C02/T1_L2";

/// Canonical band names every composite is renamed to
pub const NIR_BAND: &str = "NIR";
pub const RED_BAND: &str = "RED";

pub const NDVI_FILE_PREFIX: &str = "ndvi_";
pub const NDVI_FILE_SUFFIX: &str = ".tif";
pub const TIFF_DIR_NAME: &str = "tiff";
pub const GIF_FILE_NAME: &str = "ndvi_over_time.gif";
pub const PLOT_FILE_NAME: &str = "average_ndvi.png";

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_SCALE: u32 = 100;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Earth Engine REST endpoint and environment
pub const EE_API_BASE: &str = "https://earthengine.googleapis.com";
pub const EE_PROJECT_ENV: &str = "EE_PROJECT_NAME";
pub const EE_API_BASE_ENV: &str = "EE_API_BASE";
pub const EE_ACCESS_TOKEN_ENV: &str = "EE_ACCESS_TOKEN";
pub const EE_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// computePixels refuses grids larger than this on either axis
pub const EE_MAX_GRID_DIMENSION: usize = 32768;

/// OpenStreetMap Nominatim
pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const NOMINATIM_URL_ENV: &str = "NOMINATIM_URL";
pub const NOMINATIM_TIMEOUT: Duration = Duration::from_secs(60);
pub const USER_AGENT: &str = concat!("satndvi/", env!("CARGO_PKG_VERSION"));

/// Metres per degree of latitude, used to turn a metric scale into a lon/lat grid step
pub const METRES_PER_DEGREE: f64 = 111_320.0;
