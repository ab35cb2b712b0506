use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by an imagery or boundary provider
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Errors of the NDVI pipeline
///
/// Per-year failures (`Query`, `Export`, `Session`) carry the year they belong to,
/// so a run report can say which years are missing on disk.
#[derive(Error, Debug)]
pub enum NdviError {
    #[error("start {start} and end {end} are not in the same calendar year")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("year {0} is outside the supported calendar range")]
    InvalidYear(i32),

    #[error("catalog request for {year} failed: {source}")]
    Query {
        year: i32,
        #[source]
        source: ServiceError,
    },

    #[error("export of {year} failed: {source}")]
    Export {
        year: i32,
        #[source]
        source: ServiceError,
    },

    #[error("no imagery session for {year}: {reason}")]
    Session { year: i32, reason: String },

    #[error("no boundary found for '{place}'")]
    GeocodeNotFound { place: String },

    #[error("boundary lookup failed: {0}")]
    Geocode(#[source] ServiceError),

    #[error("invalid aggregation input: {0}")]
    AggregationInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("label font error: {0}")]
    Font(#[from] ab_glyph::InvalidFont),

    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl NdviError {
    /// Year a per-year failure belongs to
    pub fn year(&self) -> Option<i32> {
        match self {
            NdviError::Query { year, .. }
            | NdviError::Export { year, .. }
            | NdviError::Session { year, .. } => Some(*year),
            NdviError::InvalidDateRange { start, .. } => {
                use chrono::Datelike;
                Some(start.year())
            }
            NdviError::InvalidYear(year) => Some(*year),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, NdviError>;
