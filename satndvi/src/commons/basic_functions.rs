use chrono::{Datelike, NaiveDate};

use crate::collect::global_variables::{NDVI_FILE_PREFIX, NDVI_FILE_SUFFIX};
use crate::error::{NdviError, Result};

/// Earliest year that has a raster file name (`ndvi_<digits>.tif`)
pub const MIN_YEAR: i32 = 1;

/// Inclusive date range inside a single calendar year
/// The Landsat generation is chosen per year, so a range may never straddle two years
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range, failing with `InvalidDateRange` when the years differ
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start.year() != end.year() {
            return Err(NdviError::InvalidDateRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    /// January 1st to December 31st of `year`
    /// Years before `MIN_YEAR` are rejected with `InvalidYear`
    pub fn year(year: i32) -> Result<Self> {
        if year < MIN_YEAR {
            return Err(NdviError::InvalidYear(year));
        }
        let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(NdviError::InvalidYear(year))?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31).ok_or(NdviError::InvalidYear(year))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Calendar year shared by both ends
    pub fn calendar_year(&self) -> i32 {
        self.start.year()
    }

    /// Whether `date` lies in `[start, end]`
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Day after `end`, for services whose date filters are end-exclusive
    pub fn end_exclusive(&self) -> NaiveDate {
        self.end.succ_opt().unwrap_or(self.end)
    }
}

/// File name of a year's NDVI raster, e.g. `ndvi_2020.tif`
pub fn ndvi_file_name(year: i32) -> String {
    format!("{}{}{}", NDVI_FILE_PREFIX, year, NDVI_FILE_SUFFIX)
}

/// Year encoded in an NDVI raster file name
/// Returns None unless the name is exactly `ndvi_<digits>.tif`
pub fn parse_ndvi_file_name(name: &str) -> Option<i32> {
    let digits = name
        .strip_prefix(NDVI_FILE_PREFIX)?
        .strip_suffix(NDVI_FILE_SUFFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
