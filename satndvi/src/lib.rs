//! Yearly Landsat NDVI rasters for a named place, computed on a remote imagery
//! catalog one year per worker, plus an animated GIF and an average-NDVI trend plot.

pub mod collect;
pub mod commons;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod render;

pub use error::{NdviError, Result, ServiceError};
