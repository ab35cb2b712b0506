pub mod landsat;
pub mod time_series;
pub mod vegetation;
