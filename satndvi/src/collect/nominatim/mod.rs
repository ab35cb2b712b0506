pub mod nominatim_collect;

pub use nominatim_collect::{GeoJsonFileResolver, NominatimConfig, NominatimResolver};
