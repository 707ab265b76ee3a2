//! I/O operations for reading and writing geospatial data

mod geojson;
mod native;
mod table;

pub use geojson::{read_geojson, read_geojson_from_str, to_geojson_string, write_geojson};
pub use native::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
pub use table::read_table;
