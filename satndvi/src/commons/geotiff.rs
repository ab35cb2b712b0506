//! Single-band Float32 GeoTIFF reading and atomic writing, on top of the `tiff` crate

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tiff::{TiffError, TiffFormatError, TiffResult};
use tracing::warn;

use crate::geo_core::BoundingBox;

/// Affine placement of a north-up raster in EPSG:4326
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Grid of `width` x `height` pixels spanning `bbox`
    pub fn covering(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        GeoTransform::new(
            bbox.min_x,
            bbox.max_y,
            bbox.width() / width.max(1) as f64,
            -bbox.height() / height.max(1) as f64,
        )
    }

    /// Lon/lat of the centre of pixel (col, row)
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }
}

/// Georeferenced single-band raster, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRaster {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub data: Vec<f32>,
}

impl GeoRaster {
    pub fn new(width: usize, height: usize, transform: GeoTransform, data: Vec<f32>) -> TiffResult<Self> {
        if data.len() != width * height {
            return Err(TiffError::FormatError(TiffFormatError::Format(format!(
                "raster of {}x{} cannot hold {} values",
                width,
                height,
                data.len()
            ))));
        }
        Ok(GeoRaster {
            width,
            height,
            transform,
            data,
        })
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col < self.width && row < self.height {
            Some(self.data[row * self.width + col])
        } else {
            None
        }
    }
}

/// Read the first band of a GeoTIFF as Float32
pub fn read_geotiff(path: &Path) -> TiffResult<GeoRaster> {
    let file = File::open(path)?;
    decode_geotiff(BufReader::new(file))
}

/// Read a GeoTIFF held in memory
pub fn read_geotiff_from_buffer(bytes: &[u8]) -> TiffResult<GeoRaster> {
    decode_geotiff(Cursor::new(bytes))
}

fn decode_geotiff<R: Read + Seek>(reader: R) -> TiffResult<GeoRaster> {
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let data: Vec<f32> = match decoder.read_image()? {
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        _ => {
            return Err(TiffError::FormatError(TiffFormatError::Format(
                "unsupported sample format".to_string(),
            )))
        }
    };

    // Multi-band chunky images interleave samples; keep band 1
    let samples = if width * height > 0 { data.len() / (width * height) } else { 1 };
    let data = if samples > 1 {
        data.into_iter().step_by(samples).collect()
    } else {
        data
    };

    let transform = read_geotransform(&mut decoder)?;
    GeoRaster::new(width, height, transform, data)
}

/// Placement from ModelPixelScale + ModelTiepoint; a raster without them is rejected
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> TiffResult<GeoTransform> {
    let scale = decoder.find_tag(Tag::ModelPixelScaleTag)?;
    let tiepoint = decoder.find_tag(Tag::ModelTiepointTag)?;
    let (Some(scale), Some(tiepoint)) = (scale, tiepoint) else {
        warn!("GeoTIFF has no ModelPixelScale/ModelTiepoint tags");
        return Err(TiffError::FormatError(TiffFormatError::Format(
            "missing georeferencing tags".to_string(),
        )));
    };
    let scale = scale.into_f64_vec()?;
    let tiepoint = tiepoint.into_f64_vec()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(TiffError::FormatError(TiffFormatError::Format(format!(
            "malformed georeferencing tags: {} scale and {} tiepoint values",
            scale.len(),
            tiepoint.len()
        ))));
    }
    // tiepoint: [I, J, K, X, Y, Z]
    Ok(GeoTransform::new(
        tiepoint[3] - tiepoint[0] * scale[0],
        tiepoint[4] + tiepoint[1] * scale[1],
        scale[0],
        -scale[1],
    ))
}

/// Encode a raster as a Float32 GeoTIFF tagged EPSG:4326
pub fn encode_geotiff(raster: &GeoRaster) -> TiffResult<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut encoder = TiffEncoder::new(Cursor::new(&mut buf))?;
        let mut image = encoder.new_image::<Gray32Float>(raster.width as u32, raster.height as u32)?;

        let gt = raster.transform;
        let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;

        // GTModelType = Geographic, GTRasterType = PixelIsArea, GeographicType = WGS84
        let geokeys: [u16; 16] = [
            1, 1, 0, 3, //
            1024, 0, 1, 2, //
            1025, 0, 1, 1, //
            2048, 0, 1, 4326,
        ];
        image
            .encoder()
            .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;

        image.write_data(&raster.data)?;
    }
    Ok(buf)
}

/// Write `bytes` to `path` through a temp file in the same directory
/// The destination is either the complete new content or untouched
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".satndvi-")
        .suffix(".part")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

/// Encode and atomically write a GeoTIFF
pub fn write_geotiff_atomic(raster: &GeoRaster, path: &Path) -> TiffResult<()> {
    let bytes = encode_geotiff(raster)?;
    write_bytes_atomic(path, &bytes)?;
    Ok(())
}
