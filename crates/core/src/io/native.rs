//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Rasters are written with the sample type of their
//! element (u8, u32, f32, ...), a pixel-scale/tie-point georeference, a
//! GeoKey directory carrying the EPSG code when known, and the GDAL nodata
//! tag so that sentinels survive a round trip through disk.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement, SampleKind};
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::debug;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{
    ColorType, Gray16, Gray32, Gray32Float, Gray64, Gray64Float, Gray8, GrayI16, GrayI32,
    GrayI64, GrayI8,
};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Read a GeoTIFF file into a Raster, casting samples to `T`.
///
/// The file's nodata tag is cast to `T` as well; samples that do not fit in
/// `T` become `T::default_nodata()`.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)?;
    decode_geotiff(file).map_err(|e| match e {
        Error::Tiff(msg) => Error::Tiff(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn cast_samples<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let data: Vec<T> = match decoder.read_image()? {
        DecodingResult::U8(buf) => cast_samples(buf),
        DecodingResult::U16(buf) => cast_samples(buf),
        DecodingResult::U32(buf) => cast_samples(buf),
        DecodingResult::U64(buf) => cast_samples(buf),
        DecodingResult::I8(buf) => cast_samples(buf),
        DecodingResult::I16(buf) => cast_samples(buf),
        DecodingResult::I32(buf) => cast_samples(buf),
        DecodingResult::I64(buf) => cast_samples(buf),
        DecodingResult::F32(buf) => cast_samples(buf),
        DecodingResult::F64(buf) => cast_samples(buf),
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    raster.set_nodata(read_nodata::<T, R>(&mut decoder));

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    if keys.len() < 4 {
        return None;
    }
    let n_keys = keys[3] as usize;
    let mut projected = None;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(n_keys) {
        // [key id, tag location, count, value]; location 0 means inline
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            PROJECTED_CS_TYPE_KEY => projected = Some(entry[3]),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(entry[3]),
            _ => {}
        }
    }
    projected
        .or(geographic)
        .filter(|code| *code != 0 && *code != 32767)
        .map(|code| CRS::from_epsg(code as u32))
}

fn read_nodata<T: RasterElement, R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<T> {
    let text = decoder
        .find_tag(Tag::GdalNodata)
        .ok()
        .flatten()?
        .into_string()
        .ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    num_traits::cast(value)
}

/// Write a Raster to a GeoTIFF file using the raster's own sample type
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = BufWriter::new(File::create(path)?);
    encode_geotiff(raster, file)?;
    debug!("wrote {}x{} raster to {}", raster.rows(), raster.cols(), path.display());
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)?;

    match T::sample_kind() {
        SampleKind::U8 => encode_as::<Gray8, T, W>(&mut encoder, raster),
        SampleKind::U16 => encode_as::<Gray16, T, W>(&mut encoder, raster),
        SampleKind::U32 => encode_as::<Gray32, T, W>(&mut encoder, raster),
        SampleKind::U64 => encode_as::<Gray64, T, W>(&mut encoder, raster),
        SampleKind::I8 => encode_as::<GrayI8, T, W>(&mut encoder, raster),
        SampleKind::I16 => encode_as::<GrayI16, T, W>(&mut encoder, raster),
        SampleKind::I32 => encode_as::<GrayI32, T, W>(&mut encoder, raster),
        SampleKind::I64 => encode_as::<GrayI64, T, W>(&mut encoder, raster),
        SampleKind::F32 => encode_as::<Gray32Float, T, W>(&mut encoder, raster),
        SampleKind::F64 => encode_as::<Gray64Float, T, W>(&mut encoder, raster),
    }
}

fn encode_as<C, T, W>(encoder: &mut TiffEncoder<W>, raster: &Raster<T>) -> Result<()>
where
    C: ColorType,
    C::Inner: num_traits::NumCast + Copy,
    [C::Inner]: TiffValue,
    T: RasterElement,
    W: Write + Seek,
{
    let (rows, cols) = raster.shape();
    let data: Vec<C::Inner> = raster
        .data()
        .iter()
        .map(|&v| {
            num_traits::cast(v).ok_or_else(|| {
                Error::UnsupportedDataType(format!("cannot store {:?} as TIFF sample", v))
            })
        })
        .collect::<Result<_>>()?;

    let mut image = encoder.new_image::<C>(cols as u32, rows as u32)?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;

    let geokeys = geokey_directory(raster.crs());
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())?;

    if let Some(nodata) = raster.nodata().and_then(|nd| nd.to_f64()) {
        let text = format!("{}", nodata);
        image.encoder().write_tag(Tag::GdalNodata, text.as_str())?;
    }

    image.write_data(&data)?;
    Ok(())
}

fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    let geographic = crs.map(|c| c.is_geographic()).unwrap_or(false);
    let model_type = if geographic {
        MODEL_TYPE_GEOGRAPHIC
    } else {
        MODEL_TYPE_PROJECTED
    };

    let mut entries: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE_KEY, 0, 1, model_type],
        [GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA],
    ];
    if let Some(code) = crs.and_then(|c| c.epsg()).and_then(|c| u16::try_from(c).ok()) {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        entries.push([key, 0, 1, code]);
    }

    // Header: version 1.1.0 followed by the key count
    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.iter().flatten());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{BYTE_NODATA, FLOAT32_NODATA, UINT32_NODATA};

    #[test]
    fn test_float_raster_round_trip_keeps_metadata() {
        let mut raster: Raster<f32> = Raster::filled(3, 4, 1.5);
        raster.set_transform(GeoTransform::new(500_000.0, 4_600_000.0, 100.0, -100.0));
        raster.set_crs(Some(CRS::from_epsg(32631)));
        raster.set_nodata(Some(FLOAT32_NODATA));
        raster.set(2, 3, FLOAT32_NODATA).unwrap();

        let buf = write_geotiff_to_buffer(&raster).unwrap();
        let back: Raster<f32> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(back.shape(), (3, 4));
        assert_eq!(back.nodata(), Some(FLOAT32_NODATA));
        assert!(back.is_nodata_at(2, 3).unwrap());
        assert_eq!(back.get(0, 0).unwrap(), 1.5);
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32631));
        assert_eq!(back.transform().origin_x, 500_000.0);
        assert_eq!(back.transform().pixel_height, -100.0);
    }

    #[test]
    fn test_id_raster_keeps_u32_sentinel() {
        let mut ids: Raster<u32> = Raster::filled(2, 2, 7);
        ids.set_nodata(Some(UINT32_NODATA));
        ids.set(0, 0, UINT32_NODATA).unwrap();

        let buf = write_geotiff_to_buffer(&ids).unwrap();
        let back: Raster<u32> = read_geotiff_from_buffer(&buf).unwrap();
        assert_eq!(back.get(0, 0).unwrap(), UINT32_NODATA);
        assert_eq!(back.get(1, 1).unwrap(), 7);
        assert_eq!(back.nodata(), Some(UINT32_NODATA));
    }

    #[test]
    fn test_read_casts_samples() {
        let raster: Raster<u8> = Raster::filled(2, 2, 12);
        let buf = write_geotiff_to_buffer(&raster).unwrap();
        let back: Raster<i64> = read_geotiff_from_buffer(&buf).unwrap();
        assert_eq!(back.get(1, 0).unwrap(), 12);
        assert_eq!(back.nodata(), None);
    }

    #[test]
    fn test_byte_land_cover_read_as_codes() {
        let mut lulc: Raster<u8> = Raster::filled(2, 2, 3);
        lulc.set_nodata(Some(BYTE_NODATA));
        lulc.set(1, 1, BYTE_NODATA).unwrap();

        let buf = write_geotiff_to_buffer(&lulc).unwrap();
        let back: Raster<i32> = read_geotiff_from_buffer(&buf).unwrap();
        assert_eq!(back.nodata(), Some(255));
        assert!(back.is_nodata_at(1, 1).unwrap());
        assert_eq!(back.get(0, 1).unwrap(), 3);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("raster.tif");
        let raster: Raster<f64> = Raster::filled(5, 5, 0.25);
        write_geotiff(&raster, &path).unwrap();
        let back: Raster<f64> = read_geotiff(&path).unwrap();
        assert_eq!(back.get(4, 4).unwrap(), 0.25);
    }
}
