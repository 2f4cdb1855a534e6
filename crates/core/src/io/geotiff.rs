//! Native GeoTIFF reading/writing on top of the `tiff` crate.
//!
//! Supports single-band strip or tiled images of any integer or float sample
//! type, georeferenced by ModelPixelScale + ModelTiepoint or by
//! ModelTransformation. The EPSG code is taken from the GeoKey directory and
//! the no-data value from the GDAL_NODATA ASCII tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{ColorType, Gray32Float, Gray8};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_TYPE: u16 = 3072;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Override the no-data value written to GDAL_NODATA
    pub nodata: Option<f64>,
}

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("cannot read dimensions: {}", e)))?;
    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_all(&buf),
        DecodingResult::U16(buf) => cast_all(&buf),
        DecodingResult::U32(buf) => cast_all(&buf),
        DecodingResult::U64(buf) => cast_all(&buf),
        DecodingResult::I8(buf) => cast_all(&buf),
        DecodingResult::I16(buf) => cast_all(&buf),
        DecodingResult::I32(buf) => cast_all(&buf),
        DecodingResult::I64(buf) => cast_all(&buf),
        DecodingResult::F32(buf) => cast_all(&buf),
        DecodingResult::F64(buf) => cast_all(&buf),
        #[allow(unreachable_patterns)]
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    // multi-sample images are rejected rather than silently interleaved
    if data.len() != rows * cols {
        return Err(Error::UnsupportedDataType(format!(
            "expected a single-band {}x{} image, got {} samples",
            cols,
            rows,
            data.len()
        )));
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    raster.set_nodata(read_nodata(&mut decoder));

    Ok(raster)
}

fn cast_all<S, T>(buf: &[S]) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(tag(MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Some(GeoTransform {
                origin_x: m[3],
                pixel_width: m[0],
                row_rotation: m[1],
                origin_y: m[7],
                col_rotation: m[4],
                pixel_height: m[5],
            });
        }
    }

    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    let count = *keys.get(3)? as usize;
    let mut geographic = None;
    let mut projected = None;
    for entry in keys.get(4..4 + count * 4)?.chunks_exact(4) {
        // only keys stored inline (location 0) carry the value directly
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            KEY_PROJECTED_TYPE => projected = Some(entry[3] as u32),
            KEY_GEOGRAPHIC_TYPE => geographic = Some(entry[3] as u32),
            _ => {}
        }
    }
    projected
        .or(geographic)
        .filter(|&code| code != 0 && code != 32767)
        .map(CRS::from_epsg)
}

fn read_nodata<T, R>(decoder: &mut Decoder<R>) -> Option<T>
where
    T: RasterElement,
    R: Read + Seek,
{
    let text = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    if value.is_nan() {
        return if T::is_float() { num_traits::cast(value) } else { None };
    }
    num_traits::cast(value)
}

/// Write a Raster to a GeoTIFF file as 32-bit float samples.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_f32(raster, file, options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer as 32-bit float samples.
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_f32(raster, Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

/// Write a `u8` raster (e.g. a class map) as an 8-bit GeoTIFF.
pub fn write_geotiff_u8<P: AsRef<Path>>(raster: &Raster<u8>, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let nodata = raster.nodata().map(f64::from);
    let data: Vec<u8> = raster.data().iter().copied().collect();
    encode::<Gray8, _, _>(raster, &data, nodata, file)
}

fn encode_f32<T, W>(raster: &Raster<T>, writer: W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if raster.is_nodata(v) {
                f32::NAN
            } else {
                num_traits::cast(v).unwrap_or(f32::NAN)
            }
        })
        .collect();
    // every no-data cell was written as NaN above
    let nodata = options.nodata.or(Some(f64::NAN));
    encode::<Gray32Float, _, _>(raster, &data, nodata, writer)
}

fn encode<C, E, W>(raster: &Raster<E>, data: &[C::Inner], nodata: Option<f64>, writer: W) -> Result<()>
where
    C: ColorType,
    E: RasterElement,
    [C::Inner]: tiff::encoder::TiffValue,
    W: Write + Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();
    let dir = image.encoder();
    if gt.is_north_up() {
        let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        dir.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
            .map_err(|e| Error::Other(format!("cannot write scale tag: {}", e)))?;
        dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
            .map_err(|e| Error::Other(format!("cannot write tiepoint tag: {}", e)))?;
    } else {
        let m = [
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(tag(MODEL_TRANSFORMATION), &m[..])
            .map_err(|e| Error::Other(format!("cannot write transformation tag: {}", e)))?;
    }

    let geokeys = geokey_directory(raster.crs());
    dir.write_tag(tag(GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(|e| Error::Other(format!("cannot write geokey tag: {}", e)))?;

    if let Some(nd) = nodata {
        let text = if nd.is_nan() { "nan".to_string() } else { nd.to_string() };
        dir.write_tag(tag(GDAL_NODATA), text.as_str())
            .map_err(|e| Error::Other(format!("cannot write nodata tag: {}", e)))?;
    }

    image
        .write_data(data)
        .map_err(|e| Error::Other(format!("cannot write image data: {}", e)))?;

    Ok(())
}

fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    // RasterPixelIsArea; model type 1 = projected, 2 = geographic
    let mut entries: Vec<[u16; 4]> = vec![[KEY_RASTER_TYPE, 0, 1, 1]];
    match crs.and_then(|c| c.epsg().map(|code| (c.is_geographic(), code))) {
        Some((true, code)) if code <= u16::MAX as u32 => {
            entries.push([KEY_MODEL_TYPE, 0, 1, 2]);
            entries.push([KEY_GEOGRAPHIC_TYPE, 0, 1, code as u16]);
        }
        Some((false, code)) if code <= u16::MAX as u32 => {
            entries.push([KEY_MODEL_TYPE, 0, 1, 1]);
            entries.push([KEY_PROJECTED_TYPE, 0, 1, code as u16]);
        }
        _ => entries.push([KEY_MODEL_TYPE, 0, 1, 1]),
    }
    entries.sort_by_key(|e| e[0]);

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Raster<f64> {
        let mut r = Raster::from_vec(vec![0.1, 0.2, f64::NAN, 0.4, 0.5, 0.6], 2, 3).unwrap();
        r.set_transform(GeoTransform::new(600_000.0, 4_200_000.0, 10.0, -10.0));
        r.set_crs(Some(CRS::utm(10, true)));
        r
    }

    #[test]
    fn float_roundtrip_keeps_georeferencing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nbr.tif");
        write_geotiff(&sample(), &path, None).unwrap();

        let back: Raster<f64> = read_geotiff(&path).unwrap();
        assert_eq!(back.shape(), (2, 3));
        assert!(back.transform().approx_eq(sample().transform()));
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32610));
        assert!(back.get(0, 2).unwrap().is_nan());
        assert!((back.get(1, 0).unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn u8_roundtrip_keeps_nodata() {
        let mut classes = sample().derive(vec![0u8, 1, 255, 3, 4, 5], Some(255)).unwrap();
        classes.set_crs(Some(CRS::wgs84()));
        let dir = tempdir().unwrap();
        let path = dir.path().join("severity.tif");
        write_geotiff_u8(&classes, &path).unwrap();

        let back: Raster<u8> = read_geotiff(&path).unwrap();
        assert_eq!(back.nodata(), Some(255));
        assert_eq!(back.get(0, 2).unwrap(), 255);
        assert_eq!(back.valid_count(), 5);
        assert!(back.crs().map(|c| c.is_geographic()).unwrap_or(false));
    }

    #[test]
    fn buffer_roundtrip() {
        let bytes = write_geotiff_to_buffer(&sample(), None).unwrap();
        let back: Raster<f32> = read_geotiff_from_buffer(&bytes).unwrap();
        assert_eq!(back.shape(), (2, 3));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(read_geotiff_from_buffer::<f64>(b"not a tiff").is_err());
    }
}
