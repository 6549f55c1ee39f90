//! GeoTIFF encoding for clipped rasters.
//!
//! One file per timestamp, one Float32 band per variable, planar layout with
//! a single Deflate strip per band. Georeferencing uses ModelPixelScale,
//! ModelTiepoint and a GeoKey directory for EPSG:4326. GDAL-specific tags
//! carry the no-data value and band descriptions.
//!
//! Rasters wider and taller than 16 cells also get internal overviews: block
//! averages chained after the main image as reduced-resolution IFDs.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use era5_common::time::file_stamp;
use era5_common::{is_fill, VariableCodeMapper};
use grid_processor::{RasterLayer, RasterResult};
use tracing::info;

use crate::error::{ExportError, ExportResult};

/// No-data value written for masked and fill cells.
pub const NODATA: f32 = -9999.0;

// TIFF field types
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_DOUBLE: u16 = 12;

// Tags, kept in ascending order when written
const TAG_NEW_SUBFILE_TYPE: u16 = 254;
const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIGURATION: u16 = 284;
const TAG_EXTRA_SAMPLES: u16 = 338;
const TAG_SAMPLE_FORMAT: u16 = 339;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_METADATA: u16 = 42112;
const TAG_GDAL_NODATA: u16 = 42113;

const SUBFILE_REDUCED_RESOLUTION: u32 = 1;
const COMPRESSION_ADOBE_DEFLATE: u16 = 8;
const PHOTOMETRIC_MIN_IS_BLACK: u16 = 1;
const PLANAR_SEPARATE: u16 = 2;
const SAMPLE_FORMAT_IEEE_FLOAT: u16 = 3;

const OVERVIEW_FACTORS: [usize; 5] = [2, 4, 8, 16, 32];
/// Rasters whose shorter side is at most this many cells get no overviews.
const MIN_OVERVIEW_SIDE: usize = 16;

/// GeoKeys: geographic model, pixel-is-area, WGS 84, angular unit degree.
const GEO_KEY_DIRECTORY: [u16; 20] = [
    1, 1, 0, 4, //
    1024, 0, 1, 2, //
    1025, 0, 1, 1, //
    2048, 0, 1, 4326, //
    2054, 0, 1, 9102,
];

#[derive(Debug)]
enum TagValue {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
    Ascii(String),
}

impl TagValue {
    fn field_type(&self) -> u16 {
        match self {
            Self::Short(_) => TYPE_SHORT,
            Self::Long(_) => TYPE_LONG,
            Self::Double(_) => TYPE_DOUBLE,
            Self::Ascii(_) => TYPE_ASCII,
        }
    }

    fn count(&self) -> u32 {
        match self {
            Self::Short(v) => v.len() as u32,
            Self::Long(v) => v.len() as u32,
            Self::Double(v) => v.len() as u32,
            // NUL terminator included
            Self::Ascii(s) => s.len() as u32 + 1,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Short(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Long(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Double(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Ascii(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                bytes
            }
        }
    }
}

/// `era5_<YYYYMMDD_HHMM>.tif`
pub fn raster_file_name(time: &DateTime<Utc>) -> String {
    format!("era5_{}.tif", file_stamp(time))
}

/// Encode one timestamp of a clipped raster as a GeoTIFF.
pub fn encode_geotiff(raster: &RasterResult, layer: &RasterLayer) -> ExportResult<Vec<u8>> {
    let pixels = raster.width * raster.height;
    if pixels == 0 || layer.bands.is_empty() {
        return Err(ExportError::InvalidInput("empty raster".to_string()));
    }
    if let Some(band) = layer.bands.iter().find(|b| b.values.len() != pixels) {
        return Err(ExportError::InvalidInput(format!(
            "band {} has {} values, expected {}",
            band.variable.internal_code,
            band.values.len(),
            pixels
        )));
    }
    let n_bands = layer.bands.len();

    // Header, IFD offset patched below
    let mut tiff = Vec::with_capacity(pixels * n_bands * 2 + 1024);
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());

    let bands: Vec<&[f32]> = layer.bands.iter().map(|b| b.values.as_slice()).collect();
    let strips = write_strips(&mut tiff, &bands)?;
    let mut entries = image_entries(raster.width, raster.height, n_bands, strips, false);
    entries.extend([
        (
            TAG_MODEL_PIXEL_SCALE,
            TagValue::Double(vec![raster.pixel_width, raster.pixel_height, 0.0]),
        ),
        (
            TAG_MODEL_TIEPOINT,
            TagValue::Double(vec![0.0, 0.0, 0.0, raster.west, raster.north, 0.0]),
        ),
        (
            TAG_GEO_KEY_DIRECTORY,
            TagValue::Short(GEO_KEY_DIRECTORY.to_vec()),
        ),
        (TAG_GDAL_METADATA, TagValue::Ascii(gdal_metadata(layer)?)),
        (TAG_GDAL_NODATA, TagValue::Ascii(format!("{}", NODATA))),
    ]);

    let mut link_at = write_ifd(&mut tiff, 4, &entries);

    for factor in overview_factors(raster.width, raster.height) {
        let averaged: Vec<Vec<f32>> = bands
            .iter()
            .map(|values| average_blocks(values, raster.width, raster.height, factor))
            .collect();
        let reduced: Vec<&[f32]> = averaged.iter().map(Vec::as_slice).collect();
        let strips = write_strips(&mut tiff, &reduced)?;
        let entries = image_entries(
            reduced_len(raster.width, factor),
            reduced_len(raster.height, factor),
            n_bands,
            strips,
            true,
        );
        link_at = write_ifd(&mut tiff, link_at, &entries);
    }
    Ok(tiff)
}

/// Overview decimation factors built for a `width` x `height` raster.
pub fn overview_factors(width: usize, height: usize) -> Vec<usize> {
    let side = width.min(height);
    if side <= MIN_OVERVIEW_SIDE {
        return Vec::new();
    }
    OVERVIEW_FACTORS
        .iter()
        .copied()
        .filter(|&factor| factor < side / 2)
        .collect()
}

fn reduced_len(len: usize, factor: usize) -> usize {
    len.div_ceil(factor)
}

/// Mean of each `factor` x `factor` block, skipping fill cells. Blocks with
/// no valid cell stay fill.
fn average_blocks(values: &[f32], width: usize, height: usize, factor: usize) -> Vec<f32> {
    let out_width = reduced_len(width, factor);
    let out_height = reduced_len(height, factor);
    let mut out = Vec::with_capacity(out_width * out_height);
    for out_row in 0..out_height {
        for out_col in 0..out_width {
            let mut sum = 0.0f64;
            let mut count = 0usize;
            for row in out_row * factor..((out_row + 1) * factor).min(height) {
                for col in out_col * factor..((out_col + 1) * factor).min(width) {
                    let v = values[row * width + col];
                    if !is_fill(v) {
                        sum += v as f64;
                        count += 1;
                    }
                }
            }
            out.push(if count == 0 { f32::NAN } else { (sum / count as f64) as f32 });
        }
    }
    out
}

/// Strip offsets and byte counts, one strip per band.
struct Strips {
    offsets: Vec<u32>,
    byte_counts: Vec<u32>,
}

fn write_strips(tiff: &mut Vec<u8>, bands: &[&[f32]]) -> ExportResult<Strips> {
    let mut strips = Strips {
        offsets: Vec::with_capacity(bands.len()),
        byte_counts: Vec::with_capacity(bands.len()),
    };
    for values in bands {
        let strip = deflate_band(values)?;
        strips.offsets.push(tiff.len() as u32);
        strips.byte_counts.push(strip.len() as u32);
        tiff.extend_from_slice(&strip);
    }
    Ok(strips)
}

/// Image structure tags shared by the main image and its overviews.
fn image_entries(
    width: usize,
    height: usize,
    n_bands: usize,
    strips: Strips,
    overview: bool,
) -> Vec<(u16, TagValue)> {
    let mut entries = Vec::with_capacity(16);
    if overview {
        entries.push((
            TAG_NEW_SUBFILE_TYPE,
            TagValue::Long(vec![SUBFILE_REDUCED_RESOLUTION]),
        ));
    }
    entries.extend([
        (TAG_IMAGE_WIDTH, TagValue::Long(vec![width as u32])),
        (TAG_IMAGE_LENGTH, TagValue::Long(vec![height as u32])),
        (TAG_BITS_PER_SAMPLE, TagValue::Short(vec![32; n_bands])),
        (TAG_COMPRESSION, TagValue::Short(vec![COMPRESSION_ADOBE_DEFLATE])),
        (TAG_PHOTOMETRIC, TagValue::Short(vec![PHOTOMETRIC_MIN_IS_BLACK])),
        (TAG_STRIP_OFFSETS, TagValue::Long(strips.offsets)),
        (TAG_SAMPLES_PER_PIXEL, TagValue::Short(vec![n_bands as u16])),
        (TAG_ROWS_PER_STRIP, TagValue::Long(vec![height as u32])),
        (TAG_STRIP_BYTE_COUNTS, TagValue::Long(strips.byte_counts)),
        (TAG_PLANAR_CONFIGURATION, TagValue::Short(vec![PLANAR_SEPARATE])),
    ]);
    if n_bands > 1 {
        entries.push((TAG_EXTRA_SAMPLES, TagValue::Short(vec![0; n_bands - 1])));
    }
    entries.push((
        TAG_SAMPLE_FORMAT,
        TagValue::Short(vec![SAMPLE_FORMAT_IEEE_FLOAT; n_bands]),
    ));
    entries
}

/// Write every layer of `raster` into `dir`, one file per timestamp.
pub fn write_raster_files(raster: &RasterResult, dir: &Path) -> ExportResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(raster.layers.len());
    for layer in &raster.layers {
        let path = dir.join(raster_file_name(&layer.time));
        std::fs::write(&path, encode_geotiff(raster, layer)?)?;
        paths.push(path);
    }
    info!(
        files = paths.len(),
        width = raster.width,
        height = raster.height,
        "Wrote GeoTIFF rasters"
    );
    Ok(paths)
}

/// Append an IFD (and its out-of-line values) and point the offset field at
/// `link_at` to it. Returns where this IFD's next-IFD offset lives.
fn write_ifd(tiff: &mut Vec<u8>, link_at: usize, entries: &[(u16, TagValue)]) -> usize {
    if tiff.len() % 2 == 1 {
        tiff.push(0);
    }
    let ifd_offset = tiff.len() as u32;
    tiff[link_at..link_at + 4].copy_from_slice(&ifd_offset.to_le_bytes());

    let ifd_size = 2 + entries.len() * 12 + 4;
    let mut overflow: Vec<u8> = Vec::new();
    let overflow_base = ifd_offset as usize + ifd_size;

    tiff.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, value) in entries {
        let bytes = value.to_bytes();
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&value.field_type().to_le_bytes());
        tiff.extend_from_slice(&value.count().to_le_bytes());
        if bytes.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..bytes.len()].copy_from_slice(&bytes);
            tiff.extend_from_slice(&inline);
        } else {
            let offset = (overflow_base + overflow.len()) as u32;
            tiff.extend_from_slice(&offset.to_le_bytes());
            overflow.extend_from_slice(&bytes);
            if overflow.len() % 2 == 1 {
                overflow.push(0);
            }
        }
    }
    // no further IFDs until an overview is linked in
    let next_at = tiff.len();
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(&overflow);
    next_at
}

fn deflate_band(values: &[f32]) -> ExportResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(values.len() * 4);
    for &v in values {
        let v = if is_fill(v) { NODATA } else { v };
        raw.extend_from_slice(&v.to_le_bytes());
    }
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| ExportError::Encode(format!("Deflate failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| ExportError::Encode(format!("Deflate failed: {}", e)))
}

fn gdal_metadata(layer: &RasterLayer) -> ExportResult<String> {
    let mapper = VariableCodeMapper::era5_land();
    let mut xml = String::from("<GDALMetadata>");
    xml.push_str(&format!(
        "<Item name=\"TIME\">{}</Item>",
        layer.time.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    for (i, band) in layer.bands.iter().enumerate() {
        let spec = mapper
            .by_code(band.variable.internal_code)
            .map_err(|e| ExportError::InvalidInput(e.to_string()))?;
        xml.push_str(&format!(
            "<Item name=\"DESCRIPTION\" sample=\"{}\" role=\"description\">{}</Item>",
            i, spec.display_name
        ));
        xml.push_str(&format!(
            "<Item name=\"UNITS\" sample=\"{}\" role=\"unittype\">{}</Item>",
            i,
            xml_escape(spec.unit)
        ));
    }
    xml.push_str("</GDALMetadata>");
    Ok(xml)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
