//! EXIF metadata extraction.
//!
//! Extraction is a pure function of the uploaded bytes, exposed through the
//! `MetadataExtractor` trait so the ingestion pipeline does not depend on a
//! particular EXIF library. `ExifExtractor` is the kamadak-exif backed
//! implementation; it reads JPEG, PNG, TIFF, WebP and HEIF containers and
//! follows the GPS IFD pointer on its own.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeZone};
use exif::{Exif, In, Tag, Value};
use serde::Serialize;
use std::io::Cursor;

/// Decimal-degree coordinates, north and east positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinates {
    /// Build coordinates, rejecting non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhotoMetadata {
    pub gps: Option<GpsCoordinates>,
    /// Capture time as unix seconds
    pub taken_at: Option<i64>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
}

pub trait MetadataExtractor: Send + Sync {
    /// Read location and capture time from raw image bytes.
    ///
    /// Returns an error when the bytes carry no readable EXIF block at all;
    /// missing individual tags are reported as `None` fields instead.
    fn extract(&self, bytes: &[u8]) -> Result<PhotoMetadata>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<PhotoMetadata> {
        let exif = read_exif(bytes)?;
        Ok(PhotoMetadata {
            gps: gps_coordinates(&exif),
            taken_at: capture_timestamp(&exif),
            camera_make: ascii_field(&exif, Tag::Make),
            camera_model: ascii_field(&exif, Tag::Model),
        })
    }
}

pub fn read_exif(bytes: &[u8]) -> Result<Exif> {
    exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .context("No EXIF data found")
}

pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

/// Decimal coordinates from the four GPS tags; `None` unless all four are
/// present and well formed.
pub fn gps_coordinates(exif: &Exif) -> Option<GpsCoordinates> {
    let lat = dms_field(exif, Tag::GPSLatitude)?;
    let lat_ref = ascii_field(exif, Tag::GPSLatitudeRef)?;
    let lon = dms_field(exif, Tag::GPSLongitude)?;
    let lon_ref = ascii_field(exif, Tag::GPSLongitudeRef)?;

    let latitude = if lat_ref.eq_ignore_ascii_case("S") { -lat } else { lat };
    let longitude = if lon_ref.eq_ignore_ascii_case("W") { -lon } else { lon };

    GpsCoordinates::new(latitude, longitude)
}

fn dms_field(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Rational(ref v) if v.len() >= 3 => {
            let decimal = dms_to_decimal(v[0].to_f64(), v[1].to_f64(), v[2].to_f64());
            decimal.is_finite().then_some(decimal)
        }
        _ => None,
    }
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Ascii(ref parts) => parts
            .first()
            .map(|bytes| {
                String::from_utf8_lossy(bytes)
                    .trim_end_matches('\0')
                    .trim()
                    .to_string()
            })
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Capture time from the first of DateTimeOriginal, DateTime and
/// DateTimeDigitized that parses.
pub fn capture_timestamp(exif: &Exif) -> Option<i64> {
    [Tag::DateTimeOriginal, Tag::DateTime, Tag::DateTimeDigitized]
        .into_iter()
        .filter_map(|tag| ascii_field(exif, tag))
        .find_map(|value| parse_exif_datetime(&value))
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` string. EXIF carries no zone, so the
/// value is read as local time of this machine.
pub fn parse_exif_datetime(value: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), "%Y:%m:%d %H:%M:%S").ok()?;
    let timestamp = match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.timestamp(),
        // Skipped by a DST transition
        None => naive.and_utc().timestamp(),
    };
    Some(timestamp)
}

/// Everything `check-gps` reports about one file.
#[derive(Debug, Clone, Default)]
pub struct PhotoInspection {
    pub format: Option<String>,
    pub dimensions: Option<(u32, u32)>,
    pub exif_fields: Vec<(String, String)>,
    pub gps_fields: Vec<(String, String)>,
    pub coordinates: Option<GpsCoordinates>,
    pub exif_error: Option<String>,
}

pub fn inspect(bytes: &[u8]) -> PhotoInspection {
    let mut inspection = PhotoInspection::default();

    if let Ok(reader) = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        inspection.format = reader.format().map(|f| format!("{:?}", f));
        if let Ok(dims) = reader.into_dimensions() {
            inspection.dimensions = Some(dims);
        }
    }

    match read_exif(bytes) {
        Ok(exif) => {
            for field in exif.fields() {
                let entry = (
                    field.tag.to_string(),
                    field.display_value().with_unit(&exif).to_string(),
                );
                if field.tag.context() == exif::Context::Gps {
                    inspection.gps_fields.push(entry);
                } else {
                    inspection.exif_fields.push(entry);
                }
            }
            inspection.coordinates = gps_coordinates(&exif);
        }
        Err(e) => inspection.exif_error = Some(format!("{:#}", e)),
    }

    inspection
}
