//! Writing GPS and camera tags into photos, used by `journitag-tools add-gps`
//! to prepare test fixtures.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, Timelike};
use exif::experimental::Writer;
use exif::{Exif, Field, In, Rational, Tag, Value};
use std::borrow::Cow;
use std::io::Cursor;

use super::jpeg;
use super::metadata::read_exif;

/// Named coordinates accepted by `add-gps --location`.
pub const PRESET_LOCATIONS: &[(&str, f64, f64)] = &[
    ("shinjuku", 35.6938, 139.7034),
    ("shibuya", 35.6595, 139.7004),
    ("tokyo_tower", 35.6586, 139.7454),
    ("gyoen", 35.6852, 139.7100),
    ("ann_arbor", 42.2808, -83.7430),
    ("new_york", 40.7128, -74.0060),
    ("san_francisco", 37.7749, -122.4194),
];

pub fn preset(name: &str) -> Option<(f64, f64)> {
    PRESET_LOCATIONS
        .iter()
        .find(|(preset, _, _)| preset.eq_ignore_ascii_case(name))
        .map(|&(_, lat, lon)| (lat, lon))
}

#[derive(Debug, Clone)]
pub struct GeoTag {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above sea level; negative is below
    pub altitude: Option<f64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub software: Option<String>,
    /// Written as DateTime, DateTimeOriginal and the GPS date/time stamps
    pub timestamp: NaiveDateTime,
}

impl GeoTag {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            make: Some("Apple".to_string()),
            model: Some("iPhone 13 Pro".to_string()),
            software: Some(format!("journitag-tools {}", env!("CARGO_PKG_VERSION"))),
            timestamp: Local::now().naive_local(),
        }
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = vec![
            field(Tag::GPSVersionID, Value::Byte(vec![2, 2, 0, 0])),
            ascii(Tag::GPSLatitudeRef, if self.latitude < 0.0 { "S" } else { "N" }),
            field(Tag::GPSLatitude, Value::Rational(decimal_to_dms(self.latitude).to_vec())),
            ascii(Tag::GPSLongitudeRef, if self.longitude < 0.0 { "W" } else { "E" }),
            field(Tag::GPSLongitude, Value::Rational(decimal_to_dms(self.longitude).to_vec())),
        ];

        if let Some(altitude) = self.altitude {
            let below_sea_level = u8::from(altitude < 0.0);
            let centimetres = (altitude.abs() * 100.0).round() as u32;
            fields.push(field(Tag::GPSAltitudeRef, Value::Byte(vec![below_sea_level])));
            fields.push(field(
                Tag::GPSAltitude,
                Value::Rational(vec![Rational::from((centimetres, 100))]),
            ));
        }

        let time = self.timestamp.time();
        fields.push(ascii(Tag::GPSDateStamp, &self.timestamp.format("%Y:%m:%d").to_string()));
        fields.push(field(
            Tag::GPSTimeStamp,
            Value::Rational(vec![
                Rational::from((time.hour(), 1)),
                Rational::from((time.minute(), 1)),
                Rational::from((time.second(), 1)),
            ]),
        ));

        let stamp = self.timestamp.format("%Y:%m:%d %H:%M:%S").to_string();
        fields.push(ascii(Tag::DateTime, &stamp));
        fields.push(ascii(Tag::DateTimeOriginal, &stamp));

        if let Some(make) = &self.make {
            fields.push(ascii(Tag::Make, make));
        }
        if let Some(model) = &self.model {
            fields.push(ascii(Tag::Model, model));
        }
        if let Some(software) = &self.software {
            fields.push(ascii(Tag::Software, software));
        }
        fields
    }
}

fn field(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

fn ascii(tag: Tag, text: &str) -> Field {
    field(tag, Value::Ascii(vec![text.as_bytes().to_vec()]))
}

/// Degrees, minutes and seconds (to 1/100 s) of the absolute value.
pub fn decimal_to_dms(decimal: f64) -> [Rational; 3] {
    let decimal = decimal.abs();
    let degrees = decimal.trunc();
    let minutes_full = (decimal - degrees) * 60.0;
    let minutes = minutes_full.trunc();
    let seconds = (minutes_full - minutes) * 60.0;

    [
        Rational::from((degrees as u32, 1)),
        Rational::from((minutes as u32, 1)),
        Rational::from(((seconds * 100.0) as u32, 100)),
    ]
}

/// Structural tags the writer regenerates itself; copying them over would
/// point at offsets in the old file.
fn is_structural(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::ExifIFDPointer
            | Tag::GPSInfoIFDPointer
            | Tag::InteropIFDPointer
            | Tag::StripOffsets
            | Tag::StripByteCounts
            | Tag::JPEGInterchangeFormat
            | Tag::JPEGInterchangeFormatLength
    )
}

/// Return a JPEG copy of `bytes` carrying `tag`.
///
/// Non-JPEG input is re-encoded first. Primary-image tags already present
/// are kept unless `tag` replaces them; thumbnails are dropped.
pub fn tag_photo(bytes: &[u8], tag: &GeoTag) -> Result<Vec<u8>> {
    let jpeg_bytes = if jpeg::is_jpeg(bytes) {
        Cow::Borrowed(bytes)
    } else {
        Cow::Owned(jpeg::reencode_as_jpeg(bytes)?)
    };

    let new_fields = tag.fields();
    let replaced: Vec<Tag> = new_fields.iter().map(|f| f.tag).collect();
    let existing = match read_exif(bytes) {
        Ok(exif) => carried_fields(&exif, &replaced),
        Err(_) => Vec::new(),
    };

    let fields: Vec<Field> = existing.into_iter().chain(new_fields).collect();
    jpeg::embed_exif(&jpeg_bytes, &serialize_exif(&fields)?)
}

/// Primary-image fields of `exif` that can be written into a new block,
/// leaving out `skip`.
pub(crate) fn carried_fields(exif: &Exif, skip: &[Tag]) -> Vec<Field> {
    exif.fields()
        .filter(|f| f.ifd_num == In::PRIMARY)
        .filter(|f| !is_structural(f.tag) && !matches!(f.value, Value::Unknown(..)))
        .filter(|f| !skip.contains(&f.tag))
        .cloned()
        .collect()
}

/// Serialize `fields` as a little-endian TIFF block for an APP1 segment.
pub(crate) fn serialize_exif(fields: &[Field]) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer
        .write(&mut tiff, false)
        .context("Failed to serialize EXIF block")?;
    Ok(tiff.into_inner())
}
