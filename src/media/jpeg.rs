//! JPEG encoding and APP1/Exif segment splicing.

use anyhow::{anyhow, bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

const MARKER: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;

const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Quality used whenever a JPEG is produced from another format.
pub const JPEG_QUALITY: u8 = 95;

pub fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[0] == MARKER && bytes[1] == SOI
}

/// Encode an image as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        .context("Failed to encode JPEG")?;
    Ok(out)
}

/// Decode any format the `image` crate understands and re-encode as JPEG.
pub fn reencode_as_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).context("Failed to decode image")?;
    encode_jpeg(&img, JPEG_QUALITY)
}

/// Return `jpeg` with `tiff` (a bare TIFF/Exif structure) as its only Exif
/// APP1 segment.
///
/// The new segment goes right after SOI, or after a leading JFIF APP0. Any
/// existing Exif APP1 is dropped; other segments and the entropy-coded data
/// are copied unchanged.
pub fn embed_exif(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>> {
    if !is_jpeg(jpeg) {
        bail!("Not a JPEG stream");
    }
    let segment_len = u16::try_from(EXIF_HEADER.len() + tiff.len() + 2).map_err(|_| {
        anyhow!(
            "EXIF block of {} bytes does not fit in a JPEG APP1 segment",
            tiff.len()
        )
    })?;

    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&jpeg[..2]);

    let mut pos = 2;
    let mut inserted = false;
    while pos + 4 <= jpeg.len() && jpeg[pos] == MARKER {
        let marker = jpeg[pos + 1];
        if marker == SOS || marker == EOI {
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            bail!("Truncated JPEG segment at offset {}", pos);
        }

        if !inserted && marker != APP0 {
            write_app1(&mut out, segment_len, tiff);
            inserted = true;
        }
        let is_exif = marker == APP1 && jpeg[pos + 4..end].starts_with(EXIF_HEADER);
        if !is_exif {
            out.extend_from_slice(&jpeg[pos..end]);
        }
        pos = end;
    }

    if !inserted {
        write_app1(&mut out, segment_len, tiff);
    }
    out.extend_from_slice(&jpeg[pos..]);
    Ok(out)
}

fn write_app1(out: &mut Vec<u8>, segment_len: u16, tiff: &[u8]) {
    out.extend_from_slice(&[MARKER, APP1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::metadata::read_exif;
    use crate::media::test_support::{sample_image, sample_jpeg};
    use exif::experimental::Writer;
    use exif::{Field, In, Tag, Value};
    use std::io::Cursor;

    fn tiff_with_make(make: &str) -> Vec<u8> {
        let field = Field {
            tag: Tag::Make,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![make.as_bytes().to_vec()]),
        };
        let mut writer = Writer::new();
        writer.push_field(&field);
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        buf.into_inner()
    }

    fn count_exif_segments(jpeg: &[u8]) -> usize {
        jpeg.windows(EXIF_HEADER.len())
            .filter(|w| *w == EXIF_HEADER)
            .count()
    }

    fn make_of(jpeg: &[u8]) -> String {
        let exif = read_exif(jpeg).unwrap();
        let field = exif.get_field(Tag::Make, In::PRIMARY).unwrap();
        field.display_value().to_string()
    }

    #[test]
    fn test_embed_then_read_back() {
        let tagged = embed_exif(&sample_jpeg(), &tiff_with_make("Apple")).unwrap();
        assert!(is_jpeg(&tagged));
        assert_eq!(count_exif_segments(&tagged), 1);
        assert!(make_of(&tagged).contains("Apple"));
        assert!(image::load_from_memory(&tagged).is_ok());
    }

    #[test]
    fn test_embed_replaces_existing_exif() {
        let first = embed_exif(&sample_jpeg(), &tiff_with_make("Apple")).unwrap();
        let second = embed_exif(&first, &tiff_with_make("Canon")).unwrap();
        assert_eq!(count_exif_segments(&second), 1);
        assert!(make_of(&second).contains("Canon"));
    }

    #[test]
    fn test_embed_rejects_non_jpeg() {
        let png = sample_image(image::ImageFormat::Png);
        assert!(embed_exif(&png, &tiff_with_make("Apple")).is_err());
    }

    #[test]
    fn test_embed_rejects_oversized_block() {
        let huge = vec![0u8; 70_000];
        assert!(embed_exif(&sample_jpeg(), &huge).is_err());
    }

    #[test]
    fn test_reencode_png_as_jpeg() {
        let png = sample_image(image::ImageFormat::Png);
        let jpeg = reencode_as_jpeg(&png).unwrap();
        assert!(is_jpeg(&jpeg));
        assert!(reencode_as_jpeg(b"definitely not an image").is_err());
    }
}
