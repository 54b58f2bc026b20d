//! HEIC/HEIF to JPEG transcoding.
//!
//! Decoding goes through libheif and is only compiled with the `heif`
//! feature. Without it `SUPPORTED` is false and callers store HEIC uploads
//! unconverted.

use anyhow::Result;

pub const SUPPORTED: bool = cfg!(feature = "heif");

/// Whether `ext` (without the dot, any case) names a HEIF container.
pub fn is_heif_extension(ext: &str) -> bool {
    ext.eq_ignore_ascii_case("heic") || ext.eq_ignore_ascii_case("heif")
}

/// Decode the primary image of a HEIF container and re-encode it as JPEG,
/// carrying the container's EXIF fields (GPS included) over.
///
/// libheif applies the container's rotation and mirroring while decoding,
/// so the JPEG is written with Orientation 1.
#[cfg(feature = "heif")]
pub fn transcode_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    use anyhow::{anyhow, Context};
    use image::{DynamicImage, RgbImage};
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    use super::jpeg::{embed_exif, encode_jpeg, JPEG_QUALITY};
    use super::metadata::read_exif;

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(bytes).context("Failed to read HEIF container")?;
    let handle = ctx.primary_image_handle()?;
    let decoded = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .context("Failed to decode HEIF image")?;

    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| anyhow!("HEIF image has no interleaved RGB plane"))?;

    let width = plane.width;
    let height = plane.height;
    let row_len = width as usize * 3;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        pixels.extend_from_slice(&row[..row_len]);
    }

    let img = RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("Decoded HEIF buffer does not match {}x{}", width, height))?;
    let jpeg = encode_jpeg(&DynamicImage::ImageRgb8(img), JPEG_QUALITY)?;

    match read_exif(bytes) {
        Ok(exif) => embed_exif(&jpeg, &upright_exif(&exif)?),
        Err(_) => Ok(jpeg),
    }
}

/// EXIF block for pixels that are already upright.
#[cfg(any(feature = "heif", test))]
fn upright_exif(exif: &exif::Exif) -> Result<Vec<u8>> {
    use exif::{Field, In, Tag, Value};

    use super::geotag::{carried_fields, serialize_exif};

    let mut fields = carried_fields(exif, &[Tag::Orientation]);
    fields.push(Field {
        tag: Tag::Orientation,
        ifd_num: In::PRIMARY,
        value: Value::Short(vec![1]),
    });
    serialize_exif(&fields)
}

#[cfg(not(feature = "heif"))]
pub fn transcode_to_jpeg(_bytes: &[u8]) -> Result<Vec<u8>> {
    anyhow::bail!("HEIC support not compiled in (build with --features heif)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heif_extensions() {
        assert!(is_heif_extension("heic"));
        assert!(is_heif_extension("HEIF"));
        assert!(!is_heif_extension("jpg"));
    }

    #[test]
    fn test_upright_exif_resets_orientation() {
        use exif::{Field, In, Tag, Value};

        use crate::media::geotag::{self, serialize_exif, GeoTag};
        use crate::media::jpeg::embed_exif;
        use crate::media::metadata::{read_exif, ExifExtractor, MetadataExtractor};
        use crate::media::test_support::sample_jpeg;

        // Portrait phone shot: rotated 90° clockwise, with GPS
        let tagged = geotag::tag_photo(&sample_jpeg(), &GeoTag::new(35.6938, 139.7034)).unwrap();
        let mut fields = geotag::carried_fields(&read_exif(&tagged).unwrap(), &[]);
        fields.push(Field {
            tag: Tag::Orientation,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![6]),
        });
        let rotated = embed_exif(&sample_jpeg(), &serialize_exif(&fields).unwrap()).unwrap();

        let block = upright_exif(&read_exif(&rotated).unwrap()).unwrap();
        let converted = embed_exif(&sample_jpeg(), &block).unwrap();

        let exif = read_exif(&converted).unwrap();
        let orientation = exif.get_field(Tag::Orientation, In::PRIMARY).unwrap();
        assert_eq!(orientation.value.get_uint(0), Some(1));

        let metadata = ExifExtractor.extract(&converted).unwrap();
        assert_eq!(metadata.camera_make.as_deref(), Some("Apple"));
        let gps = metadata.gps.unwrap();
        assert!((gps.latitude - 35.6938).abs() < 1e-5);
    }

    #[cfg(not(feature = "heif"))]
    #[test]
    fn test_transcode_unavailable_without_feature() {
        assert!(!SUPPORTED);
        assert!(transcode_to_jpeg(b"anything").is_err());
    }

    #[cfg(feature = "heif")]
    #[test]
    fn test_transcode_rejects_garbage() {
        assert!(transcode_to_jpeg(b"not a heif file").is_err());
    }
}
