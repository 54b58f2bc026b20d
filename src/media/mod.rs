//! Image handling: metadata extraction, JPEG segment surgery, HEIC
//! transcoding, GPS tagging and on-disk storage of uploads.

pub mod geotag;
pub mod hashing;
pub mod heic;
pub mod jpeg;
pub mod metadata;
pub mod storage;

pub use metadata::{ExifExtractor, GpsCoordinates, MetadataExtractor, PhotoMetadata};
pub use storage::{PhotoStorage, StoredPhoto};
