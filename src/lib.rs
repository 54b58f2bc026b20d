//! JourniTag: a travel photo journal backend.
//!
//! Uploaded photos are placed on a trip's map by their EXIF GPS tags.
//! Photos taken close together are grouped into one location, and every
//! location gets a cover photo.

pub mod api;
pub mod config;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod media;
pub mod setup;
