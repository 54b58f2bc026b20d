//! Batch photo ingestion.
//!
//! A batch runs inside one IMMEDIATE transaction so location clustering
//! cannot race with a concurrent upload to the same trip. Each file gets
//! its own savepoint: a file that fails after touching the database rolls
//! back alone and is reported as skipped while the rest of the batch
//! proceeds. Cover photos are designated once all files are in.

use anyhow::Result;
use rusqlite::Transaction;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{locations, photos, unix_now, Database, NewPhoto, Photo};
use crate::media::{MetadataExtractor, PhotoStorage, StoredPhoto};

/// One file from a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("file type not allowed")]
    UnsupportedExtension,
    #[error("could not read metadata: {0}")]
    Metadata(String),
    #[error("no GPS data")]
    NoGps,
    #[error("could not store file: {0}")]
    Storage(String),
    #[error("database error: {0}")]
    Database(String),
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub photos: Vec<Photo>,
    pub skipped: Vec<SkippedFile>,
}

pub struct Ingestor<'a> {
    extractor: &'a dyn MetadataExtractor,
    storage: &'a PhotoStorage,
    config: &'a Config,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        extractor: &'a dyn MetadataExtractor,
        storage: &'a PhotoStorage,
        config: &'a Config,
    ) -> Self {
        Self {
            extractor,
            storage,
            config,
        }
    }

    /// Ingest `files` into `trip_id` on behalf of `user_id`.
    ///
    /// Trip existence and ownership are the caller's concern. Per-file
    /// problems end up in `BatchReport::skipped`; an `Err` means the batch
    /// as a whole failed and nothing was committed.
    pub fn ingest_batch(
        &self,
        db: &mut Database,
        trip_id: i64,
        user_id: i64,
        files: &[UploadedFile],
    ) -> Result<BatchReport> {
        let mut tx = db.begin_immediate()?;
        let mut report = BatchReport::default();
        let mut written: Vec<StoredPhoto> = Vec::new();

        for file in files {
            debug!(filename = %file.filename, size = file.bytes.len(), "Processing upload");
            match self.ingest_file(&mut tx, trip_id, user_id, file) {
                Ok((photo, stored)) => {
                    info!(
                        filename = %file.filename,
                        photo_id = photo.id,
                        location_id = photo.location_id,
                        "Stored photo"
                    );
                    written.push(stored);
                    report.photos.push(photo);
                }
                Err(reason) => {
                    warn!(filename = %file.filename, %reason, "Skipping upload");
                    report.skipped.push(SkippedFile {
                        filename: file.filename.clone(),
                        reason,
                    });
                }
            }
        }

        let finished = designate_covers(&tx, &mut report.photos).and_then(|()| {
            tx.commit()?;
            Ok(())
        });
        if let Err(e) = finished {
            for stored in &written {
                self.storage.discard(stored);
            }
            return Err(e);
        }

        info!(
            trip_id,
            uploaded = report.photos.len(),
            skipped = report.skipped.len(),
            "Batch upload finished"
        );
        Ok(report)
    }

    fn ingest_file(
        &self,
        tx: &mut Transaction,
        trip_id: i64,
        user_id: i64,
        file: &UploadedFile,
    ) -> std::result::Result<(Photo, StoredPhoto), SkipReason> {
        if !self.config.uploads.is_allowed(&file.filename) {
            return Err(SkipReason::UnsupportedExtension);
        }

        let metadata = self
            .extractor
            .extract(&file.bytes)
            .map_err(|e| SkipReason::Metadata(format!("{:#}", e)))?;
        let coords = metadata.gps.ok_or(SkipReason::NoGps)?;
        debug!(
            latitude = coords.latitude,
            longitude = coords.longitude,
            "Extracted GPS"
        );

        let savepoint = tx.savepoint().map_err(|e| SkipReason::Database(e.to_string()))?;
        let (location, created) = locations::find_or_create(
            &savepoint,
            trip_id,
            &coords,
            self.config.locations.proximity_threshold,
        )
        .map_err(database_error)?;
        if created {
            info!(location_id = location.id, name = %location.name, "Created location");
        }

        let stored = self
            .storage
            .save(&file.bytes, &file.filename, unix_now())
            .map_err(|e| SkipReason::Storage(format!("{:#}", e)))?;

        let inserted = photos::insert(
            &savepoint,
            &NewPhoto {
                location_id: location.id,
                user_id,
                coords,
                file_url: &stored.file_url,
                original_filename: &file.filename,
                taken_at: metadata.taken_at.unwrap_or_else(unix_now),
            },
        )
        .and_then(|photo| {
            savepoint.commit()?;
            Ok(photo)
        });

        match inserted {
            Ok(photo) => Ok((photo, stored)),
            Err(e) => {
                self.storage.discard(&stored);
                Err(database_error(e))
            }
        }
    }
}

fn database_error(e: anyhow::Error) -> SkipReason {
    SkipReason::Database(format!("{:#}", e))
}

/// Give every location touched by the batch a cover photo if it has none,
/// using the first photo of the batch placed there.
fn designate_covers(tx: &Transaction, uploaded: &mut [Photo]) -> Result<()> {
    let mut seen = HashSet::new();
    for photo in uploaded.iter_mut() {
        if !seen.insert(photo.location_id) {
            continue;
        }
        if !photos::has_cover(tx, photo.location_id)? {
            photos::mark_cover(tx, photo.id)?;
            photo.is_cover_photo = true;
            debug!(photo_id = photo.id, location_id = photo.location_id, "Designated cover photo");
        }
    }
    Ok(())
}
