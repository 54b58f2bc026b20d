use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

use super::Database;
use crate::media::GpsCoordinates;

#[derive(Debug, Clone, Serialize)]
pub struct Photo {
    pub id: i64,
    pub location_id: i64,
    pub user_id: i64,
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
    pub file_url: String,
    pub original_filename: String,
    pub taken_at: Option<i64>,
    pub is_cover_photo: bool,
}

impl Photo {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            location_id: row.get("location_id")?,
            user_id: row.get("user_id")?,
            x: row.get("x")?,
            y: row.get("y")?,
            file_url: row.get("file_url")?,
            original_filename: row.get("original_filename")?,
            taken_at: row.get("taken_at")?,
            is_cover_photo: row.get("is_cover_photo")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPhoto<'a> {
    pub location_id: i64,
    pub user_id: i64,
    pub coords: GpsCoordinates,
    pub file_url: &'a str,
    pub original_filename: &'a str,
    pub taken_at: i64,
}

pub fn insert(conn: &Connection, photo: &NewPhoto) -> Result<Photo> {
    conn.execute(
        r#"
        INSERT INTO Photos
            (location_id, user_id, x, y, file_url, original_filename, taken_at, is_cover_photo)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0)
        "#,
        rusqlite::params![
            photo.location_id,
            photo.user_id,
            photo.coords.longitude,
            photo.coords.latitude,
            photo.file_url,
            photo.original_filename,
            photo.taken_at,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or_else(|| anyhow::anyhow!("Photo {} vanished after insert", id))
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Photo>> {
    let photo = conn
        .query_row("SELECT * FROM Photos WHERE id = ?", [id], Photo::from_row)
        .optional()?;
    Ok(photo)
}

pub fn list_for_location(conn: &Connection, location_id: i64) -> Result<Vec<Photo>> {
    let mut stmt = conn.prepare("SELECT * FROM Photos WHERE location_id = ? ORDER BY id")?;
    let photos = stmt
        .query_map([location_id], Photo::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(photos)
}

pub fn has_cover(conn: &Connection, location_id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM Photos WHERE location_id = ? AND is_cover_photo = 1)",
        [location_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Flag a single photo as cover without touching the others.
pub fn mark_cover(conn: &Connection, photo_id: i64) -> Result<()> {
    conn.execute("UPDATE Photos SET is_cover_photo = 1 WHERE id = ?", [photo_id])?;
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM Photos WHERE id = ?", [id])?;
    Ok(deleted > 0)
}

pub fn count_with_file_url(conn: &Connection, file_url: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM Photos WHERE file_url = ?",
        [file_url],
        |row| row.get(0),
    )?;
    Ok(count)
}

impl Database {
    pub fn get_photo(&self, id: i64) -> Result<Option<Photo>> {
        get(self.conn(), id)
    }

    pub fn list_photos_for_location(&self, location_id: i64) -> Result<Vec<Photo>> {
        list_for_location(self.conn(), location_id)
    }

    /// Make `photo` the only cover photo of its location.
    pub fn set_cover_photo(&mut self, photo: &Photo) -> Result<()> {
        let tx = self.begin_immediate()?;
        tx.execute(
            "UPDATE Photos SET is_cover_photo = 0 WHERE location_id = ? AND is_cover_photo = 1",
            [photo.location_id],
        )?;
        mark_cover(&tx, photo.id)?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_photo(&self, id: i64) -> Result<bool> {
        delete(self.conn(), id)
    }

    pub fn count_photos_with_file_url(&self, file_url: &str) -> Result<i64> {
        count_with_file_url(self.conn(), file_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::seeded;

    fn add_photo(db: &Database, location_id: i64, file_url: &str) -> Photo {
        insert(
            db.conn(),
            &NewPhoto {
                location_id,
                user_id: 1,
                coords: GpsCoordinates {
                    latitude: 35.0,
                    longitude: 139.0,
                },
                file_url,
                original_filename: "IMG_0001.jpg",
                taken_at: 1_705_329_000,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_set_cover_keeps_single_cover() {
        let mut db = seeded();
        let (location, _) = db
            .find_or_create_location(
                1,
                &GpsCoordinates {
                    latitude: 35.0,
                    longitude: 139.0,
                },
                0.0005,
            )
            .unwrap();
        let a = add_photo(&db, location.id, "/uploads/photos/a.jpg");
        let b = add_photo(&db, location.id, "/uploads/photos/b.jpg");
        assert!(!a.is_cover_photo);
        assert!(!has_cover(db.conn(), location.id).unwrap());

        db.set_cover_photo(&a).unwrap();
        db.set_cover_photo(&b).unwrap();

        let photos = db.list_photos_for_location(location.id).unwrap();
        let covers: Vec<i64> = photos
            .iter()
            .filter(|p| p.is_cover_photo)
            .map(|p| p.id)
            .collect();
        assert_eq!(covers, vec![b.id]);
    }

    #[test]
    fn test_delete_and_shared_file_count() {
        let db = seeded();
        let (location, _) = db
            .find_or_create_location(
                1,
                &GpsCoordinates {
                    latitude: 35.0,
                    longitude: 139.0,
                },
                0.0005,
            )
            .unwrap();
        let a = add_photo(&db, location.id, "/uploads/photos/same.jpg");
        add_photo(&db, location.id, "/uploads/photos/same.jpg");

        assert_eq!(db.count_photos_with_file_url("/uploads/photos/same.jpg").unwrap(), 2);
        assert!(db.delete_photo(a.id).unwrap());
        assert!(!db.delete_photo(a.id).unwrap());
        assert_eq!(db.count_photos_with_file_url("/uploads/photos/same.jpg").unwrap(), 1);
        assert!(db.get_photo(a.id).unwrap().is_none());
    }
}
