use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{unix_now, Database};
use crate::media::GpsCoordinates;

/// Accepted values for `Location::cost_level`.
pub const COST_LEVELS: &[&str] = &["Free", "$", "$$", "$$$", "$-$$", "$$-$$$"];

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub id: i64,
    pub trip_id: i64,
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
    pub name: String,
    pub address: Option<String>,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub cost_level: Option<String>,
    pub time_needed: Option<i64>,
    pub best_time_to_visit: Option<String>,
    pub created_at: i64,
}

impl Location {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let tags: String = row.get("tags")?;
        Ok(Self {
            id: row.get("id")?,
            trip_id: row.get("trip_id")?,
            x: row.get("x")?,
            y: row.get("y")?,
            name: row.get("name")?,
            address: row.get("address")?,
            rating: row.get("rating")?,
            notes: row.get("notes")?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            cost_level: row.get("cost_level")?,
            time_needed: row.get("time_needed")?,
            best_time_to_visit: row.get("best_time_to_visit")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A location as listed under its trip.
#[derive(Debug, Clone, Serialize)]
pub struct LocationSummary {
    #[serde(flatten)]
    pub location: Location,
    pub photo_count: i64,
    pub cover_photo_url: Option<String>,
}

/// Partial update of the user-editable location fields. Absent fields are
/// left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cost_level: Option<String>,
    pub time_needed: Option<i64>,
    pub best_time_to_visit: Option<String>,
}

impl LocationUpdate {
    /// Check field ranges, returning a message for the first bad one.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(format!("rating must be between 1 and 5, got {}", rating));
            }
        }
        if let Some(ref cost) = self.cost_level {
            if !COST_LEVELS.contains(&cost.as_str()) {
                return Err(format!("invalid cost_level {:?}", cost));
            }
        }
        if let Some(minutes) = self.time_needed {
            if minutes < 0 {
                return Err("time_needed must not be negative".to_string());
            }
        }
        if let Some(ref name) = self.name {
            if name.trim().is_empty() {
                return Err("name must not be empty".to_string());
            }
        }
        Ok(())
    }

    fn apply(self, location: &mut Location) {
        if let Some(name) = self.name {
            location.name = name;
        }
        if self.address.is_some() {
            location.address = self.address;
        }
        if self.rating.is_some() {
            location.rating = self.rating;
        }
        if self.notes.is_some() {
            location.notes = self.notes;
        }
        if let Some(tags) = self.tags {
            location.tags = tags;
        }
        if self.cost_level.is_some() {
            location.cost_level = self.cost_level;
        }
        if self.time_needed.is_some() {
            location.time_needed = self.time_needed;
        }
        if self.best_time_to_visit.is_some() {
            location.best_time_to_visit = self.best_time_to_visit;
        }
    }
}

/// Name given to locations created from photo coordinates.
pub fn default_name(coords: &GpsCoordinates) -> String {
    format!("Location at ({:.4}, {:.4})", coords.latitude, coords.longitude)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Location>> {
    let location = conn
        .query_row("SELECT * FROM Locations WHERE id = ?", [id], Location::from_row)
        .optional()?;
    Ok(location)
}

/// Oldest location of the trip inside the axis-aligned box of half-width
/// `threshold` degrees around `coords`.
pub fn find_near(
    conn: &Connection,
    trip_id: i64,
    coords: &GpsCoordinates,
    threshold: f64,
) -> Result<Option<Location>> {
    let location = conn
        .query_row(
            r#"
            SELECT * FROM Locations
            WHERE trip_id = ?
              AND x BETWEEN ? AND ?
              AND y BETWEEN ? AND ?
            ORDER BY id
            LIMIT 1
            "#,
            rusqlite::params![
                trip_id,
                coords.longitude - threshold,
                coords.longitude + threshold,
                coords.latitude - threshold,
                coords.latitude + threshold,
            ],
            Location::from_row,
        )
        .optional()?;
    Ok(location)
}

pub fn insert(
    conn: &Connection,
    trip_id: i64,
    coords: &GpsCoordinates,
    name: &str,
    address: Option<&str>,
) -> Result<Location> {
    conn.execute(
        r#"
        INSERT INTO Locations (trip_id, x, y, name, address, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        rusqlite::params![trip_id, coords.longitude, coords.latitude, name, address, unix_now()],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or_else(|| anyhow::anyhow!("Location {} vanished after insert", id))
}

/// Return the trip's location near `coords`, creating one if there is none.
///
/// The second element is true when the location was created. Callers that
/// may race with other writers must run this inside an IMMEDIATE
/// transaction (see `Database::begin_immediate`).
pub fn find_or_create(
    conn: &Connection,
    trip_id: i64,
    coords: &GpsCoordinates,
    threshold: f64,
) -> Result<(Location, bool)> {
    if let Some(existing) = find_near(conn, trip_id, coords, threshold)? {
        return Ok((existing, false));
    }
    let created = insert(conn, trip_id, coords, &default_name(coords), None)?;
    Ok((created, true))
}

pub fn list_for_trip(conn: &Connection, trip_id: i64) -> Result<Vec<LocationSummary>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT l.*,
               (SELECT COUNT(*) FROM Photos p WHERE p.location_id = l.id) AS photo_count,
               (SELECT p.file_url FROM Photos p
                 WHERE p.location_id = l.id AND p.is_cover_photo = 1
                 LIMIT 1) AS cover_photo_url
        FROM Locations l
        WHERE l.trip_id = ?
        ORDER BY l.created_at, l.id
        "#,
    )?;
    let summaries = stmt
        .query_map([trip_id], |row| {
            Ok(LocationSummary {
                location: Location::from_row(row)?,
                photo_count: row.get("photo_count")?,
                cover_photo_url: row.get("cover_photo_url")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(summaries)
}

pub fn update(conn: &Connection, id: i64, changes: LocationUpdate) -> Result<Option<Location>> {
    let Some(mut location) = get(conn, id)? else {
        return Ok(None);
    };
    changes.apply(&mut location);

    conn.execute(
        r#"
        UPDATE Locations
        SET name = ?, address = ?, rating = ?, notes = ?, tags = ?,
            cost_level = ?, time_needed = ?, best_time_to_visit = ?
        WHERE id = ?
        "#,
        rusqlite::params![
            location.name,
            location.address,
            location.rating,
            location.notes,
            serde_json::to_string(&location.tags)?,
            location.cost_level,
            location.time_needed,
            location.best_time_to_visit,
            id,
        ],
    )?;
    Ok(Some(location))
}

impl Database {
    pub fn get_location(&self, id: i64) -> Result<Option<Location>> {
        get(self.conn(), id)
    }

    pub fn find_or_create_location(
        &self,
        trip_id: i64,
        coords: &GpsCoordinates,
        threshold: f64,
    ) -> Result<(Location, bool)> {
        find_or_create(self.conn(), trip_id, coords, threshold)
    }

    pub fn list_locations_for_trip(&self, trip_id: i64) -> Result<Vec<LocationSummary>> {
        list_for_trip(self.conn(), trip_id)
    }

    pub fn update_location(&self, id: i64, changes: LocationUpdate) -> Result<Option<Location>> {
        update(self.conn(), id, changes)
    }
}
