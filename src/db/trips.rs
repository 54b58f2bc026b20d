use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{unix_now, Database};

#[derive(Debug, Clone, Serialize)]
pub struct Trip {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: i64,
}

impl Trip {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            city: row.get("city")?,
            country: row.get("country")?,
            start_date: row.get("start_date")?,
            end_date: row.get("end_date")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTrip {
    pub user_id: i64,
    pub title: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

pub fn insert(conn: &Connection, trip: &NewTrip) -> Result<Trip> {
    conn.execute(
        r#"
        INSERT INTO Trips (user_id, title, city, country, start_date, end_date, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        rusqlite::params![
            trip.user_id,
            trip.title,
            trip.city,
            trip.country,
            trip.start_date,
            trip.end_date,
            unix_now(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or_else(|| anyhow::anyhow!("Trip {} vanished after insert", id))
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Trip>> {
    let trip = conn
        .query_row("SELECT * FROM Trips WHERE id = ?", [id], Trip::from_row)
        .optional()?;
    Ok(trip)
}

pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Trip>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM Trips WHERE user_id = ? ORDER BY start_date DESC, created_at DESC, id DESC",
    )?;
    let trips = stmt
        .query_map([user_id], Trip::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(trips)
}

impl Database {
    pub fn create_trip(&self, trip: &NewTrip) -> Result<Trip> {
        insert(self.conn(), trip)
    }

    pub fn get_trip(&self, id: i64) -> Result<Option<Trip>> {
        get(self.conn(), id)
    }

    pub fn list_trips_for_user(&self, user_id: i64) -> Result<Vec<Trip>> {
        list_for_user(self.conn(), user_id)
    }
}
