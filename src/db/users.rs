use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{unix_now, Database};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub profile_photo_url: Option<String>,
    pub created_at: i64,
}

impl User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            name: row.get("name")?,
            profile_photo_url: row.get("profile_photo_url")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
}

pub fn insert(conn: &Connection, user: &NewUser) -> Result<User> {
    conn.execute(
        "INSERT INTO Users (email, name, created_at) VALUES (?, ?, ?)",
        rusqlite::params![user.email, user.name, unix_now()],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", id))
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row("SELECT * FROM Users WHERE id = ?", [id], User::from_row)
        .optional()?;
    Ok(user)
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let user = conn
        .query_row("SELECT * FROM Users WHERE email = ?", [email], User::from_row)
        .optional()?;
    Ok(user)
}

impl Database {
    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        insert(self.conn(), user)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        get(self.conn(), id)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        find_by_email(self.conn(), email)
    }
}
