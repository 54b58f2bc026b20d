pub const SCHEMA: &str = r#"
-- Users: trip owners
CREATE TABLE IF NOT EXISTS Users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    profile_photo_url TEXT,
    created_at INTEGER NOT NULL
);

-- Trips group locations
CREATE TABLE IF NOT EXISTS Trips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    city TEXT,
    country TEXT,
    start_date TEXT,
    end_date TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (user_id) REFERENCES Users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_trips_user ON Trips(user_id);

-- Locations: x = longitude, y = latitude
CREATE TABLE IF NOT EXISTS Locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL,
    x REAL NOT NULL,
    y REAL NOT NULL,
    name TEXT NOT NULL,
    address TEXT,
    rating INTEGER,              -- 1-5
    notes TEXT,
    tags TEXT NOT NULL DEFAULT '[]',  -- JSON array
    cost_level TEXT,
    time_needed INTEGER,         -- minutes
    best_time_to_visit TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (trip_id) REFERENCES Trips(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_locations_trip_xy ON Locations(trip_id, x, y);

-- Photos: at most one cover per location, kept by the application
CREATE TABLE IF NOT EXISTS Photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    location_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    x REAL NOT NULL,
    y REAL NOT NULL,
    file_url TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    taken_at INTEGER,
    is_cover_photo INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (location_id) REFERENCES Locations(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES Users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_photos_location ON Photos(location_id);
CREATE INDEX IF NOT EXISTS idx_photos_file_url ON Photos(file_url);

-- Trip sharing links
CREATE TABLE IF NOT EXISTS SharedTrips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL,
    shared_by_user_id INTEGER NOT NULL,
    shared_with_email TEXT NOT NULL,
    share_token TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL,
    expires_at INTEGER,
    FOREIGN KEY (trip_id) REFERENCES Trips(id) ON DELETE CASCADE,
    FOREIGN KEY (shared_by_user_id) REFERENCES Users(id) ON DELETE CASCADE
);
"#;

/// Column additions for databases created before the column existed.
/// Each statement may fail with "duplicate column", which is ignored.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE Locations ADD COLUMN best_time_to_visit TEXT",
    "ALTER TABLE Locations ADD COLUMN time_needed INTEGER",
];

/// Tables a working installation must have.
pub const REQUIRED_TABLES: &[&str] = &["Users", "Trips", "Locations", "Photos", "SharedTrips"];
