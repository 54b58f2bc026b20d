//! Installation checks run by `journitag-tools validate`.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::db::{Database, REQUIRED_TABLES};
use crate::media::heic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct CheckLine {
    pub status: Status,
    pub message: String,
    /// Suggested fix, shown under errors and warnings
    pub hint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub name: &'static str,
    pub lines: Vec<CheckLine>,
}

impl CheckReport {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            lines: Vec::new(),
        }
    }

    fn ok(&mut self, message: impl Into<String>) {
        self.push(Status::Ok, message, None);
    }

    fn warn(&mut self, message: impl Into<String>, hint: Option<String>) {
        self.push(Status::Warning, message, hint);
    }

    fn error(&mut self, message: impl Into<String>, hint: Option<String>) {
        self.push(Status::Error, message, hint);
    }

    fn push(&mut self, status: Status, message: impl Into<String>, hint: Option<String>) {
        self.lines.push(CheckLine {
            status,
            message: message.into(),
            hint,
        });
    }

    pub fn passed(&self) -> bool {
        self.lines.iter().all(|line| line.status != Status::Error)
    }
}

pub fn run_all(config: &Config) -> Vec<CheckReport> {
    vec![
        check_directories(config),
        check_configuration(config),
        check_database(config),
        check_heic_support(config),
    ]
}

pub fn check_directories(config: &Config) -> CheckReport {
    let mut report = CheckReport::new("Directories");

    let upload_dir = &config.uploads.dir;
    if upload_dir.is_dir() {
        report.ok(format!("Upload directory exists: {}", upload_dir.display()));
        if is_writable(upload_dir) {
            report.ok("Upload directory is writable");
        } else {
            report.error(
                "Upload directory is not writable",
                Some(format!("Check permissions on {}", upload_dir.display())),
            );
        }
    } else {
        report.warn(
            format!("Upload directory missing: {}", upload_dir.display()),
            Some("It is created when the server starts".to_string()),
        );
    }

    match config.database.path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => report.warn(
            format!("Database directory missing: {}", parent.display()),
            Some("Run: journitag-tools init-db".to_string()),
        ),
        _ => report.ok("Database directory exists"),
    }

    report
}

fn is_writable(dir: &Path) -> bool {
    let probe = dir.join(".journitag-write-test");
    let writable = fs::write(&probe, b"").is_ok();
    let _ = fs::remove_file(&probe);
    writable
}

pub fn check_configuration(config: &Config) -> CheckReport {
    let mut report = CheckReport::new("Configuration");

    let max = config.uploads.max_content_length;
    if max == 0 {
        report.error(
            "uploads.max_content_length is 0",
            Some("Set a limit such as 33554432 (32MB)".to_string()),
        );
    } else {
        report.ok(format!("Max upload size: {}MB", max / (1024 * 1024)));
    }

    if config.uploads.allowed_extensions.is_empty() {
        report.error(
            "uploads.allowed_extensions is empty; every upload would be skipped",
            None,
        );
    } else {
        report.ok(format!(
            "Allowed extensions: {}",
            config.uploads.allowed_extensions.join(", ")
        ));
    }

    let threshold = config.locations.proximity_threshold;
    if threshold.is_finite() && threshold > 0.0 && threshold < 1.0 {
        report.ok(format!("Location proximity threshold: {}°", threshold));
    } else {
        report.error(
            format!("locations.proximity_threshold out of range: {}", threshold),
            Some("Use a small positive value; 0.0005 is about 50m".to_string()),
        );
    }

    if config.uploads.url_prefix.trim_end_matches('/').starts_with('/') {
        report.ok(format!("Photos served under {}", config.uploads.url_prefix));
    } else {
        report.warn(
            format!("uploads.url_prefix {:?} is not an absolute path", config.uploads.url_prefix),
            Some("Use a value like /uploads/photos".to_string()),
        );
    }

    report.ok(format!("Listen address: {}", config.listen_addr()));
    report
}

pub fn check_database(config: &Config) -> CheckReport {
    let mut report = CheckReport::new("Database");
    let path = &config.database.path;

    if !path.exists() {
        report.error(
            format!("Database not found: {}", path.display()),
            Some("Run: journitag-tools init-db".to_string()),
        );
        return report;
    }
    report.ok(format!("Database file: {}", path.display()));

    let tables = match Database::open(path).and_then(|db| db.list_tables()) {
        Ok(tables) => tables,
        Err(e) => {
            report.error(format!("Cannot open database: {:#}", e), None);
            return report;
        }
    };

    for required in REQUIRED_TABLES {
        if tables.iter().any(|t| t == required) {
            report.ok(format!("Table {} present", required));
        } else {
            report.error(
                format!("Table {} missing", required),
                Some("Run: journitag-tools init-db".to_string()),
            );
        }
    }
    report
}

pub fn check_heic_support(config: &Config) -> CheckReport {
    let mut report = CheckReport::new("HEIC support");
    if !config.uploads.convert_heic {
        report.ok("HEIC conversion disabled; HEIC uploads are stored as-is");
    } else if heic::SUPPORTED {
        report.ok("HEIC uploads are converted to JPEG");
    } else {
        report.warn(
            "Built without HEIC decoding; HEIC uploads are stored unconverted",
            Some("Rebuild with: cargo build --features heif (needs libheif)".to_string()),
        );
    }
    report
}
