//! JourniTag API server.
//!
//! ## Usage
//!
//! ```bash
//! journitag                          # default config location
//! journitag --config ./journitag.toml
//! ```

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use journitag::config::Config;
use journitag::db::Database;
use journitag::{api, logging};

#[derive(Default)]
struct ServerArgs {
    /// Config path override
    config_path: Option<PathBuf>,
    /// Write logs here when journald is unavailable
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    logging::init(args.log_dir.clone())?;

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("JourniTag {} starting", env!("CARGO_PKG_VERSION"));

    let db = Database::open(&config.database.path)?;
    db.initialize()?;
    drop(db);
    info!("Database ready at {:?}", config.database.path);
    info!("Uploads stored in {:?}", config.uploads.dir);

    api::serve(config).await
}

fn parse_args() -> ServerArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ServerArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--log-dir" => {
                if i + 1 < args.len() {
                    parsed.log_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--version" | "-V" => {
                println!("journitag {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"journitag - Travel photo API server

USAGE:
    journitag [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --log-dir PATH      Log to PATH/journitag.log when journald is unavailable
    --version, -V       Print version
    --help, -h          Show this help message

ENVIRONMENT:
    JOURNITAG_CONFIG    Path to config file (overrides default location)
    JOURNITAG_LOG       Log filter (e.g. info, journitag=debug)

Build with `--features heif` to convert HEIC uploads to JPEG.
Run `journitag-tools validate` to check an installation.
"#
    );
}
