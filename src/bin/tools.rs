//! Operator tools for JourniTag.
//!
//! ```bash
//! journitag-tools validate
//! journitag-tools init-db
//! journitag-tools check-gps IMG_0001.jpg
//! journitag-tools add-gps in.jpg out.jpg --location shinjuku
//! journitag-tools add-gps in.png out.jpg --lat 35.6595 --lon 139.7004 --altitude 40
//! ```

use anyhow::{bail, Context, Result};
use crossterm::style::Stylize;
use std::path::{Path, PathBuf};

use journitag::config::Config;
use journitag::db::Database;
use journitag::logging;
use journitag::media::geotag::{self, GeoTag, PRESET_LOCATIONS};
use journitag::media::metadata::{self, ExifExtractor, MetadataExtractor};
use journitag::setup::{self, Status};

enum Command {
    Validate,
    InitDb,
    CheckGps(PathBuf),
    AddGps(AddGpsArgs),
}

struct AddGpsArgs {
    input: PathBuf,
    output: PathBuf,
    latitude: Option<f64>,
    longitude: Option<f64>,
    location: Option<String>,
    altitude: Option<f64>,
    make: String,
    model: String,
}

struct ToolArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn main() {
    if let Err(e) = logging::init_stderr() {
        eprintln!("{:#}", e);
    }

    let code = match parse_args().and_then(run) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            1
        }
    };
    std::process::exit(code);
}

fn run(args: ToolArgs) -> Result<i32> {
    let load_config = || match &args.config_path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    match &args.command {
        Command::Validate => validate(&load_config()?),
        Command::InitDb => init_db(&load_config()?),
        Command::CheckGps(path) => check_gps(path),
        Command::AddGps(add) => add_gps(add),
    }
}

fn validate(config: &Config) -> Result<i32> {
    println!("{}", "JourniTag installation check".bold());
    let reports = setup::run_all(config);

    for report in &reports {
        println!();
        println!("{}", format!("== {} ==", report.name).cyan());
        for line in &report.lines {
            let marker = match line.status {
                Status::Ok => "✓".green(),
                Status::Warning => "⚠".yellow(),
                Status::Error => "✗".red(),
            };
            println!("  {} {}", marker, line.message);
            if let Some(hint) = &line.hint {
                println!("      {}", hint.as_str().dim());
            }
        }
    }

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| !r.passed())
        .map(|r| r.name)
        .collect();
    println!();
    if failed.is_empty() {
        println!("{} all checks passed", "PASSED:".green().bold());
        Ok(0)
    } else {
        println!("{} {}", "FAILED:".red().bold(), failed.join(", "));
        Ok(1)
    }
}

fn init_db(config: &Config) -> Result<i32> {
    let path = &config.database.path;
    let db = Database::open(path)?;
    db.initialize()?;
    println!("{} Database initialized at {}", "✓".green(), path.display());
    for table in db.list_tables()? {
        println!("    {}", table);
    }
    Ok(0)
}

fn check_gps(path: &Path) -> Result<i32> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let inspection = metadata::inspect(&bytes);

    println!("{}", path.display().to_string().bold());
    println!("  Size:       {} bytes", bytes.len());
    if let Some(format) = &inspection.format {
        println!("  Format:     {}", format);
    }
    if let Some((width, height)) = inspection.dimensions {
        println!("  Dimensions: {}x{}", width, height);
    }

    if let Some(err) = &inspection.exif_error {
        println!("  {} {}", "✗".red(), err);
        return Ok(1);
    }

    println!();
    let field_count = inspection.exif_fields.len() + inspection.gps_fields.len();
    println!("{} ({} fields)", "EXIF".cyan(), field_count);
    for (tag, value) in &inspection.exif_fields {
        println!("  {:<28} {}", tag, value);
    }

    println!();
    println!("{}", "GPS".cyan());
    if inspection.gps_fields.is_empty() {
        println!("  {} No GPS tags", "✗".red());
    }
    for (tag, value) in &inspection.gps_fields {
        println!("  {:<28} {}", tag, value);
    }

    match ExifExtractor.extract(&bytes).ok().and_then(|m| m.gps) {
        Some(gps) => {
            println!();
            println!(
                "  {} Coordinates: {:.6}, {:.6}",
                "✓".green(),
                gps.latitude,
                gps.longitude
            );
            println!(
                "    https://www.google.com/maps?q={:.6},{:.6}",
                gps.latitude, gps.longitude
            );
            Ok(0)
        }
        None => {
            println!("  {} This photo would be skipped on upload", "✗".red());
            Ok(1)
        }
    }
}

fn add_gps(args: &AddGpsArgs) -> Result<i32> {
    let (latitude, longitude) = match (&args.location, args.latitude, args.longitude) {
        (Some(name), _, _) => geotag::preset(name).with_context(|| {
            let names: Vec<&str> = PRESET_LOCATIONS.iter().map(|(n, _, _)| *n).collect();
            format!("Unknown location {:?}; known: {}", name, names.join(", "))
        })?,
        (None, Some(lat), Some(lon)) => (lat, lon),
        _ => bail!("add-gps needs --lat and --lon, or --location NAME"),
    };

    let input = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let mut tag = GeoTag::new(latitude, longitude);
    tag.altitude = args.altitude;
    tag.make = Some(args.make.clone());
    tag.model = Some(args.model.clone());

    let tagged = geotag::tag_photo(&input, &tag)?;
    std::fs::write(&args.output, &tagged)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "{} Wrote {} with GPS {:.6}, {:.6}",
        "✓".green(),
        args.output.display(),
        latitude,
        longitude
    );

    match ExifExtractor.extract(&tagged).ok().and_then(|m| m.gps) {
        Some(gps) => {
            println!("  Read back: {:.6}, {:.6}", gps.latitude, gps.longitude);
            Ok(0)
        }
        None => {
            println!("  {} GPS could not be read back", "✗".red());
            Ok(1)
        }
    }
}

fn parse_args() -> Result<ToolArgs> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();
    let mut latitude = None;
    let mut longitude = None;
    let mut location = None;
    let mut altitude = None;
    let mut make = "Apple".to_string();
    let mut model = "iPhone 13 Pro".to_string();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(flag_value(&args, i)?));
                i += 1;
            }
            "--lat" => {
                latitude = Some(parse_number(flag_value(&args, i)?, "--lat")?);
                i += 1;
            }
            "--lon" => {
                longitude = Some(parse_number(flag_value(&args, i)?, "--lon")?);
                i += 1;
            }
            "--altitude" => {
                altitude = Some(parse_number(flag_value(&args, i)?, "--altitude")?);
                i += 1;
            }
            "--location" => {
                location = Some(flag_value(&args, i)?.to_string());
                i += 1;
            }
            "--make" => {
                make = flag_value(&args, i)?.to_string();
                i += 1;
            }
            "--model" => {
                model = flag_value(&args, i)?.to_string();
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if arg.starts_with('-') => {
                print_help();
                bail!("Unknown argument: {}", arg);
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("validate") => Command::Validate,
        Some("init-db") => Command::InitDb,
        Some("check-gps") => match positional.get(1) {
            Some(path) => Command::CheckGps(PathBuf::from(path)),
            None => bail!("check-gps needs a FILE"),
        },
        Some("add-gps") => match (positional.get(1), positional.get(2)) {
            (Some(input), Some(output)) => Command::AddGps(AddGpsArgs {
                input: PathBuf::from(input),
                output: PathBuf::from(output),
                latitude,
                longitude,
                location,
                altitude,
                make,
                model,
            }),
            _ => bail!("add-gps needs INPUT and OUTPUT"),
        },
        Some(other) => {
            print_help();
            bail!("Unknown command: {}", other);
        }
        None => {
            print_help();
            std::process::exit(1);
        }
    };

    Ok(ToolArgs {
        config_path,
        command,
    })
}

fn flag_value(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{} needs a value", args[i]))
}

fn parse_number(value: &str, flag: &str) -> Result<f64> {
    value
        .parse()
        .with_context(|| format!("{} expects a number, got {:?}", flag, value))
}

fn print_help() {
    let presets: Vec<&str> = PRESET_LOCATIONS.iter().map(|(n, _, _)| *n).collect();
    println!(
        r#"journitag-tools - JourniTag maintenance commands

USAGE:
    journitag-tools [--config PATH] <COMMAND>

COMMANDS:
    validate                      Check directories, configuration and database
    init-db                       Create or migrate the database schema
    check-gps FILE                Show EXIF and GPS data of a photo
    add-gps INPUT OUTPUT [OPTS]   Write GPS tags into a copy of a photo

ADD-GPS OPTIONS:
    --lat DEG --lon DEG           Coordinates in decimal degrees
    --location NAME               Preset: {}
    --altitude M                  Altitude in metres
    --make TEXT                   Camera make (default: Apple)
    --model TEXT                  Camera model (default: iPhone 13 Pro)

OPTIONS:
    --config, -c PATH             Path to config file
    --help, -h                    Show this help message
"#,
        presets.join(", ")
    );
}
