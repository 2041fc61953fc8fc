//! Summary of a meteorological resource: format, validity, geometry and fields.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meteo_common::{EngineConfig, OpenMode};
use resources::{resource, Format, FormatResource};

#[derive(Parser, Debug)]
#[command(name = "meteo-what")]
#[command(about = "Describe the contents of an FA, LFI, LFA, GRIB2 or netCDF file")]
struct Args {
    /// File to describe
    path: PathBuf,

    /// Format of the file (guessed when absent): FA, LFI, LFA, GRIB2, netCDF, netCDFMNH
    #[arg(short, long)]
    format: Option<String>,

    /// Group fields by kind instead of listing them in file order
    #[arg(short, long)]
    sort: bool,

    /// Print the first field matching this pattern as well
    #[arg(long)]
    field: Option<String>,

    /// Engine configuration file (default: $CONFIG_DIR/engine.yaml)
    #[arg(long, env = "METEO_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if let Some(path) = &args.config {
        let config = EngineConfig::load_from(path)
            .with_context(|| format!("Failed to load engine configuration {}", path.display()))?;
        EngineConfig::install(config);
    }

    let format = args
        .format
        .as_deref()
        .map(str::parse::<Format>)
        .transpose()
        .context("Invalid format")?;

    let mut r = resource(&args.path, OpenMode::Read, format)
        .with_context(|| format!("Failed to open {}", args.path.display()))?;
    info!(path = %args.path.display(), format = %r.format(), "Describing resource");

    println!("{}", r.what(args.sort)?);

    if let Some(pattern) = &args.field {
        let fids = r.find_fields_in_resource(&pattern.as_str().into(), &[])?;
        if let Some(fid) = fids.first() {
            let field = r.readfield(fid)?;
            println!("{}", field.what());
        }
    }

    r.close()?;
    Ok(())
}
