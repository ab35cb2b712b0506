use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use satndvi::collect::earth_engine::{EarthEngineConfig, EarthEngineConnector};
use satndvi::collect::global_variables::{
    DEFAULT_LOG_LEVEL, DEFAULT_SCALE, DEFAULT_WORKERS, TIFF_DIR_NAME,
};
use satndvi::collect::nominatim::{GeoJsonFileResolver, NominatimConfig, NominatimResolver};
use satndvi::collect::{BoundaryResolver, SessionFactory};
use satndvi::commons::basic_functions::MIN_YEAR;
use satndvi::geometric::time_series::NdviTimeSeries;
use satndvi::render;

/// Yearly NDVI of a place from Landsat surface reflectance, as GeoTIFFs, a GIF and a trend plot
#[derive(Parser, Debug)]
#[command(name = "satndvi", version, about)]
struct Cli {
    /// Place to geocode, e.g. "Lyon, France"
    city_name: String,

    /// First year, inclusive
    start_year: i32,

    /// Last year, inclusive
    end_year: i32,

    /// Outputs go to <output_dir>/<city_name>/
    output_dir: PathBuf,

    /// Years processed concurrently
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// TRACE, DEBUG, INFO, WARN or ERROR; RUST_LOG wins when set
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, value_parser = parse_level)]
    log_level: Level,

    /// Export resolution in metres per pixel
    #[arg(long, default_value_t = DEFAULT_SCALE)]
    scale: u32,

    /// Earth Engine cloud project (defaults to $EE_PROJECT_NAME)
    #[arg(long)]
    project: Option<String>,

    /// GeoJSON file holding the boundary, instead of asking Nominatim
    #[arg(long)]
    boundary: Option<PathBuf>,

    /// Only export the GeoTIFFs
    #[arg(long)]
    skip_render: bool,
}

fn parse_level(s: &str) -> std::result::Result<Level, String> {
    Level::from_str(s).map_err(|_| format!("unknown log level '{}'", s))
}

fn init_logging(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

impl Cli {
    fn validate(&self) -> Result<()> {
        if self.start_year < MIN_YEAR {
            bail!("start year {} is before year {}", self.start_year, MIN_YEAR);
        }
        if self.start_year > self.end_year {
            bail!(
                "start year {} is after end year {}",
                self.start_year,
                self.end_year
            );
        }
        if self.workers == 0 {
            bail!("--workers must be at least 1");
        }
        if self.scale == 0 {
            bail!("--scale must be at least 1");
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    cli.validate()?;

    let city_dir = cli.output_dir.join(&cli.city_name);
    let tiff_dir = city_dir.join(TIFF_DIR_NAME);
    std::fs::create_dir_all(&tiff_dir)
        .with_context(|| format!("Failed to create {}", tiff_dir.display()))?;

    let roi = match cli.boundary {
        Some(ref path) => GeoJsonFileResolver::new(path).resolve(&cli.city_name),
        None => {
            let config = NominatimConfig::from_env()?;
            NominatimResolver::new(config)?.resolve(&cli.city_name)
        }
    }
    .with_context(|| format!("Failed to resolve the boundary of '{}'", cli.city_name))?;

    let config = EarthEngineConfig::from_env(cli.project.clone())?;
    let connector = EarthEngineConnector::new(config);
    // Fail before spawning workers when credentials are missing
    connector
        .connect()
        .context("Failed to open an Earth Engine session")?;

    let mut series = NdviTimeSeries::new(roi, &tiff_dir);
    series.set_years(cli.start_year, cli.end_year);
    series.set_scale(cli.scale);
    series.set_workers(cli.workers);
    let report = series.run(&connector)?;

    let failures = report.failures();
    for (year, err) in &failures {
        error!(year, error = %err, "no NDVI for this year");
    }
    if !failures.is_empty() {
        bail!(
            "{} of {} years failed, see {} for the years that succeeded",
            failures.len(),
            series.get_years().len(),
            tiff_dir.display()
        );
    }

    if cli.skip_render {
        info!(dir = %tiff_dir.display(), "done, rendering skipped");
        return Ok(());
    }

    let outputs = render::render_all(&tiff_dir, &city_dir, &cli.city_name)?;
    info!(
        gif = %outputs.gif.display(),
        plot = %outputs.plot.display(),
        frames = outputs.frames,
        "done"
    );
    Ok(())
}
