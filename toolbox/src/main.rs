use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod arguments;
mod commands;
mod errors;
mod helpers;
mod types;

use arguments::{Cli, Commands};

fn setup_logging(verbose: u8) -> Result<()> {
    let log_level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // Logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(Targets::default().with_default(Level::TRACE)),
        )
        .with(
            Targets::default()
                .with_target("subsurface_toolbox", log_level)
                .with_target("subsurface_toolbox_core", log_level),
        )
        .try_init()?;

    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(args.verbose)?;
    let config = args.config()?;

    match &args.command {
        Commands::FixSalinity(options) => commands::divelog::fix_salinity(options, &config)?,
        Commands::FixSerial(options) => commands::divelog::fix_serial(options, &config)?,
        Commands::Compact(options) => commands::divelog::compact(options, &config)?,
        Commands::Timezone {
            options,
            tz,
            replace,
        } => commands::divelog::fix_time_zones(options, tz.as_deref(), *replace, &config)?,
        Commands::Dives { ssrf, tz } => {
            commands::divelog::list_dives(ssrf, tz.as_deref(), &config)?
        }
        Commands::DivesGpx {
            options,
            interval,
            track,
        } => commands::gpx::dives_gpx(options, *interval, track, &config)?,
        Commands::SitesGpx(options) => commands::gpx::sites_gpx(options, &config)?,
        Commands::MergeGpx { options, gpx } => commands::gpx::merge_gpx(options, gpx, &config)?,
        Commands::GpxDepth {
            options,
            gpx,
            track,
        } => commands::gpx::gpx_depth(options, gpx, track, &config)?,
        Commands::DateFusion(options) => commands::fusion::date_fusion(options, &config)?,
    }

    Ok(())
}
