use std::path::Path;

use anyhow::Result;
use comfy_table::*;
use itertools::Itertools;
use subsurface_toolbox_core::timezone::find_marker;
use subsurface_toolbox_core::{Dive, DiveLog, TimeZone};

use super::{FILE_FOLDER, OPEN_BOOK, load_dive_log, step, summary};
use crate::arguments::DiveLogOptions;
use crate::errors::InputError;
use crate::helpers::fs;
use crate::types::Config;

fn read(options: &DiveLogOptions, config: &Config) -> Result<DiveLog> {
    step(1, 2, &OPEN_BOOK, "Reading dive log...");
    load_dive_log(&options.ssrf, config.time_zone(None))
}

fn write(options: &DiveLogOptions, log: &DiveLog) -> Result<()> {
    step(2, 2, &FILE_FOLDER, "Writing dive log...");
    fs::write_output(options.output.as_deref(), &log.to_markup())?;
    Ok(())
}

fn report_computers(fix: &'static str, (eligible, changed): (usize, usize)) -> Result<()> {
    if eligible == 0 {
        return Err(InputError::NothingEligible(fix).into());
    }
    summary(format!("{changed}/{eligible} DCs updated"));
    Ok(())
}

pub(crate) fn fix_salinity(options: &DiveLogOptions, config: &Config) -> Result<()> {
    let mut log = read(options, config)?;
    report_computers("a salinity fix", log.fix_salinity())?;
    write(options, &log)
}

pub(crate) fn fix_serial(options: &DiveLogOptions, config: &Config) -> Result<()> {
    let mut log = read(options, config)?;
    report_computers("a serial number fix", log.fix_serial())?;
    write(options, &log)
}

pub(crate) fn compact(options: &DiveLogOptions, config: &Config) -> Result<()> {
    let mut log = read(options, config)?;
    let removed = log.compact_samples();
    summary(format!("{removed} samples removed"));
    write(options, &log)
}

pub(crate) fn fix_time_zones(
    options: &DiveLogOptions,
    tz: Option<&str>,
    replace: bool,
    config: &Config,
) -> Result<()> {
    let default = match config.time_zone(tz) {
        Some(token) => token.parse()?,
        None => TimeZone::system(),
    };
    let mut log = read(options, config)?;
    let (eligible, changed) = log.fix_time_zones(default.token(), replace)?;
    summary(format!(
        "{changed}/{eligible} sites and dives updated (default {default})"
    ));
    write(options, &log)
}

fn format_duration(seconds: i64) -> String {
    format!("{}:{:02} min", seconds / 60, seconds % 60)
}

/// Tags without the time zone marker.
fn plain_tags(dive: &Dive<'_>) -> String {
    dive.tags()
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && find_marker(tag).is_none())
        .join(", ")
}

fn dive_row(dive: &Dive<'_>) -> Vec<Cell> {
    let (start, time_zone, source) = match (dive.start(), dive.time_zone(), dive.time_zone_source()) {
        (Ok(start), Ok(tz), Ok(source)) => (
            Cell::new(start.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(tz),
            Cell::new(source),
        ),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => (
            Cell::new(e).fg(Color::Red),
            Cell::new(""),
            Cell::new(""),
        ),
    };

    vec![
        Cell::new(dive.number()).set_alignment(CellAlignment::Right),
        start,
        Cell::new(format_duration(dive.duration())),
        Cell::new(format!("{:.1} m", dive.depth().max)).set_alignment(CellAlignment::Right),
        time_zone,
        source,
        Cell::new(dive.site().and_then(|s| s.name().map(str::to_string)).unwrap_or_default()),
        Cell::new(plain_tags(dive)),
    ]
}

pub(crate) fn list_dives(ssrf: &Path, tz: Option<&str>, config: &Config) -> Result<()> {
    let log = load_dive_log(ssrf, config.time_zone(tz))?;

    let mut table = Table::new();
    table
        .load_preset("││──╞═╪╡┆    ┬┴┌┐└┘")
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Start").add_attribute(Attribute::Bold),
            Cell::new("Duration").add_attribute(Attribute::Bold),
            Cell::new("Depth").add_attribute(Attribute::Bold),
            Cell::new("Time Zone").add_attribute(Attribute::Bold),
            Cell::new("Source").add_attribute(Attribute::Bold),
            Cell::new("Site").add_attribute(Attribute::Bold),
            Cell::new("Tags").add_attribute(Attribute::Bold),
        ]);

    for dive in log.dives() {
        table.add_row(dive_row(&dive));
    }

    println!("{table}");
    Ok(())
}
