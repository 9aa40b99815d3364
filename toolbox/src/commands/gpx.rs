use std::path::Path;

use anyhow::Result;
use subsurface_toolbox_core::GpxWriter;
use subsurface_toolbox_core::correlation::{
    dives_to_track, sites_to_track, track_depth, track_to_dive_log,
};

use super::{FILE_FOLDER, OPEN_BOOK, SATELLITE, load_dive_log, load_track, step, summary};
use crate::arguments::{DiveLogOptions, TrackOptions};
use crate::helpers::fs;
use crate::types::Config;

fn write_track(options: &DiveLogOptions, writer: &mut GpxWriter) -> Result<()> {
    let gpx = writer.finish()?;
    fs::write_output(options.output.as_deref(), &gpx)?;
    Ok(())
}

pub(crate) fn dives_gpx(
    options: &DiveLogOptions,
    interval: Option<i64>,
    track: &TrackOptions,
    config: &Config,
) -> Result<()> {
    step(1, 2, &OPEN_BOOK, "Reading dive log...");
    let log = load_dive_log(&options.ssrf, config.time_zone(None))?;
    let interval = interval.unwrap_or(config.dive_track_interval);
    let mut writer = config.writer(track);
    let written = dives_to_track(&log, interval, &mut writer)?;

    step(2, 2, &FILE_FOLDER, "Writing GPS track...");
    write_track(options, &mut writer)?;
    summary(format!("{written}/{} dives written", log.dives().len()));
    Ok(())
}

pub(crate) fn sites_gpx(options: &DiveLogOptions, config: &Config) -> Result<()> {
    step(1, 2, &OPEN_BOOK, "Reading dive log...");
    let log = load_dive_log(&options.ssrf, config.time_zone(None))?;
    let mut writer = GpxWriter::new(false, false);
    let written = sites_to_track(&log, &mut writer);

    step(2, 2, &FILE_FOLDER, "Writing waypoints...");
    write_track(options, &mut writer)?;
    summary(format!("{written} sites written"));
    Ok(())
}

pub(crate) fn merge_gpx(options: &DiveLogOptions, gpx: &Path, config: &Config) -> Result<()> {
    step(1, 3, &OPEN_BOOK, "Reading dive log...");
    let mut log = load_dive_log(&options.ssrf, config.time_zone(None))?;

    step(2, 3, &SATELLITE, "Locating dives along the GPS track...");
    let track = load_track(gpx)?;
    let (located, waypoints) = track_to_dive_log(&track, &mut log)?;

    step(3, 3, &FILE_FOLDER, "Writing dive log...");
    fs::write_output(options.output.as_deref(), &log.to_markup())?;
    summary(format!("{located} dives located, {waypoints} waypoints matched"));
    Ok(())
}

pub(crate) fn gpx_depth(
    options: &DiveLogOptions,
    gpx: &Path,
    track: &TrackOptions,
    config: &Config,
) -> Result<()> {
    step(1, 3, &OPEN_BOOK, "Reading dive log...");
    let log = load_dive_log(&options.ssrf, config.time_zone(None))?;

    step(2, 3, &SATELLITE, "Applying dive depths to the GPS track...");
    let reader = load_track(gpx)?;
    let mut writer = config.writer(track);
    let adjusted = track_depth(&reader, &log, &mut writer)?;

    step(3, 3, &FILE_FOLDER, "Writing GPS track...");
    write_track(options, &mut writer)?;
    summary(format!("{adjusted} track points adjusted"));
    Ok(())
}
