use std::path::Path;

use anyhow::{Context, Result};
use console::{Emoji, style};
use subsurface_toolbox_core::{DiveLog, GpxReader};

use crate::helpers::fs;

pub mod divelog;
pub mod fusion;
pub mod gpx;

static OPEN_BOOK: Emoji<'_, '_> = Emoji("📖  ", "");
static SATELLITE: Emoji<'_, '_> = Emoji("🛰️   ", "");
static FILE_FOLDER: Emoji<'_, '_> = Emoji("📂  ", "");

/// Progress goes to stderr, stdout may carry the command's output.
fn step(position: usize, total: usize, emoji: &Emoji<'_, '_>, message: &str) {
    eprintln!(
        "{} {}{}",
        style(format!("[{position}/{total}]")).bold().dim(),
        emoji,
        message
    );
}

fn summary(message: String) {
    eprintln!("{}", style(message).green());
}

pub(crate) fn load_dive_log(path: &Path, time_zone: Option<&str>) -> Result<DiveLog> {
    let mut log = DiveLog::parse(&fs::read_text(path)?)
        .with_context(|| format!("Failed to load dive log `{}`", path.display()))?;
    if let Some(time_zone) = time_zone {
        log.set_default_time_zone(time_zone)?;
    }
    tracing::debug!(path = %path.display(), dives = log.dives().len(), "Loaded dive log");
    Ok(log)
}

pub(crate) fn load_track(path: &Path) -> Result<GpxReader> {
    GpxReader::parse(&fs::read_text(path)?)
        .with_context(|| format!("Failed to load GPS track `{}`", path.display()))
}
