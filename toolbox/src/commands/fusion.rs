use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use subsurface_toolbox_core::TimeZone;
use subsurface_toolbox_core::correlation::fuse;

use super::{FILE_FOLDER, OPEN_BOOK, load_dive_log, load_track, step, summary};
use crate::arguments::FusionOptions;
use crate::errors::InputError;
use crate::helpers::fs;
use crate::types::Config;

/// Local date formats, the second one as cameras write it in EXIF.
const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y:%m:%d %H:%M:%S"];

fn parse_date(value: &str, time_zone: &TimeZone) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&Utc));
    }
    LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())?
        .and_local_timezone(time_zone.offset())
        .single()
        .map(|instant| instant.with_timezone(&Utc))
}

/// One instant per line; blank lines and `#` comments are skipped.
fn parse_dates(text: &str, time_zone: &TimeZone) -> Result<Vec<DateTime<Utc>>, InputError> {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, value)| {
            parse_date(value, time_zone).ok_or_else(|| InputError::InvalidDate {
                line,
                value: value.to_string(),
            })
        })
        .collect()
}

pub(crate) fn date_fusion(options: &FusionOptions, config: &Config) -> Result<()> {
    if options.ssrf.is_none() && options.gpx.is_none() {
        return Err(InputError::NoSources.into());
    }
    let token = config.time_zone(options.tz.as_deref());
    let time_zone = match token {
        Some(token) => token.parse()?,
        None => TimeZone::system(),
    };

    step(1, 2, &OPEN_BOOK, "Reading dates, dive log and GPS track...");
    let dates = parse_dates(&fs::read_text(&options.dates)?, &time_zone)?;
    let log = options
        .ssrf
        .as_deref()
        .map(|path| load_dive_log(path, token))
        .transpose()?;
    let track = options.gpx.as_deref().map(load_track).transpose()?;

    step(2, 2, &FILE_FOLDER, "Writing records...");
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(fs::output_writer(options.output.as_deref())?);
    let mut located = 0;
    for instant in &dates {
        let record = fuse(*instant, track.as_ref(), log.as_ref())?;
        if record.has_position() {
            located += 1;
        }
        wtr.serialize(&record)?;
    }
    wtr.flush()?;

    summary(format!("{located}/{} dates located", dates.len()));
    Ok(())
}

#[cfg(test)]
mod test {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn test_parse_dates() {
        let time_zone: TimeZone = "-0300".parse().unwrap();
        let dates = parse_dates(
            "# photos\n2023-01-01T10:00:00Z\n\n2023-01-01 08:00:00\n2023:01:01 07:30:00\n",
            &time_zone,
        )
        .unwrap();
        assert_eq!(
            dates,
            vec![
                Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2023, 1, 1, 11, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2023, 1, 1, 10, 30, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_invalid_date() {
        let error = parse_dates("2023-01-01T10:00:00Z\nyesterday\n", &TimeZone::utc()).unwrap_err();
        assert!(matches!(error, InputError::InvalidDate { line: 2, .. }));
    }
}
