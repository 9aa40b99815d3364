//! Cross references between a dive log and a GPS track, matched by time.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument};

use crate::divelog::{Dive, DiveLog};
use crate::errors::{CorrelationError, DiveLogError};
use crate::geomath::Point;
use crate::gpx::{GpxReader, GpxWriter};
use crate::utils::round;

/// Everything known about one instant, in the column layout photo taggers
/// expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedRecord {
    #[serde(rename = "DateTime", serialize_with = "serialize_instant")]
    pub instant: DateTime<Utc>,
    #[serde(rename = "GPSLatitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "GPSLongitude")]
    pub longitude: Option<f64>,
    #[serde(rename = "GPSAltitude")]
    pub altitude: Option<f64>,
    #[serde(rename = "SpotName")]
    pub spot_name: Option<String>,
    #[serde(rename = "WaterDepth")]
    pub depth: Option<f64>,
    #[serde(rename = "Temperature")]
    pub temperature: Option<f64>,
    #[serde(rename = "HeartRate")]
    pub heart_rate: Option<f64>,
}

fn serialize_instant<S: Serializer>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&instant.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl FusedRecord {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            latitude: None,
            longitude: None,
            altitude: None,
            spot_name: None,
            depth: None,
            temperature: None,
            heart_rate: None,
        }
    }

    fn set_position(&mut self, point: &Point) {
        self.latitude = Some(point.lat());
        self.longitude = Some(point.lon());
        self.altitude = Some(point.alt());
        self.spot_name = point.name().map(str::to_string);
    }

    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Merges the track position and the dive sample at `instant`. The track
/// position wins; without one, the spot of the dive in progress is used.
pub fn fuse(
    instant: DateTime<Utc>,
    track: Option<&GpxReader>,
    log: Option<&DiveLog>,
) -> Result<FusedRecord, CorrelationError> {
    let mut record = FusedRecord::new(instant);

    if let Some(point) = track.map(|t| t.position_at(instant)).transpose()?.flatten() {
        record.set_position(&point);
    }

    if let Some((dive, sample)) = log.map(|l| l.data_at(instant)).transpose()?.flatten() {
        record.depth = Some(round(sample.depth, 2));
        record.temperature = sample.temperature;
        record.heart_rate = sample.heart_rate;
        if !record.has_position() {
            if let Some(spot) = dive.spot() {
                record.set_position(&spot);
            }
        }
    }
    Ok(record)
}

/// Renders a located dive as a track: one fix every `interval` seconds or
/// so, stretched so the fixes evenly cover the dive. Each fix sits at the
/// dive spot, lowered by the depth at that time (the mean depth when there is
/// no sample).
///
/// Returns the number of fixes written.
pub fn dive_to_track(
    dive: &Dive<'_>,
    interval: i64,
    writer: &mut GpxWriter,
) -> Result<usize, DiveLogError> {
    let Some(spot) = dive.spot() else {
        return Ok(0);
    };

    let duration = dive.duration().max(0);
    let interval = interval.clamp(1, duration.max(1));
    let count = (duration + interval - 1) / interval;
    let step = if count > 0 {
        (duration + count - 1) / count
    } else {
        interval
    };
    debug!(dive = dive.number(), duration, count, step, "Sampling dive");

    let start = dive.start()?.with_timezone(&Utc);
    let group = format!("Dive #{}", dive.number());
    let mean = dive.depth().mean;
    let spot = spot.without_name();

    for k in 0..=count {
        let time = start + Duration::seconds(k * step);
        let depth = match dive.sample_at(time)? {
            Some(sample) => round(sample.depth, 2),
            None => mean,
        };
        let point = spot.clone().with_alt(spot.alt() - depth);
        writer.add_position(point, time, Some(&group), false);
    }
    Ok(count as usize + 1)
}

/// Writes every located dive as a track plus a waypoint at its spot.
/// Returns the number of dives written.
#[instrument(skip_all)]
pub fn dives_to_track(
    log: &DiveLog,
    interval: i64,
    writer: &mut GpxWriter,
) -> Result<usize, DiveLogError> {
    let mut written = 0;
    for dive in log.dives() {
        let Some(spot) = dive.spot() else {
            info!(dive = dive.number(), "Dive without a located site, skipped");
            continue;
        };
        writer.add_waypoint(spot);
        dive_to_track(&dive, interval, writer)?;
        written += 1;
    }
    Ok(written)
}

/// One waypoint per located dive site. Returns the number written.
pub fn sites_to_track(log: &DiveLog, writer: &mut GpxWriter) -> usize {
    let mut written = 0;
    for point in log.sites().filter_map(|site| site.point().cloned()) {
        writer.add_waypoint(point);
        written += 1;
    }
    written
}

/// Locates dives from a track: every dive without a position gets the track
/// position at its start, and every track waypoint is matched to (or becomes)
/// a dive site.
///
/// Returns `(dives located, waypoints matched)`.
#[instrument(skip_all)]
pub fn track_to_dive_log(
    track: &GpxReader,
    log: &mut DiveLog,
) -> Result<(usize, usize), CorrelationError> {
    let pending = log
        .dives()
        .filter(|dive| !dive.is_located())
        .map(|dive| -> Result<_, DiveLogError> {
            Ok((dive.index(), dive.number(), dive.start()?.with_timezone(&Utc)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut located = 0;
    for (index, number, start) in pending {
        let Some(point) = track.position_at(start)? else {
            debug!(dive = number, %start, "No track position at dive start");
            continue;
        };
        let site = log.set_spot(index, &point)?;
        info!(dive = number, uuid = site.uuid(), "Located dive");
        located += 1;
    }

    let mut waypoints = 0;
    for waypoint in track.waypoints() {
        if log.site_by_position(&waypoint, true).is_some() {
            waypoints += 1;
        }
    }
    Ok((located, waypoints))
}

/// Copies a track, lowering each fix by the dive depth at its time.
///
/// Returns the number of fixes that fell inside a dive.
#[instrument(skip_all)]
pub fn track_depth(
    track: &GpxReader,
    log: &DiveLog,
    writer: &mut GpxWriter,
) -> Result<usize, CorrelationError> {
    let mut adjusted = 0;
    for fix in track.track_points() {
        let fix = fix?;
        let point = match log.sample_at(fix.time)? {
            Some(sample) => {
                adjusted += 1;
                let alt = fix.point.alt() - sample.depth;
                fix.point.with_alt(alt)
            }
            None => fix.point,
        };
        writer.add_position(point, fix.time, Some(&fix.track), false);
    }
    for waypoint in track.waypoints() {
        writer.add_waypoint(waypoint);
    }
    Ok(adjusted)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    const LOG: &str = r#"<divelog program='subsurface' version='3'>
<divesites>
  <site uuid='aaaa0001' name='Reef' gps='-23.0 -45.0'/>
</divesites>
<dives>
  <dive number='1' date='2023-01-01' time='10:00:00' duration='20:00 min' divesiteid='aaaa0001' tags='#tz:+0000'>
    <divecomputer model='A'>
      <depth max='20.0 m' mean='10.0 m'/>
      <surface pressure='1.013 bar'/>
      <sample time='0:00 min' depth='0.0 m' temp='24.0 C' heartbeat='95'/>
      <sample time='10:00 min' depth='20.0 m'/>
      <sample time='20:00 min' depth='0.0 m'/>
    </divecomputer>
  </dive>
  <dive number='2' date='2023-01-01' time='14:00:00' duration='30:00 min' tags='#tz:+0000'/>
</dives>
</divelog>"#;

    const GPX: &str = r#"<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1">
  <wpt lat="-24.0" lon="-46.0"><name>Island</name></wpt>
  <trk>
    <name>Boat</name>
    <trkseg>
      <trkpt lat="-23.5" lon="-45.5"><ele>0</ele><time>2023-01-01T13:50:00Z</time></trkpt>
      <trkpt lat="-23.6" lon="-45.5"><ele>0</ele><time>2023-01-01T14:10:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_fuse() {
        let log = DiveLog::parse(LOG).unwrap();
        let track = GpxReader::parse(GPX).unwrap();

        // Inside dive #1, no track position: the site is used
        let record = fuse(at(10, 5), Some(&track), Some(&log)).unwrap();
        assert_eq!(record.depth, Some(10.0));
        assert_eq!(record.temperature, Some(24.0));
        assert_eq!(record.heart_rate, Some(95.0));
        assert_eq!(record.latitude, Some(-23.0));
        assert_eq!(record.spot_name.as_deref(), Some("Reef"));

        // Track only
        let record = fuse(at(14, 0), Some(&track), None).unwrap();
        assert_eq!(record.latitude, Some(-23.55));
        assert_eq!(record.depth, None);

        let record = fuse(at(20, 0), Some(&track), Some(&log)).unwrap();
        assert_eq!(record, FusedRecord::new(at(20, 0)));
    }

    #[test]
    fn test_fused_record_columns() {
        let mut record = FusedRecord::new(at(10, 5));
        record.depth = Some(10.0);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        writer.serialize(&record).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "DateTime\tGPSLatitude\tGPSLongitude\tGPSAltitude\tSpotName\tWaterDepth\tTemperature\tHeartRate\n\
             2023-01-01T10:05:00.000Z\t\t\t\t\t10.0\t\t\n"
        );
    }

    #[test]
    fn test_dive_to_track() {
        let log = DiveLog::parse(LOG).unwrap();
        let mut writer = GpxWriter::new(false, false);
        // 1200 s at a 900 s target: 2 intervals of 600 s, 3 fixes
        assert_eq!(dive_to_track(&log.dive(0).unwrap(), 900, &mut writer).unwrap(), 3);
        // An interval longer than the dive gives a fix at each end
        let mut long = GpxWriter::new(false, false);
        assert_eq!(dive_to_track(&log.dive(0).unwrap(), i64::MAX, &mut long).unwrap(), 2);
        // Unlocated dives write nothing
        assert_eq!(dive_to_track(&log.dive(1).unwrap(), 900, &mut writer).unwrap(), 0);

        let track = GpxReader::parse(&writer.finish().unwrap()).unwrap();
        let fixes: Vec<_> = track
            .track_points()
            .map(|p| p.map(|p| (p.track, p.point.alt(), p.time)))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            fixes,
            vec![
                ("Dive #1".to_string(), 0.0, at(10, 0)),
                ("Dive #1".to_string(), -20.0, at(10, 10)),
                ("Dive #1".to_string(), 0.0, at(10, 20)),
            ]
        );
    }

    #[test]
    fn test_dives_and_sites_to_track() {
        let log = DiveLog::parse(LOG).unwrap();
        let mut writer = GpxWriter::new(false, false);
        assert_eq!(dives_to_track(&log, 900, &mut writer).unwrap(), 1);
        let track = GpxReader::parse(&writer.finish().unwrap()).unwrap();
        assert_eq!(track.waypoints().count(), 1);

        assert_eq!(sites_to_track(&log, &mut writer), 1);
        let track = GpxReader::parse(&writer.finish().unwrap()).unwrap();
        let names: Vec<_> = track.waypoints().filter_map(|p| p.name().map(str::to_string)).collect();
        assert_eq!(names, vec!["Reef"]);
    }

    #[test]
    fn test_track_to_dive_log() {
        let mut log = DiveLog::parse(LOG).unwrap();
        let track = GpxReader::parse(GPX).unwrap();
        assert_eq!(track_to_dive_log(&track, &mut log).unwrap(), (1, 1));

        let spot = log.dive(1).unwrap().spot().unwrap();
        assert_eq!((spot.lat(), spot.lon()), (-23.55, -45.5));
        // Reef, the dive #2 spot and the Island waypoint
        assert_eq!(log.sites().count(), 3);

        // Nothing left to locate, the waypoint now matches its site
        assert_eq!(track_to_dive_log(&track, &mut log).unwrap(), (0, 1));
        assert_eq!(log.sites().count(), 3);
    }

    #[test]
    fn test_track_depth() {
        let log = DiveLog::parse(LOG).unwrap();
        let track = GpxReader::parse(
            r#"<gpx><trk><name>Day</name><trkseg>
<trkpt lat="-23.0" lon="-45.0"><ele>1</ele><time>2023-01-01T10:05:00Z</time></trkpt>
<trkpt lat="-23.0" lon="-45.1"><ele>1</ele><time>2023-01-01T11:00:00Z</time></trkpt>
</trkseg></trk><wpt lat="-23.0" lon="-45.0"><name>Reef</name></wpt></gpx>"#,
        )
        .unwrap();
        let mut writer = GpxWriter::new(false, false);
        assert_eq!(track_depth(&track, &log, &mut writer).unwrap(), 1);

        let output = GpxReader::parse(&writer.finish().unwrap()).unwrap();
        let altitudes: Vec<_> = output
            .track_points()
            .map(|p| p.map(|p| p.point.alt()))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(altitudes, vec![-9.0, 1.0]);
        assert_eq!(output.waypoints().count(), 1);
    }
}
