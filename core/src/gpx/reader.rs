use chrono::{DateTime, Utc};
use once_cell::unsync::OnceCell;
use tracing::trace;

use super::{point_from, TrackPoint};
use crate::errors::{DocumentError, TrackError};
use crate::geomath::Point;
use crate::interpolator::{Interpolator, Line, Sample};
use crate::markup::{local_name, to_struct, Document, NodeId, Structure};

/// Largest distance, in seconds, between a queried instant and the fixes used
/// to estimate a position.
pub const MAX_GAP: f64 = 1800.0;

/// Waypoints within this many meters lend their name to an estimated position.
pub const WAYPOINT_RADIUS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
struct TrackSample {
    /// Unix time, seconds.
    time: f64,
    lat: f64,
    lon: f64,
    alt: Option<f64>,
}

impl Sample for TrackSample {
    fn key(&self) -> Option<f64> {
        Some(self.time)
    }

    fn blend(first: &Self, second: &Self, line: &Line) -> Self {
        TrackSample {
            time: line.x(),
            lat: line.value(first.lat, second.lat),
            lon: line.value(first.lon, second.lon),
            alt: line.optional(first.alt, second.alt),
        }
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, TrackError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| TrackError::InvalidTime(value.to_string()))
}

fn seconds(time: &DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

#[derive(Debug)]
pub struct GpxReader {
    document: Document,
    samples: OnceCell<Interpolator<TrackSample>>,
}

impl GpxReader {
    pub fn parse(text: &str) -> Result<Self, TrackError> {
        let document = Document::parse(text)?;
        let root = local_name(document.name(document.root()));
        if root != "gpx" {
            return Err(DocumentError::InvalidRoot {
                kind: "GPX",
                found: root.to_string(),
            }
            .into());
        }
        Ok(Self {
            document,
            samples: OnceCell::new(),
        })
    }

    fn fixes(&self, parent: NodeId) -> impl Iterator<Item = Structure> + '_ {
        self.document
            .descendants_named(parent, "trkpt")
            .map(|id| to_struct(&self.document, id, 1))
    }

    fn samples(&self) -> Result<&Interpolator<TrackSample>, TrackError> {
        self.samples.get_or_try_init(|| -> Result<_, TrackError> {
            let mut interpolator = Interpolator::new();
            for fix in self.fixes(self.document.root()) {
                let (Some(point), Some(time)) = (point_from(&fix), fix.child_text("time")) else {
                    continue;
                };
                let has_ele = fix.child("ele").is_some();
                interpolator.add(TrackSample {
                    time: seconds(&parse_time(time)?),
                    lat: point.lat(),
                    lon: point.lon(),
                    alt: has_ele.then(|| point.alt()),
                })?;
            }
            trace!(fixes = interpolator.len(), "Loaded track");
            Ok(interpolator)
        })
    }

    /// Every waypoint with a position, in document order.
    pub fn waypoints(&self) -> impl Iterator<Item = Point> + '_ {
        self.document
            .descendants_named(self.document.root(), "wpt")
            .filter_map(|id| point_from(&to_struct(&self.document, id, 1)))
    }

    /// Every timestamped fix, in document order.
    pub fn track_points(&self) -> impl Iterator<Item = Result<TrackPoint, TrackError>> + '_ {
        let root = self.document.root();
        self.document
            .descendants_named(root, "trk")
            .flat_map(move |trk| {
                let track = self
                    .document
                    .first_named(trk, "name")
                    .map(|name| self.document.text(name).trim().to_string())
                    .unwrap_or_default();
                self.fixes(trk).filter_map(move |fix| {
                    let point = point_from(&fix)?;
                    let time = fix.child_text("time")?;
                    Some(parse_time(time).map(|time| TrackPoint {
                        point,
                        time,
                        track: track.clone(),
                    }))
                })
            })
    }

    /// Estimated position at `instant`.
    ///
    /// Only positions between two fixes at most [`MAX_GAP`] seconds away are
    /// returned; the track is never extrapolated. The point is named after
    /// the closest waypoint within [`WAYPOINT_RADIUS`], if any.
    pub fn position_at(&self, instant: DateTime<Utc>) -> Result<Option<Point>, TrackError> {
        let Some(estimate) = self.samples()?.sample_at(seconds(&instant)) else {
            return Ok(None);
        };
        if !estimate.kind.is_interpolated() || estimate.max_distance > MAX_GAP {
            trace!(%instant, kind = ?estimate.kind, gap = estimate.max_distance, "No position");
            return Ok(None);
        }

        let sample = estimate.sample;
        let point = Point::new(sample.lat, sample.lon, sample.alt.unwrap_or_default());
        Ok(Some(match self.waypoint_name_near(&point) {
            Some(name) => point.with_name(name),
            None => point,
        }))
    }

    fn waypoint_name_near(&self, point: &Point) -> Option<String> {
        self.waypoints()
            .filter(|wpt| wpt.name().is_some())
            .map(|wpt| (point.distance_to(&wpt), wpt))
            .filter(|(distance, _)| *distance <= WAYPOINT_RADIUS)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .and_then(|(_, wpt)| wpt.name().map(str::to_string))
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone};

    use super::*;

    const GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1" creator="test">
  <wpt lat="-23.001" lon="-45.0"><ele>0</ele><name>Buoy</name></wpt>
  <wpt lat="-23.5" lon="-45.5"><ele>0</ele></wpt>
  <trk>
    <name>Boat ride</name>
    <trkseg>
      <trkpt lat="-23.0" lon="-45.0"><ele>2</ele><time>2023-01-01T10:00:00Z</time></trkpt>
      <trkpt lat="-23.002" lon="-45.0"><ele>4</ele><time>2023-01-01T10:10:00Z</time></trkpt>
      <trkpt lat="-23.1" lon="-45.0"><time>2023-01-01T12:00:00Z</time></trkpt>
      <trkpt lat="-23.2" lon="-45.0"/>
    </trkseg>
  </trk>
</gpx>"#;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_parse() {
        assert!(GpxReader::parse(GPX).is_ok());
        assert!(matches!(
            GpxReader::parse("<divelog/>"),
            Err(TrackError::Document(DocumentError::InvalidRoot { .. }))
        ));
    }

    #[test]
    fn test_position_at() {
        let reader = GpxReader::parse(GPX).unwrap();
        let point = reader.position_at(at(10, 5)).unwrap().unwrap();
        assert_eq!(point.lat(), -23.001);
        assert_eq!(point.lon(), -45.0);
        assert_eq!(point.alt(), 3.0);
        assert_eq!(point.name(), Some("Buoy"));

        let exact = reader.position_at(at(10, 0)).unwrap().unwrap();
        assert_eq!(exact.alt(), 2.0);
        assert_eq!(exact.name(), None);
    }

    #[test]
    fn test_position_outside_track() {
        let reader = GpxReader::parse(GPX).unwrap();
        // Before the first fix: extrapolation is refused
        assert!(reader.position_at(at(9, 59)).unwrap().is_none());
        // After the last fix
        assert!(reader.position_at(at(12, 1)).unwrap().is_none());
        // Between fixes 110 minutes apart
        assert!(reader.position_at(at(11, 0)).unwrap().is_none());
        // Close to one fix, too far from the next
        assert!(reader
            .position_at(at(10, 10) + Duration::minutes(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_waypoints_and_track_points() {
        let reader = GpxReader::parse(GPX).unwrap();
        let waypoints: Vec<_> = reader.waypoints().collect();
        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[0].name(), Some("Buoy"));
        assert_eq!(waypoints[1].name(), None);

        let points: Vec<_> = reader.track_points().collect::<Result<_, _>>().unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].track, "Boat ride");
        assert_eq!(points[2].time, at(12, 0));
        assert_eq!(points[1].point.alt(), 4.0);
    }

    #[test]
    fn test_invalid_time() {
        let reader = GpxReader::parse(
            "<gpx><trk><trkseg><trkpt lat='1' lon='2'><time>yesterday</time></trkpt></trkseg></trk></gpx>",
        )
        .unwrap();
        assert!(matches!(
            reader.position_at(at(10, 0)),
            Err(TrackError::InvalidTime(_))
        ));
    }
}
