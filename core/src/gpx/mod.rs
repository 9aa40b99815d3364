//! GPX 1.1 tracks and waypoints.

mod reader;
mod writer;

use chrono::{DateTime, Utc};

use crate::geomath::Point;
use crate::markup::Structure;

pub use reader::{GpxReader, MAX_GAP, WAYPOINT_RADIUS};
pub use writer::{GpxWriter, STOP_RADIUS};

pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";

/// A timestamped fix and the name of the track it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub point: Point,
    pub time: DateTime<Utc>,
    pub track: String,
}

/// Reads a `wpt`/`trkpt` record. Latitude and longitude are required.
pub(crate) fn point_from(structure: &Structure) -> Option<Point> {
    let lat = structure.attribute("lat")?.trim().parse().ok()?;
    let lon = structure.attribute("lon")?.trim().parse().ok()?;
    let alt = structure
        .child_text("ele")
        .and_then(|ele| ele.trim().parse().ok())
        .unwrap_or_default();

    let point = Point::new(lat, lon, alt);
    match structure.child_text("name").map(str::trim) {
        Some(name) if !name.is_empty() => Some(point.with_name(name)),
        _ => Some(point),
    }
}

/// Builds a `wpt`/`trkpt` record; the inverse of [`point_from`].
pub(crate) fn point_to(point: &Point, time: Option<&DateTime<Utc>>) -> Structure {
    let mut structure = Structure::new()
        .with_attribute("lat", point.lat())
        .with_attribute("lon", point.lon())
        .with_child("ele", Structure::new().with_text(point.alt()));
    if let Some(time) = time {
        structure.push_child(
            "time",
            Structure::new().with_text(time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
    }
    if let Some(name) = point.name() {
        structure.push_child("name", Structure::new().with_text(name));
    }
    structure
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_point_structure() {
        let time = Utc.with_ymd_and_hms(2023, 1, 1, 11, 0, 0).unwrap();
        let point = Point::new(-23.5, -46.25, 3.5).with_name("Buoy");
        let structure = point_to(&point, Some(&time));
        assert_eq!(structure.child_text("time"), Some("2023-01-01T11:00:00.000Z"));
        assert_eq!(structure.child_text("ele"), Some("3.5"));
        assert_eq!(point_from(&structure), Some(point));

        let bare = Structure::new().with_attribute("lat", "1.5");
        assert_eq!(point_from(&bare), None);
    }
}
