//! Planar geo helpers.
//!
//! Distances use a flat-earth approximation (Pythagoras on the degree deltas,
//! scaled by a latitude dependent factor). This is fine for the short ranges a
//! dive site or a GPS track deals with and wrong for long ones.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use geo::Coord;

use crate::timezone::TimeZone;
use crate::utils::round;

/// Meters in one degree at the equator.
const METERS_PER_DEGREE: f64 = 111_317.0;

thread_local! {
    static SCALE_FACTORS: RefCell<HashMap<i64, f64>> = RefCell::new(HashMap::new());
}

/// Meters per degree at `latitude`, memoized per 0.1 degree bucket.
fn scale_factor(latitude: f64) -> f64 {
    let bucket = (latitude * 10.0).round() as i64;
    SCALE_FACTORS.with(|factors| {
        *factors.borrow_mut().entry(bucket).or_insert_with(|| {
            let latitude = bucket as f64 / 10.0;
            (METERS_PER_DEGREE * latitude.to_radians().cos()).trunc()
        })
    })
}

pub fn degrees_to_meters(degrees: f64, latitude: f64) -> f64 {
    degrees * scale_factor(latitude)
}

pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    meters / scale_factor(latitude)
}

/// A WGS84 position: latitude/longitude rounded to 7 decimals, altitude in
/// meters rounded to 2 decimals, and an optional label.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    position: Coord<f64>,
    alt: f64,
    name: Option<String>,
}

impl Point {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self {
            position: Coord {
                x: round(lon, 7),
                y: round(lat, 7),
            },
            alt: round(alt, 2),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_alt(mut self, alt: f64) -> Self {
        self.alt = round(alt, 2);
        self
    }

    pub fn without_name(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn lat(&self) -> f64 {
        self.position.y
    }

    pub fn lon(&self) -> f64 {
        self.position.x
    }

    pub fn alt(&self) -> f64 {
        self.alt
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// `"<lat> <lon>"`, the format dive sites store their GPS position in.
    pub fn coords(&self) -> String {
        format!("{} {}", self.lat(), self.lon())
    }

    /// The label if there is one, the coordinates otherwise.
    pub fn desc(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.coords())
    }

    /// 2D distance in meters (planar approximation).
    pub fn distance_to(&self, other: &Point) -> f64 {
        let delta = other.position - self.position;
        let degrees = delta.x.hypot(delta.y);
        degrees_to_meters(degrees, (self.lat() + other.lat()) / 2.0)
    }

    /// Time zone guessed from the longitude. Ignores political borders, so only
    /// useful as a last resort.
    pub fn calculated_time_zone(&self) -> TimeZone {
        TimeZone::from_longitude(self.lon())
    }

    /// Truncates latitude/longitude to `precision` decimals (0 => ~100 km
    /// cells, 4 => ~10 m cells).
    pub(crate) fn cell(&self, precision: u32) -> (i64, i64) {
        let scale = 10f64.powi(precision as i32);
        (
            (self.lat() * scale).trunc() as i64,
            (self.lon() * scale).trunc() as i64,
        )
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.desc())
    }
}
