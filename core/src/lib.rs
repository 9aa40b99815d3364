//! Dive logs in Subsurface's XML format, GPS tracks in GPX, and the
//! correlation of both by time and position.

pub mod correlation;
pub mod divelog;
pub mod errors;
pub mod geomath;
pub mod gpx;
pub mod interpolator;
pub mod markup;
pub mod timezone;
pub mod utils;

pub use divelog::{Dive, DiveLog, DiveSite};
pub use geomath::Point;
pub use gpx::{GpxReader, GpxWriter};
pub use timezone::TimeZone;
