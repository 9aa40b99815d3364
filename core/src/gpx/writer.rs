use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::{point_to, GPX_NAMESPACE};
use crate::errors::TrackError;
use crate::geomath::Point;
use crate::markup::{to_markup, Structure};

/// Fixes within this many meters of the previous one count as stopped.
pub const STOP_RADIUS: f64 = 1.0;

const CREATOR: &str = "subsurface-toolbox";
const SCHEMA_LOCATION: &str =
    "http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd";

#[derive(Debug)]
struct Track {
    name: String,
    segments: Vec<Vec<(Point, DateTime<Utc>)>>,
}

/// Accumulates waypoints and tracks, then renders them as one GPX document.
#[derive(Debug, Default)]
pub struct GpxWriter {
    track_poi: bool,
    detect_stops: bool,
    waypoints: Vec<Point>,
    tracks: Vec<Track>,
    /// Set while the last track accepts fixes.
    open: bool,
    last_point: Option<Point>,
    /// Time of the latest fix swallowed while stopped at `last_point`.
    stopped_until: Option<DateTime<Utc>>,
}

impl GpxWriter {
    /// `track_poi` adds start/end waypoints to every track; `detect_stops`
    /// collapses fixes that do not move into a single one.
    pub fn new(track_poi: bool, detect_stops: bool) -> Self {
        Self {
            track_poi,
            detect_stops,
            ..Default::default()
        }
    }

    pub fn add_waypoint(&mut self, point: Point) {
        self.waypoints.push(point);
    }

    /// Adds a fix to the track named `group` (the UTC date of `time` when
    /// unset). A different group closes the current track and opens a new one;
    /// `new_segment` splits the current track.
    pub fn add_position(
        &mut self,
        point: Point,
        time: DateTime<Utc>,
        group: Option<&str>,
        new_segment: bool,
    ) {
        let group = group
            .map(str::to_string)
            .unwrap_or_else(|| time.format("%Y-%m-%d").to_string());
        let current = self
            .tracks
            .last()
            .filter(|_| self.open)
            .map(|track| track.name.as_str());

        if current != Some(group.as_str()) {
            if self.open {
                self.end_track();
            }
            self.start_track(group, &point);
        } else if new_segment {
            self.flush_stop();
            if let Some(track) = self.tracks.last_mut() {
                track.segments.push(Vec::new());
            }
        } else if self.detect_stops && self.is_stopped_at(&point) {
            trace!(%time, "Stopped");
            self.stopped_until = Some(time);
            self.last_point = self.last_point.take().map(|last| last.with_alt(point.alt()));
            return;
        }

        self.flush_stop();
        self.push_fix(point.clone(), time);
        self.last_point = Some(point);
    }

    fn is_stopped_at(&self, point: &Point) -> bool {
        self.last_point
            .as_ref()
            .is_some_and(|last| last.distance_to(point) <= STOP_RADIUS)
    }

    fn push_fix(&mut self, point: Point, time: DateTime<Utc>) {
        if let Some(segment) = self
            .tracks
            .last_mut()
            .and_then(|track| track.segments.last_mut())
        {
            segment.push((point, time));
        }
    }

    /// Emits the last stopped position with the time the stop ended.
    fn flush_stop(&mut self) {
        if let (Some(time), Some(point)) = (self.stopped_until.take(), self.last_point.clone()) {
            self.push_fix(point, time);
        }
    }

    fn start_track(&mut self, name: String, point: &Point) {
        debug!(track = %name, "Starting track");
        if self.track_poi {
            self.add_waypoint(point.clone().with_name(format!("{name}: Start Point")));
        }
        self.tracks.push(Track {
            name,
            segments: vec![Vec::new()],
        });
        self.open = true;
    }

    fn end_track(&mut self) {
        self.flush_stop();
        if self.track_poi {
            if let (Some(track), Some(last)) = (self.tracks.last(), self.last_point.clone()) {
                let name = format!("{}: End Point", track.name);
                self.waypoints.push(last.with_name(name));
            }
        }
        self.open = false;
    }

    pub fn has_content(&self) -> bool {
        !self.tracks.is_empty() || !self.waypoints.is_empty()
    }

    /// Renders everything added so far and starts over.
    pub fn finish(&mut self) -> Result<String, TrackError> {
        if self.open {
            self.end_track();
        }
        if !self.has_content() {
            self.reset();
            return Err(TrackError::NoContent);
        }

        let mut gpx = Structure::new()
            .with_attribute("xmlns", GPX_NAMESPACE)
            .with_attribute("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .with_attribute("xsi:schemaLocation", SCHEMA_LOCATION)
            .with_attribute("version", "1.1")
            .with_attribute("creator", CREATOR);

        let mut unnamed = 0;
        for waypoint in &self.waypoints {
            let waypoint = match waypoint.name() {
                Some(_) => waypoint.clone(),
                None => {
                    unnamed += 1;
                    waypoint.clone().with_name(format!("POI #{unnamed}"))
                }
            };
            gpx.push_child("wpt", point_to(&waypoint, None));
        }

        for track in &self.tracks {
            let mut trk = Structure::new().with_child("name", Structure::new().with_text(&track.name));
            for segment in track.segments.iter().filter(|s| !s.is_empty()) {
                let mut trkseg = Structure::new();
                for (point, time) in segment {
                    trkseg.push_child("trkpt", point_to(&point.clone().without_name(), Some(time)));
                }
                trk.push_child("trkseg", trkseg);
            }
            gpx.push_child("trk", trk);
        }

        debug!(
            waypoints = self.waypoints.len(),
            tracks = self.tracks.len(),
            "Writing GPX"
        );
        self.reset();
        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}",
            to_markup(&gpx, "gpx")
        ))
    }

    /// Drops everything added so far; the options are kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.track_poi, self.detect_stops);
    }
}
