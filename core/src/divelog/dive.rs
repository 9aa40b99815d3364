use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use once_cell::unsync::OnceCell;
use tracing::{debug, trace};

use super::sample::DiveSample;
use super::sites::DiveSite;
use super::DiveLog;
use crate::errors::DiveLogError;
use crate::geomath::Point;
use crate::interpolator::Interpolator;
use crate::markup::{Document, NodeId};
use crate::timezone::{find_marker, TimeZone};
use crate::utils::{round, time_to_seconds, to_number};

/// Sea level pressure, in bar.
const SEA_LEVEL_PRESSURE: f64 = 1.013;

/// Altitude in meters for an ambient pressure in bar (never below sea level).
pub fn altitude_from_pressure(bar: f64) -> f64 {
    if bar <= 0.0 {
        return 0.0;
    }
    round((SEA_LEVEL_PRESSURE / bar).log10() * 7800.0, 1).max(0.0)
}

/// Where a dive's time zone came from, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeZoneSource {
    Dive,
    Site,
    SiteLongitude,
    Default,
}

impl Display for TimeZoneSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let source = match self {
            TimeZoneSource::Dive => "dive tags",
            TimeZoneSource::Site => "site notes",
            TimeZoneSource::SiteLongitude => "site longitude",
            TimeZoneSource::Default => "default",
        };
        write!(f, "{source}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Depth {
    pub max: f64,
    pub mean: f64,
}

/// Values derived from a dive element, computed on first use.
#[derive(Debug, Default)]
pub(crate) struct DiveCache {
    time_zone: OnceCell<(TimeZone, TimeZoneSource)>,
    start: OnceCell<DateTime<FixedOffset>>,
    duration: OnceCell<i64>,
    samples: OnceCell<Interpolator<DiveSample>>,
}

impl DiveCache {
    pub(crate) fn reset_time_zone(&mut self) {
        self.time_zone.take();
        self.start.take();
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Read-only view of one `dive` element of a [`DiveLog`].
#[derive(Clone, Copy)]
pub struct Dive<'a> {
    log: &'a DiveLog,
    index: usize,
}

impl<'a> Dive<'a> {
    pub(crate) fn new(log: &'a DiveLog, index: usize) -> Self {
        Self { log, index }
    }

    fn document(&self) -> &'a Document {
        &self.log.document
    }

    fn element(&self) -> NodeId {
        self.log.dives[self.index]
    }

    fn cache(&self) -> &'a DiveCache {
        &self.log.caches[self.index]
    }

    fn attribute(&self, name: &str) -> Option<&'a str> {
        self.document().attribute(self.element(), name)
    }

    /// Position of the dive in the log, as accepted by the log's setters.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn number(&self) -> u32 {
        self.attribute("number")
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or_default()
    }

    pub fn tags(&self) -> &'a str {
        self.attribute("tags").unwrap_or_default()
    }

    pub fn site(&self) -> Option<DiveSite> {
        self.attribute("divesiteid")
            .and_then(|uuid| self.log.site_by_uuid(uuid))
    }

    pub fn is_located(&self) -> bool {
        self.site().is_some_and(|site| site.is_located())
    }

    /// Raw `#tz:` token from the dive tags.
    pub fn time_zone_marker(&self) -> Option<&'a str> {
        find_marker(self.tags())
    }

    fn resolved_time_zone(&self) -> Result<&'a (TimeZone, TimeZoneSource), DiveLogError> {
        self.cache()
            .time_zone
            .get_or_try_init(|| -> Result<_, DiveLogError> {
                let (tz, source) = self.resolve_time_zone()?;
                debug!(
                    dive = self.number(),
                    time_zone = %tz,
                    %source,
                    "Resolved dive time zone"
                );
                Ok((tz, source))
            })
    }

    fn resolve_time_zone(&self) -> Result<(TimeZone, TimeZoneSource), DiveLogError> {
        let dive = self.number();
        let parse = |token: &str| {
            token
                .parse::<TimeZone>()
                .map_err(|source| DiveLogError::TimeZone { dive, source })
        };

        if let Some(token) = self.time_zone_marker() {
            return Ok((parse(token)?, TimeZoneSource::Dive));
        }
        if let Some(site) = self.site() {
            if let Some(token) = site.time_zone_marker() {
                return Ok((parse(token)?, TimeZoneSource::Site));
            }
            if let Some(point) = site.point() {
                return Ok((point.calculated_time_zone(), TimeZoneSource::SiteLongitude));
            }
        }
        Ok((self.log.default_time_zone.clone(), TimeZoneSource::Default))
    }

    pub fn time_zone(&self) -> Result<TimeZone, DiveLogError> {
        self.resolved_time_zone().map(|(tz, _)| tz.clone())
    }

    pub fn time_zone_source(&self) -> Result<TimeZoneSource, DiveLogError> {
        self.resolved_time_zone().map(|(_, source)| *source)
    }

    /// Local `date`/`time` attributes placed in the resolved time zone.
    pub fn start(&self) -> Result<DateTime<FixedOffset>, DiveLogError> {
        self.cache()
            .start
            .get_or_try_init(|| -> Result<_, DiveLogError> {
                let (tz, _) = self.resolved_time_zone()?;
                let date = self.attribute("date").unwrap_or_default().trim();
                let time = self.attribute("time").unwrap_or_default().trim();
                let invalid = || DiveLogError::InvalidStart {
                    dive: self.number(),
                    value: format!("{date} {time}"),
                };

                let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
                let time = NaiveTime::parse_from_str(time, "%H:%M:%S").map_err(|_| invalid())?;
                date.and_time(time)
                    .and_local_timezone(tz.offset())
                    .single()
                    .ok_or_else(invalid)
            })
            .copied()
    }

    pub fn end(&self) -> Result<DateTime<FixedOffset>, DiveLogError> {
        Ok(self.start()? + Duration::seconds(self.duration()))
    }

    /// Seconds. The last sample time of the primary dive computer wins over
    /// the declared `duration`, which dive computers round down.
    pub fn duration(&self) -> i64 {
        *self.cache().duration.get_or_init(|| {
            let document = self.document();
            let recorded = self
                .primary_computer()
                .and_then(|dc| {
                    document
                        .elements_named(dc, "sample")
                        .filter_map(|s| document.attribute(s, "time"))
                        .last()
                })
                .map(time_to_seconds)
                .filter(|seconds| *seconds > 0);

            recorded.unwrap_or_else(|| {
                self.attribute("duration")
                    .map(time_to_seconds)
                    .unwrap_or_default()
            })
        })
    }

    /// Deepest `max`/`mean` over every dive computer.
    pub fn depth(&self) -> Depth {
        let document = self.document();
        document
            .elements_named(self.element(), "divecomputer")
            .flat_map(|dc| document.elements_named(dc, "depth"))
            .fold(Depth::default(), |depth, id| Depth {
                max: depth
                    .max
                    .max(document.attribute(id, "max").map(to_number).unwrap_or_default()),
                mean: depth
                    .mean
                    .max(document.attribute(id, "mean").map(to_number).unwrap_or_default()),
            })
    }

    fn primary_computer(&self) -> Option<NodeId> {
        self.document().first_named(self.element(), "divecomputer")
    }

    fn samples(&self) -> Result<&'a Interpolator<DiveSample>, DiveLogError> {
        self.cache().samples.get_or_try_init(|| -> Result<_, DiveLogError> {
            let document = self.document();
            let mut interpolator = Interpolator::new();
            let mut previous: Option<DiveSample> = None;

            if let Some(dc) = self.primary_computer() {
                for id in document.elements_named(dc, "sample") {
                    let Some(sample) = DiveSample::from_element(document, id) else {
                        continue;
                    };
                    let sample = sample.hold(previous.as_ref());
                    interpolator.add(sample.clone())?;
                    previous = Some(sample);
                }
            }

            trace!(dive = self.number(), samples = interpolator.len(), "Loaded dive samples");
            Ok(interpolator)
        })
    }

    /// The primary dive computer reading at `instant`, if it falls inside the
    /// dive and there are enough samples to estimate it.
    pub fn sample_at(&self, instant: DateTime<Utc>) -> Result<Option<DiveSample>, DiveLogError> {
        let start = self.start()?;
        let offset = (instant.timestamp_millis() - start.timestamp_millis()) as f64 / 1000.0;
        if offset < 0.0 || offset > self.duration() as f64 {
            return Ok(None);
        }
        Ok(self.samples()?.sample_at(offset).map(|estimate| estimate.sample))
    }

    fn surface_pressure(&self) -> f64 {
        let document = self.document();
        if let Some(pressure) = self.attribute("airpressure") {
            return to_number(pressure);
        }
        self.primary_computer()
            .and_then(|dc| {
                document
                    .elements_named(dc, "surface")
                    .find_map(|s| document.attribute(s, "pressure"))
            })
            .map(to_number)
            .unwrap_or(1.0)
    }

    /// Site position at the altitude implied by the surface pressure.
    pub fn spot(&self) -> Option<Point> {
        let site = self.site()?;
        let point = site.point()?.clone();
        Some(point.with_alt(altitude_from_pressure(self.surface_pressure())))
    }
}
