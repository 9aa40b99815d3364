//! Subsurface dive log (`.ssrf`) model.
//!
//! A [`DiveLog`] owns the parsed document and edits it in place. Dives are
//! exposed as lightweight [`Dive`] views; values derived from a dive (time
//! zone, start, duration, samples) are memoized and dropped whenever an edit
//! could change them.

mod dive;
mod fixes;
mod sample;
mod sites;

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::errors::{DiveLogError, DocumentError};
use crate::geomath::Point;
use crate::markup::{Document, NodeId, local_name};
use crate::timezone::{with_marker, TimeZone};

pub use dive::{altitude_from_pressure, Depth, Dive, TimeZoneSource};
pub use fixes::DEFAULT_SALINITY;
pub use sample::DiveSample;
pub use sites::{DiveSite, SITE_RADIUS};

use dive::DiveCache;

#[derive(Debug)]
pub struct DiveLog {
    document: Document,
    /// The `divesites` element.
    sites: NodeId,
    dives: Vec<NodeId>,
    caches: Vec<DiveCache>,
    default_time_zone: TimeZone,
}

impl DiveLog {
    /// Parses a `divelog` document, or a bare `divesites` one. A `divelog`
    /// without a `divesites` element gets an empty one.
    pub fn parse(text: &str) -> Result<Self, DiveLogError> {
        let mut document = Document::parse(text)?;
        let root = document.root();

        let sites = match local_name(document.name(root)) {
            "divesites" => root,
            "divelog" => match document.first_named(root, "divesites") {
                Some(sites) => sites,
                None => match document.first_named(root, "dives") {
                    Some(dives) => document.insert_element_before(dives, "divesites"),
                    None => document.append_element(root, "divesites"),
                },
            },
            other => {
                return Err(DocumentError::InvalidRoot {
                    kind: "Subsurface",
                    found: other.to_string(),
                }
                .into());
            }
        };

        let dives: Vec<NodeId> = document.descendants_named(root, "dive").collect();
        let mut log = DiveLog {
            document,
            sites,
            caches: dives.iter().map(|_| DiveCache::default()).collect(),
            dives,
            default_time_zone: TimeZone::system(),
        };
        log.unlink_missing_sites();
        debug!(
            dives = log.dives.len(),
            sites = log.sites().count(),
            "Parsed dive log"
        );
        Ok(log)
    }

    /// Drops `divesiteid` references to sites that do not exist.
    fn unlink_missing_sites(&mut self) {
        for id in self.dives.clone() {
            let Some(uuid) = self.document.attribute(id, "divesiteid") else {
                continue;
            };
            if self.site_element(uuid).is_none() {
                warn!(uuid, "Dive references a missing dive site, removing the link");
                self.document.remove_attribute(id, "divesiteid");
            }
        }
    }

    /// Time zone for dives without any better source. Starts as the host offset.
    pub fn default_time_zone(&self) -> &TimeZone {
        &self.default_time_zone
    }

    pub fn set_default_time_zone(&mut self, token: &str) -> Result<(), DiveLogError> {
        self.default_time_zone = token.parse()?;
        self.invalidate_time_zones();
        Ok(())
    }

    pub(crate) fn invalidate_time_zones(&mut self) {
        self.caches.iter_mut().for_each(DiveCache::reset_time_zone);
    }

    pub(crate) fn invalidate_dives(&mut self) {
        self.caches.iter_mut().for_each(DiveCache::reset);
    }

    pub fn dives(&self) -> impl ExactSizeIterator<Item = Dive<'_>> {
        (0..self.dives.len()).map(move |index| Dive::new(self, index))
    }

    pub fn dive(&self, index: usize) -> Option<Dive<'_>> {
        (index < self.dives.len()).then(|| Dive::new(self, index))
    }

    /// The first dive with a sample at `instant`, along with that sample.
    pub fn data_at(
        &self,
        instant: DateTime<Utc>,
    ) -> Result<Option<(Dive<'_>, DiveSample)>, DiveLogError> {
        for dive in self.dives() {
            if let Some(sample) = dive.sample_at(instant)? {
                return Ok(Some((dive, sample)));
            }
        }
        Ok(None)
    }

    pub fn sample_at(&self, instant: DateTime<Utc>) -> Result<Option<DiveSample>, DiveLogError> {
        Ok(self.data_at(instant)?.map(|(_, sample)| sample))
    }

    pub fn dive_at(&self, instant: DateTime<Utc>) -> Result<Option<Dive<'_>>, DiveLogError> {
        Ok(self.data_at(instant)?.map(|(dive, _)| dive))
    }

    /// Places a dive at `point`.
    ///
    /// A linked site without a position gets `point`. Otherwise the dive is
    /// linked to the nearest site around `point`, created if there is none.
    pub fn set_spot(&mut self, index: usize, point: &Point) -> Result<DiveSite, DiveLogError> {
        let dive = self.dive(index).ok_or(DiveLogError::UnknownDive(index))?;
        let number = dive.number();
        let unlocated = dive
            .site()
            .filter(|site| !site.is_located())
            .map(|site| site.uuid().to_string());

        if let Some(uuid) = unlocated {
            if self.set_site_position(&uuid, point, false) {
                return self
                    .site_by_uuid(&uuid)
                    .ok_or(DiveLogError::UnknownSite(uuid));
            }
        }

        let site = match self.find_site(point) {
            Some(site) => site,
            None => self.create_site(point),
        };
        let element = self.dives[index];
        self.document
            .set_attribute(element, "divesiteid", site.uuid());
        self.caches[index].reset_time_zone();
        debug!(dive = number, uuid = site.uuid(), "Linked dive to dive site");
        Ok(site)
    }

    pub(crate) fn write_dive_marker(&mut self, index: usize, tz: &TimeZone) {
        let element = self.dives[index];
        let tags = self.document.attribute(element, "tags").unwrap_or_default();
        let tags = with_marker(tags, tz, ", ");
        self.document.set_attribute(element, "tags", &tags);
        self.caches[index].reset_time_zone();
    }

    pub(crate) fn write_site_marker(&mut self, site: NodeId, tz: &TimeZone) {
        match self.document.first_named(site, "notes") {
            Some(notes) => {
                let text = with_marker(&self.document.text(notes), tz, "\n");
                self.document.set_text(notes, &text);
            }
            None => {
                let notes = self.document.append_element(site, "notes");
                self.document.set_text(notes, &with_marker("", tz, "\n"));
            }
        }
        self.invalidate_time_zones();
    }

    /// Stores `#tz:<token>` in the dive tags, replacing any previous marker.
    pub fn set_dive_time_zone(&mut self, index: usize, token: &str) -> Result<(), DiveLogError> {
        if index >= self.dives.len() {
            return Err(DiveLogError::UnknownDive(index));
        }
        let tz: TimeZone = token.parse()?;
        self.write_dive_marker(index, &tz);
        Ok(())
    }

    /// Stores `#tz:<token>` in the site notes, replacing any previous marker.
    pub fn set_site_time_zone(&mut self, uuid: &str, token: &str) -> Result<(), DiveLogError> {
        let site = self
            .site_element(uuid)
            .ok_or_else(|| DiveLogError::UnknownSite(uuid.to_string()))?;
        let tz: TimeZone = token.parse()?;
        self.write_site_marker(site, &tz);
        Ok(())
    }

    /// The document as it currently stands.
    pub fn to_markup(&self) -> String {
        self.document.to_markup()
    }
}

impl Display for DiveLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_markup())
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone as _};

    use super::*;

    const LOG: &str = r#"<divelog program='subsurface' version='3'>
<settings/>
<dives>
  <dive number='1' date='2023-01-01' time='08:00:00' duration='10:00 min' tags='boat'>
    <divecomputer model='A'>
      <sample time='0:00 min' depth='0.0 m'/>
      <sample time='5:00 min' depth='20.0 m'/>
      <sample time='10:00 min' depth='0.0 m'/>
    </divecomputer>
  </dive>
  <trip>
    <dive number='2' date='2023-01-01' time='14:00:00' duration='10:00 min' divesiteid='ghost'>
      <divecomputer model='A'>
        <sample time='0:00 min' depth='0.0 m'/>
        <sample time='10:00 min' depth='10.0 m'/>
      </divecomputer>
    </dive>
  </trip>
</dives>
</divelog>"#;

    fn log() -> DiveLog {
        let mut log = DiveLog::parse(LOG).unwrap();
        log.set_default_time_zone("+0000").unwrap();
        log
    }

    #[test]
    fn test_parse() {
        let log = log();
        assert_eq!(log.dives().len(), 2);
        assert_eq!(log.dives().map(|d| d.number()).collect::<Vec<_>>(), vec![1, 2]);
        // The dangling link is dropped and an empty divesites is added
        assert!(log.dive(1).unwrap().site().is_none());
        assert!(!log.to_markup().contains("ghost"));
        assert!(log.to_markup().contains("<divesites/>"));
        assert!(log.dive(2).is_none());
    }

    #[test]
    fn test_parse_rejects_other_documents() {
        assert!(matches!(
            DiveLog::parse("<gpx/>"),
            Err(DiveLogError::Document(DocumentError::InvalidRoot { .. }))
        ));
        assert!(matches!(
            DiveLog::parse("<divelog>"),
            Err(DiveLogError::Document(DocumentError::Parse(_)))
        ));
        assert!(DiveLog::parse("<divesites/>").is_ok());
    }

    #[test]
    fn test_default_time_zone() {
        let mut log = log();
        assert_eq!(log.default_time_zone().to_string(), "+0000");
        assert!(log.set_default_time_zone("Mars/Olympus").is_err());
        assert_eq!(log.default_time_zone().to_string(), "+0000");

        let before = log.dive(0).unwrap().start().unwrap();
        log.set_default_time_zone("-0100").unwrap();
        let after = log.dive(0).unwrap().start().unwrap();
        assert_eq!(after - before, Duration::hours(1));
    }

    #[test]
    fn test_data_at() {
        let log = log();
        let at = Utc.with_ymd_and_hms(2023, 1, 1, 14, 5, 0).unwrap();
        let (dive, sample) = log.data_at(at).unwrap().unwrap();
        assert_eq!(dive.number(), 2);
        assert_eq!(sample.depth, 5.0);
        assert_eq!(log.sample_at(at).unwrap().unwrap().depth, 5.0);
        assert_eq!(log.dive_at(at).unwrap().unwrap().number(), 2);

        let between = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap();
        assert!(log.data_at(between).unwrap().is_none());
    }

    #[test]
    fn test_set_spot_creates_and_reuses_sites() {
        let mut log = log();
        let point = Point::new(-23.0, -45.0, 0.0);
        let created = log.set_spot(0, &point).unwrap();
        assert_eq!(log.dive(0).unwrap().site().unwrap().uuid(), created.uuid());
        assert!(log.dive(0).unwrap().is_located());

        // ~10 m away: the same site is reused
        let nearby = Point::new(-23.0, -45.0001, 0.0);
        let reused = log.set_spot(1, &nearby).unwrap();
        assert_eq!(reused.uuid(), created.uuid());
        assert_eq!(log.sites().count(), 1);

        assert!(matches!(
            log.set_spot(5, &point),
            Err(DiveLogError::UnknownDive(5))
        ));
    }

    #[test]
    fn test_set_spot_fills_unlocated_site() {
        let mut log = DiveLog::parse(
            "<divelog><divesites><site uuid='s1' name='Wreck'/></divesites><dives><dive number='1' date='2023-01-01' time='08:00:00' divesiteid='s1'/></dives></divelog>",
        )
        .unwrap();
        let site = log.set_spot(0, &Point::new(10.0, 20.0, 0.0)).unwrap();
        assert_eq!(site.uuid(), "s1");
        assert_eq!(site.point().unwrap().name(), Some("Wreck"));
        assert_eq!(log.sites().count(), 1);
        // The site is now located, so its longitude drives the time zone
        assert_eq!(
            log.dive(0).unwrap().time_zone_source().unwrap(),
            TimeZoneSource::SiteLongitude
        );
    }

    #[test]
    fn test_time_zone_markers() {
        let mut log = log();
        let point = Point::new(-23.0, -45.0, 0.0);
        let site = log.set_spot(0, &point).unwrap();

        log.set_site_time_zone(site.uuid(), "+0100").unwrap();
        let dive = log.dive(0).unwrap();
        assert_eq!(dive.time_zone_source().unwrap(), TimeZoneSource::Site);
        assert_eq!(dive.time_zone().unwrap().to_string(), "+0100");

        log.set_dive_time_zone(0, "-0300").unwrap();
        let dive = log.dive(0).unwrap();
        assert_eq!(dive.tags(), "boat, #tz:-0300");
        assert_eq!(dive.time_zone_source().unwrap(), TimeZoneSource::Dive);
        assert_eq!(
            dive.start().unwrap().with_timezone(&Utc),
            Utc.with_ymd_and_hms(2023, 1, 1, 11, 0, 0).unwrap()
        );

        assert!(log.set_dive_time_zone(0, "nope").is_err());
        assert!(matches!(
            log.set_site_time_zone("missing", "+0100"),
            Err(DiveLogError::UnknownSite(_))
        ));
    }
}
