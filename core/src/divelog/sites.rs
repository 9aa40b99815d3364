use tracing::{debug, info, warn};

use super::DiveLog;
use crate::geomath::{meters_to_degrees, Point};
use crate::markup::{Document, NodeId};
use crate::timezone::find_marker;
use crate::utils::string_hash;

/// Sites closer than this to a queried position are reused instead of created.
pub const SITE_RADIUS: f64 = 100.0;

/// Finest truncation band first: 4 decimals (~10 m) down to 0 (~100 km).
const SEARCH_PRECISIONS: [u32; 5] = [4, 3, 2, 1, 0];

/// Finest band whose cells are wide enough that every site within
/// [`SITE_RADIUS`] of `point` shares its cell or a neighbouring one. `None`
/// near the poles, where only a full scan is safe.
fn search_precision(point: &Point) -> Option<u32> {
    let reach = 2.0 * meters_to_degrees(SITE_RADIUS, point.lat());
    SEARCH_PRECISIONS
        .into_iter()
        .find(|precision| 10f64.powi(-(*precision as i32)) >= reach)
}

fn is_neighbour(a: (i64, i64), b: (i64, i64)) -> bool {
    (a.0 - b.0).abs() <= 1 && (a.1 - b.1).abs() <= 1
}

pub(crate) const CREATED_MARKER: &str = "## Created by subsurface-tools ##";

#[derive(Debug, Clone, PartialEq)]
pub struct DiveSite {
    uuid: String,
    name: Option<String>,
    point: Option<Point>,
    notes: Option<String>,
}

fn parse_gps(value: &str) -> Option<(f64, f64)> {
    let mut parts = value.split_whitespace();
    let lat = parts.next()?.parse().ok()?;
    let lon = parts.next()?.parse().ok()?;
    Some((lat, lon))
}

impl DiveSite {
    pub(crate) fn from_element(document: &Document, id: NodeId) -> Option<Self> {
        let uuid = document.attribute(id, "uuid")?.trim().to_string();
        let name = document.attribute(id, "name").map(str::to_string);
        let point = document.attribute(id, "gps").and_then(|gps| {
            let (lat, lon) = parse_gps(gps)?;
            let label = name.clone().unwrap_or_else(|| gps.trim().to_string());
            Some(Point::new(lat, lon, 0.0).with_name(label))
        });
        let notes = document
            .first_named(id, "notes")
            .map(|notes| document.text(notes));

        Some(DiveSite {
            uuid,
            name,
            point,
            notes,
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Position labelled with the site name (or its coordinates).
    pub fn point(&self) -> Option<&Point> {
        self.point.as_ref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn is_located(&self) -> bool {
        self.point.is_some()
    }

    /// Raw `#tz:` token from the site notes.
    pub fn time_zone_marker(&self) -> Option<&str> {
        self.notes.as_deref().and_then(find_marker)
    }
}

impl DiveLog {
    fn site_elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.document.elements_named(self.sites, "site")
    }

    pub(crate) fn site_element(&self, uuid: &str) -> Option<NodeId> {
        let uuid = uuid.trim();
        self.site_elements().find(|id| {
            self.document
                .attribute(*id, "uuid")
                .is_some_and(|v| v.trim() == uuid)
        })
    }

    pub fn sites(&self) -> impl Iterator<Item = DiveSite> + '_ {
        self.site_elements()
            .filter_map(|id| DiveSite::from_element(&self.document, id))
    }

    pub fn site_by_uuid(&self, uuid: &str) -> Option<DiveSite> {
        self.site_element(uuid)
            .and_then(|id| DiveSite::from_element(&self.document, id))
    }

    /// The nearest located site within [`SITE_RADIUS`] of `point`.
    ///
    /// Candidates are the sites in `point`'s truncated cell or one of its
    /// neighbours, so sites just across a cell border are still found.
    pub fn find_site(&self, point: &Point) -> Option<DiveSite> {
        let band = search_precision(point).map(|precision| (precision, point.cell(precision)));

        let nearest = self
            .sites()
            .filter_map(|site| {
                let location = site.point()?;
                if let Some((precision, cell)) = band {
                    if !is_neighbour(location.cell(precision), cell) {
                        return None;
                    }
                }
                let distance = point.distance_to(location);
                (distance <= SITE_RADIUS).then_some((site, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        nearest.map(|(site, distance)| {
            debug!(
                uuid = site.uuid(),
                distance,
                precision = ?band.map(|(precision, _)| precision),
                "Matched dive site"
            );
            site
        })
    }

    /// Like [`DiveLog::find_site`], creating a site at `point` when nothing is
    /// close enough and `create` is set.
    pub fn site_by_position(&mut self, point: &Point, create: bool) -> Option<DiveSite> {
        match self.find_site(point) {
            Some(site) => Some(site),
            None if create => Some(self.create_site(point)),
            None => None,
        }
    }

    /// Sets the GPS position of a site that has none (or of any site when
    /// `force` is set). Returns whether the site was updated.
    pub fn set_site_position(&mut self, uuid: &str, point: &Point, force: bool) -> bool {
        let Some(id) = self.site_element(uuid) else {
            return false;
        };
        if self.document.has_attribute(id, "gps") && !force {
            return false;
        }
        self.document.set_attribute(id, "gps", &point.coords());
        self.invalidate_time_zones();
        debug!(uuid, gps = %point.coords(), "Updated dive site position");
        true
    }

    /// Identifier derived from the point label. Not collision resistant: when
    /// it matches an existing site, that site is returned as is.
    pub(super) fn create_site(&mut self, point: &Point) -> DiveSite {
        let name = point.desc();
        let hash = string_hash(&format!("{name}{CREATED_MARKER}"))
            .unsigned_abs()
            .to_string();
        let uuid: String = hash.chars().take(8).collect();

        if let Some(existing) = self.site_by_uuid(&uuid) {
            warn!(%uuid, %name, "Dive site identifier already in use, reusing it");
            return existing;
        }

        let site = self.document.append_element(self.sites, "site");
        self.document.set_attribute(site, "uuid", &uuid);
        self.document.set_attribute(site, "name", &name);
        self.document.set_attribute(site, "gps", &point.coords());
        let notes = self.document.append_element(site, "notes");
        self.document.set_text(notes, CREATED_MARKER);
        info!(%uuid, %name, gps = %point.coords(), "Created dive site");

        DiveSite {
            uuid,
            name: Some(name.clone()),
            point: Some(Point::new(point.lat(), point.lon(), 0.0).with_name(name)),
            notes: Some(CREATED_MARKER.to_string()),
        }
    }
}
