//! Bulk edits over every dive computer block or site of a log. Each one is
//! idempotent and reports `(eligible, changed)`.

use std::collections::HashMap;

use tracing::{info, instrument};

use super::{DiveLog, DiveSite};
use crate::errors::DiveLogError;
use crate::geomath::Point;
use crate::markup::NodeId;
use crate::timezone::TimeZone;

/// Salt water, as Subsurface writes it.
pub const DEFAULT_SALINITY: &str = "1030 g/l";

impl DiveLog {
    fn computers(&self) -> Vec<NodeId> {
        self.dives
            .iter()
            .flat_map(|dive| self.document.elements_named(*dive, "divecomputer"))
            .collect()
    }

    /// Adds a child to a dive computer block, before the first child named in
    /// `before` (samples and events go last).
    fn insert_into_computer(&mut self, dc: NodeId, name: &str, before: &[&str]) -> NodeId {
        let anchor = self
            .document
            .elements(dc)
            .find(|child| before.iter().any(|b| self.document.is_named(*child, b)));
        match anchor {
            Some(anchor) => self.document.insert_element_before(anchor, name),
            None => self.document.append_element(dc, name),
        }
    }

    /// Sets the default water salinity on every dive computer block without one.
    #[instrument(skip(self))]
    pub fn fix_salinity(&mut self) -> (usize, usize) {
        let computers = self.computers();
        let mut changed = 0;

        for dc in &computers {
            let water = self.document.first_named(*dc, "water");
            if water.is_some_and(|w| self.document.has_attribute(w, "salinity")) {
                continue;
            }
            let water = match water {
                Some(water) => water,
                None => self.insert_into_computer(*dc, "water", &["sample"]),
            };
            self.document
                .set_attribute(water, "salinity", DEFAULT_SALINITY);
            changed += 1;
        }

        info!(eligible = computers.len(), changed, "Fixed water salinity");
        (computers.len(), changed)
    }

    /// Copies the device serial from `settings/fingerprint` into every dive
    /// computer block with a `deviceid` but no `Serial` extra data.
    #[instrument(skip(self))]
    pub fn fix_serial(&mut self) -> (usize, usize) {
        let root = self.document.root();
        let serials: HashMap<String, String> = self
            .document
            .elements_named(root, "settings")
            .flat_map(|settings| self.document.elements_named(settings, "fingerprint"))
            .filter_map(|fp| {
                let device = self.document.attribute(fp, "deviceid")?;
                let serial = self.document.attribute(fp, "serial")?;
                Some((device.trim().to_lowercase(), serial.to_string()))
            })
            .collect();

        let computers: Vec<(NodeId, String)> = self
            .computers()
            .into_iter()
            .filter_map(|dc| {
                let device = self.document.attribute(dc, "deviceid")?;
                Some((dc, device.trim().to_lowercase()))
            })
            .collect();
        let mut changed = 0;

        for (dc, device) in &computers {
            let has_serial = self.document.elements_named(*dc, "extradata").any(|extra| {
                self.document
                    .attribute(extra, "key")
                    .is_some_and(|key| key == "Serial")
            });
            if has_serial {
                continue;
            }
            let Some(serial) = serials.get(device) else {
                continue;
            };
            let extra = self.insert_into_computer(*dc, "extradata", &["event", "sample"]);
            self.document.set_attribute(extra, "key", "Serial");
            self.document.set_attribute(extra, "value", serial);
            changed += 1;
        }

        info!(eligible = computers.len(), changed, "Fixed dive computer serials");
        (computers.len(), changed)
    }

    /// Writes time zone markers: sites get their longitude estimate (or
    /// `default` when unlocated), unlocated dives get `default`. Existing
    /// markers are kept unless `replace` is set.
    #[instrument(skip(self))]
    pub fn fix_time_zones(
        &mut self,
        default: &str,
        replace: bool,
    ) -> Result<(usize, usize), DiveLogError> {
        let default: TimeZone = default.parse()?;
        let sites: Vec<DiveSite> = self.sites().collect();
        let dives: Vec<(usize, bool)> = self
            .dives()
            .filter(|dive| !dive.is_located())
            .map(|dive| (dive.index(), dive.time_zone_marker().is_some()))
            .collect();
        let mut changed = 0;

        for site in &sites {
            if !replace && site.time_zone_marker().is_some() {
                continue;
            }
            let tz = site
                .point()
                .map(Point::calculated_time_zone)
                .unwrap_or_else(|| default.clone());
            if let Some(element) = self.site_element(site.uuid()) {
                self.write_site_marker(element, &tz);
                changed += 1;
            }
        }

        for (index, has_marker) in &dives {
            if !replace && *has_marker {
                continue;
            }
            self.write_dive_marker(*index, &default);
            changed += 1;
        }

        let eligible = sites.len() + dives.len();
        info!(eligible, changed, "Fixed time zones");
        Ok((eligible, changed))
    }

    /// Removes redundant samples from every dive computer block:
    /// - inside a run of samples at the same depth, the ones carrying nothing
    ///   but time and depth (the first and last of the run stay);
    /// - near-surface samples trailing the first `0.0 m` at the end of a dive.
    ///
    /// Returns the number of samples removed.
    #[instrument(skip(self))]
    pub fn compact_samples(&mut self) -> usize {
        let mut removed = Vec::new();

        for dc in self.computers() {
            let samples: Vec<(NodeId, Option<&str>)> = self
                .document
                .elements_named(dc, "sample")
                .map(|s| (s, self.document.attribute(s, "depth")))
                .collect();

            let mut kept = Vec::with_capacity(samples.len());
            for run in samples.chunk_by(|a, b| a.1.is_some() && a.1 == b.1) {
                for (position, (id, depth)) in run.iter().enumerate() {
                    let interior = position > 0 && position + 1 < run.len();
                    if interior && self.only_time_and_depth(*id) {
                        removed.push(*id);
                    } else {
                        kept.push((*id, *depth));
                    }
                }
            }

            let surface = kept
                .iter()
                .rposition(|(_, depth)| !depth.is_some_and(|d| d.starts_with("0.")))
                .map_or(0, |last_deep| last_deep + 1);
            if let Some(first_zero) = kept[surface..]
                .iter()
                .position(|(_, depth)| *depth == Some("0.0 m"))
            {
                removed.extend(kept[surface + first_zero + 1..].iter().map(|(id, _)| *id));
            }
        }

        for id in &removed {
            self.document.remove(*id);
        }
        if !removed.is_empty() {
            self.invalidate_dives();
        }
        info!(removed = removed.len(), "Compacted dive samples");
        removed.len()
    }

    fn only_time_and_depth(&self, sample: NodeId) -> bool {
        self.document
            .attributes(sample)
            .all(|(name, _)| matches!(name, "time" | "depth"))
    }
}
