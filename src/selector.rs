//! Candidate selection and the destination-zone book.
//!
//! The book records which zones a rider has placed for each vehicle and
//! which vehicles are hidden. A planning run takes a snapshot of it through
//! [`select_candidates`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{
    Candidate, Coordinate, DestinationZone, RadiusBounds, ServicePoint, ServicePointId,
};

#[derive(Debug, Clone, Default)]
struct OwnerZones {
    next_sequence: u32,
    zones: Vec<DestinationZone>,
}

#[derive(Debug, Clone, Default)]
pub struct ZoneBook {
    bounds: RadiusBounds,
    owners: BTreeMap<ServicePointId, OwnerZones>,
    hidden: BTreeSet<ServicePointId>,
}

impl ZoneBook {
    pub fn new(bounds: RadiusBounds) -> Self {
        Self {
            bounds,
            owners: BTreeMap::new(),
            hidden: BTreeSet::new(),
        }
    }

    pub fn bounds(&self) -> &RadiusBounds {
        &self.bounds
    }

    /// Add a zone stamped with the current time.
    pub fn add_zone(
        &mut self,
        owner: &ServicePointId,
        position: Coordinate,
        requested_radius_m: f64,
    ) -> Option<&DestinationZone> {
        self.add_zone_at(owner, position, requested_radius_m, Utc::now())
    }

    /// Add a zone for `owner`. Hidden owners accept no zones.
    ///
    /// The radius is clamped into the book's bounds and the zone gets the
    /// owner's next 1-based sequence index.
    pub fn add_zone_at(
        &mut self,
        owner: &ServicePointId,
        position: Coordinate,
        requested_radius_m: f64,
        created_at: DateTime<Utc>,
    ) -> Option<&DestinationZone> {
        if self.hidden.contains(owner) {
            debug!(%owner, "ignoring zone for hidden service point");
            return None;
        }
        let radius_m = self.bounds.clamp(requested_radius_m);
        let entry = self.owners.entry(owner.clone()).or_default();
        entry.next_sequence += 1;
        entry.zones.push(DestinationZone {
            owner: owner.clone(),
            sequence_index: entry.next_sequence,
            position,
            radius_m,
            created_at,
        });
        entry.zones.last()
    }

    pub fn zones_for(&self, owner: &ServicePointId) -> &[DestinationZone] {
        self.owners
            .get(owner)
            .map(|o| o.zones.as_slice())
            .unwrap_or(&[])
    }

    /// Drop every zone of `owner`; numbering starts again at 1.
    pub fn clear_zones(&mut self, owner: &ServicePointId) -> usize {
        self.owners.remove(owner).map(|o| o.zones.len()).unwrap_or(0)
    }

    /// Hide a service point and drop its zones.
    pub fn hide(&mut self, owner: &ServicePointId) {
        self.owners.remove(owner);
        self.hidden.insert(owner.clone());
    }

    pub fn unhide(&mut self, owner: &ServicePointId) -> bool {
        self.hidden.remove(owner)
    }

    pub fn is_hidden(&self, owner: &ServicePointId) -> bool {
        self.hidden.contains(owner)
    }

    /// Forget zones and hidden flags of service points absent from a
    /// refreshed feed. Returns the ids whose zones were removed.
    pub fn retain_owners<'a, I>(&mut self, present: I) -> Vec<ServicePointId>
    where
        I: IntoIterator<Item = &'a ServicePointId>,
    {
        let present: BTreeSet<&ServicePointId> = present.into_iter().collect();
        let gone: Vec<ServicePointId> = self
            .owners
            .keys()
            .filter(|id| !present.contains(id))
            .cloned()
            .collect();
        for id in &gone {
            self.owners.remove(id);
        }
        self.hidden.retain(|id| present.contains(id));
        if !gone.is_empty() {
            debug!(removed = gone.len(), "dropped zones of vanished service points");
        }
        gone
    }

    pub fn zone_count(&self) -> usize {
        self.owners.values().map(|o| o.zones.len()).sum()
    }
}

/// Service points that are visible and have at least one pending zone, in
/// feed order.
pub fn select_candidates(points: &[ServicePoint], book: &ZoneBook) -> Vec<Candidate> {
    points
        .iter()
        .filter(|point| !book.is_hidden(&point.id))
        .filter_map(|point| {
            let zones = book.zones_for(&point.id);
            (!zones.is_empty()).then(|| Candidate::new(point.clone(), zones.to_vec()))
        })
        .collect()
}
