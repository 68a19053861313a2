//! Cost tables prefetched before the visiting-order search.
//!
//! The search only looks up durations; every collaborator round-trip
//! happens here, up front. The walking table and the per-vehicle driving
//! tables are independent, so they are requested concurrently.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::model::{Candidate, Coordinate};
use crate::resolver::{LegCostResolver, LegError};
use crate::traits::{CostTable, TravelMode};

/// Where the traveller stands before the next access leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Origin,
    /// Global zone index (see [`CostTables::zone`]).
    Zone(usize),
}

/// A zone addressed by its owning candidate and its slot in that candidate's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneRef {
    pub candidate: usize,
    pub slot: usize,
}

/// Access and transfer durations in seconds; `None` marks an unobtainable leg.
#[derive(Debug, Clone, PartialEq)]
pub struct CostTables {
    /// Row 0 is the origin, row `1 + z` is global zone `z`; one column per candidate.
    access: Vec<Vec<Option<f64>>>,
    /// `transfer[c][slot]`: candidate `c` to its zone in `slot`.
    transfer: Vec<Vec<Option<f64>>>,
    zones: Vec<ZoneRef>,
    zones_by_candidate: Vec<Vec<usize>>,
}

impl CostTables {
    /// Build tables from raw matrices.
    ///
    /// Zones are numbered in candidate order following the shape of
    /// `transfer`; `access` must have `1 + total zones` rows.
    pub fn from_parts(access: Vec<Vec<Option<f64>>>, transfer: Vec<Vec<Option<f64>>>) -> Self {
        let mut zones = Vec::new();
        let mut zones_by_candidate = Vec::with_capacity(transfer.len());
        for (candidate, row) in transfer.iter().enumerate() {
            let mut owned = Vec::with_capacity(row.len());
            for slot in 0..row.len() {
                owned.push(zones.len());
                zones.push(ZoneRef { candidate, slot });
            }
            zones_by_candidate.push(owned);
        }

        Self {
            access,
            transfer,
            zones,
            zones_by_candidate,
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.transfer.len()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn zone(&self, zone: usize) -> ZoneRef {
        self.zones[zone]
    }

    /// Global zone indices owned by `candidate`, in input order.
    pub fn zones_of(&self, candidate: usize) -> &[usize] {
        self.zones_by_candidate
            .get(candidate)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn row(position: Position) -> usize {
        match position {
            Position::Origin => 0,
            Position::Zone(z) => 1 + z,
        }
    }

    pub fn access(&self, from: Position, candidate: usize) -> Option<f64> {
        self.access
            .get(Self::row(from))
            .and_then(|row| row.get(candidate))
            .copied()
            .flatten()
    }

    pub fn transfer(&self, zone: usize) -> Option<f64> {
        let ZoneRef { candidate, slot } = *self.zones.get(zone)?;
        self.transfer
            .get(candidate)
            .and_then(|row| row.get(slot))
            .copied()
            .flatten()
    }

    /// Access to the zone's owner plus the drive to the zone.
    pub fn step_cost(&self, from: Position, zone: usize) -> Option<f64> {
        let owner = self.zones.get(zone)?.candidate;
        Some(self.access(from, owner)? + self.transfer(zone)?)
    }

    /// A candidate is reachable when the origin or another candidate's zone
    /// can walk to it and at least one of its zones can be driven to.
    pub fn is_reachable(&self, candidate: usize) -> bool {
        let own = self.zones_of(candidate);
        let accessible = (0..self.access.len())
            .filter(|&row| row == 0 || !own.contains(&(row - 1)))
            .any(|row| self.access[row].get(candidate).copied().flatten().is_some());
        let drivable = own.iter().any(|&z| self.transfer(z).is_some());
        accessible && drivable
    }

    /// Tables restricted to `keep` (candidate indices, in the order given).
    pub fn retain_candidates(&self, keep: &[usize]) -> CostTables {
        let transfer: Vec<Vec<Option<f64>>> = keep
            .iter()
            .map(|&c| self.transfer.get(c).cloned().unwrap_or_default())
            .collect();

        let mut access = Vec::with_capacity(1 + self.zone_count());
        let project = |row: &Vec<Option<f64>>| -> Vec<Option<f64>> {
            keep.iter()
                .map(|&c| row.get(c).copied().flatten())
                .collect()
        };
        access.push(self.access.first().map(project).unwrap_or_else(|| vec![None; keep.len()]));
        for &c in keep {
            for &z in self.zones_of(c) {
                access.push(
                    self.access
                        .get(1 + z)
                        .map(project)
                        .unwrap_or_else(|| vec![None; keep.len()]),
                );
            }
        }

        CostTables::from_parts(access, transfer)
    }

    /// Fetch every access and transfer duration a search over `candidates` can need.
    ///
    /// Provider gaps (failed requests or `null` cells) are filled with the
    /// resolver's straight-line estimate. When a transit graph is enabled,
    /// each access cell is replaced by the transit duration whenever the
    /// resolver's substitution rule would pick transit for that leg.
    pub fn prefetch(
        resolver: &LegCostResolver<'_>,
        origin: Coordinate,
        candidates: &[Candidate],
    ) -> Result<CostTables, LegError> {
        resolver.check_cancelled()?;

        let vehicles: Vec<Coordinate> =
            candidates.iter().map(|c| c.service_point.position).collect();
        let mut sources = vec![origin];
        sources.extend(candidates.iter().flat_map(|c| c.zones.iter().map(|z| z.position)));

        let (mut access, transfer) = rayon::join(
            || walking_table(resolver, &sources, &vehicles),
            || {
                candidates
                    .par_iter()
                    .map(|candidate| driving_row(resolver, candidate))
                    .collect::<Vec<_>>()
            },
        );
        resolver.check_cancelled()?;

        if resolver.transit().is_some() {
            access
                .par_iter_mut()
                .zip(sources.par_iter())
                .for_each(|(row, from)| {
                    for (cell, to) in row.iter_mut().zip(&vehicles) {
                        if let Some(leg) = resolver.transit_alternative(*from, *to) {
                            *cell = Some(leg.duration_s);
                        }
                    }
                });
            resolver.check_cancelled()?;
        }

        Ok(CostTables::from_parts(access, transfer))
    }
}

fn walking_table(
    resolver: &LegCostResolver<'_>,
    sources: &[Coordinate],
    vehicles: &[Coordinate],
) -> Vec<Vec<Option<f64>>> {
    let table = query_or_empty(resolver, TravelMode::Walk, sources, vehicles);
    fill_gaps(resolver, TravelMode::Walk, &table, sources, vehicles)
}

fn driving_row(resolver: &LegCostResolver<'_>, candidate: &Candidate) -> Vec<Option<f64>> {
    let from = [candidate.service_point.position];
    let zones: Vec<Coordinate> = candidate.zones.iter().map(|z| z.position).collect();
    let table = query_or_empty(resolver, TravelMode::Drive, &from, &zones);
    fill_gaps(resolver, TravelMode::Drive, &table, &from, &zones)
        .into_iter()
        .next()
        .unwrap_or_default()
}

fn query_or_empty(
    resolver: &LegCostResolver<'_>,
    mode: TravelMode,
    origins: &[Coordinate],
    destinations: &[Coordinate],
) -> CostTable {
    if destinations.is_empty() || resolver.check_cancelled().is_err() {
        return CostTable::empty(origins.len(), destinations.len());
    }
    match resolver.provider().table_query(mode, origins, destinations) {
        Ok(table) => table,
        Err(err) => {
            warn!(?mode, error = %err, "table query failed, using straight-line estimates");
            CostTable::empty(origins.len(), destinations.len())
        }
    }
}

fn fill_gaps(
    resolver: &LegCostResolver<'_>,
    mode: TravelMode,
    table: &CostTable,
    origins: &[Coordinate],
    destinations: &[Coordinate],
) -> Vec<Vec<Option<f64>>> {
    let mut estimated = 0usize;
    let rows: Vec<Vec<Option<f64>>> = origins
        .iter()
        .enumerate()
        .map(|(i, from)| {
            destinations
                .iter()
                .enumerate()
                .map(|(j, to)| {
                    table.duration(i, j).or_else(|| {
                        estimated += 1;
                        resolver.estimator().estimate(mode, *from, *to).map(|(d, _)| d)
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect();
    if estimated > 0 {
        debug!(?mode, estimated, "filled table cells with estimates");
    }
    rows
}
