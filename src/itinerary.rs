//! Itinerary assembly from a solved order and its resolved legs.

use crate::model::{
    DestinationZone, Diagnostic, Itinerary, LegCost, PlanStep, ServicePoint, SolverKind,
};

/// A visit whose legs have been resolved, in visiting order.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub service_point: ServicePoint,
    pub zone: DestinationZone,
    pub access_leg: LegCost,
    pub transfer_leg: LegCost,
}

pub fn assemble(
    steps: Vec<ResolvedStep>,
    solver: SolverKind,
    diagnostics: Vec<Diagnostic>,
) -> Itinerary {
    let total_access_duration_s: f64 = steps.iter().map(|s| s.access_leg.duration_s).sum();
    let total_transfer_duration_s: f64 = steps.iter().map(|s| s.transfer_leg.duration_s).sum();
    let service_points_used = steps.iter().map(|s| s.service_point.id.clone()).collect();

    let steps = steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| PlanStep {
            order_index: i + 1,
            service_point: step.service_point,
            zone: step.zone,
            access_leg: step.access_leg,
            transfer_leg: step.transfer_leg,
        })
        .collect();

    Itinerary {
        steps,
        total_duration_s: total_access_duration_s + total_transfer_duration_s,
        total_access_duration_s,
        total_transfer_duration_s,
        service_points_used,
        solver,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{Coordinate, LegMode, ServicePointId};
    use crate::polyline::Polyline;

    fn step(id: &str, access_s: f64, transfer_s: f64) -> ResolvedStep {
        let car = Coordinate::new(47.50, 19.05);
        let zone = Coordinate::new(47.51, 19.06);
        ResolvedStep {
            service_point: ServicePoint::new(id, id, car),
            zone: DestinationZone {
                owner: ServicePointId::from(id),
                sequence_index: 1,
                position: zone,
                radius_m: 360.0,
                created_at: Utc::now(),
            },
            access_leg: LegCost::new(LegMode::Walk, access_s, None, Polyline::straight(car, car)),
            transfer_leg: LegCost::new(
                LegMode::Drive,
                transfer_s,
                None,
                Polyline::straight(car, zone),
            ),
        }
    }

    #[test]
    fn totals_and_order_indices() {
        let itinerary = assemble(
            vec![step("a", 100.0, 200.0), step("b", 50.0, 300.0)],
            SolverKind::Exact,
            Vec::new(),
        );
        assert_eq!(itinerary.total_access_duration_s, 150.0);
        assert_eq!(itinerary.total_transfer_duration_s, 500.0);
        assert_eq!(itinerary.total_duration_s, 650.0);
        assert_eq!(
            itinerary.steps.iter().map(|s| s.order_index).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(
            itinerary.service_points_used,
            vec![ServicePointId::from("a"), ServicePointId::from("b")]
        );
    }

    #[test]
    fn empty_itinerary_has_zero_totals() {
        let itinerary = assemble(Vec::new(), SolverKind::Greedy, Vec::new());
        assert!(itinerary.steps.is_empty());
        assert_eq!(itinerary.total_duration_s, 0.0);
    }
}
