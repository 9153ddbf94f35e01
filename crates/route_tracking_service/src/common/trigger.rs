/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::types::*;
use crate::tools::error::AppError;
use chrono::NaiveDate;

#[derive(Clone, Debug, PartialEq)]
pub struct TriggerOutcome {
    pub action: TriggerAction,
    pub stop_index: usize,
    pub at: TimeStamp,
    pub route_completed: bool,
}

/// Builds the transient trigger state for a route that has none yet.
/// Alternation starts with a departure at stop 0; a process restart re-seeds
/// from the persisted progress so the alternation picks up where it left off.
pub fn seed_trigger_state(progress: &RouteProgress) -> TriggerState {
    let index = progress.current_stop_index;
    let next_action = match progress.stops.get(index) {
        Some(stop) if stop.actual_arrival.is_some() && stop.actual_departure.is_none() => {
            TriggerAction::Departure
        }
        _ if index == 0 => TriggerAction::Departure,
        _ => TriggerAction::Arrival,
    };

    TriggerState {
        current_stop_index: index,
        next_action,
        last_triggered_at: None,
    }
}

/// The tracking engine advances the progress record without touching the
/// cached trigger state, so a cached state can lag behind GPS-fixed events.
/// A state whose stop pointer no longer matches the record, or whose
/// targeted stop the engine already departed, is rebuilt from the record
/// before use.
pub fn reconcile_trigger_state(progress: &RouteProgress, state: TriggerState) -> TriggerState {
    let stale = state.current_stop_index != progress.current_stop_index
        || progress
            .stops
            .get(state.current_stop_index)
            .map_or(false, |stop| stop.status.is_departed());

    if stale {
        let mut reseeded = seed_trigger_state(progress);
        reseeded.last_triggered_at = state.last_triggered_at;
        reseeded
    } else {
        state
    }
}

/// The trigger only operates on routes scheduled for the current calendar
/// day, and never on a finished route. Rejections mutate nothing.
pub fn guard_triggerable(
    route: &Route,
    progress: &RouteProgress,
    today: NaiveDate,
) -> Result<(), AppError> {
    if route.service_date != today {
        return Err(AppError::RouteNotScheduledToday(route.route_id.inner()));
    }
    if progress.status == RouteProgressStatus::Completed {
        return Err(AppError::RouteAlreadyCompleted(route.route_id.inner()));
    }
    Ok(())
}

/// Fixes the next expected event for the route without waiting for a
/// geofence crossing: departure and arrival strictly alternate, and the stop
/// pointer advances only on departures.
pub fn apply_trigger(
    progress: &mut RouteProgress,
    state: &mut TriggerState,
    now: TimeStamp,
) -> Result<TriggerOutcome, AppError> {
    let stop_index = state.current_stop_index;
    if stop_index >= progress.stops.len() {
        return Err(AppError::InvalidRequest(
            "no remaining stop to trigger".to_string(),
        ));
    }

    let action = state.next_action;
    let mut route_completed = false;

    match action {
        TriggerAction::Departure => {
            let last_stop = stop_index + 1 == progress.stops.len();
            let stop = &mut progress.stops[stop_index];
            stop.actual_departure.get_or_insert(now);
            stop.exited_geofence_at.get_or_insert(now);
            stop.status = StopStatus::Completed;

            if progress.status == RouteProgressStatus::NotStarted {
                progress.status = RouteProgressStatus::InProgress;
                progress.start_time.get_or_insert(now);
            }

            if last_stop {
                progress.status = RouteProgressStatus::Completed;
                progress.end_time.get_or_insert(now);
                route_completed = true;
            } else {
                progress.current_stop_index = stop_index + 1;
                state.current_stop_index = stop_index + 1;
            }
            state.next_action = TriggerAction::Arrival;
        }
        TriggerAction::Arrival => {
            let stop = &mut progress.stops[stop_index];
            stop.actual_arrival.get_or_insert(now);
            stop.entered_geofence_at.get_or_insert(now);
            if matches!(stop.status, StopStatus::Pending | StopStatus::EnRoute) {
                stop.status = StopStatus::Arrived;
            }
            state.next_action = TriggerAction::Departure;
        }
    }

    state.last_triggered_at = Some(now);

    Ok(TriggerOutcome {
        action,
        stop_index,
        at: now,
        route_completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn ts(minute: u32) -> TimeStamp {
        TimeStamp(
            Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap()
                + chrono::Duration::minutes(minute as i64),
        )
    }

    fn fixture_route(stop_count: usize) -> Route {
        Route {
            route_id: RouteId("route-1".to_string()),
            service_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            driver_id: DriverId("driver-1".to_string()),
            vehicle_id: VehicleId("vehicle-1".to_string()),
            stops: (0..stop_count)
                .map(|i| Stop {
                    stop_id: StopId(format!("stop-{}", i + 1)),
                    warehouse_id: WarehouseId(format!("warehouse-{}", i + 1)),
                    order: i as u32,
                    planned_arrival: ts(60 * i as u32),
                    planned_departure: ts(60 * i as u32 + 30),
                    has_lunch_break: false,
                    lunch_duration_minutes: None,
                    traffic_scenario: None,
                })
                .collect(),
            speed_limit: None,
        }
    }

    #[test]
    fn alternation_is_strict_and_index_advances_on_departure_only() {
        let route = fixture_route(3);
        let mut progress = RouteProgress::new(&route);
        let mut state = seed_trigger_state(&progress);

        assert_eq!(state.next_action, TriggerAction::Departure);
        assert_eq!(state.current_stop_index, 0);

        let expected = [
            (TriggerAction::Departure, 0, 1),
            (TriggerAction::Arrival, 1, 1),
            (TriggerAction::Departure, 1, 2),
            (TriggerAction::Arrival, 2, 2),
        ];
        for (i, (action, stop_index, index_after)) in expected.into_iter().enumerate() {
            let outcome = apply_trigger(&mut progress, &mut state, ts(i as u32)).unwrap();
            assert_eq!(outcome.action, action);
            assert_eq!(outcome.stop_index, stop_index);
            assert_eq!(state.current_stop_index, index_after);
        }

        // Final departure finishes the route.
        let outcome = apply_trigger(&mut progress, &mut state, ts(10)).unwrap();
        assert_eq!(outcome.action, TriggerAction::Departure);
        assert!(outcome.route_completed);
        assert_eq!(progress.status, RouteProgressStatus::Completed);
    }

    #[test]
    fn departure_marks_stop_completed_and_starts_route() {
        let route = fixture_route(2);
        let mut progress = RouteProgress::new(&route);
        let mut state = seed_trigger_state(&progress);

        let outcome = apply_trigger(&mut progress, &mut state, ts(0)).unwrap();
        assert_eq!(outcome.action, TriggerAction::Departure);
        assert_eq!(progress.stops[0].status, StopStatus::Completed);
        assert_eq!(progress.stops[0].actual_departure, Some(ts(0)));
        assert_eq!(progress.status, RouteProgressStatus::InProgress);
        assert_eq!(progress.start_time, Some(ts(0)));
    }

    #[test]
    fn guard_rejects_non_today_routes_without_mutation() {
        let route = fixture_route(2);
        let progress = RouteProgress::new(&route);
        let not_today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        let err = guard_triggerable(&route, &progress, not_today).unwrap_err();
        assert!(matches!(err, AppError::RouteNotScheduledToday(_)));
        assert_eq!(progress, RouteProgress::new(&route));
    }

    #[test]
    fn guard_rejects_completed_routes() {
        let route = fixture_route(1);
        let mut progress = RouteProgress::new(&route);
        progress.status = RouteProgressStatus::Completed;

        let err = guard_triggerable(&route, &progress, route.service_date).unwrap_err();
        assert!(matches!(err, AppError::RouteAlreadyCompleted(_)));
    }

    #[test]
    fn reconcile_fast_forwards_state_after_gps_advancement() {
        let route = fixture_route(3);
        let mut progress = RouteProgress::new(&route);
        let mut state = seed_trigger_state(&progress);

        // Operator fixes the first departure manually.
        let outcome = apply_trigger(&mut progress, &mut state, ts(0)).unwrap();
        assert_eq!(outcome.action, TriggerAction::Departure);
        assert_eq!(state.current_stop_index, 1);

        // GPS then fixes stop 2 end to end; the cached state is not told.
        progress.stops[1].status = StopStatus::Departed;
        progress.stops[1].actual_arrival = Some(ts(30));
        progress.stops[1].actual_departure = Some(ts(45));
        progress.current_stop_index = 2;

        let mut state = reconcile_trigger_state(&progress, state);
        assert_eq!(state.current_stop_index, 2);
        assert_eq!(state.next_action, TriggerAction::Arrival);
        assert_eq!(state.last_triggered_at, Some(ts(0)));

        // The next trigger lands on the live stop, not the departed one.
        let outcome = apply_trigger(&mut progress, &mut state, ts(50)).unwrap();
        assert_eq!(outcome.action, TriggerAction::Arrival);
        assert_eq!(outcome.stop_index, 2);
        assert_eq!(progress.stops[1].actual_arrival, Some(ts(30)));
    }

    #[test]
    fn reconcile_keeps_state_that_matches_progress() {
        let route = fixture_route(3);
        let mut progress = RouteProgress::new(&route);
        let mut state = seed_trigger_state(&progress);

        apply_trigger(&mut progress, &mut state, ts(0)).unwrap();
        apply_trigger(&mut progress, &mut state, ts(10)).unwrap();

        // Stop 2 is arrived and awaiting its departure; nothing is stale.
        let reconciled = reconcile_trigger_state(&progress, state);
        assert_eq!(reconciled, state);
    }

    #[test]
    fn seed_resumes_mid_stop_after_restart() {
        let route = fixture_route(3);
        let mut progress = RouteProgress::new(&route);
        progress.current_stop_index = 1;
        progress.stops[1].actual_arrival = Some(ts(5));
        progress.stops[1].status = StopStatus::Arrived;

        let state = seed_trigger_state(&progress);
        assert_eq!(state.current_stop_index, 1);
        assert_eq!(state.next_action, TriggerAction::Departure);
    }
}
