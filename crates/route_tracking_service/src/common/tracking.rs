/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::types::*;
use crate::common::utils::{distance_between_in_meters, is_within_geofence};
use crate::environment::TrackingConfig;
use uuid::Uuid;

/// Advances the per-stop state machine for one position sample.
///
/// Mutates the passed `RouteProgress` in place and returns the events the
/// sample fixed. Transitions are one-way and every actual timestamp is
/// write-once, so replaying a sample is a no-op on status.
///
/// `current_stop_geofence` is the warehouse center of the stop at
/// `progress.current_stop_index`; containment against it drives every
/// transition.
pub fn process_position(
    progress: &mut RouteProgress,
    current_stop_geofence: &Point,
    position: &VehiclePosition,
    config: &TrackingConfig,
) -> Vec<TrackingEvent> {
    let mut events = Vec::new();

    progress.last_position_update_at = Some(position.timestamp);

    if progress.status == RouteProgressStatus::Completed {
        return events;
    }

    let stop_index = progress.current_stop_index;
    let Some(current_stop) = progress.stops.get(stop_index) else {
        return events;
    };

    let inside = is_within_geofence(
        &position.location,
        current_stop_geofence,
        config.geofence_radius_meters,
    );
    let at = position.timestamp;

    match current_stop.status {
        StopStatus::Pending => {
            let previous_departed = stop_index == 0
                || progress
                    .stops
                    .get(stop_index - 1)
                    .map(|stop| stop.status.is_departed())
                    .unwrap_or(false);

            if !inside && previous_departed {
                let stop = &mut progress.stops[stop_index];
                stop.status = StopStatus::EnRoute;
                stop.exited_geofence_at.get_or_insert(at);

                if stop_index == 0 {
                    progress.status = RouteProgressStatus::InProgress;
                    progress.start_time.get_or_insert(at);
                    events.push(TrackingEvent::RouteStarted { at });
                }
            }
        }
        StopStatus::EnRoute => {
            if inside {
                close_open_intermediate_stop(progress, at);

                let stop = &mut progress.stops[stop_index];
                stop.status = StopStatus::Arrived;
                stop.entered_geofence_at.get_or_insert(at);
                stop.actual_arrival.get_or_insert(at);
                events.push(TrackingEvent::ArrivalFixed { stop_index, at });
            } else {
                detect_intermediate_stop(progress, position, config);
            }
        }
        StopStatus::Arrived => {
            if !inside {
                let stop = &mut progress.stops[stop_index];
                stop.status = StopStatus::Departed;
                stop.exited_geofence_at = Some(at);
                stop.actual_departure.get_or_insert(at);
                events.push(TrackingEvent::DepartureFixed { stop_index, at });

                if stop_index + 1 < progress.stops.len() {
                    progress.current_stop_index = stop_index + 1;
                } else {
                    progress.status = RouteProgressStatus::Completed;
                    progress.end_time.get_or_insert(at);
                    events.push(TrackingEvent::RouteCompleted { at });
                }
            }
        }
        StopStatus::Departed | StopStatus::Completed => {}
    }

    events
}

/// Logs unplanned stationary periods while en route, without touching the
/// primary state machine. Samples with no speed reading are skipped.
fn detect_intermediate_stop(
    progress: &mut RouteProgress,
    position: &VehiclePosition,
    config: &TrackingConfig,
) {
    let Some(SpeedInMeterPerSecond(speed)) = position.speed else {
        return;
    };
    let at = position.timestamp;

    if speed < config.stationary_speed_threshold {
        let drifted_past_threshold = match progress.open_intermediate_stop_mut() {
            Some(open) => {
                distance_between_in_meters(&open.position, &position.location)
                    > config.intermediate_stop_move_threshold_meters
            }
            None => {
                open_intermediate_stop(progress, position);
                return;
            }
        };

        if drifted_past_threshold {
            close_open_intermediate_stop(progress, at);
            open_intermediate_stop(progress, position);
        }
    } else {
        close_open_intermediate_stop(progress, at);
    }
}

fn open_intermediate_stop(progress: &mut RouteProgress, position: &VehiclePosition) {
    let stop_index = progress.current_stop_index;
    let from_stop_id = (stop_index > 0)
        .then(|| progress.stops[stop_index - 1].stop_id.clone());
    let Some(to_stop) = progress.stops.get(stop_index) else {
        return;
    };

    progress.intermediate_stops.push(IntermediateStop {
        id: Uuid::new_v4().to_string(),
        position: position.location,
        start_time: position.timestamp,
        end_time: None,
        duration_minutes: None,
        from_stop_id,
        to_stop_id: to_stop.stop_id.clone(),
    });
}

fn close_open_intermediate_stop(progress: &mut RouteProgress, at: TimeStamp) {
    if let Some(open) = progress.open_intermediate_stop_mut() {
        open.end_time = Some(at);
        open.duration_minutes = Some(
            at.inner()
                .signed_duration_since(open.start_time.inner())
                .num_minutes(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    const STOP_1: Point = Point {
        lat: Latitude(12.9716),
        lon: Longitude(77.5946),
    };
    const STOP_2: Point = Point {
        lat: Latitude(13.0359),
        lon: Longitude(77.5970),
    };
    const STOP_3: Point = Point {
        lat: Latitude(13.1007),
        lon: Longitude(77.5963),
    };

    fn config() -> TrackingConfig {
        TrackingConfig {
            geofence_radius_meters: 160.934,
            stationary_speed_threshold: 5.0,
            intermediate_stop_move_threshold_meters: 50.0,
        }
    }

    fn ts(minute: u32) -> TimeStamp {
        TimeStamp(
            Utc.with_ymd_and_hms(2024, 3, 14, 8, 0, 0).unwrap()
                + chrono::Duration::minutes(minute as i64),
        )
    }

    fn fixture_route(centers: &[Point]) -> Route {
        Route {
            route_id: RouteId("route-1".to_string()),
            service_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            driver_id: DriverId("driver-1".to_string()),
            vehicle_id: VehicleId("vehicle-1".to_string()),
            stops: centers
                .iter()
                .enumerate()
                .map(|(i, _)| Stop {
                    stop_id: StopId(format!("stop-{}", i + 1)),
                    warehouse_id: WarehouseId(format!("warehouse-{}", i + 1)),
                    order: i as u32,
                    planned_arrival: ts(30 * (i as u32 + 1)),
                    planned_departure: ts(30 * (i as u32 + 1) + 20),
                    has_lunch_break: false,
                    lunch_duration_minutes: None,
                    traffic_scenario: None,
                })
                .collect(),
            speed_limit: None,
        }
    }

    fn sample(location: Point, speed: f64, minute: u32) -> VehiclePosition {
        VehiclePosition {
            vehicle_id: VehicleId("vehicle-1".to_string()),
            location,
            speed: Some(SpeedInMeterPerSecond(speed)),
            timestamp: ts(minute),
        }
    }

    /// A point well outside every stop's geofence, between stop 1 and 2.
    const MIDWAY: Point = Point {
        lat: Latitude(13.0000),
        lon: Longitude(77.5958),
    };

    #[test]
    fn full_geofence_lifecycle_for_first_stop() {
        let route = fixture_route(&[STOP_1, STOP_2, STOP_3]);
        let mut progress = RouteProgress::new(&route);
        let cfg = config();

        // Outside stop 1's fence: route starts, stop 1 goes en route.
        let events = process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 0), &cfg);
        assert_eq!(events, vec![TrackingEvent::RouteStarted { at: ts(0) }]);
        assert_eq!(progress.status, RouteProgressStatus::InProgress);
        assert_eq!(progress.stops[0].status, StopStatus::EnRoute);
        assert_eq!(progress.start_time, Some(ts(0)));

        // Entering the fence fixes the actual arrival.
        let events = process_position(&mut progress, &STOP_1, &sample(STOP_1, 3.0, 25), &cfg);
        assert_eq!(
            events,
            vec![TrackingEvent::ArrivalFixed {
                stop_index: 0,
                at: ts(25)
            }]
        );
        assert_eq!(progress.stops[0].status, StopStatus::Arrived);
        assert_eq!(progress.stops[0].actual_arrival, Some(ts(25)));

        // Leaving the fence fixes the actual departure and advances the pointer.
        let events = process_position(&mut progress, &STOP_1, &sample(MIDWAY, 10.0, 50), &cfg);
        assert_eq!(
            events,
            vec![TrackingEvent::DepartureFixed {
                stop_index: 0,
                at: ts(50)
            }]
        );
        assert_eq!(progress.stops[0].status, StopStatus::Departed);
        assert_eq!(progress.stops[0].actual_departure, Some(ts(50)));
        assert_eq!(progress.current_stop_index, 1);
        assert!(progress.stops[0].actual_arrival <= progress.stops[0].actual_departure);
    }

    #[test]
    fn repeated_sample_is_a_no_op() {
        let route = fixture_route(&[STOP_1, STOP_2]);
        let mut progress = RouteProgress::new(&route);
        let cfg = config();

        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 0), &cfg);
        process_position(&mut progress, &STOP_1, &sample(STOP_1, 2.0, 20), &cfg);
        let first_arrival = progress.stops[0].actual_arrival;

        // Same inside-fence sample again: no new transition, no overwrite.
        let events = process_position(&mut progress, &STOP_1, &sample(STOP_1, 2.0, 20), &cfg);
        assert!(events.is_empty());
        assert_eq!(progress.stops[0].status, StopStatus::Arrived);
        assert_eq!(progress.stops[0].actual_arrival, first_arrival);

        // A later inside-fence sample cannot re-fix the arrival either.
        let events = process_position(&mut progress, &STOP_1, &sample(STOP_1, 0.0, 22), &cfg);
        assert!(events.is_empty());
        assert_eq!(progress.stops[0].actual_arrival, first_arrival);
    }

    #[test]
    fn next_stop_waits_for_previous_departure() {
        let route = fixture_route(&[STOP_1, STOP_2]);
        let mut progress = RouteProgress::new(&route);
        let cfg = config();

        // Force stop 1 to Arrived without a departure.
        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 0), &cfg);
        process_position(&mut progress, &STOP_1, &sample(STOP_1, 2.0, 20), &cfg);

        // Stop 2 is still pending and the pointer has not moved.
        assert_eq!(progress.current_stop_index, 0);
        assert_eq!(progress.stops[1].status, StopStatus::Pending);
    }

    #[test]
    fn last_stop_departure_completes_the_route() {
        let route = fixture_route(&[STOP_1, STOP_2]);
        let mut progress = RouteProgress::new(&route);
        let cfg = config();

        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 0), &cfg);
        process_position(&mut progress, &STOP_1, &sample(STOP_1, 2.0, 20), &cfg);
        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 40), &cfg);

        // Stop 2 goes en route on the next outside-fence sample.
        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 12.0, 41), &cfg);
        assert_eq!(progress.stops[1].status, StopStatus::EnRoute);

        process_position(&mut progress, &STOP_2, &sample(STOP_2, 2.0, 70), &cfg);
        let events = process_position(&mut progress, &STOP_2, &sample(MIDWAY, 12.0, 95), &cfg);

        assert_eq!(
            events,
            vec![
                TrackingEvent::DepartureFixed {
                    stop_index: 1,
                    at: ts(95)
                },
                TrackingEvent::RouteCompleted { at: ts(95) }
            ]
        );
        assert_eq!(progress.status, RouteProgressStatus::Completed);
        assert_eq!(progress.end_time, Some(ts(95)));

        // Monotonic chain across the stop sequence.
        assert!(progress.stops[0].actual_departure <= progress.stops[1].actual_arrival);

        // A completed route ignores further samples.
        let events = process_position(&mut progress, &STOP_2, &sample(STOP_2, 2.0, 99), &cfg);
        assert!(events.is_empty());
    }

    #[test]
    fn stationary_period_yields_one_intermediate_stop() {
        let route = fixture_route(&[STOP_1, STOP_2]);
        let mut progress = RouteProgress::new(&route);
        let cfg = config();

        // Depart stop 1 and head to stop 2.
        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 0), &cfg);
        process_position(&mut progress, &STOP_1, &sample(STOP_1, 2.0, 20), &cfg);
        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 40), &cfg);
        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 12.0, 41), &cfg);

        // Ten minutes stationary at a non-warehouse point.
        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 0.0, 45), &cfg);
        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 0.0, 50), &cfg);
        assert_eq!(progress.intermediate_stops.len(), 1);
        assert!(progress.intermediate_stops[0].end_time.is_none());

        // Motion resumes: the stop closes with its elapsed duration.
        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 11.0, 55), &cfg);
        let stop = &progress.intermediate_stops[0];
        assert_eq!(progress.intermediate_stops.len(), 1);
        assert_eq!(stop.end_time, Some(ts(55)));
        assert_eq!(stop.duration_minutes, Some(10));
        assert_eq!(stop.from_stop_id, Some(StopId("stop-1".to_string())));
        assert_eq!(stop.to_stop_id, StopId("stop-2".to_string()));

        // The primary state machine never moved.
        assert_eq!(progress.stops[1].status, StopStatus::EnRoute);
    }

    #[test]
    fn creeping_vehicle_rolls_the_open_intermediate_stop_forward() {
        let route = fixture_route(&[STOP_1, STOP_2]);
        let mut progress = RouteProgress::new(&route);
        let cfg = config();

        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 0), &cfg);
        process_position(&mut progress, &STOP_1, &sample(STOP_1, 2.0, 20), &cfg);
        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 40), &cfg);
        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 12.0, 41), &cfg);

        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 0.5, 45), &cfg);

        // Crawls ~550m while still below the stationary threshold: the first
        // record closes and a second one opens at the new position.
        let crept = Point {
            lat: Latitude(13.0050),
            lon: Longitude(77.5958),
        };
        process_position(&mut progress, &STOP_2, &sample(crept, 0.5, 52), &cfg);

        assert_eq!(progress.intermediate_stops.len(), 2);
        assert_eq!(progress.intermediate_stops[0].end_time, Some(ts(52)));
        assert_eq!(progress.intermediate_stops[0].duration_minutes, Some(7));
        assert!(progress.intermediate_stops[1].end_time.is_none());
        assert_eq!(progress.intermediate_stops[1].position, crept);
    }

    #[test]
    fn arrival_closes_any_open_intermediate_stop() {
        let route = fixture_route(&[STOP_1, STOP_2]);
        let mut progress = RouteProgress::new(&route);
        let cfg = config();

        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 0), &cfg);
        process_position(&mut progress, &STOP_1, &sample(STOP_1, 2.0, 20), &cfg);
        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 40), &cfg);
        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 12.0, 41), &cfg);
        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 0.0, 45), &cfg);

        process_position(&mut progress, &STOP_2, &sample(STOP_2, 2.0, 60), &cfg);
        assert_eq!(progress.intermediate_stops[0].end_time, Some(ts(60)));
        assert_eq!(progress.stops[1].status, StopStatus::Arrived);
    }

    #[test]
    fn sample_without_speed_leaves_intermediate_state_untouched() {
        let route = fixture_route(&[STOP_1, STOP_2]);
        let mut progress = RouteProgress::new(&route);
        let cfg = config();

        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 0), &cfg);
        process_position(&mut progress, &STOP_1, &sample(STOP_1, 2.0, 20), &cfg);
        process_position(&mut progress, &STOP_1, &sample(MIDWAY, 12.0, 40), &cfg);
        process_position(&mut progress, &STOP_2, &sample(MIDWAY, 12.0, 41), &cfg);

        let mut no_speed = sample(MIDWAY, 0.0, 45);
        no_speed.speed = None;
        process_position(&mut progress, &STOP_2, &no_speed, &cfg);
        assert!(progress.intermediate_stops.is_empty());
    }
}
