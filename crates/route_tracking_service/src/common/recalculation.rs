/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::registry::WarehouseLookup;
use crate::common::types::*;
use crate::common::utils::clamp_to_operating_window;
use crate::environment::RecalculationConfig;
use crate::tools::error::AppError;
use crate::tools::prometheus::ESTIMATOR_FALLBACK_COUNTER;
use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{error, info, warn};

/// One traffic-aware travel-time question for the external routing service.
#[derive(Clone, Debug, PartialEq)]
pub struct TravelTimeQuery {
    pub origin_address: String,
    pub destination_address: String,
    pub traffic_scenario: TrafficScenario,
    pub departure_time: TimeStamp,
    pub speed_limit: f64,
}

/// Adapter over the external routing service. `Ok(None)` means the service
/// answered but had no estimate; both that and `Err` fall back to the
/// configured duration, never aborting the cascade.
#[async_trait]
pub trait TravelTimeEstimator: Send + Sync {
    async fn travel_time_minutes(&self, query: &TravelTimeQuery)
        -> Result<Option<u32>, AppError>;
}

/// Durable sink for the recomputed stop schedule. Persisted after every
/// stop's recomputation rather than batched at the end.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn save_schedule(&self, route_id: &RouteId, stops: &[Stop]) -> Result<(), AppError>;
}

fn dwell_minutes(stop: &Stop, config: &RecalculationConfig) -> i64 {
    let lunch = if stop.has_lunch_break {
        stop.lunch_duration_minutes
            .unwrap_or(config.default_lunch_break_minutes)
    } else {
        0
    };
    (config.base_dwell_minutes + lunch) as i64
}

async fn estimate_or_fallback(
    estimator: &dyn TravelTimeEstimator,
    query: &TravelTimeQuery,
    config: &RecalculationConfig,
) -> u32 {
    match estimator.travel_time_minutes(query).await {
        Ok(Some(minutes)) => minutes,
        Ok(None) => {
            warn!(
                tag = "[Estimator Fallback]",
                "No estimate for {} -> {}, using fallback of {} minutes",
                query.origin_address,
                query.destination_address,
                config.fallback_travel_time_minutes
            );
            ESTIMATOR_FALLBACK_COUNTER.inc();
            config.fallback_travel_time_minutes
        }
        Err(err) => {
            warn!(
                tag = "[Estimator Fallback]",
                error = %err,
                "Estimator call failed for {} -> {}, using fallback of {} minutes",
                query.origin_address,
                query.destination_address,
                config.fallback_travel_time_minutes
            );
            ESTIMATOR_FALLBACK_COUNTER.inc();
            config.fallback_travel_time_minutes
        }
    }
}

async fn persist_and_publish(
    store: &dyn ScheduleStore,
    schedule_events: &Sender<ScheduleUpdated>,
    route: &Route,
    stop_index: usize,
) {
    // Persistence failure is logged, not fatal: the in-memory schedule stays
    // authoritative for this process and a later write wins.
    if let Err(err) = store.save_schedule(&route.route_id, &route.stops).await {
        error!(
            tag = "[Schedule Persist Failed]",
            route_id = %route.route_id.inner(),
            error = %err
        );
    }

    let stop = &route.stops[stop_index];
    let _ = schedule_events
        .send(ScheduleUpdated {
            route_id: route.route_id.clone(),
            stop_id: stop.stop_id.clone(),
            planned_arrival: stop.planned_arrival,
            planned_departure: stop.planned_departure,
        })
        .await;
}

/// Cascades an observed departure deviation forward: re-derives every
/// downstream stop's planned arrival/departure by chaining travel-time
/// estimates from the actual departure time.
///
/// Deterministic for a given estimator response sequence, and recomputed
/// from the authoritative current stop list, so replaying the same fixed
/// event rewrites the same values instead of accumulating deltas. A missing
/// warehouse reference aborts the cascade for this route; nothing is
/// fabricated in its place.
pub async fn cascade_from_departure(
    route: &mut Route,
    warehouses: &dyn WarehouseLookup,
    departed_stop_index: usize,
    departed_at: TimeStamp,
    estimator: &dyn TravelTimeEstimator,
    store: &dyn ScheduleStore,
    schedule_events: &Sender<ScheduleUpdated>,
    config: &RecalculationConfig,
) -> Result<(), AppError> {
    let Some(departed_stop) = route.stops.get(departed_stop_index) else {
        return Ok(());
    };

    let mut origin = resolve_warehouse(warehouses, &departed_stop.warehouse_id).await?;
    let mut available_at = departed_at;
    let speed_limit = route.speed_limit.unwrap_or(config.default_speed_limit);

    for stop_index in departed_stop_index + 1..route.stops.len() {
        let destination =
            resolve_warehouse(warehouses, &route.stops[stop_index].warehouse_id).await?;

        let query = TravelTimeQuery {
            origin_address: origin.address.clone(),
            destination_address: destination.address.clone(),
            traffic_scenario: route.stops[stop_index]
                .traffic_scenario
                .unwrap_or(TrafficScenario::BestGuess),
            departure_time: available_at,
            speed_limit,
        };
        let travel_minutes = estimate_or_fallback(estimator, &query, config).await;

        let planned_arrival = clamp_to_operating_window(
            TimeStamp(available_at.inner() + Duration::minutes(travel_minutes as i64)),
            config.operating_window_start_hour,
            config.operating_window_end_hour,
        );
        let planned_departure = TimeStamp(
            planned_arrival.inner()
                + Duration::minutes(dwell_minutes(&route.stops[stop_index], config)),
        );

        let stop = &mut route.stops[stop_index];
        stop.planned_arrival = planned_arrival;
        stop.planned_departure = planned_departure;

        persist_and_publish(store, schedule_events, route, stop_index).await;

        available_at = planned_departure;
        origin = destination;
    }

    info!(
        tag = "[Schedule Recalculated]",
        route_id = %route.route_id.inner(),
        "Cascaded departure deviation from stop index {departed_stop_index} forward"
    );

    Ok(())
}

/// Narrow recompute on a fixed arrival: only the arrived stop's planned
/// departure moves; downstream stops wait for the matching departure event.
pub async fn recompute_departure_after_arrival(
    route: &mut Route,
    arrived_stop_index: usize,
    arrived_at: TimeStamp,
    store: &dyn ScheduleStore,
    schedule_events: &Sender<ScheduleUpdated>,
    config: &RecalculationConfig,
) -> Result<(), AppError> {
    let Some(stop) = route.stops.get_mut(arrived_stop_index) else {
        return Ok(());
    };

    stop.planned_departure =
        TimeStamp(arrived_at.inner() + Duration::minutes(dwell_minutes(stop, config)));

    persist_and_publish(store, schedule_events, route, arrived_stop_index).await;

    Ok(())
}

async fn resolve_warehouse(
    warehouses: &dyn WarehouseLookup,
    warehouse_id: &WarehouseId,
) -> Result<Warehouse, AppError> {
    warehouses
        .warehouse(warehouse_id)
        .await?
        .ok_or_else(|| AppError::WarehouseNotFound(warehouse_id.inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rustc_hash::FxHashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct FixtureWarehouses(FxHashMap<WarehouseId, Warehouse>);

    #[async_trait]
    impl WarehouseLookup for FixtureWarehouses {
        async fn warehouse(
            &self,
            warehouse_id: &WarehouseId,
        ) -> Result<Option<Warehouse>, AppError> {
            Ok(self.0.get(warehouse_id).cloned())
        }
    }

    /// Answers with a scripted response per call, in order.
    struct ScriptedEstimator(Mutex<Vec<Result<Option<u32>, AppError>>>);

    #[async_trait]
    impl TravelTimeEstimator for ScriptedEstimator {
        async fn travel_time_minutes(
            &self,
            _query: &TravelTimeQuery,
        ) -> Result<Option<u32>, AppError> {
            self.0.lock().unwrap().remove(0)
        }
    }

    #[derive(Default)]
    struct RecordingStore(Mutex<Vec<Vec<Stop>>>);

    #[async_trait]
    impl ScheduleStore for RecordingStore {
        async fn save_schedule(
            &self,
            _route_id: &RouteId,
            stops: &[Stop],
        ) -> Result<(), AppError> {
            self.0.lock().unwrap().push(stops.to_vec());
            Ok(())
        }
    }

    fn ts(h: u32, m: u32) -> TimeStamp {
        TimeStamp(Utc.with_ymd_and_hms(2024, 3, 14, h, m, 0).unwrap())
    }

    fn fixture_route(stop_count: usize) -> (Route, FixtureWarehouses) {
        let stops = (0..stop_count)
            .map(|i| Stop {
                stop_id: StopId(format!("stop-{}", i + 1)),
                warehouse_id: WarehouseId(format!("warehouse-{}", i + 1)),
                order: i as u32,
                planned_arrival: ts(8 + i as u32, 0),
                planned_departure: ts(8 + i as u32, 30),
                has_lunch_break: false,
                lunch_duration_minutes: None,
                traffic_scenario: None,
            })
            .collect();
        let warehouses = (0..stop_count)
            .map(|i| {
                let id = WarehouseId(format!("warehouse-{}", i + 1));
                let warehouse = Warehouse {
                    warehouse_id: id.clone(),
                    name: format!("Warehouse {}", i + 1),
                    address: format!("{} Depot Road", i + 1),
                    location: Point {
                        lat: Latitude(12.97 + i as f64 * 0.05),
                        lon: Longitude(77.59),
                    },
                };
                (id, warehouse)
            })
            .collect();

        (
            Route {
                route_id: RouteId("route-1".to_string()),
                service_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
                driver_id: DriverId("driver-1".to_string()),
                vehicle_id: VehicleId("vehicle-1".to_string()),
                stops,
                speed_limit: Some(60.0),
            },
            FixtureWarehouses(warehouses),
        )
    }

    fn config() -> RecalculationConfig {
        RecalculationConfig {
            base_dwell_minutes: 30,
            default_lunch_break_minutes: 30,
            fallback_travel_time_minutes: 45,
            operating_window_start_hour: 7,
            operating_window_end_hour: 20,
            default_speed_limit: 50.0,
        }
    }

    #[tokio::test]
    async fn cascade_chains_travel_time_and_dwell_downstream() {
        let (mut route, warehouses) = fixture_route(3);
        let estimator = ScriptedEstimator(Mutex::new(vec![Ok(Some(25)), Ok(Some(40))]));
        let store = RecordingStore::default();
        let (tx, mut rx) = mpsc::channel(16);

        cascade_from_departure(
            &mut route,
            &warehouses,
            0,
            ts(9, 10),
            &estimator,
            &store,
            &tx,
            &config(),
        )
        .await
        .unwrap();

        // Stop 2: actual departure + 25 minutes travel, then 30 minutes dwell.
        assert_eq!(route.stops[1].planned_arrival, ts(9, 35));
        assert_eq!(route.stops[1].planned_departure, ts(10, 5));
        // Stop 3 chains from stop 2's new departure.
        assert_eq!(route.stops[2].planned_arrival, ts(10, 45));
        assert_eq!(route.stops[2].planned_departure, ts(11, 15));

        // Persisted once per recomputed stop, durability over batching.
        assert_eq!(store.0.lock().unwrap().len(), 2);

        // One schedule-updated notification per stop.
        assert_eq!(rx.recv().await.unwrap().stop_id, StopId("stop-2".into()));
        assert_eq!(rx.recv().await.unwrap().stop_id, StopId("stop-3".into()));
    }

    #[tokio::test]
    async fn cascade_is_deterministic_across_replays() {
        let (route, warehouses) = fixture_route(3);
        let cfg = config();
        let mut results = Vec::new();

        for _ in 0..2 {
            let mut replay = route.clone();
            let estimator = ScriptedEstimator(Mutex::new(vec![Ok(Some(25)), Ok(Some(40))]));
            let store = RecordingStore::default();
            let (tx, _rx) = mpsc::channel(16);
            cascade_from_departure(
                &mut replay,
                &warehouses,
                0,
                ts(9, 10),
                &estimator,
                &store,
                &tx,
                &cfg,
            )
            .await
            .unwrap();
            results.push(replay.stops);
        }

        assert_eq!(results[0], results[1]);
    }

    #[tokio::test]
    async fn estimator_failure_falls_back_and_cascade_continues() {
        let (mut route, warehouses) = fixture_route(3);
        let estimator = ScriptedEstimator(Mutex::new(vec![
            Err(AppError::ExternalAPICallError("timeout".to_string())),
            Ok(Some(40)),
        ]));
        let store = RecordingStore::default();
        let (tx, _rx) = mpsc::channel(16);

        cascade_from_departure(
            &mut route,
            &warehouses,
            0,
            ts(9, 0),
            &estimator,
            &store,
            &tx,
            &config(),
        )
        .await
        .unwrap();

        // Stop 2 used the 45 minute fallback, stop 3 still recomputed.
        assert_eq!(route.stops[1].planned_arrival, ts(9, 45));
        assert_eq!(route.stops[1].planned_departure, ts(10, 15));
        assert_eq!(route.stops[2].planned_arrival, ts(10, 55));
        assert_eq!(store.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn no_estimate_also_falls_back() {
        let (mut route, warehouses) = fixture_route(2);
        let estimator = ScriptedEstimator(Mutex::new(vec![Ok(None)]));
        let store = RecordingStore::default();
        let (tx, _rx) = mpsc::channel(16);

        cascade_from_departure(
            &mut route,
            &warehouses,
            0,
            ts(9, 0),
            &estimator,
            &store,
            &tx,
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(route.stops[1].planned_arrival, ts(9, 45));
    }

    #[tokio::test]
    async fn recomputed_arrivals_stay_inside_the_operating_window() {
        let (mut route, warehouses) = fixture_route(3);
        // A late departure pushes everything past closing time.
        let estimator = ScriptedEstimator(Mutex::new(vec![Ok(Some(90)), Ok(Some(90))]));
        let store = RecordingStore::default();
        let (tx, _rx) = mpsc::channel(16);

        cascade_from_departure(
            &mut route,
            &warehouses,
            0,
            ts(19, 0),
            &estimator,
            &store,
            &tx,
            &config(),
        )
        .await
        .unwrap();

        for stop in &route.stops[1..] {
            let time = stop.planned_arrival.inner().time();
            assert!(time >= chrono::NaiveTime::from_hms_opt(7, 0, 0).unwrap());
            assert!(time < chrono::NaiveTime::from_hms_opt(20, 0, 0).unwrap());
        }
    }

    #[tokio::test]
    async fn lunch_break_extends_the_dwell() {
        let (mut route, warehouses) = fixture_route(2);
        route.stops[1].has_lunch_break = true;
        route.stops[1].lunch_duration_minutes = Some(45);
        let estimator = ScriptedEstimator(Mutex::new(vec![Ok(Some(20))]));
        let store = RecordingStore::default();
        let (tx, _rx) = mpsc::channel(16);

        cascade_from_departure(
            &mut route,
            &warehouses,
            0,
            ts(9, 0),
            &estimator,
            &store,
            &tx,
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(route.stops[1].planned_arrival, ts(9, 20));
        // 30 base + 45 lunch.
        assert_eq!(route.stops[1].planned_departure, ts(10, 35));
    }

    #[tokio::test]
    async fn missing_warehouse_is_a_hard_error() {
        let (mut route, _) = fixture_route(3);
        let warehouses = FixtureWarehouses(FxHashMap::default());
        let estimator = ScriptedEstimator(Mutex::new(vec![Ok(Some(25))]));
        let store = RecordingStore::default();
        let (tx, _rx) = mpsc::channel(16);

        let err = cascade_from_departure(
            &mut route,
            &warehouses,
            0,
            ts(9, 0),
            &estimator,
            &store,
            &tx,
            &config(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::WarehouseNotFound(_)));
        assert!(store.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn arrival_recompute_touches_only_the_arrived_stop() {
        let (mut route, _warehouses) = fixture_route(3);
        let downstream_before = route.stops[2].clone();
        let store = RecordingStore::default();
        let (tx, mut rx) = mpsc::channel(16);

        recompute_departure_after_arrival(&mut route, 1, ts(9, 50), &store, &tx, &config())
            .await
            .unwrap();

        assert_eq!(route.stops[1].planned_departure, ts(10, 20));
        assert_eq!(route.stops[2], downstream_before);
        assert_eq!(store.0.lock().unwrap().len(), 1);
        assert_eq!(rx.recv().await.unwrap().stop_id, StopId("stop-2".into()));
    }
}
