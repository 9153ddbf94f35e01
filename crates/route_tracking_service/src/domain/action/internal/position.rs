/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use actix_web::web::Data;
use tracing::{info, warn};

use crate::common::recalculation::{cascade_from_departure, recompute_departure_after_arrival};
use crate::common::tracking::process_position;
use crate::common::types::*;
use crate::domain::types::internal::position::IngestPositionRequest;
use crate::environment::AppState;
use crate::redis::commands::*;
use crate::redis::keys::route_progress_key;
use crate::tools::error::AppError;
use crate::tools::prometheus::{GEOFENCE_EVENTS, TOTAL_POSITION_UPDATES};

pub async fn ingest_position(
    data: Data<AppState>,
    vehicle_id: VehicleId,
    request: IngestPositionRequest,
) -> Result<RouteProgress, AppError> {
    if !(-90.0..=90.0).contains(&request.latitude)
        || !(-180.0..=180.0).contains(&request.longitude)
    {
        return Err(AppError::InvalidGPSData(format!(
            "Coordinates out of range : (Lat : {}, Lon : {})",
            request.latitude, request.longitude
        )));
    }

    let position = VehiclePosition {
        vehicle_id: vehicle_id.clone(),
        location: Point {
            lat: Latitude(request.latitude),
            lon: Longitude(request.longitude),
        },
        speed: request.speed.map(SpeedInMeterPerSecond),
        timestamp: request.timestamp,
    };

    apply_position(&data, &vehicle_id, position).await
}

/// Feeds one GPS fix through the geofence state machine for the route the
/// vehicle is registered against and returns the advanced record. Shared by
/// the HTTP ingest endpoint and the position poller, always under the
/// per-record lock.
pub async fn apply_position(
    data: &Data<AppState>,
    vehicle_id: &VehicleId,
    position: VehiclePosition,
) -> Result<RouteProgress, AppError> {
    let tracker = {
        let trackers = data.active_trackers.lock().await;
        trackers
            .get(vehicle_id)
            .cloned()
            .ok_or_else(|| AppError::VehicleNotTracked(vehicle_id.inner()))?
    };

    TOTAL_POSITION_UPDATES.inc();

    let lock_key = route_progress_key(&tracker.route_id, &tracker.driver_id, &tracker.date);
    let record_lock = data.route_lock(&lock_key).await;
    let _guard = record_lock.lock().await;

    let mut progress =
        get_route_progress(&data.redis, &tracker.route_id, &tracker.driver_id, &tracker.date)
            .await?
            .ok_or_else(|| AppError::ProgressNotFound(tracker.route_id.inner()))?;

    if progress.status == RouteProgressStatus::Completed {
        return Ok(progress);
    }

    let route = data
        .route_lookup
        .route(&tracker.route_id)
        .await?
        .ok_or_else(|| AppError::RouteNotFound(tracker.route_id.inner()))?;

    let current_stop = route
        .stops
        .get(progress.current_stop_index)
        .ok_or_else(|| AppError::InternalError("Stop index out of bounds".to_string()))?;

    let warehouse = data
        .warehouse_lookup
        .warehouse(&current_stop.warehouse_id)
        .await?
        .ok_or_else(|| AppError::WarehouseNotFound(current_stop.warehouse_id.inner()))?;

    let events = process_position(
        &mut progress,
        &warehouse.location,
        &position,
        &data.tracking_cfg,
    );

    set_route_progress(&data.redis, &progress, data.redis_expiry).await?;

    handle_tracking_events(data, &route, &tracker, events).await;

    Ok(progress)
}

/// Route carrying the latest recalculated stop list when one has been
/// persisted, so successive recomputations chain instead of resetting to
/// the registry plan.
pub async fn current_schedule(data: &Data<AppState>, route: &Route) -> Route {
    let mut schedule = route.clone();
    match get_route_schedule(&data.redis, &route.route_id).await {
        Ok(Some(stops)) => schedule.stops = stops,
        Ok(None) => {}
        Err(err) => {
            warn!(tag = "[Schedule Read Failed]", route_id = %route.route_id.inner(), error = %err);
        }
    }
    schedule
}

/// Schedule consequences of fixed events. Recalculation failures are logged
/// and do not fail the position update that produced them.
async fn handle_tracking_events(
    data: &Data<AppState>,
    route: &Route,
    tracker: &ActiveTracker,
    events: Vec<TrackingEvent>,
) {
    for event in events {
        match event {
            TrackingEvent::RouteStarted { at } => {
                info!(tag = "[Route Started]", route_id = %route.route_id.inner(), at = %at.inner());
            }
            TrackingEvent::ArrivalFixed { stop_index, at } => {
                GEOFENCE_EVENTS.with_label_values(&["arrival"]).inc();
                info!(tag = "[Arrival Fixed]", route_id = %route.route_id.inner(), stop_index, at = %at.inner());

                let mut schedule = current_schedule(data, route).await;
                if let Err(err) = recompute_departure_after_arrival(
                    &mut schedule,
                    stop_index,
                    at,
                    data.schedule_store.as_ref(),
                    &data.schedule_events,
                    &data.recalculation_cfg,
                )
                .await
                {
                    warn!(tag = "[Recalculation Failed]", route_id = %route.route_id.inner(), error = %err);
                }
            }
            TrackingEvent::DepartureFixed { stop_index, at } => {
                GEOFENCE_EVENTS.with_label_values(&["departure"]).inc();
                info!(tag = "[Departure Fixed]", route_id = %route.route_id.inner(), stop_index, at = %at.inner());

                let mut schedule = current_schedule(data, route).await;
                if let Err(err) = cascade_from_departure(
                    &mut schedule,
                    data.warehouse_lookup.as_ref(),
                    stop_index,
                    at,
                    data.estimator.as_ref(),
                    data.schedule_store.as_ref(),
                    &data.schedule_events,
                    &data.recalculation_cfg,
                )
                .await
                {
                    warn!(tag = "[Recalculation Failed]", route_id = %route.route_id.inner(), error = %err);
                }
            }
            TrackingEvent::RouteCompleted { at } => {
                info!(tag = "[Route Completed]", route_id = %route.route_id.inner(), at = %at.inner());
                deregister_tracker(data, tracker).await;
            }
        }
    }
}

/// Drops the in-memory registration, the record's keyed lock entry and the
/// distributed tracking lock.
pub async fn deregister_tracker(data: &Data<AppState>, tracker: &ActiveTracker) {
    {
        let mut trackers = data.active_trackers.lock().await;
        trackers.retain(|_, active| {
            !(active.route_id == tracker.route_id && active.date == tracker.date)
        });
    }
    {
        let mut trigger_states = data.trigger_states.lock().await;
        trigger_states.remove(&tracker.route_id);
    }

    data.route_locks
        .remove(&route_progress_key(
            &tracker.route_id,
            &tracker.driver_id,
            &tracker.date,
        ))
        .await;

    if let Err(err) = release_tracking_lock(&data.redis, &tracker.route_id, &tracker.date).await {
        warn!(tag = "[Lock Release Failed]", route_id = %tracker.route_id.inner(), error = %err);
    }
}
