/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use actix_web::web::Data;
use chrono::Utc;
use tracing::{info, warn};

use crate::common::recalculation::{cascade_from_departure, recompute_departure_after_arrival};
use crate::common::trigger::{
    apply_trigger, guard_triggerable, reconcile_trigger_state, seed_trigger_state,
};
use crate::common::types::*;
use crate::common::utils::today;
use crate::domain::action::internal::position::{current_schedule, deregister_tracker};
use crate::domain::types::ui::tracking::*;
use crate::environment::AppState;
use crate::redis::commands::*;
use crate::redis::keys::route_progress_key;
use crate::tools::error::AppError;

#[derive(Debug, PartialEq)]
enum StartResolution {
    Create,
    Resume(RouteProgress),
    RejectBusy,
    RejectCompleted { release_lock: bool },
}

/// Outcome of an initialization attempt given the day-lock result and the
/// stored record. A completed record that won the lock must give it back so
/// the rejection does not block the key until its TTL lapses.
fn resolve_start(acquired: bool, existing: Option<RouteProgress>) -> StartResolution {
    match existing {
        None if !acquired => StartResolution::RejectBusy,
        None => StartResolution::Create,
        Some(progress) if progress.status == RouteProgressStatus::Completed => {
            StartResolution::RejectCompleted {
                release_lock: acquired,
            }
        }
        Some(progress) => StartResolution::Resume(progress),
    }
}

/// Registers a route for tracking: creates (or resumes) the progress record
/// and maps the vehicle to it for the position poller.
pub async fn start_tracking(
    data: Data<AppState>,
    route_id: RouteId,
    request: StartTrackingRequest,
) -> Result<StartTrackingResponse, AppError> {
    let date = request.date.unwrap_or_else(today);

    let route = data
        .route_lookup
        .route(&route_id)
        .await?
        .ok_or_else(|| AppError::RouteNotFound(route_id.inner()))?;

    if route.service_date != date {
        return Err(AppError::RouteNotScheduledToday(route_id.inner()));
    }

    let acquired =
        acquire_tracking_lock(&data.redis, &route_id, &date, data.tracking_lock_expiry).await?;

    let existing = get_route_progress(&data.redis, &route_id, &route.driver_id, &date).await?;

    let (resumed, progress) = match resolve_start(acquired, existing) {
        StartResolution::RejectBusy => {
            // Another instance holds the day's lock and owns the record.
            return Err(AppError::TrackingAlreadyActive(route_id.inner()));
        }
        StartResolution::RejectCompleted { release_lock } => {
            if release_lock {
                if let Err(err) = release_tracking_lock(&data.redis, &route_id, &date).await {
                    warn!(tag = "[Lock Release Failed]", route_id = %route_id.inner(), error = %err);
                }
            }
            return Err(AppError::RouteAlreadyCompleted(route_id.inner()));
        }
        StartResolution::Resume(progress) => (true, progress),
        StartResolution::Create => {
            let progress = RouteProgress::new(&route);
            set_route_progress(&data.redis, &progress, data.redis_expiry).await?;
            (false, progress)
        }
    };

    {
        let mut trackers = data.active_trackers.lock().await;
        trackers.insert(
            route.vehicle_id.clone(),
            ActiveTracker {
                route_id: route_id.clone(),
                driver_id: route.driver_id.clone(),
                date,
            },
        );
    }

    info!(
        tag = "[Tracking Started]",
        route_id = %route_id.inner(),
        vehicle_id = %route.vehicle_id.inner(),
        resumed
    );

    Ok(StartTrackingResponse { resumed, progress })
}

/// Fixes the next expected event (departure or arrival, strictly
/// alternating) without a geofence crossing, then runs the same schedule
/// recalculation a GPS-fixed event would.
pub async fn manual_trigger(
    data: Data<AppState>,
    route_id: RouteId,
) -> Result<TriggerResponse, AppError> {
    let date = today();

    let route = data
        .route_lookup
        .route(&route_id)
        .await?
        .ok_or_else(|| AppError::RouteNotFound(route_id.inner()))?;

    let lock_key = route_progress_key(&route_id, &route.driver_id, &date);
    let record_lock = data.route_lock(&lock_key).await;
    let _guard = record_lock.lock().await;

    let mut progress = get_route_progress(&data.redis, &route_id, &route.driver_id, &date)
        .await?
        .ok_or_else(|| AppError::ProgressNotFound(route_id.inner()))?;

    guard_triggerable(&route, &progress, date)?;

    let cached = {
        let trigger_states = data.trigger_states.lock().await;
        trigger_states.get(&route_id).copied()
    };
    // GPS fixes advance the record behind the cached state's back.
    let mut state = match cached {
        Some(state) => reconcile_trigger_state(&progress, state),
        None => seed_trigger_state(&progress),
    };

    let outcome = apply_trigger(&mut progress, &mut state, TimeStamp(Utc::now()))?;

    set_route_progress(&data.redis, &progress, data.redis_expiry).await?;

    {
        let mut trigger_states = data.trigger_states.lock().await;
        trigger_states.insert(route_id.clone(), state);
    }

    let mut schedule = current_schedule(&data, &route).await;
    let recalculated = match outcome.action {
        TriggerAction::Departure => {
            cascade_from_departure(
                &mut schedule,
                data.warehouse_lookup.as_ref(),
                outcome.stop_index,
                outcome.at,
                data.estimator.as_ref(),
                data.schedule_store.as_ref(),
                &data.schedule_events,
                &data.recalculation_cfg,
            )
            .await
        }
        TriggerAction::Arrival => {
            recompute_departure_after_arrival(
                &mut schedule,
                outcome.stop_index,
                outcome.at,
                data.schedule_store.as_ref(),
                &data.schedule_events,
                &data.recalculation_cfg,
            )
            .await
        }
    };
    if let Err(err) = recalculated {
        warn!(tag = "[Recalculation Failed]", route_id = %route_id.inner(), error = %err);
    }

    if outcome.route_completed {
        deregister_tracker(
            &data,
            &ActiveTracker {
                route_id: route_id.clone(),
                driver_id: route.driver_id,
                date,
            },
        )
        .await;
    }

    info!(
        tag = "[Manual Trigger]",
        route_id = %route_id.inner(),
        action = %outcome.action,
        stop_index = outcome.stop_index
    );

    Ok(TriggerResponse {
        action: outcome.action,
        stop_index: outcome.stop_index,
        triggered_at: outcome.at,
        route_completed: outcome.route_completed,
    })
}

pub async fn get_progress(
    data: Data<AppState>,
    route_id: RouteId,
    query: ProgressQuery,
) -> Result<RouteProgressResponse, AppError> {
    let date = query.date.unwrap_or_else(today);

    let progress = get_route_progress(&data.redis, &route_id, &query.driver_id, &date)
        .await?
        .ok_or_else(|| AppError::ProgressNotFound(route_id.inner()))?;

    // The recalculated schedule when one exists, the planned one otherwise.
    let schedule = match get_route_schedule(&data.redis, &route_id).await? {
        Some(schedule) => schedule,
        None => {
            data.route_lookup
                .route(&route_id)
                .await?
                .ok_or_else(|| AppError::RouteNotFound(route_id.inner()))?
                .stops
        }
    };

    Ok(RouteProgressResponse { progress, schedule })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixture_progress() -> RouteProgress {
        let route = Route {
            route_id: RouteId("route-1".to_string()),
            service_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            driver_id: DriverId("driver-1".to_string()),
            vehicle_id: VehicleId("vehicle-1".to_string()),
            stops: Vec::new(),
            speed_limit: None,
        };
        RouteProgress::new(&route)
    }

    #[test]
    fn completed_record_releases_a_freshly_won_lock() {
        let mut progress = fixture_progress();
        progress.status = RouteProgressStatus::Completed;

        assert_eq!(
            resolve_start(true, Some(progress)),
            StartResolution::RejectCompleted { release_lock: true }
        );
    }

    #[test]
    fn completed_record_leaves_a_foreign_lock_alone() {
        let mut progress = fixture_progress();
        progress.status = RouteProgressStatus::Completed;

        assert_eq!(
            resolve_start(false, Some(progress)),
            StartResolution::RejectCompleted {
                release_lock: false
            }
        );
    }

    #[test]
    fn lost_lock_without_a_record_is_busy() {
        assert_eq!(resolve_start(false, None), StartResolution::RejectBusy);
    }

    #[test]
    fn in_progress_record_resumes_even_without_the_lock() {
        let mut progress = fixture_progress();
        progress.status = RouteProgressStatus::InProgress;

        assert_eq!(
            resolve_start(false, Some(progress.clone())),
            StartResolution::Resume(progress)
        );
    }

    #[test]
    fn fresh_route_creates_a_record() {
        assert_eq!(resolve_start(true, None), StartResolution::Create);
    }
}
