/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::common::recalculation::ScheduleStore;
use crate::common::registry::{RouteLookup, WarehouseLookup};
use crate::common::types::*;
use crate::redis::{keys::*, types::RedisConnectionPool};
use crate::tools::error::AppError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

pub async fn get_route_progress(
    redis: &RedisConnectionPool,
    route_id: &RouteId,
    driver_id: &DriverId,
    date: &NaiveDate,
) -> Result<Option<RouteProgress>, AppError> {
    let value = redis
        .get_key(&route_progress_key(route_id, driver_id, date))
        .await?;

    match value {
        Some(value) => Ok(Some(
            serde_json::from_str::<RouteProgress>(&value)
                .map_err(|err| AppError::DeserializationError(err.to_string()))?,
        )),
        None => Ok(None),
    }
}

pub async fn set_route_progress(
    redis: &RedisConnectionPool,
    progress: &RouteProgress,
    expiry: u32,
) -> Result<(), AppError> {
    let value = serde_json::to_string(progress)
        .map_err(|err| AppError::SerializationError(err.to_string()))?;

    redis
        .set_with_expiry(
            &route_progress_key(&progress.route_id, &progress.driver_id, &progress.date),
            value,
            expiry,
        )
        .await
}

/// Takes the per-route tracking lock for the day. `Ok(false)` means another
/// instance already owns it.
pub async fn acquire_tracking_lock(
    redis: &RedisConnectionPool,
    route_id: &RouteId,
    date: &NaiveDate,
    expiry: u32,
) -> Result<bool, AppError> {
    redis
        .setnx_with_expiry(&tracking_lock_key(route_id, date), "locked", expiry)
        .await
}

pub async fn release_tracking_lock(
    redis: &RedisConnectionPool,
    route_id: &RouteId,
    date: &NaiveDate,
) -> Result<(), AppError> {
    redis.delete_key(&tracking_lock_key(route_id, date)).await
}

/// Latest recalculated schedule, if any cascade has run for this route.
pub async fn get_route_schedule(
    redis: &RedisConnectionPool,
    route_id: &RouteId,
) -> Result<Option<Vec<Stop>>, AppError> {
    let value = redis.get_key(&route_stops_key(route_id)).await?;

    match value {
        Some(value) => Ok(Some(
            serde_json::from_str::<Vec<Stop>>(&value)
                .map_err(|err| AppError::DeserializationError(err.to_string()))?,
        )),
        None => Ok(None),
    }
}

/// Registry reads and schedule writes backed by the persistent Redis, shared
/// with the upstream route CRUD service.
#[derive(Clone)]
pub struct RedisRegistry {
    pub redis: Arc<RedisConnectionPool>,
}

#[async_trait]
impl RouteLookup for RedisRegistry {
    async fn route(&self, route_id: &RouteId) -> Result<Option<Route>, AppError> {
        let value = self.redis.get_key(&route_registry_key(route_id)).await?;

        match value {
            Some(value) => Ok(Some(
                serde_json::from_str::<Route>(&value)
                    .map_err(|err| AppError::DeserializationError(err.to_string()))?,
            )),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl WarehouseLookup for RedisRegistry {
    async fn warehouse(&self, warehouse_id: &WarehouseId) -> Result<Option<Warehouse>, AppError> {
        let value = self
            .redis
            .get_key(&warehouse_registry_key(warehouse_id))
            .await?;

        match value {
            Some(value) => Ok(Some(
                serde_json::from_str::<Warehouse>(&value)
                    .map_err(|err| AppError::DeserializationError(err.to_string()))?,
            )),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ScheduleStore for RedisRegistry {
    async fn save_schedule(&self, route_id: &RouteId, stops: &[Stop]) -> Result<(), AppError> {
        let value = serde_json::to_string(stops)
            .map_err(|err| AppError::SerializationError(err.to_string()))?;

        self.redis.set_key(&route_stops_key(route_id), value).await
    }
}
