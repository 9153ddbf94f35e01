/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use crate::common::recalculation::{ScheduleStore, TravelTimeEstimator};
use crate::common::registry::{RouteLookup, WarehouseLookup};
use crate::common::types::*;
use crate::outbound::external::{
    HttpPositionProvider, HttpTravelTimeEstimator, PositionProvider,
};
use crate::redis::{commands::RedisRegistry, types::*};
use crate::tools::logger::LoggerConfig;
use reqwest::Url;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub workers: usize,
    pub logger_cfg: LoggerConfig,
    pub redis_cfg: RedisConfig,
    pub redis_expiry: u32,
    pub tracking_lock_expiry: u32,
    pub travel_time_url: String,
    pub travel_time_api_key: String,
    pub position_provider_url: String,
    pub position_provider_api_key: String,
    pub request_timeout: u64,
    pub max_allowed_req_size: usize,
    pub polling_interval_secs: u64,
    pub tracking_start_hour: u32,
    pub tracking_end_hour: u32,
    pub schedule_event_buffer: usize,
    pub tracking_cfg: TrackingConfig,
    pub recalculation_cfg: RecalculationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_pool_size: usize,
    pub redis_partition: usize,
    pub reconnect_max_attempts: u32,
    pub reconnect_delay: u32,
    pub default_ttl: u32,
}

/// Thresholds for the geofence state machine and intermediate-stop
/// detection, all in SI units.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TrackingConfig {
    pub geofence_radius_meters: f64,
    pub stationary_speed_threshold: f64,
    pub intermediate_stop_move_threshold_meters: f64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RecalculationConfig {
    pub base_dwell_minutes: u32,
    pub default_lunch_break_minutes: u32,
    pub fallback_travel_time_minutes: u32,
    pub operating_window_start_hour: u32,
    pub operating_window_end_hour: u32,
    pub default_speed_limit: f64,
}

/// Mutation locks keyed by progress record. All writers of one record take
/// the same lock, so concurrent fixes and triggers serialize. Entries are
/// removed when the route deregisters so the map tracks the active set
/// instead of growing with route turnover.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub async fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Holders of an already-acquired guard are unaffected; they keep their
    /// `Arc` until the guard drops.
    pub async fn remove(&self, key: &str) {
        let mut locks = self.locks.lock().await;
        locks.remove(key);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub redis: Arc<RedisConnectionPool>,
    pub route_lookup: Arc<dyn RouteLookup>,
    pub warehouse_lookup: Arc<dyn WarehouseLookup>,
    pub schedule_store: Arc<dyn ScheduleStore>,
    pub estimator: Arc<dyn TravelTimeEstimator>,
    pub position_provider: Arc<dyn PositionProvider>,
    /// Vehicles currently polled, keyed by vehicle, mapping back to the
    /// progress record each GPS fix feeds.
    pub active_trackers: Arc<Mutex<FxHashMap<VehicleId, ActiveTracker>>>,
    /// Transient manual-trigger alternation state per route.
    pub trigger_states: Arc<Mutex<FxHashMap<RouteId, TriggerState>>>,
    /// Per-progress-record mutation locks for the actively tracked routes.
    pub route_locks: Arc<KeyedLocks>,
    pub schedule_events: Sender<ScheduleUpdated>,
    pub redis_expiry: u32,
    pub tracking_lock_expiry: u32,
    pub max_allowed_req_size: usize,
    pub polling_interval_secs: u64,
    pub tracking_start_hour: u32,
    pub tracking_end_hour: u32,
    pub tracking_cfg: TrackingConfig,
    pub recalculation_cfg: RecalculationConfig,
}

impl AppState {
    pub async fn new(app_config: AppConfig, schedule_events: Sender<ScheduleUpdated>) -> AppState {
        let redis = Arc::new(
            RedisConnectionPool::new(RedisSettings {
                host: app_config.redis_cfg.redis_host,
                port: app_config.redis_cfg.redis_port,
                pool_size: app_config.redis_cfg.redis_pool_size,
                partition: app_config.redis_cfg.redis_partition,
                reconnect_max_attempts: app_config.redis_cfg.reconnect_max_attempts,
                reconnect_delay: app_config.redis_cfg.reconnect_delay,
                default_ttl: app_config.redis_cfg.default_ttl,
                ..Default::default()
            })
            .await
            .expect("Failed to create Redis connection pool"),
        );

        let registry = RedisRegistry {
            redis: redis.clone(),
        };

        let request_timeout = Duration::from_millis(app_config.request_timeout);

        let estimator = Arc::new(HttpTravelTimeEstimator {
            url: Url::parse(app_config.travel_time_url.as_str())
                .expect("Failed to parse travel_time_url."),
            api_key: app_config.travel_time_api_key,
            timeout: request_timeout,
        });

        let position_provider = Arc::new(HttpPositionProvider {
            base_url: Url::parse(app_config.position_provider_url.as_str())
                .expect("Failed to parse position_provider_url."),
            api_key: app_config.position_provider_api_key,
            timeout: request_timeout,
        });

        AppState {
            redis,
            route_lookup: Arc::new(registry.clone()),
            warehouse_lookup: Arc::new(registry.clone()),
            schedule_store: Arc::new(registry),
            estimator,
            position_provider,
            active_trackers: Arc::new(Mutex::new(FxHashMap::default())),
            trigger_states: Arc::new(Mutex::new(FxHashMap::default())),
            route_locks: Arc::new(KeyedLocks::default()),
            schedule_events,
            redis_expiry: app_config.redis_expiry,
            tracking_lock_expiry: app_config.tracking_lock_expiry,
            max_allowed_req_size: app_config.max_allowed_req_size,
            polling_interval_secs: app_config.polling_interval_secs,
            tracking_start_hour: app_config.tracking_start_hour,
            tracking_end_hour: app_config.tracking_end_hour,
            tracking_cfg: app_config.tracking_cfg,
            recalculation_cfg: app_config.recalculation_cfg,
        }
    }

    /// Lock guarding one progress record. Same key, same lock, for fixes
    /// from the poller and manual triggers alike.
    pub async fn route_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.route_locks.acquire(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_yields_the_same_lock() {
        let locks = KeyedLocks::default();
        let first = locks.acquire("route-1:driver-1:2024-03-14").await;
        let second = locks.acquire("route-1:driver-1:2024-03-14").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(locks.len().await, 1);
    }

    #[tokio::test]
    async fn removal_evicts_the_entry() {
        let locks = KeyedLocks::default();
        locks.acquire("route-1:driver-1:2024-03-14").await;
        locks.acquire("route-2:driver-2:2024-03-14").await;
        assert_eq!(locks.len().await, 2);

        locks.remove("route-1:driver-1:2024-03-14").await;
        assert_eq!(locks.len().await, 1);

        // A held guard survives eviction of its entry.
        let held = locks.acquire("route-2:driver-2:2024-03-14").await;
        let guard = held.lock().await;
        locks.remove("route-2:driver-2:2024-03-14").await;
        assert_eq!(locks.len().await, 0);
        drop(guard);
    }
}
