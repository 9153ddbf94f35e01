/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

macro_rules! impl_getter {
    ($name:ident, $inner:ty) => {
        impl $name {
            pub fn inner(&self) -> $inner {
                self.0.clone()
            }
        }
    };
}

#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq)]
pub struct RouteId(pub String);
impl_getter!(RouteId, String);

#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq)]
pub struct DriverId(pub String);
impl_getter!(DriverId, String);

#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq)]
pub struct VehicleId(pub String);
impl_getter!(VehicleId, String);

#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq)]
pub struct WarehouseId(pub String);
impl_getter!(WarehouseId, String);

#[derive(Deserialize, Serialize, Clone, Debug, Eq, Hash, PartialEq)]
pub struct StopId(pub String);
impl_getter!(StopId, String);

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Copy)]
pub struct Latitude(pub f64);
impl_getter!(Latitude, f64);

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Copy)]
pub struct Longitude(pub f64);
impl_getter!(Longitude, f64);

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, PartialOrd, Copy)]
pub struct SpeedInMeterPerSecond(pub f64);
impl_getter!(SpeedInMeterPerSecond, f64);

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, PartialOrd, Copy)]
pub struct Meters(pub f64);
impl_getter!(Meters, f64);

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Hash, Ord)]
pub struct TimeStamp(pub DateTime<Utc>);
impl_getter!(TimeStamp, DateTime<Utc>);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub lat: Latitude,
    pub lon: Longitude,
}

#[derive(Debug, Clone, Copy, EnumString, Display, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub enum TrafficScenario {
    #[strum(serialize = "optimistic")]
    #[serde(rename = "optimistic")]
    Optimistic,
    #[strum(serialize = "best_guess")]
    #[serde(rename = "best_guess")]
    BestGuess,
    #[strum(serialize = "pessimistic")]
    #[serde(rename = "pessimistic")]
    Pessimistic,
}

#[derive(Debug, Clone, Copy, EnumString, Display, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub enum StopStatus {
    #[strum(serialize = "PENDING")]
    #[serde(rename = "PENDING")]
    Pending,
    #[strum(serialize = "EN_ROUTE")]
    #[serde(rename = "EN_ROUTE")]
    EnRoute,
    #[strum(serialize = "ARRIVED")]
    #[serde(rename = "ARRIVED")]
    Arrived,
    #[strum(serialize = "DEPARTED")]
    #[serde(rename = "DEPARTED")]
    Departed,
    // Terminal marker used by the manual trigger path, analogous to DEPARTED.
    #[strum(serialize = "COMPLETED")]
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl StopStatus {
    pub fn is_departed(&self) -> bool {
        matches!(self, StopStatus::Departed | StopStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, EnumString, Display, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub enum RouteProgressStatus {
    #[strum(serialize = "NOT_STARTED")]
    #[serde(rename = "NOT_STARTED")]
    NotStarted,
    #[strum(serialize = "IN_PROGRESS")]
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[strum(serialize = "COMPLETED")]
    #[serde(rename = "COMPLETED")]
    Completed,
}

#[derive(Debug, Clone, Copy, EnumString, Display, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub enum TriggerAction {
    #[strum(serialize = "DEPARTURE")]
    #[serde(rename = "DEPARTURE")]
    Departure,
    #[strum(serialize = "ARRIVAL")]
    #[serde(rename = "ARRIVAL")]
    Arrival,
}

/// Registry record for a warehouse, owned by the upstream CRUD service and
/// read-only here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub address: String,
    pub location: Point,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub stop_id: StopId,
    pub warehouse_id: WarehouseId,
    pub order: u32,
    pub planned_arrival: TimeStamp,
    pub planned_departure: TimeStamp,
    #[serde(default)]
    pub has_lunch_break: bool,
    pub lunch_duration_minutes: Option<u32>,
    pub traffic_scenario: Option<TrafficScenario>,
}

/// Registry record for a planned route. The stop schedule is the only part
/// this service writes back, and only through the recalculation path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub route_id: RouteId,
    pub service_date: NaiveDate,
    pub driver_id: DriverId,
    pub vehicle_id: VehicleId,
    pub stops: Vec<Stop>,
    pub speed_limit: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StopProgress {
    pub stop_id: StopId,
    pub status: StopStatus,
    pub entered_geofence_at: Option<TimeStamp>,
    pub exited_geofence_at: Option<TimeStamp>,
    pub actual_arrival: Option<TimeStamp>,
    pub actual_departure: Option<TimeStamp>,
}

impl StopProgress {
    pub fn new(stop_id: StopId) -> Self {
        StopProgress {
            stop_id,
            status: StopStatus::Pending,
            entered_geofence_at: None,
            exited_geofence_at: None,
            actual_arrival: None,
            actual_departure: None,
        }
    }
}

/// An unplanned stationary period observed between two planned stops.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntermediateStop {
    pub id: String,
    pub position: Point,
    pub start_time: TimeStamp,
    pub end_time: Option<TimeStamp>,
    pub duration_minutes: Option<i64>,
    pub from_stop_id: Option<StopId>,
    pub to_stop_id: StopId,
}

/// The live tracking record for one driver executing one route on one
/// calendar day. Mutated only by the tracking engine and the manual trigger,
/// always under the per-key lock.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteProgress {
    pub route_id: RouteId,
    pub driver_id: DriverId,
    pub vehicle_id: VehicleId,
    pub date: NaiveDate,
    pub status: RouteProgressStatus,
    pub current_stop_index: usize,
    pub stops: Vec<StopProgress>,
    pub intermediate_stops: Vec<IntermediateStop>,
    pub start_time: Option<TimeStamp>,
    pub end_time: Option<TimeStamp>,
    pub last_position_update_at: Option<TimeStamp>,
}

impl RouteProgress {
    pub fn new(route: &Route) -> Self {
        RouteProgress {
            route_id: route.route_id.clone(),
            driver_id: route.driver_id.clone(),
            vehicle_id: route.vehicle_id.clone(),
            date: route.service_date,
            status: RouteProgressStatus::NotStarted,
            current_stop_index: 0,
            stops: route
                .stops
                .iter()
                .map(|stop| StopProgress::new(stop.stop_id.clone()))
                .collect(),
            intermediate_stops: Vec::new(),
            start_time: None,
            end_time: None,
            last_position_update_at: None,
        }
    }

    pub fn current_stop(&self) -> Option<&StopProgress> {
        self.stops.get(self.current_stop_index)
    }

    pub fn open_intermediate_stop_mut(&mut self) -> Option<&mut IntermediateStop> {
        self.intermediate_stops
            .iter_mut()
            .find(|stop| stop.end_time.is_none())
    }
}

/// Drives the manual trigger's departure/arrival alternation. Transient per
/// route, kept in process memory only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggerState {
    pub current_stop_index: usize,
    pub next_action: TriggerAction,
    pub last_triggered_at: Option<TimeStamp>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePosition {
    pub vehicle_id: VehicleId,
    pub location: Point,
    pub speed: Option<SpeedInMeterPerSecond>,
    pub timestamp: TimeStamp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackingEvent {
    RouteStarted { at: TimeStamp },
    ArrivalFixed { stop_index: usize, at: TimeStamp },
    DepartureFixed { stop_index: usize, at: TimeStamp },
    RouteCompleted { at: TimeStamp },
}

/// Published on the notification channel whenever the recalculation service
/// rewrites a stop's planned times.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdated {
    pub route_id: RouteId,
    pub stop_id: StopId,
    pub planned_arrival: TimeStamp,
    pub planned_departure: TimeStamp,
}

/// In-memory registration of a vehicle being polled, mapping it back to the
/// RouteProgress it feeds.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveTracker {
    pub route_id: RouteId,
    pub driver_id: DriverId,
    pub date: NaiveDate,
}
