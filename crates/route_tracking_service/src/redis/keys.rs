/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::common::types::*;
use chrono::NaiveDate;

pub fn route_progress_key(
    RouteId(route_id): &RouteId,
    DriverId(driver_id): &DriverId,
    date: &NaiveDate,
) -> String {
    format!("rts:progress:{route_id}:{driver_id}:{date}")
}

pub fn route_stops_key(RouteId(route_id): &RouteId) -> String {
    format!("rts:route:stops:{route_id}")
}

pub fn route_registry_key(RouteId(route_id): &RouteId) -> String {
    format!("rts:registry:route:{route_id}")
}

pub fn warehouse_registry_key(WarehouseId(warehouse_id): &WarehouseId) -> String {
    format!("rts:registry:warehouse:{warehouse_id}")
}

pub fn tracking_lock_key(RouteId(route_id): &RouteId, date: &NaiveDate) -> String {
    format!("rts:tracking:lock:{route_id}:{date}")
}

pub fn health_check_key() -> String {
    "rts:health_check".to_string()
}
