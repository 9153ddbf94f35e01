/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use serde::{Deserialize, Serialize};

use crate::common::types::*;

// Travel time estimation between two warehouse addresses
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TravelTimeReq {
    pub origin_address: String,
    pub destination_address: String,
    pub traffic_scenario: TrafficScenario,
    pub departure_time: TimeStamp,
    pub speed_limit: f64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelTimeResp {
    pub success: bool,
    pub travel_time_minutes: Option<u32>,
}

// Latest GPS fix per vehicle from the provider gateway
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePositionResp {
    pub vehicle_id: VehicleId,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub timestamp: TimeStamp,
}
