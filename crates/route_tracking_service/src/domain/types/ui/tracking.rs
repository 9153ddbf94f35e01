/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use crate::common::types::*;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartTrackingRequest {
    pub date: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartTrackingResponse {
    pub resumed: bool,
    /// The record the caller is now tracking against, fresh or resumed.
    pub progress: RouteProgress,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub action: TriggerAction,
    pub stop_index: usize,
    pub triggered_at: TimeStamp,
    pub route_completed: bool,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub driver_id: DriverId,
    pub date: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RouteProgressResponse {
    pub progress: RouteProgress,
    pub schedule: Vec<Stop>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ResponseData {
    pub result: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixture_route() -> Route {
        Route {
            route_id: RouteId("route-1".to_string()),
            service_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            driver_id: DriverId("driver-1".to_string()),
            vehicle_id: VehicleId("vehicle-1".to_string()),
            stops: Vec::new(),
            speed_limit: None,
        }
    }

    #[test]
    fn start_response_carries_the_full_progress_record() {
        let route = fixture_route();
        let response = StartTrackingResponse {
            resumed: false,
            progress: RouteProgress::new(&route),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["resumed"], false);
        assert_eq!(json["progress"]["routeId"], "route-1");
        assert_eq!(json["progress"]["driverId"], "driver-1");
        assert_eq!(json["progress"]["status"], "NOT_STARTED");
        assert_eq!(json["progress"]["currentStopIndex"], 0);
    }
}
