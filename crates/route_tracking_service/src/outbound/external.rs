/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use super::types::*;
use crate::common::recalculation::{TravelTimeEstimator, TravelTimeQuery};
use crate::common::types::*;
use crate::tools::{callapi::call_api, error::AppError};
use async_trait::async_trait;
use reqwest::{Method, Url};
use std::time::Duration;

/// Travel-time estimates from the external routing service. A `success:
/// false` reply maps to `Ok(None)` so callers fall back instead of failing.
pub struct HttpTravelTimeEstimator {
    pub url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

#[async_trait]
impl TravelTimeEstimator for HttpTravelTimeEstimator {
    async fn travel_time_minutes(
        &self,
        query: &TravelTimeQuery,
    ) -> Result<Option<u32>, AppError> {
        let resp = call_api::<TravelTimeResp, TravelTimeReq>(
            Method::POST,
            &self.url,
            vec![
                ("content-type", "application/json"),
                ("api-key", &self.api_key),
            ],
            Some(TravelTimeReq {
                origin_address: query.origin_address.clone(),
                destination_address: query.destination_address.clone(),
                traffic_scenario: query.traffic_scenario,
                departure_time: query.departure_time,
                speed_limit: query.speed_limit,
            }),
            Some(self.timeout),
        )
        .await?;

        if resp.success {
            Ok(resp.travel_time_minutes)
        } else {
            Ok(None)
        }
    }
}

/// Latest GPS fixes from the vehicle position gateway, polled on a timer.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn latest_position(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Option<VehiclePosition>, AppError>;
}

pub struct HttpPositionProvider {
    pub base_url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

#[async_trait]
impl PositionProvider for HttpPositionProvider {
    async fn latest_position(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Option<VehiclePosition>, AppError> {
        let url = self
            .base_url
            .join(&format!("vehicles/{}/position", vehicle_id.inner()))
            .map_err(|err| AppError::InvalidRequest(err.to_string()))?;

        let resp = call_api::<Option<VehiclePositionResp>, ()>(
            Method::GET,
            &url,
            vec![
                ("content-type", "application/json"),
                ("api-key", &self.api_key),
            ],
            None,
            Some(self.timeout),
        )
        .await?;

        Ok(resp.map(|resp| VehiclePosition {
            vehicle_id: resp.vehicle_id,
            location: Point {
                lat: Latitude(resp.latitude),
                lon: Longitude(resp.longitude),
            },
            speed: resp.speed.map(SpeedInMeterPerSecond),
            timestamp: resp.timestamp,
        }))
    }
}
