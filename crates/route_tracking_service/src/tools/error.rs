/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use actix_web::{
    http::{header::ContentType, StatusCode},
    HttpResponse, ResponseError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    error_message: String,
    pub error_code: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    InternalError(String),
    InvalidRequest(String),
    PanicOccured(String),
    UnprocessibleRequest(String),
    LargePayloadSize(usize, usize),
    RouteNotFound(String),
    WarehouseNotFound(String),
    ProgressNotFound(String),
    VehicleNotTracked(String),
    RouteNotScheduledToday(String),
    RouteAlreadyCompleted(String),
    TrackingAlreadyActive(String),
    InvalidGPSData(String),
    ExternalAPICallError(String),
    SerializationError(String),
    DeserializationError(String),
    InvalidConfiguration(String),
    RedisConnectionError(String),
    SetFailed,
    GetFailed,
    DeleteFailed,
    RequestTimeout,
}

impl AppError {
    fn error_message(&self) -> ErrorBody {
        ErrorBody {
            error_message: self.message(),
            error_code: self.code(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::InternalError(err) => err.to_string(),
            AppError::InvalidRequest(err) => err.to_string(),
            AppError::UnprocessibleRequest(err) => err.to_string(),
            AppError::PanicOccured(reason) => {
                format!("Panic occured : {reason}")
            }
            AppError::LargePayloadSize(length, limit) => {
                format!("Content length ({length} Bytes) greater than allowed maximum limit : ({limit} Bytes)")
            }
            AppError::RouteNotFound(route_id) => {
                format!("Route not found : RouteId - {route_id}")
            }
            AppError::WarehouseNotFound(warehouse_id) => {
                format!("Warehouse not found : WarehouseId - {warehouse_id}")
            }
            AppError::ProgressNotFound(route_id) => {
                format!("No tracking progress found : RouteId - {route_id}")
            }
            AppError::VehicleNotTracked(vehicle_id) => {
                format!("Vehicle is not being tracked : VehicleId - {vehicle_id}")
            }
            AppError::RouteNotScheduledToday(route_id) => {
                format!("Route is not scheduled for today : RouteId - {route_id}")
            }
            AppError::RouteAlreadyCompleted(route_id) => {
                format!("Route is already completed : RouteId - {route_id}")
            }
            AppError::TrackingAlreadyActive(route_id) => {
                format!("Tracking is already active : RouteId - {route_id}")
            }
            AppError::InvalidGPSData(err) => err.to_string(),
            AppError::ExternalAPICallError(err) => err.to_string(),
            AppError::SerializationError(err) => err.to_string(),
            AppError::DeserializationError(err) => err.to_string(),
            AppError::InvalidConfiguration(err) => err.to_string(),
            AppError::RedisConnectionError(err) => err.to_string(),
            _ => "Some Error Occured".to_string(),
        }
    }

    fn code(&self) -> String {
        match self {
            AppError::InternalError(_) => "INTERNAL_ERROR",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::PanicOccured(_) => "PANIC_OCCURED",
            AppError::UnprocessibleRequest(_) => "UNPROCESSIBLE_REQUEST",
            AppError::LargePayloadSize(_, _) => "LARGE_PAYLOAD_SIZE",
            AppError::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            AppError::WarehouseNotFound(_) => "WAREHOUSE_NOT_FOUND",
            AppError::ProgressNotFound(_) => "PROGRESS_NOT_FOUND",
            AppError::VehicleNotTracked(_) => "VEHICLE_NOT_TRACKED",
            AppError::RouteNotScheduledToday(_) => "ROUTE_NOT_SCHEDULED_TODAY",
            AppError::RouteAlreadyCompleted(_) => "ROUTE_ALREADY_COMPLETED",
            AppError::TrackingAlreadyActive(_) => "TRACKING_ALREADY_ACTIVE",
            AppError::InvalidGPSData(_) => "INVALID_GPS_DATA",
            AppError::ExternalAPICallError(_) => "EXTERNAL_API_CALL_ERROR",
            AppError::SerializationError(_) => "SERIALIZATION_ERROR",
            AppError::DeserializationError(_) => "DESERIALIZATION_ERROR",
            AppError::InvalidConfiguration(_) => "INVALID_REDIS_CONFIGURATION",
            AppError::RedisConnectionError(_) => "REDIS_CONNECTION_ERROR",
            AppError::SetFailed => "SET_FAILED",
            AppError::GetFailed => "GET_FAILED",
            AppError::DeleteFailed => "DELETE_FAILED",
            AppError::RequestTimeout => "REQUEST_TIMEOUT",
        }
        .to_string()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(self.error_message())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PanicOccured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UnprocessibleRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::LargePayloadSize(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            AppError::WarehouseNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ProgressNotFound(_) => StatusCode::NOT_FOUND,
            AppError::VehicleNotTracked(_) => StatusCode::NOT_FOUND,
            AppError::RouteNotScheduledToday(_) => StatusCode::BAD_REQUEST,
            AppError::RouteAlreadyCompleted(_) => StatusCode::BAD_REQUEST,
            AppError::TrackingAlreadyActive(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidGPSData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ExternalAPICallError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DeserializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RedisConnectionError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SetFailed => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::GetFailed => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DeleteFailed => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
        }
    }
}
