/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use actix_web::{
    post,
    web::{Data, Json, Path},
};

use crate::{
    common::types::*,
    domain::{action::internal::position, types::internal::position::IngestPositionRequest},
    environment::AppState,
    tools::error::AppError,
};

#[post("/internal/position/{vehicleId}")]
pub async fn ingest_position(
    data: Data<AppState>,
    path: Path<String>,
    param_obj: Json<IngestPositionRequest>,
) -> Result<Json<RouteProgress>, AppError> {
    let vehicle_id = VehicleId(path.into_inner());
    let request_body = param_obj.into_inner();

    Ok(Json(
        position::ingest_position(data, vehicle_id, request_body).await?,
    ))
}
