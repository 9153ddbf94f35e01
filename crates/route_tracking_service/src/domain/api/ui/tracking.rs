/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use actix_web::{
    get, post,
    web::{Data, Json, Path, Query},
};

use crate::{
    common::types::*,
    domain::{action::ui::tracking, types::ui::tracking::*},
    environment::AppState,
    tools::error::AppError,
};

#[post("/ui/tracking/{routeId}/start")]
pub async fn start_tracking(
    data: Data<AppState>,
    path: Path<String>,
    param_obj: Json<StartTrackingRequest>,
) -> Result<Json<StartTrackingResponse>, AppError> {
    let route_id = RouteId(path.into_inner());
    let request_body = param_obj.into_inner();

    Ok(Json(
        tracking::start_tracking(data, route_id, request_body).await?,
    ))
}

#[post("/ui/tracking/{routeId}/trigger")]
pub async fn manual_trigger(
    data: Data<AppState>,
    path: Path<String>,
) -> Result<Json<TriggerResponse>, AppError> {
    let route_id = RouteId(path.into_inner());

    Ok(Json(tracking::manual_trigger(data, route_id).await?))
}

#[get("/ui/tracking/{routeId}/progress")]
pub async fn get_progress(
    data: Data<AppState>,
    path: Path<String>,
    query: Query<ProgressQuery>,
) -> Result<Json<RouteProgressResponse>, AppError> {
    let route_id = RouteId(path.into_inner());

    Ok(Json(
        tracking::get_progress(data, route_id, query.into_inner()).await?,
    ))
}
