/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use actix_web::web::Data;
use tracing::{info, warn};

use crate::domain::types::internal::position::StopAllResponse;
use crate::environment::AppState;
use crate::redis::commands::release_tracking_lock;
use crate::redis::keys::route_progress_key;
use crate::tools::error::AppError;

/// Deregisters every active tracker and releases its day lock. Progress
/// records stay in Redis until their TTL runs out, so tracking can be
/// restarted without losing state.
pub async fn stop_all_tracking(data: Data<AppState>) -> Result<StopAllResponse, AppError> {
    let trackers: Vec<_> = {
        let mut active = data.active_trackers.lock().await;
        active.drain().map(|(_, tracker)| tracker).collect()
    };

    {
        let mut trigger_states = data.trigger_states.lock().await;
        trigger_states.clear();
    }

    for tracker in &trackers {
        data.route_locks
            .remove(&route_progress_key(
                &tracker.route_id,
                &tracker.driver_id,
                &tracker.date,
            ))
            .await;

        if let Err(err) =
            release_tracking_lock(&data.redis, &tracker.route_id, &tracker.date).await
        {
            warn!(tag = "[Lock Release Failed]", route_id = %tracker.route_id.inner(), error = %err);
        }
    }

    info!(tag = "[Tracking Stopped]", stopped_routes = trackers.len());

    Ok(StopAllResponse {
        stopped_routes: trackers.len(),
    })
}
