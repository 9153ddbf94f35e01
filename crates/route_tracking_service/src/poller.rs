/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actix_web::web::Data;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::common::types::VehicleId;
use crate::common::utils::is_within_tracking_hours;
use crate::domain::action::internal::position::apply_position;
use crate::environment::AppState;
use crate::poller_cycle_latency;
use crate::tools::prometheus::POLLER_CYCLE_LATENCY;

/// Polls the position provider for every actively tracked vehicle on a fixed
/// interval, feeding each fix through the geofence state machine. Sleeps
/// through the hours outside the tracking window and exits on graceful
/// termination.
pub async fn run_poller(data: Data<AppState>, graceful_termination_requested: Arc<AtomicBool>) {
    let mut timer = interval(Duration::from_secs(data.polling_interval_secs));

    loop {
        timer.tick().await;

        if graceful_termination_requested.load(Ordering::Relaxed) {
            info!(tag = "[Graceful Shutting Down]", "Position poller stopping");
            break;
        }

        if !is_within_tracking_hours(data.tracking_start_hour, data.tracking_end_hour) {
            debug!(tag = "[Outside Tracking Hours]");
            continue;
        }

        let start_time = std::time::Instant::now();

        let vehicle_ids: Vec<VehicleId> = {
            let trackers = data.active_trackers.lock().await;
            trackers.keys().cloned().collect()
        };

        let mut handles = Vec::with_capacity(vehicle_ids.len());
        for vehicle_id in vehicle_ids {
            let data = data.clone();
            handles.push(tokio::spawn(async move {
                match data.position_provider.latest_position(&vehicle_id).await {
                    Ok(Some(position)) => {
                        if let Err(err) = apply_position(&data, &vehicle_id, position).await {
                            warn!(tag = "[Position Apply Failed]", vehicle_id = %vehicle_id.inner(), error = %err);
                        }
                    }
                    Ok(None) => {
                        debug!(tag = "[No Position Fix]", vehicle_id = %vehicle_id.inner());
                    }
                    Err(err) => {
                        warn!(tag = "[Position Fetch Failed]", vehicle_id = %vehicle_id.inner(), error = %err);
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(tag = "[Poller Task Panicked]", error = %err);
            }
        }

        poller_cycle_latency!(start_time);
    }
}
