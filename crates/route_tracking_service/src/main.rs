/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use actix_web::{web, App, HttpServer};
use route_tracking_service::{
    common::types::ScheduleUpdated,
    domain::api,
    environment::{AppConfig, AppState},
    middleware::*,
    poller::run_poller,
    tools::{error::AppError, logger::*, prometheus::prometheus_metrics},
};
use std::{
    env::var,
    sync::atomic::{AtomicBool, Ordering},
    sync::Arc,
};
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::mpsc::{self, Receiver},
};
use tracing_actix_web::TracingLogger;

pub fn read_dhall_config(config_path: &str) -> Result<AppConfig, String> {
    let config = serde_dhall::from_file(config_path).parse::<AppConfig>();
    match config {
        Ok(config) => Ok(config),
        Err(e) => Err(format!("Error reading config: {}", e)),
    }
}

/// Drains schedule-updated notifications. Downstream consumers (driver app
/// push, ops dashboards) hang off this channel; for now each notification is
/// logged as a structured event.
async fn run_schedule_event_listener(
    mut receiver: Receiver<ScheduleUpdated>,
    graceful_termination_requested: Arc<AtomicBool>,
) {
    let mut timer = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        if graceful_termination_requested.load(Ordering::Relaxed) {
            info!(tag = "[Graceful Shutting Down]", "Schedule event listener stopping");
            break;
        }
        tokio::select! {
            event = receiver.recv() => {
                match event {
                    Some(event) => {
                        info!(
                            tag = "[Schedule Updated]",
                            route_id = %event.route_id.inner(),
                            stop_id = %event.stop_id.inner(),
                            planned_arrival = %event.planned_arrival.inner(),
                            planned_departure = %event.planned_departure.inner()
                        );
                    }
                    None => break,
                }
            },
            _ = timer.tick() => {},
        }
    }
}

#[actix_web::main]
async fn start_server() -> std::io::Result<()> {
    let dhall_config_path = var("DHALL_CONFIG")
        .unwrap_or_else(|_| "./dhall_config/route_tracking_service.dhall".to_string());
    let app_config = read_dhall_config(&dhall_config_path).unwrap_or_else(|err| {
        println!("Dhall Config Reading Error : {}", err);
        std::process::exit(1);
    });

    let _guard = setup_tracing(app_config.logger_cfg);

    let port = app_config.port;
    let workers = app_config.workers;

    let (sender, receiver) = mpsc::channel::<ScheduleUpdated>(app_config.schedule_event_buffer);

    let app_state = AppState::new(app_config, sender).await;

    let data = web::Data::new(app_state);

    let graceful_termination_requested = Arc::new(AtomicBool::new(false));
    let graceful_termination_requested_sigterm = graceful_termination_requested.to_owned();
    let graceful_termination_requested_sigint = graceful_termination_requested.to_owned();
    // Listen for SIGTERM signal.
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        sigterm.recv().await;
        graceful_termination_requested_sigterm.store(true, Ordering::Relaxed);
    });
    // Listen for SIGINT (Ctrl+C) signal.
    tokio::spawn(async move {
        let mut ctrl_c = signal(SignalKind::interrupt()).unwrap();
        ctrl_c.recv().await;
        graceful_termination_requested_sigint.store(true, Ordering::Relaxed);
    });

    let poller_data = data.clone();
    let poller_termination = graceful_termination_requested.to_owned();
    let poller_thread = tokio::spawn(async move {
        run_poller(poller_data, poller_termination).await;
    });

    let shutdown_data = data.clone();
    let listener_termination = graceful_termination_requested.to_owned();
    let listener_thread = tokio::spawn(async move {
        run_schedule_event_listener(receiver, listener_termination).await;
    });

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(
                web::JsonConfig::default()
                    .error_handler(|err, _| AppError::UnprocessibleRequest(err.to_string()).into()),
            )
            .wrap(CheckContentLength)
            .wrap(IncomingRequestMetrics)
            .wrap(TracingLogger::<DomainRootSpanBuilder>::new())
            .wrap(prometheus_metrics())
            .configure(api::handler)
    })
    .workers(workers)
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    poller_thread.await.expect("Position poller panicked");
    listener_thread
        .await
        .expect("Schedule event listener panicked");

    shutdown_data.redis.close_connections().await;

    Ok(())
}

fn main() {
    start_server().expect("Failed to start the server");
}
