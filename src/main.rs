use std::process::ExitCode;

mod cli;
mod config;
mod sensor;
mod signals;
mod store;

use config::FalconerConfig;
use sensor::SensorSupervisor;
use store::EventStore;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let config = match FalconerConfig::try_init() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Unable to read config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store = match EventStore::open(config.store.database_path.as_deref()) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Unable to open event store: {e}");
            return ExitCode::FAILURE;
        }
    };
    match store.event_count() {
        Ok(count) => log::debug!("Event store ready with {count} stored events"),
        Err(e) => log::warn!("Unable to query event store: {e}"),
    }

    // A signal arriving during preflight is buffered and honored as soon as
    // the supervisor starts.
    let (cancel_tx, cancel_rx) = tokio::sync::mpsc::channel(1);
    signals::handle_shutdown(cancel_tx);

    if let Err(e) = sensor::preflight::check_host_capability(&config, &store).await {
        log::error!("Host capability check failed: {e}");
        return ExitCode::FAILURE;
    }

    let supervisor = match SensorSupervisor::new(config, store) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            log::error!("Unable to initialize sensor supervisor: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    match supervisor.run(cancel_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Sensor supervision failed: {e}");
            ExitCode::FAILURE
        }
    }
}
