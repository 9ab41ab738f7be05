//! The long-running supervision loop: launch the sensor, verify it came up,
//! surface rules-parser warnings once, then tail its output file until the
//! process is told to shut down.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc::Receiver;

use crate::config::FalconerConfig;
use crate::store::{EventStore, StoreError};

use super::classify::classify;
use super::docker;
use super::launcher::{self, ExecutionSpec, HOST_PREFIX};
use super::tail::{self, TailCursor};

/// Output file the sensor writes into the shared directory.
pub const OUTPUT_FILE: &str = "/tmp/falco_output.json";
/// Fixed host-visible location the custom rules file is copied to.
pub const RULES_FILE: &str = "/tmp/custom_falco_rules.yaml";

/// How long the sensor gets to initialize and create its output file.
const LAUNCH_SETTLE: Duration = Duration::from_secs(3);
/// Pause between tail cycles.
const TAIL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("sensor output file not found or sensor container not running")]
    SensorStartup,
    #[error("Docker API error: {0}")]
    Engine(#[from] bollard::errors::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("event store error: {0}")]
    Store(#[from] StoreError),
}

pub struct SensorSupervisor {
    config: FalconerConfig,
    store: EventStore,
    output_file: PathBuf,
    custom_rules: bool,
    container_id: Option<String>,
}

impl SensorSupervisor {
    /// Build a supervisor. A configured custom rules file is copied into the
    /// shared directory here, exactly once.
    pub fn new(config: FalconerConfig, store: EventStore) -> Result<Self, SupervisorError> {
        let custom_rules = match &config.sensor.rules_file {
            Some(rules) => {
                std::fs::copy(rules, RULES_FILE)?;
                log::info!("Copied custom rules file {rules:?} to {RULES_FILE}");
                true
            }
            None => false,
        };

        let output_file = config
            .sensor
            .external_output_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(OUTPUT_FILE));

        Ok(Self {
            config,
            store,
            output_file,
            custom_rules,
            container_id: None,
        })
    }

    /// Supervise until a cancellation message arrives or a fatal error occurs.
    /// The managed sensor container is stopped and removed on the way out.
    pub async fn run(mut self, mut cancel_rx: Receiver<()>) -> Result<(), SupervisorError> {
        let result = tokio::select! {
            res = self.supervise() => res,
            _ = cancel_rx.recv() => {
                log::info!("Shutdown requested, stopping sensor supervision");
                Ok(())
            }
        };
        self.shutdown_sensor().await;
        result
    }

    async fn supervise(&mut self) -> Result<(), SupervisorError> {
        self.launch_sensor().await?;
        self.verify_startup().await?;
        self.tail_loop().await
    }

    async fn launch_sensor(&mut self) -> Result<(), SupervisorError> {
        if self.config.sensor.is_external() {
            log::info!(
                "Sensor output {:?} is externally managed, skipping launch",
                self.output_file
            );
            return Ok(());
        }

        let command = sensor_command(&self.output_file, self.custom_rules);
        let spec = ExecutionSpec::sensor(&self.config.sensor.image_ref(), Some(command));
        let id = launcher::launch(&spec).await?;
        log::info!("Sensor container {id} started");
        self.container_id = Some(id);

        // Give the sensor time to initialize and create the output file
        tokio::time::sleep(LAUNCH_SETTLE).await;
        Ok(())
    }

    async fn verify_startup(&mut self) -> Result<(), SupervisorError> {
        let alive = self.config.sensor.is_external()
            || !docker::containers_by_image(&self.config.sensor.image_ref(), false)
                .await?
                .is_empty();
        if !self.output_file.is_file() || !alive {
            return Err(SupervisorError::SensorStartup);
        }

        // One-shot check: surface rules-parser warnings from the startup logs
        if let Some(id) = &self.container_id {
            let logs = docker::fetch_logs(id).await?;
            if logs.contains("Rule ") {
                for warning in classify(&logs) {
                    log::warn!("{warning}");
                }
            }
        }
        Ok(())
    }

    async fn tail_loop(&mut self) -> Result<(), SupervisorError> {
        log::info!("Tailing sensor output at {:?}", self.output_file);
        let mut cursor = TailCursor::default();
        loop {
            self.tail_cycle(&mut cursor)?;
            tokio::time::sleep(TAIL_INTERVAL).await;
        }
    }

    /// One read batch: parse everything appended since `cursor` and forward
    /// it to the store. Returns the number of events forwarded.
    fn tail_cycle(&mut self, cursor: &mut TailCursor) -> Result<usize, SupervisorError> {
        let events = tail::read_new_events(&self.output_file, cursor)?;
        if !events.is_empty() {
            log::debug!("Forwarding {} sensor events", events.len());
            self.store.bulk_insert(&events)?;
        }
        Ok(events.len())
    }

    async fn shutdown_sensor(&mut self) {
        if let Some(id) = self.container_id.take() {
            log::info!("Stopping sensor container {id}");
            if let Err(e) = docker::stop_container(&id).await {
                log::warn!("Failed to stop sensor container {id}: {e}");
            }
            if let Err(e) = docker::remove_container(&id).await {
                log::warn!("Failed to remove sensor container {id}: {e}");
            }
        }
    }
}

/// Full sensor command line: structured JSON output into the shared output
/// file, plus the copied rules file override when one was configured.
fn sensor_command(output_file: &Path, custom_rules: bool) -> Vec<String> {
    let mut command: Vec<String> = [
        "falco",
        "-pc",
        "-o",
        "json_output=true",
        "-o",
        "file_output.enabled=true",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect();

    command.push("-o".to_string());
    command.push(format!(
        "file_output.filename={HOST_PREFIX}{}",
        output_file.display()
    ));

    if custom_rules {
        command.push("-o".to_string());
        command.push(format!("rules_file={HOST_PREFIX}{RULES_FILE}"));
    }

    command
}
