//! Host capability checks run once before the sensor is supervised.
//!
//! Every failure here is fatal: the operator has to fix the host environment
//! and restart the process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use crate::config::FalconerConfig;
use crate::store::{EventStore, StoreError};

use super::docker;
use super::launcher::{self, ExecutionSpec};

/// Emitted by the sensor when it cannot attach to its kernel capture device.
pub const DEVICE_OPEN_ERROR: &str = "Runtime error: error opening device /host/dev/sysdig0";

/// Marker that this process is itself running inside a container.
const CONTAINER_MARKER: &str = "/.dockerenv";
const OS_RELEASE: &str = "/etc/os-release";

/// How long the throwaway instance gets to attempt the device attach before
/// its logs are inspected.
const PROBE_SETTLE: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("Linux distribution not supported yet")]
    UnsupportedHost,
    #[error("the kernel headers are not installed in the host operating system")]
    MissingKernelHeaders,
    #[error("error while contacting the Docker daemon: {0}")]
    EngineUnavailable(#[source] bollard::errors::Error),
    #[error("runtime error opening device /host/dev/sysdig0")]
    DeviceUnavailable,
    #[error("Docker API error: {0}")]
    Engine(#[from] bollard::errors::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("event store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinuxFamily {
    Rpm,
    Debian,
}

fn linux_family(distro_name: &str) -> Option<LinuxFamily> {
    const RPM_FAMILY: &[&str] = &["Red Hat", "CentOS", "Fedora", "openSUSE"];
    const DEBIAN_FAMILY: &[&str] = &["Debian", "Ubuntu"];

    if RPM_FAMILY.iter().any(|name| distro_name.contains(name)) {
        Some(LinuxFamily::Rpm)
    } else if DEBIAN_FAMILY.iter().any(|name| distro_name.contains(name)) {
        Some(LinuxFamily::Debian)
    } else {
        None
    }
}

/// The package query matching the host's package manager.
fn headers_query(family: LinuxFamily, kernel_release: &str) -> (&'static str, Vec<String>) {
    match family {
        LinuxFamily::Rpm => (
            "rpm",
            vec!["-q".to_string(), format!("kernel-devel-{kernel_release}")],
        ),
        LinuxFamily::Debian => (
            "dpkg",
            vec!["-l".to_string(), format!("linux-headers-{kernel_release}")],
        ),
    }
}

/// Verify the headers package for the running kernel is installed.
///
/// `run_query` reports whether the package lookup succeeded; it is injected
/// so the decision logic stays testable without the host package manager.
fn check_kernel_headers(
    distro_name: &str,
    kernel_release: &str,
    run_query: impl FnOnce(&str, &[String]) -> std::io::Result<bool>,
) -> Result<(), PreflightError> {
    let family = linux_family(distro_name).ok_or(PreflightError::UnsupportedHost)?;
    let (program, args) = headers_query(family, kernel_release);
    match run_query(program, &args)? {
        true => Ok(()),
        false => Err(PreflightError::MissingKernelHeaders),
    }
}

fn run_package_query(program: &str, args: &[String]) -> std::io::Result<bool> {
    std::process::Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
}

fn parse_os_release_name(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("NAME="))
        .map(|name| name.trim().trim_matches(['"', '\'']).to_string())
}

fn distro_name() -> std::io::Result<String> {
    let content = std::fs::read_to_string(OS_RELEASE)?;
    Ok(parse_os_release_name(&content).unwrap_or_default())
}

fn kernel_release() -> std::io::Result<String> {
    let output = std::process::Command::new("uname").arg("-r").output()?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Validate that this host can run the sensor, and reset session state.
///
/// Skipped entirely when the sensor output is externally managed. See the
/// module docs for the failure policy.
pub async fn check_host_capability(
    config: &FalconerConfig,
    store: &EventStore,
) -> Result<(), PreflightError> {
    if config.sensor.is_external() {
        return Ok(());
    }

    if Path::new(CONTAINER_MARKER).is_file() {
        log::warn!(
            "Running inside a container, so the kernel headers on the host \
             operating system cannot be verified. Please review!"
        );
    } else {
        let distro = distro_name()?;
        let release = kernel_release()?;
        check_kernel_headers(&distro, &release, run_package_query)?;
    }

    docker::ping().await.map_err(PreflightError::EngineUnavailable)?;

    docker::pull_image(&config.sensor.image, &config.sensor.tag).await?;

    // Idempotent cleanup of instances left over from a previous run
    for id in docker::containers_by_image(&config.sensor.image_ref(), true).await? {
        docker::stop_container(&id).await?;
        docker::remove_container(&id).await?;
    }

    store.purge_events()?;

    // No command override here: the default entrypoint performs the device
    // attach whose outcome we inspect in the logs.
    let spec = ExecutionSpec::sensor(&config.sensor.image_ref(), None);
    let probe_id = launcher::launch(&spec).await?;
    log::info!("Probing sensor device access with container {probe_id}");
    tokio::time::sleep(PROBE_SETTLE).await;

    let logs = docker::fetch_logs(&probe_id).await?;
    if logs.contains(DEVICE_OPEN_ERROR) {
        // The container is left in place for diagnosis
        return Err(PreflightError::DeviceUnavailable);
    }
    docker::stop_container(&probe_id).await?;
    docker::remove_container(&probe_id).await?;

    Ok(())
}
