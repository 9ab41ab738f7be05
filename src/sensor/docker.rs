//! Docker engine access via bollard.
//!
//! A single shared client plus the narrow set of container operations the
//! supervisor needs: pull, lookup by image, start/stop/remove, and a one-shot
//! log fetch.

use std::collections::HashMap;
use std::sync::OnceLock;

use bollard::Docker;
use bollard::errors::Error;
use bollard::query_parameters::{
    ListContainersOptions, ListContainersOptionsBuilder, LogsOptions, LogsOptionsBuilder,
    RemoveContainerOptions, RemoveContainerOptionsBuilder, StartContainerOptions,
    StartContainerOptionsBuilder, StopContainerOptions, StopContainerOptionsBuilder,
};
use futures_util::StreamExt;

static DOCKER_CLIENT: OnceLock<Docker> = OnceLock::new();

/// Get a reference to the shared Docker client.
///
/// Lazily initialized on first use; connects with the default method
/// (Unix socket on Linux).
pub fn get_docker() -> &'static Docker {
    DOCKER_CLIENT.get_or_init(|| {
        Docker::connect_with_local_defaults().expect("Failed to connect to Docker daemon")
    })
}

/// Check connectivity to the Docker daemon.
pub async fn ping() -> Result<(), Error> {
    get_docker().ping().await?;
    Ok(())
}

/// Ensure `image:tag` is present locally, pulling it if absent.
pub async fn pull_image(image: &str, tag: &str) -> Result<(), Error> {
    log::info!("Pulling image: {image}:{tag}");
    let docker = get_docker();

    let options = bollard::query_parameters::CreateImageOptionsBuilder::new()
        .from_image(image)
        .tag(tag)
        .build();

    let mut stream = docker.create_image(Some(options), None, None);

    while let Some(result) = stream.next().await {
        match result {
            Ok(info) => {
                if let Some(status) = info.status {
                    log::debug!("Pull status: {status}");
                }
            }
            Err(e) => {
                log::error!("Failed to pull image {image}:{tag}: {e}");
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Ids of containers created from `image_ref`; running ones only, or every
/// container including exited ones when `all` is set.
pub async fn containers_by_image(image_ref: &str, all: bool) -> Result<Vec<String>, Error> {
    let docker = get_docker();

    let mut filters = HashMap::new();
    filters.insert("ancestor".to_string(), vec![image_ref.to_string()]);

    let options: ListContainersOptions = ListContainersOptionsBuilder::new()
        .all(all)
        .filters(&filters)
        .build();

    let containers = docker.list_containers(Some(options)).await?;
    Ok(containers
        .into_iter()
        .filter_map(|container| container.id)
        .collect())
}

pub async fn start_container(id: &str) -> Result<(), Error> {
    let options: StartContainerOptions = StartContainerOptionsBuilder::new().build();
    get_docker().start_container(id, Some(options)).await
}

/// Stop a container. Already-stopped and missing containers are not errors.
pub async fn stop_container(id: &str) -> Result<(), Error> {
    let options: StopContainerOptions = StopContainerOptionsBuilder::new().t(10).build();

    match get_docker().stop_container(id, Some(options)).await {
        Ok(_) => Ok(()),
        Err(Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {
            log::warn!("Container {id} not found, skipping stop");
            Ok(())
        }
        Err(Error::DockerResponseServerError {
            status_code: 304, ..
        }) => {
            log::info!("Container {id} already stopped");
            Ok(())
        }
        Err(e) => {
            log::warn!("Failed to stop container {id}: {e}");
            Err(e)
        }
    }
}

/// Remove a container. Missing containers are not errors.
pub async fn remove_container(id: &str) -> Result<(), Error> {
    let options: RemoveContainerOptions = RemoveContainerOptionsBuilder::new().force(true).build();

    match get_docker().remove_container(id, Some(options)).await {
        Ok(_) => Ok(()),
        Err(Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {
            log::info!("Container {id} not found, skipping removal");
            Ok(())
        }
        Err(e) => {
            log::error!("Failed to remove container {id}: {e}");
            Err(e)
        }
    }
}

/// Fetch the full stdout+stderr log of a container as one string.
pub async fn fetch_logs(id: &str) -> Result<String, Error> {
    let options: LogsOptions = LogsOptionsBuilder::new()
        .stdout(true)
        .stderr(true)
        .follow(false)
        .build();

    let mut stream = get_docker().logs(id, Some(options));
    let mut logs = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        logs.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
    }
    Ok(logs)
}
