//! Builds the sensor's container specification and drives it through
//! create → start. Readiness is the caller's concern.

use bollard::errors::Error;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::CreateContainerOptions;

use super::docker;

/// Prefix under which the host filesystem is exposed inside the sensor.
pub const HOST_PREFIX: &str = "/host";
/// Host directory shared with the sensor for its output file and any custom
/// rules file.
pub const SHARED_DIR: &str = "/tmp";

/// Immutable description of one sensor container launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSpec {
    pub image: String,
    pub command: Option<Vec<String>>,
    pub mount_targets: Vec<String>,
    pub binds: Vec<String>,
    pub privileged: bool,
}

impl ExecutionSpec {
    /// The sensor needs the engine socket and device tree read-write, the
    /// rest of the host read-only, and the shared temp directory read-write
    /// for its output file. Raw device and namespace access require a
    /// privileged container.
    pub fn sensor(image_ref: &str, command: Option<Vec<String>>) -> Self {
        let mount_targets = [
            "/var/run/docker.sock",
            "/dev",
            "/proc",
            "/boot",
            "/lib/modules",
            "/usr",
            "/etc",
            SHARED_DIR,
        ]
        .iter()
        .map(|target| format!("{HOST_PREFIX}{target}"))
        .collect();

        let binds = vec![
            format!("/var/run/docker.sock:{HOST_PREFIX}/var/run/docker.sock"),
            format!("/dev:{HOST_PREFIX}/dev"),
            format!("/proc:{HOST_PREFIX}/proc:ro"),
            format!("/boot:{HOST_PREFIX}/boot:ro"),
            format!("/lib/modules:{HOST_PREFIX}/lib/modules:ro"),
            format!("/usr:{HOST_PREFIX}/usr:ro"),
            format!("/etc:{HOST_PREFIX}/etc:ro"),
            format!("{SHARED_DIR}:{HOST_PREFIX}{SHARED_DIR}:rw"),
        ];

        Self {
            image: image_ref.to_string(),
            command,
            mount_targets,
            binds,
            privileged: true,
        }
    }
}

/// Create and start a container from `spec`, returning its id.
pub async fn launch(spec: &ExecutionSpec) -> Result<String, Error> {
    let docker = docker::get_docker();

    let volumes: Vec<String> = spec.mount_targets.clone();

    let host_config = HostConfig {
        binds: Some(spec.binds.clone()),
        privileged: Some(spec.privileged),
        ..Default::default()
    };

    let body = ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: spec.command.clone(),
        volumes: Some(volumes),
        host_config: Some(host_config),
        ..Default::default()
    };

    let created = docker
        .create_container(None::<CreateContainerOptions>, body)
        .await?;
    docker::start_container(&created.id).await?;

    Ok(created.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_spec_mounts_host_paths() {
        let spec = ExecutionSpec::sensor("falcosecurity/falco:0.29.0", None);

        assert_eq!(spec.image, "falcosecurity/falco:0.29.0");
        assert!(spec.privileged);
        assert!(spec.command.is_none());

        assert_eq!(
            spec.mount_targets,
            vec![
                "/host/var/run/docker.sock",
                "/host/dev",
                "/host/proc",
                "/host/boot",
                "/host/lib/modules",
                "/host/usr",
                "/host/etc",
                "/host/tmp",
            ]
        );

        // Engine socket, devices and the shared dir are read-write, the rest
        // read-only.
        assert!(spec.binds.contains(&"/var/run/docker.sock:/host/var/run/docker.sock".to_string()));
        assert!(spec.binds.contains(&"/dev:/host/dev".to_string()));
        assert!(spec.binds.contains(&"/proc:/host/proc:ro".to_string()));
        assert!(spec.binds.contains(&"/boot:/host/boot:ro".to_string()));
        assert!(spec.binds.contains(&"/lib/modules:/host/lib/modules:ro".to_string()));
        assert!(spec.binds.contains(&"/usr:/host/usr:ro".to_string()));
        assert!(spec.binds.contains(&"/etc:/host/etc:ro".to_string()));
        assert!(spec.binds.contains(&"/tmp:/host/tmp:rw".to_string()));
    }

    #[test]
    fn test_sensor_spec_carries_command_override() {
        let command = vec!["falco".to_string(), "-pc".to_string()];
        let spec = ExecutionSpec::sensor("falcosecurity/falco:0.29.0", Some(command.clone()));
        assert_eq!(spec.command, Some(command));
    }
}
