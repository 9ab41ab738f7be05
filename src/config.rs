use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum FalconerConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top level configuration for the supervisor. Every field has a default, so
/// a missing config file is equivalent to an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FalconerConfig {
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    /// Sensor image repository.
    #[serde(default = "default_sensor_image")]
    pub image: String,
    /// Pinned sensor image tag.
    #[serde(default = "default_sensor_tag")]
    pub tag: String,
    /// Optional custom Falco rules file. Copied once into the shared /tmp
    /// directory before the sensor is launched.
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
    /// When set, the sensor lifecycle is managed externally and falconer only
    /// tails the given output file. No container is launched or inspected.
    #[serde(default)]
    pub external_output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Path to the DuckDB database file. In-memory when absent.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_sensor_image() -> String {
    "falcosecurity/falco".to_string()
}

fn default_sensor_tag() -> String {
    "0.29.0".to_string()
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            image: default_sensor_image(),
            tag: default_sensor_tag(),
            rules_file: None,
            external_output_file: None,
        }
    }
}

impl SensorConfig {
    /// Full image reference, e.g. `falcosecurity/falco:0.29.0`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    pub fn is_external(&self) -> bool {
        self.external_output_file.is_some()
    }
}

impl FalconerConfig {
    fn try_init_from_string(config: &str) -> Result<Self, FalconerConfigError> {
        Ok(toml::from_str(config)?)
    }

    pub fn try_init() -> Result<Self, FalconerConfigError> {
        use std::io::Read;
        match std::fs::File::open(&crate::cli::get_cli_args().config) {
            Ok(mut file) => {
                let mut config = String::new();
                file.read_to_string(&mut config)?;
                Self::try_init_from_string(&config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FalconerConfig::try_init_from_string("").expect("Failed to parse config");
        assert_eq!(config.sensor.image_ref(), "falcosecurity/falco:0.29.0");
        assert!(!config.sensor.is_external());
        assert!(config.sensor.rules_file.is_none());
        assert!(config.store.database_path.is_none());
    }

    #[test]
    fn test_full_config() {
        let input = r#"
            [sensor]
            tag = "0.30.0"
            rules_file = "/etc/falconer/rules.yaml"
            external_output_file = "/var/run/falco/events.json"

            [store]
            database_path = "/var/lib/falconer/events.duckdb"
        "#;
        let config = FalconerConfig::try_init_from_string(input).expect("Failed to parse config");
        assert_eq!(config.sensor.image_ref(), "falcosecurity/falco:0.30.0");
        assert!(config.sensor.is_external());
        assert_eq!(
            config.sensor.rules_file.as_deref(),
            Some(std::path::Path::new("/etc/falconer/rules.yaml"))
        );
        assert_eq!(
            config.store.database_path.as_deref(),
            Some(std::path::Path::new("/var/lib/falconer/events.duckdb"))
        );
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let res = FalconerConfig::try_init_from_string("[sensor\ntag = 1");
        assert!(matches!(res, Err(FalconerConfigError::Toml(_))));
    }
}
