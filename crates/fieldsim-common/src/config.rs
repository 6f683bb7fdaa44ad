//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Shared primitives and utilities for the fieldsim runtime."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for the fieldsim runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging sink and format settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// One entry per simulated field device.
    #[serde(rename = "field-device", default)]
    pub field_devices: Vec<FieldDeviceConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    /// The parsed, validated configuration.
    pub config: AppConfig,
    /// The file it came from.
    pub source: PathBuf,
}

impl AppConfig {
    /// Environment variable overriding the config search path.
    pub const ENV_CONFIG_PATH: &'static str = "FIELDSIM_CONFIG";

    /// Load configuration from disk, respecting the `FIELDSIM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig { config, source: path });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig { config, source: path });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.field_devices.is_empty() {
            return Err(anyhow!("configuration must declare at least one field-device"));
        }
        for device in &self.field_devices {
            device.validate()?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Logging sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory receiving the rolling daily log file.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Override for the log file name prefix; defaults to the service name.
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Stdout format.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
        }
    }
}

/// One simulated field device.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldDeviceConfig {
    /// Device name, used in logs.
    pub name: String,
    /// Cycle period in milliseconds.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub cycle_time: Duration,
    /// Tag declarations.
    #[serde(default)]
    pub tags: TagsConfig,
    /// Simulation-plane subscription settings.
    #[serde(default)]
    pub input: Option<IoConfig>,
    /// Simulation-plane update settings.
    #[serde(default)]
    pub output: Option<IoConfig>,
    /// Logic program source, one statement per line.
    #[serde(default)]
    pub logic: String,
    /// Control-plane outstations.
    #[serde(default)]
    pub comms: CommsConfig,
}

impl FieldDeviceConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("field-device name must not be empty"));
        }
        if self.cycle_time.is_zero() {
            return Err(anyhow!("field-device '{}' needs a non-zero cycle-time", self.name));
        }

        // Tag names must be unique across every kind and origin.
        let mut names = HashSet::new();
        for tag in &self.tags.internal_tag {
            tag.validate(&self.name)?;
            if !names.insert(tag.name.as_str()) {
                return Err(anyhow!("field-device '{}' declares tag '{}' twice", self.name, tag.name));
            }
        }
        for tag in &self.tags.external_tag {
            if !names.insert(tag.name.as_str()) {
                return Err(anyhow!("field-device '{}' declares tag '{}' twice", self.name, tag.name));
            }
        }

        for server in &self.comms.sunspec_tcp_server {
            server.validate(&self.name)?;
        }

        Ok(())
    }
}

/// Tag declarations for one device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TagsConfig {
    /// Tags whose value lives in the device itself.
    #[serde(default)]
    pub internal_tag: Vec<InternalTagConfig>,
    /// Tags bound to simulator devices through an IO module id.
    #[serde(default)]
    pub external_tag: Vec<ExternalTagConfig>,
}

/// An internal tag with its initializer; exactly one of `value`, `status`,
/// or `string` must be present, and it fixes the tag kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalTagConfig {
    /// Tag name.
    pub name: String,
    /// Analog initializer.
    #[serde(default)]
    pub value: Option<f64>,
    /// Binary initializer.
    #[serde(default)]
    pub status: Option<bool>,
    /// String initializer.
    #[serde(default)]
    pub string: Option<String>,
}

impl InternalTagConfig {
    fn validate(&self, device: &str) -> Result<()> {
        let initializers =
            usize::from(self.value.is_some()) + usize::from(self.status.is_some()) + usize::from(self.string.is_some());
        if initializers != 1 {
            return Err(anyhow!(
                "field-device '{}' internal-tag '{}' needs exactly one of value, status, or string",
                device,
                self.name
            ));
        }
        Ok(())
    }
}

/// An external tag bound to an IO module id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalTagConfig {
    /// Tag name.
    pub name: String,
    /// IO module id this tag reads from and writes to.
    pub io: String,
    /// Tag kind.
    #[serde(rename = "type")]
    pub kind: TagKindConfig,
}

/// Kind of an external tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKindConfig {
    /// Boolean point.
    Binary,
    /// Double-precision point.
    Analog,
}

/// Subscription or update endpoint plus its point declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IoConfig {
    /// Transport endpoint, e.g. `tcp://host:port`.
    pub endpoint: String,
    /// Binary points: IO module id -> simulator device name.
    #[serde(default)]
    pub binary: Vec<IoPointConfig>,
    /// Analog points: IO module id -> simulator device name.
    #[serde(default)]
    pub analog: Vec<IoPointConfig>,
}

/// One IO point declaration binding a module id to a device name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoPointConfig {
    /// IO module id referenced by external tags.
    pub id: String,
    /// Simulator-side device name used on the wire.
    pub name: String,
}

/// Control-plane outstation declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommsConfig {
    /// SunSpec Modbus/TCP servers.
    #[serde(default)]
    pub sunspec_tcp_server: Vec<SunSpecServerConfig>,
}

/// One SunSpec Modbus/TCP outstation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SunSpecServerConfig {
    /// Listen address.
    pub ip: String,
    /// Listen port.
    pub port: u16,
    /// Register map entries.
    #[serde(default)]
    pub register: Vec<RegisterConfig>,
}

impl SunSpecServerConfig {
    fn validate(&self, device: &str) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(anyhow!("field-device '{}' sunspec-tcp-server needs an ip", device));
        }
        for register in &self.register {
            if register.address == 0 || register.tag.trim().is_empty() {
                return Err(anyhow!(
                    "field-device '{}' register entries need both an address and a tag",
                    device
                ));
            }
        }
        Ok(())
    }
}

/// One holding-register mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegisterConfig {
    /// 16-bit Modbus address; SunSpec convention starts at 40000.
    pub address: u16,
    /// Power-of-ten scaling exponent.
    #[serde(default)]
    pub scaling_factor: i32,
    /// SunSpec type name, e.g. `uint16` or `string8`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Mapped tag name.
    pub tag: String,
}
