//! Configuration and settings management for Plotkit
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats stored in platform-specific
//! directories.
//!
//! Configuration is organized into logical sections:
//! - Device settings (ports, baud rates, enablement per device type)
//! - Reconnect policy (backoff base/cap, auto-connect stagger)
//! - Engine settings (ack timeout, settling delay, liveness ceiling)
//! - Machine geometry and pen-lift angles
//! - Pen definitions (preconfigured change sequences)
//! - Queue persistence path and the shared-secret gate

use plotkit_core::{ConfigError, DeviceType, Error, MachineDimensions, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for one physical device port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePortSettings {
    /// Serial port path, or "Auto" to take the first discovered port
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Whether auto-connect should pursue this device
    pub enabled: bool,
}

impl DevicePortSettings {
    fn with_port(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            enabled: true,
        }
    }
}

/// Per-device-type port settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Motion controller port
    pub motion: DevicePortSettings,
    /// Operator panel port
    pub panel: DevicePortSettings,
    /// Pen-lift actuator controller port
    pub remote: DevicePortSettings,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            motion: DevicePortSettings::with_port("Auto", 115200),
            panel: DevicePortSettings::with_port("Auto", 9600),
            remote: DevicePortSettings {
                enabled: false,
                ..DevicePortSettings::with_port("Auto", 9600)
            },
        }
    }
}

impl DeviceSettings {
    /// Settings for one device type
    pub fn for_device(&self, device: DeviceType) -> &DevicePortSettings {
        match device {
            DeviceType::Motion => &self.motion,
            DeviceType::Panel => &self.panel,
            DeviceType::Remote => &self.remote,
        }
    }
}

/// Backoff policy for connect retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    /// First retry delay in milliseconds
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
    /// Stagger before the initial auto-connect attempt, in milliseconds
    pub initial_stagger_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
            initial_stagger_ms: 500,
        }
    }
}

/// Transmission engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Per-line acknowledgement timeout in milliseconds
    pub ack_timeout_ms: u64,
    /// Settling delay after an actuator move, in milliseconds
    pub settle_delay_ms: u64,
    /// Consecutive ack timeouts tolerated before a fatal abort
    pub max_consecutive_timeouts: u32,
    /// Abort on firmware `error:` responses instead of continuing
    pub halt_on_error: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 3_000,
            settle_delay_ms: 250,
            max_consecutive_timeouts: 5,
            halt_on_error: false,
        }
    }
}

/// Machine geometry and pen-lift angles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSettings {
    /// Drawable surface dimensions
    pub dimensions: MachineDimensions,
    /// Row spacing of the erase sweep, in millimeters
    pub erase_row_spacing_mm: f64,
    /// Feed rate of the erase sweep, in mm/min
    pub erase_feed: u32,
    /// Actuator angle that presses the tool onto the surface
    pub pen_down_angle: u8,
    /// Actuator angle that lifts the tool clear
    pub pen_up_angle: u8,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            dimensions: MachineDimensions::default(),
            erase_row_spacing_mm: 40.0,
            erase_feed: 6_000,
            pen_down_angle: 90,
            pen_up_angle: 0,
        }
    }
}

/// One preconfigured pen-change sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenSettings {
    /// Pen slot id (1, 2, ...; the eraser pen uses its own id)
    pub id: u8,
    /// Display name
    pub name: String,
    /// Motion text streamed when this pen is selected
    pub motion_text: String,
}

/// Queue persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Path of the persisted queue file
    pub path: PathBuf,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("queue.json"),
        }
    }
}

/// Shared-secret gate for remote callers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    /// The shared secret; empty disables the gate
    pub shared_secret: String,
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device port settings
    pub devices: DeviceSettings,
    /// Reconnect backoff policy
    pub reconnect: ReconnectSettings,
    /// Transmission engine tuning
    pub engine: EngineSettings,
    /// Machine geometry
    pub machine: MachineSettings,
    /// Preconfigured pens
    pub pens: Vec<PenSettings>,
    /// Queue persistence
    pub queue: QueueSettings,
    /// Shared-secret gate
    pub auth: AuthSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform default config path (`<config dir>/plotkit/plotkit.json`)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plotkit")
            .join("plotkit.json")
    }

    /// Load config from file (JSON or TOML, by extension)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::other(format!("Failed to read config file: {}", e)))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid JSON config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid TOML config: {}", e)))?
        } else {
            return Err(Error::other(
                "Config file must be .json or .toml".to_string(),
            ));
        };

        config.validate()?;
        Ok(config)
    }

    /// Load config from file, falling back to defaults when missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML, by extension)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?
        } else {
            return Err(Error::other(
                "Config file must be .json or .toml".to_string(),
            ));
        };

        std::fs::write(path, content)
            .map_err(|e| Error::other(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate all sections, rejecting out-of-range values at the boundary
    pub fn validate(&self) -> Result<()> {
        if self.engine.ack_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.ack_timeout_ms".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        if !(100..=500).contains(&self.engine.settle_delay_ms) {
            return Err(ConfigError::InvalidValue {
                field: "engine.settle_delay_ms".to_string(),
                reason: "must be within 100..=500".to_string(),
            }
            .into());
        }

        if self.engine.max_consecutive_timeouts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.max_consecutive_timeouts".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        if self.reconnect.base_delay_ms == 0
            || self.reconnect.max_delay_ms < self.reconnect.base_delay_ms
        {
            return Err(ConfigError::InvalidValue {
                field: "reconnect".to_string(),
                reason: "base delay must be positive and below the cap".to_string(),
            }
            .into());
        }

        if self.machine.dimensions.width_mm <= 0.0 || self.machine.dimensions.height_mm <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "machine.dimensions".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        if self.machine.erase_row_spacing_mm <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "machine.erase_row_spacing_mm".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        for angle in [self.machine.pen_down_angle, self.machine.pen_up_angle] {
            if angle > 180 {
                return Err(ConfigError::InvalidValue {
                    field: "machine pen angles".to_string(),
                    reason: "must be within 0..=180".to_string(),
                }
                .into());
            }
        }

        for pen in &self.pens {
            if pen.motion_text.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: format!("pens[{}].motion_text", pen.id),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Look up a pen definition by id
    pub fn pen(&self, id: u8) -> Result<&PenSettings> {
        self.pens
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ConfigError::UnknownPen { id }.into())
    }

    /// Shared-secret gate; an empty configured secret admits everything
    pub fn authorize(&self, secret: &str) -> Result<()> {
        if self.auth.shared_secret.is_empty() || self.auth.shared_secret == secret {
            Ok(())
        } else {
            Err(ConfigError::NotAuthorized.into())
        }
    }
}
