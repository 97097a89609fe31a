//! # Plotkit Settings
//!
//! Configuration file handling and validation for the Plotkit control
//! plane. JSON and TOML formats are supported, selected by extension.

pub mod config;

pub use config::{
    AuthSettings, Config, DevicePortSettings, DeviceSettings, EngineSettings, MachineSettings,
    PenSettings, QueueSettings, ReconnectSettings,
};
