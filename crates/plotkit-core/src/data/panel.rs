//! Operator panel status
//!
//! Single-instance status record for the input panel, mutated on every
//! parsed message and broadcast on mutation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Panel display/interaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelMode {
    /// Powered, nobody logged in
    Idle,
    /// Operator navigating the panel menu
    Menu,
    /// A queued job is being drawn
    Writing,
    /// The erase sweep is running
    Erasing,
    /// Pen slot 1 change in progress
    Pen1,
    /// Pen slot 2 change in progress
    Pen2,
    /// Eraser-pen change in progress
    ErasingPen,
    /// Logged in, waiting for a trigger
    Ready,
    /// Locked out after too many failed logins
    Locked,
    /// Camera capture requested, awaiting auto-exit
    Screenshot,
    /// Draw was requested with nothing queued
    QueueEmpty,
}

impl fmt::Display for PanelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelMode::Idle => write!(f, "IDLE"),
            PanelMode::Menu => write!(f, "MENU"),
            PanelMode::Writing => write!(f, "WRITING"),
            PanelMode::Erasing => write!(f, "ERASING"),
            PanelMode::Pen1 => write!(f, "PEN1"),
            PanelMode::Pen2 => write!(f, "PEN2"),
            PanelMode::ErasingPen => write!(f, "ERASING_PEN"),
            PanelMode::Ready => write!(f, "READY"),
            PanelMode::Locked => write!(f, "LOCKED"),
            PanelMode::Screenshot => write!(f, "SCREENSHOT"),
            PanelMode::QueueEmpty => write!(f, "QUEUE_EMPTY"),
        }
    }
}

/// Live panel status, broadcast on every mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelStatus {
    /// Panel link is open
    pub connected: bool,
    /// Operator passed the panel login
    pub logged_in: bool,
    /// Current mode as last reported or commanded
    pub current_mode: PanelMode,
    /// Pen slot engaged by the last pen change, if any
    pub current_pen: Option<u8>,
    /// Raw text of the last message consumed
    pub last_message: Option<String>,
    /// Last panel-level error, cleared on successful login
    pub error: Option<String>,
    /// Times the panel link dropped and was reacquired
    pub reconnect_attempts: u32,
}

impl Default for PanelStatus {
    fn default() -> Self {
        Self {
            connected: false,
            logged_in: false,
            current_mode: PanelMode::Idle,
            current_pen: None,
            last_message: None,
            error: None,
            reconnect_attempts: 0,
        }
    }
}
