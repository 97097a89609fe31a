//! # Plotkit Engine
//!
//! The motion-command transmission engine: single-flight line streaming
//! under the acknowledgement protocol, with local-actuator interception,
//! timeout/corruption/reset recovery, and panel mode restoration.

pub mod engine;
pub mod lines;
pub mod panel_port;

pub use engine::{EngineConfig, SendMode, TransmissionEngine};
pub use lines::{classify_response, parse_pen_lift, scan_position, split_block, MotionLine, ResponseKind};
pub use panel_port::{LinkPanelPort, NoOpPanelPort, PanelPort};
