//! Erase sweep generation
//!
//! The hardware erase trigger runs a fixed serpentine sweep derived
//! deterministically from the machine dimensions: same dimensions, same
//! program, every time.

use plotkit_core::MachineDimensions;

/// Parameters of the erase sweep
#[derive(Debug, Clone)]
pub struct EraseParams {
    /// Drawable surface
    pub dimensions: MachineDimensions,
    /// Vertical distance between sweep rows, in millimeters
    pub row_spacing_mm: f64,
    /// Sweep feed rate, in mm/min
    pub feed: u32,
    /// Actuator angle pressing the eraser down
    pub pen_down_angle: u8,
    /// Actuator angle lifting the eraser clear
    pub pen_up_angle: u8,
}

/// Generate the zig-zag erase program for the given parameters
pub fn erase_sweep(params: &EraseParams) -> String {
    let width = params.dimensions.width_mm;
    let height = params.dimensions.height_mm;

    let mut lines = vec![
        "G21".to_string(),
        "G90".to_string(),
        format!("M3 S{}", params.pen_up_angle),
        "G0 X0 Y0".to_string(),
        format!("M3 S{}", params.pen_down_angle),
    ];

    let mut y = 0.0_f64;
    let mut rightward = true;
    loop {
        let x = if rightward { width } else { 0.0 };
        lines.push(format!("G1 X{:.3} Y{:.3} F{}", x, y, params.feed));

        if y >= height {
            break;
        }
        y = (y + params.row_spacing_mm).min(height);
        // Step down along the edge the sweep just reached.
        lines.push(format!("G1 X{:.3} Y{:.3} F{}", x, y, params.feed));
        rightward = !rightward;
    }

    lines.push(format!("M3 S{}", params.pen_up_angle));
    lines.push("G0 X0 Y0".to_string());
    lines.push("M2".to_string());

    lines.join("\n")
}
