//! Motion-command line handling
//!
//! Splits a motion-command block into streamable lines, recognizes the
//! reserved spindle-parameter command routed to the local actuator, and
//! classifies controller responses for the acknowledgement loop.

use plotkit_core::Position;

/// One streamable line of a motion-command block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotionLine {
    /// Written to the controller and acknowledged
    Device(String),
    /// Intercepted and routed to the pen-lift actuator
    PenLift {
        /// Target angle, clamped to 0..=180
        angle: u8,
    },
}

/// Split a block into non-empty, non-comment lines
///
/// Semicolon comments and parenthesized comments are stripped; blank
/// results are dropped. Pen-lift commands are recognized here so the
/// engine never writes them to the device.
pub fn split_block(text: &str) -> Vec<MotionLine> {
    text.lines()
        .filter_map(|raw| {
            let cleaned = strip_comments(raw);
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                return None;
            }
            Some(match parse_pen_lift(cleaned) {
                Some(angle) => MotionLine::PenLift { angle },
                None => MotionLine::Device(cleaned.to_string()),
            })
        })
        .collect()
}

/// Remove `;` line comments and `(...)` inline comments
fn strip_comments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_parens = false;
    for c in line.chars() {
        match c {
            ';' if !in_parens => break,
            '(' => in_parens = true,
            ')' if in_parens => in_parens = false,
            _ if in_parens => {}
            _ => out.push(c),
        }
    }
    out
}

/// Recognize the reserved spindle command with numeric parameter
///
/// `M3 S<n>` (or `M03 S<n>`) addresses the pen lift; the parameter is
/// clamped to the servo's 0..=180 range. An `M3` without a parameter is
/// ordinary device traffic.
pub fn parse_pen_lift(line: &str) -> Option<u8> {
    let mut tokens = line.split_whitespace();
    let head = tokens.next()?;
    if !head.eq_ignore_ascii_case("M3") && !head.eq_ignore_ascii_case("M03") {
        return None;
    }

    for token in tokens {
        if let Some(value) = token.strip_prefix(['S', 's']) {
            if let Ok(angle) = value.parse::<f64>() {
                return Some(angle.clamp(0.0, 180.0).round() as u8);
            }
        }
    }

    None
}

/// Update the diagnostic position from a line's coordinate fields
pub fn scan_position(line: &str, position: &mut Position) {
    for token in line.split_whitespace() {
        let mut chars = token.chars();
        let axis = match chars.next() {
            Some(c) => c.to_ascii_uppercase(),
            None => continue,
        };
        if !matches!(axis, 'X' | 'Y' | 'Z') {
            continue;
        }
        if let Ok(value) = chars.as_str().parse::<f64>() {
            match axis {
                'X' => position.x = value,
                'Y' => position.y = value,
                'Z' => position.z = value,
                _ => unreachable!(),
            }
        }
    }
}

/// Classification of one controller response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// `ok` or `ok <extra>`: the line was accepted
    Ack,
    /// `error...`: the firmware rejected the line
    DeviceError(String),
    /// The firmware boot banner; mid-stream it means a spurious reset
    BootBanner,
    /// Corrupted bytes; dropped without advancing
    Garbage,
    /// Any other unsolicited message
    Other(String),
}

/// Classify one response line from the controller
pub fn classify_response(line: &str) -> ResponseKind {
    let trimmed = line.trim();

    if trimmed.is_empty() || looks_garbled(trimmed) {
        return ResponseKind::Garbage;
    }

    if trimmed == "ok" || trimmed.starts_with("ok ") {
        return ResponseKind::Ack;
    }

    if trimmed.starts_with("error") {
        return ResponseKind::DeviceError(trimmed.to_string());
    }

    if trimmed.starts_with("Grbl ") {
        return ResponseKind::BootBanner;
    }

    ResponseKind::Other(trimmed.to_string())
}

/// Non-printable/placeholder heuristic for corrupted serial bytes
fn looks_garbled(s: &str) -> bool {
    s.chars()
        .any(|c| c == '\u{FFFD}' || (!c.is_ascii_graphic() && c != ' ' && c != '\t'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_drops_blanks_and_comments() {
        let block = "G21\n; full line comment\n\nG90 ; trailing\nG0 X10 Y10 (move in)\nM2\n";
        let lines = split_block(block);
        assert_eq!(
            lines,
            vec![
                MotionLine::Device("G21".to_string()),
                MotionLine::Device("G90".to_string()),
                MotionLine::Device("G0 X10 Y10".to_string()),
                MotionLine::Device("M2".to_string()),
            ]
        );
    }

    #[test]
    fn pen_lift_is_recognized_and_clamped() {
        assert_eq!(parse_pen_lift("M3 S90"), Some(90));
        assert_eq!(parse_pen_lift("m03 s45.4"), Some(45));
        assert_eq!(parse_pen_lift("M3 S400"), Some(180));
        assert_eq!(parse_pen_lift("M3 S-20"), Some(0));
        // No parameter: ordinary spindle command, not intercepted.
        assert_eq!(parse_pen_lift("M3"), None);
        assert_eq!(parse_pen_lift("M30"), None);
        assert_eq!(parse_pen_lift("G0 X1"), None);
    }

    #[test]
    fn split_routes_pen_lift_lines() {
        let lines = split_block("G21\nM3 S90\nM2");
        assert_eq!(
            lines,
            vec![
                MotionLine::Device("G21".to_string()),
                MotionLine::PenLift { angle: 90 },
                MotionLine::Device("M2".to_string()),
            ]
        );
    }

    #[test]
    fn position_scan_tracks_coordinate_fields() {
        let mut pos = Position::default();
        scan_position("G0 X10.5 Y20 F3000", &mut pos);
        assert_eq!(pos, Position::new(10.5, 20.0, 0.0));

        scan_position("G1 Z-1.2", &mut pos);
        assert_eq!(pos, Position::new(10.5, 20.0, -1.2));

        // Words without numbers leave the position alone.
        scan_position("G1 X Y", &mut pos);
        assert_eq!(pos, Position::new(10.5, 20.0, -1.2));
    }

    #[test]
    fn response_classification() {
        assert_eq!(classify_response("ok"), ResponseKind::Ack);
        assert_eq!(classify_response("ok T:23"), ResponseKind::Ack);
        assert_eq!(
            classify_response("error:20"),
            ResponseKind::DeviceError("error:20".to_string())
        );
        assert_eq!(
            classify_response("Grbl 1.1h ['$' for help]"),
            ResponseKind::BootBanner
        );
        assert_eq!(classify_response(""), ResponseKind::Garbage);
        assert_eq!(classify_response("\u{FFFD}\u{FFFD}x"), ResponseKind::Garbage);
        assert_eq!(classify_response("\x01\x02"), ResponseKind::Garbage);
        assert_eq!(
            classify_response("[MSG:Pgm End]"),
            ResponseKind::Other("[MSG:Pgm End]".to_string())
        );
        // "okay" is not an acknowledgement.
        assert_eq!(
            classify_response("okay"),
            ResponseKind::Other("okay".to_string())
        );
    }
}
