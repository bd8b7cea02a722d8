//! Parsing helpers for window-span settings.

/// Converts a duration in milliseconds to a frame count (integer division).
pub fn ms_to_frames(ms: i64, samplerate: i32) -> i64 {
    (samplerate as i64 * ms) / 1000
}

/// Parses a window-span setting.
///
/// A bare integer (`"4096"`) is a frame count; an integer with a literal
/// `ms` suffix (`"60ms"`, no space) is converted via the sample rate.
/// Returns `None` for anything else.
pub fn parse_window_span(text: &str, samplerate: i32) -> Option<i64> {
    if let Some(stripped) = text.strip_suffix("ms") {
        let ms = stripped.parse::<i64>().ok()?;
        Some(ms_to_frames(ms, samplerate))
    } else {
        text.parse::<i64>().ok()
    }
}
