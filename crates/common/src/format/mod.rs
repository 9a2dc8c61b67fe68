//! Human-readable formatting helpers

const UNITS: [&str; 9] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Format a byte count with base 1024 and one decimal, trailing zeros
/// dropped: `1536` gives `"1.5 KB"`, `0` gives `"0 Bytes"`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let value = bytes as f64;
    let exponent = ((value.ln() / 1024f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let scaled = value / 1024f64.powi(exponent as i32);
    let rounded = (scaled * 10.0).round() / 10.0;

    let number = if rounded.fract() == 0.0 {
        format!("{}", rounded as u64)
    } else {
        format!("{:.1}", rounded)
    };
    format!("{} {}", number, UNITS[exponent])
}
