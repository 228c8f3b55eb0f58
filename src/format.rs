/*!
 * Display Formatting
 * Pure conversions of byte counts and durations into human-readable units
 */

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Format a byte count with B/KB/MB/GB units at 1024 boundaries.
///
/// Raw byte counts are printed as-is; larger units get two decimal places.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else {
        format_bytes_f64(bytes as f64)
    }
}

/// Format an allocation rate as bytes per second.
pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes_f64(bytes_per_sec))
}

fn format_bytes_f64(bytes: f64) -> String {
    if bytes < KIB {
        format!("{:.0} B", bytes)
    } else if bytes < MIB {
        format!("{:.2} KB", bytes / KIB)
    } else if bytes < GIB {
        format!("{:.2} MB", bytes / MIB)
    } else {
        format!("{:.2} GB", bytes / GIB)
    }
}

/// Format a millisecond duration: integer ms below one second, seconds to
/// one decimal below a minute, minutes plus seconds above.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) as f64 / 1000.0;
        format!("{}m {:.1}s", minutes, seconds)
    }
}
