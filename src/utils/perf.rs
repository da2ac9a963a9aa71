//! Memory measurement for the scalability experiments.
//!
//! Peak memory is read from `/proc/self/status`, so every measurement should run in a
//! fresh process: the high-water mark never goes down.

/// Extracts a `kB` field such as `VmHWM:    1234 kB` from the contents of
/// `/proc/self/status`.
fn status_field_kb(status: &str, field: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(field)?.strip_prefix(':'))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

/// Reads the peak resident set size (`VmHWM`) of the current process.
///
/// # Returns
/// The peak in kilobytes, or 0 if it cannot be read.
#[cfg(target_os = "linux")]
pub fn get_peak_rss_kb() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| status_field_kb(&status, "VmHWM"))
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
pub fn get_peak_rss_kb() -> u64 {
    use std::sync::Once;
    static WARN_ONCE: Once = Once::new();
    WARN_ONCE.call_once(|| {
        log::warn!("Peak RSS measurement is only supported on Linux; returning 0.");
    });
    0
}
