/*!
 * Memory Probe
 * Best-effort resident set size for the pressure sampler
 */

/// Resident set size of this process in bytes, if the platform exposes it
///
/// Linux reads `/proc/self/statm`; elsewhere the probe reports `None` and
/// the memory term of the pressure computation stays at zero.
pub fn rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(resident_pages * page_size())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    // 4KB pages on every mainstream Linux target this runs on
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn test_rss_is_positive_on_linux() {
        let rss = rss_bytes().unwrap();
        assert!(rss > 0);
    }

    #[test]
    fn test_probe_never_panics() {
        let _ = rss_bytes();
    }
}
