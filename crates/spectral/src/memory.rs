//! Total memory detection for the legendre swapping guard.

use tracing::debug;

/// Memory available to this process, in bytes.
///
/// Container limits (cgroup v2, then v1) win over physical memory; 16 GB
/// is assumed when nothing can be read.
pub fn total_system_memory() -> u64 {
    // Try cgroup v2 first
    if let Some(bytes) = read_limit("/sys/fs/cgroup/memory.max") {
        return bytes;
    }

    // Try cgroup v1
    if let Some(bytes) = read_limit("/sys/fs/cgroup/memory/memory.limit_in_bytes") {
        return bytes;
    }

    // Fall back to system memory
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        if let Some(kb) = parse_meminfo_total(&meminfo) {
            return kb * 1024;
        }
    }

    debug!("Could not detect total memory, assuming 16 GB");
    16 * 1024 * 1024 * 1024
}

fn read_limit(path: &str) -> Option<u64> {
    let limit = std::fs::read_to_string(path).ok()?;
    let bytes = limit.trim().parse::<u64>().ok()?;
    (bytes < u64::MAX / 2).then_some(bytes)
}

/// `MemTotal` in kB from the content of /proc/meminfo.
fn parse_meminfo_total(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
}
