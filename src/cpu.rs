//! Host CPU capability probe.

use std::fs;

/// Whether the host CPU advertises AVX.
///
/// Reads `/proc/cpuinfo`; hosts without it are assumed capable so no
/// spurious warning is shown.
#[must_use]
pub fn has_avx() -> bool {
    let Ok(info) = fs::read_to_string("/proc/cpuinfo") else {
        return true;
    };
    flags_have_avx(&info)
}

fn flags_have_avx(cpuinfo: &str) -> bool {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("flags"))
        .any(|line| line.split_whitespace().any(|flag| flag == "avx"))
}
