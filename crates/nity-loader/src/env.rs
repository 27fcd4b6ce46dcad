//! Host environment probes
//!
//! Used by `nity status` to explain why an attach would fail before trying it.

use std::path::Path;
use tracing::warn;

/// Default bpffs mount point
pub const BPFFS_ROOT: &str = "/sys/fs/bpf";

/// Check if a BPF filesystem is mounted where pins will go
pub fn check_bpffs_mounted() -> bool {
    if !Path::new(BPFFS_ROOT).exists() {
        warn!("BPF filesystem not mounted at {}", BPFFS_ROOT);
        return false;
    }
    true
}

/// Check that `path` is the root (or a child) of a cgroup v2 hierarchy
pub fn is_cgroup_v2(path: &Path) -> bool {
    path.join("cgroup.controllers").exists()
}

/// Check for BTF support
pub fn has_btf() -> bool {
    Path::new("/sys/kernel/btf/vmlinux").exists()
}

/// Check kernel version for eBPF feature support
pub fn get_kernel_version() -> Option<(u32, u32, u32)> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease").ok()?;
    parse_kernel_release(&release)
}

fn parse_kernel_release(release: &str) -> Option<(u32, u32, u32)> {
    let parts: Vec<&str> = release.trim().split('.').collect();

    if parts.len() >= 2 {
        let major = parts[0].parse().ok()?;
        let minor = parts[1].split('-').next()?.parse().ok()?;
        let patch = parts
            .get(2)
            .and_then(|p| p.split('-').next())
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);

        Some((major, minor, patch))
    } else {
        None
    }
}

/// Kernels from 5.11 account BPF memory to the cgroup instead of RLIMIT_MEMLOCK
pub fn memlock_accounting_is_cgroup_based(version: (u32, u32, u32)) -> bool {
    version >= (5, 11, 0)
}

/// Check if running as root
#[cfg(target_os = "linux")]
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(target_os = "linux"))]
pub fn is_root() -> bool {
    false
}
