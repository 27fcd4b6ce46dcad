//! Kernel operations used by the attachment lifecycle
//!
//! Every OS call the lifecycle makes goes through [`Kernel`], so the ordering
//! and rollback logic can run against a recording implementation in tests.
//! [`crate::AyaKernel`] is the production implementation.

use crate::error::BoxError;
use crate::spec::{HookKind, Specification};
use std::path::{Path, PathBuf};

/// Where the entry-point program gets attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookTarget {
    pub cgroup_path: PathBuf,
    pub hook: HookKind,
}

impl HookTarget {
    /// Outbound IPv4 connect on the given cgroup
    pub fn inet4_connect(cgroup_path: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_path: cgroup_path.into(),
            hook: HookKind::Inet4Connect,
        }
    }
}

/// Result of pinning one map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    Pinned,
    /// Another process created the pin between our existence check and the pin call
    AlreadyPinned,
}

/// Kernel-facing operations
///
/// `Unit` owns instantiated maps and programs; `Link` owns one attachment.
/// Dropping either without calling [`Kernel::detach`] / [`Kernel::release`]
/// must still free the kernel object.
pub trait Kernel {
    type Unit;
    type Link;

    /// Raise RLIMIT_MEMLOCK so maps can be allocated
    fn raise_memlock_limit(&mut self) -> std::io::Result<()>;

    /// Create every map and load every hook program, all or nothing
    fn instantiate(&mut self, spec: &Specification) -> Result<Self::Unit, BoxError>;

    /// Whether `name` is a loaded program that can be bound to `hook`
    fn has_program(&self, unit: &Self::Unit, name: &str, hook: HookKind) -> bool;

    /// Bind `program` to the hook target
    fn attach(
        &mut self,
        unit: &mut Self::Unit,
        program: &str,
        target: &HookTarget,
    ) -> Result<Self::Link, BoxError>;

    fn detach(&mut self, link: Self::Link) -> Result<(), BoxError>;

    fn release(&mut self, unit: Self::Unit) -> Result<(), BoxError>;

    /// Names of every map in the unit
    fn map_names(&self, unit: &Self::Unit) -> Vec<String>;

    /// Pin one map at `path`
    fn pin_map(
        &mut self,
        unit: &mut Self::Unit,
        name: &str,
        path: &Path,
    ) -> Result<PinOutcome, BoxError>;
}
