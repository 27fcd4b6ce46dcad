//! nity loader - userspace lifecycle of the connect4 interception program
//!
//! Loads the compiled eBPF object embedded at build time, attaches its
//! entry point to a cgroup's IPv4 connect hook and pins its maps so the
//! control-plane agent can find them:
//!
//! - **Contract**: map and program names the agent depends on
//! - **Source**: parses the embedded object into a [`Specification`]
//! - **Lifecycle**: [`attach`] / [`Handle::close`] with full rollback
//! - **Config**: TOML configuration for the `nity` binary

pub mod config;
pub mod contract;
pub mod env;
pub mod error;
pub mod kernel;
pub mod lifecycle;
pub mod pin;
pub mod source;
pub mod spec;
mod unwind;

#[cfg(target_os = "linux")]
mod aya_kernel;

#[cfg(test)]
mod testing;

pub use contract::{CONTRACT_MAPS, CONTRACT_VERSION, ENTRY_PROGRAM};
pub use error::{LoaderError, LoaderResult};
pub use kernel::{HookTarget, Kernel, PinOutcome};
pub use lifecycle::{attach, Handle};
pub use pin::PinReport;
pub use source::{SourceError, SpecificationSource};
pub use spec::{ContractViolation, HookKind, MapSpec, ProgramSpec, Specification};

#[cfg(target_os = "linux")]
pub use aya_kernel::AyaKernel;
#[cfg(target_os = "linux")]
pub use lifecycle::load_and_attach;
#[cfg(target_os = "linux")]
pub use source::EmbeddedObject;

/// Loader version
pub const LOADER_VERSION: &str = env!("CARGO_PKG_VERSION");
