//! Pin directory management
//!
//! One file per contract map under the pin root, named after the map. Maps
//! outside the contract surface (data sections, helper maps) are never
//! published. An existing pin
//! file is never replaced: an agent may hold it open, and a concurrent loader
//! may have just created it.
//!
//! TODO: compare the pinned map's id/type against the fresh unit instead of
//! trusting any existing file, once the agent can handle a map swap.

use crate::contract;
use crate::error::LoaderError;
use crate::kernel::{Kernel, PinOutcome};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What the pin pass did under a pin root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinReport {
    pub root: PathBuf,
    /// Maps pinned by this run
    pub pinned: Vec<String>,
    /// Maps whose pin file already existed and was left untouched
    pub preserved: Vec<String>,
}

impl PinReport {
    pub fn total(&self) -> usize {
        self.pinned.len() + self.preserved.len()
    }
}

/// Path of a map's pin file
pub fn pin_path(root: &Path, map: &str) -> PathBuf {
    root.join(map)
}

pub(crate) fn ensure_pin_root(root: &Path) -> Result<(), LoaderError> {
    std::fs::create_dir_all(root).map_err(|source| LoaderError::PinRoot {
        path: root.to_path_buf(),
        source,
    })
}

/// Pin the contract maps of `unit` under `root`, skipping existing pin files
pub(crate) fn pin_maps<K: Kernel>(
    kernel: &mut K,
    unit: &mut K::Unit,
    root: &Path,
) -> Result<PinReport, LoaderError> {
    let mut names = kernel.map_names(unit);
    names.sort();

    let mut report = PinReport {
        root: root.to_path_buf(),
        ..Default::default()
    };

    for name in names
        .into_iter()
        .filter(|n| contract::role_of(n).is_some())
    {
        let path = pin_path(root, &name);
        if path.exists() {
            debug!("Keeping existing pin {}", path.display());
            report.preserved.push(name);
            continue;
        }

        match kernel.pin_map(unit, &name, &path) {
            Ok(PinOutcome::Pinned) => {
                debug!("Pinned map {} at {}", name, path.display());
                report.pinned.push(name);
            }
            Ok(PinOutcome::AlreadyPinned) => {
                debug!("Pin {} appeared concurrently, keeping it", path.display());
                report.preserved.push(name);
            }
            Err(source) => {
                return Err(LoaderError::Pin {
                    map: name,
                    path,
                    source,
                })
            }
        }
    }

    Ok(report)
}
