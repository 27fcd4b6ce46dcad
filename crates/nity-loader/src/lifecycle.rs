//! Attachment lifecycle
//!
//! [`attach`] runs the load sequence strictly in order:
//!
//! 1. raise RLIMIT_MEMLOCK
//! 2. load the specification and check the contract surface
//! 3. instantiate maps and programs
//! 4. look up the entry-point program
//! 5. attach it to the cgroup hook
//! 6. create the pin root and pin every contract map
//!
//! Once step 3 succeeds, acquired resources live on a [`ResourceStack`]; any
//! later failure unwinds it (attachment first, then the unit) before the
//! error is returned, so a failed call never leaves kernel objects behind.
//! Callers must serialize calls against the same cgroup.

use crate::contract::ENTRY_PROGRAM;
use crate::error::{LoaderError, LoaderResult};
use crate::kernel::{HookTarget, Kernel};
use crate::pin::{self, PinReport};
use crate::source::SpecificationSource;
use crate::unwind::ResourceStack;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Exclusive owner of a live attachment and the unit backing it
pub struct Handle<K: Kernel> {
    kernel: K,
    resources: Option<ResourceStack<K>>,
    target: HookTarget,
    pins: Option<PinReport>,
}

impl<K: Kernel> Handle<K> {
    pub fn target(&self) -> &HookTarget {
        &self.target
    }

    /// Pin root used, if pinning was requested
    pub fn pin_root(&self) -> Option<&Path> {
        self.pins.as_ref().map(|p| p.root.as_path())
    }

    pub fn pin_report(&self) -> Option<&PinReport> {
        self.pins.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.resources.is_none()
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Instantiated unit, until the handle is closed
    pub fn unit(&self) -> Option<&K::Unit> {
        self.resources.as_ref().map(|r| r.unit())
    }

    /// Detach the program, then release the unit.
    ///
    /// Both releases are attempted; the first error is returned. Closing is
    /// final: a second call returns [`LoaderError::AlreadyClosed`] and a new
    /// [`attach`] is needed to load again. Pin files stay in place.
    pub fn close(&mut self) -> LoaderResult<()> {
        let resources = self.resources.take().ok_or(LoaderError::AlreadyClosed)?;
        let result = resources.unwind(&mut self.kernel);
        match &result {
            Ok(()) => info!(
                "Detached {} from {}",
                ENTRY_PROGRAM,
                self.target.cgroup_path.display()
            ),
            Err(e) => warn!("Close of {} finished with error: {}", ENTRY_PROGRAM, e),
        }
        result
    }
}

impl<K: Kernel> Drop for Handle<K> {
    fn drop(&mut self) {
        if let Some(resources) = self.resources.take() {
            warn!("Handle dropped without close(), releasing resources");
            if let Err(e) = resources.unwind(&mut self.kernel) {
                warn!("Release on drop failed: {}", e);
            }
        }
    }
}

impl<K: Kernel> std::fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("target", &self.target)
            .field("pins", &self.pins)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Load, attach and pin. See the module docs for the step order.
pub fn attach<K, S>(
    mut kernel: K,
    source: &S,
    target: &HookTarget,
    pin_root: Option<&Path>,
) -> LoaderResult<Handle<K>>
where
    K: Kernel,
    S: SpecificationSource + ?Sized,
{
    kernel
        .raise_memlock_limit()
        .map_err(LoaderError::ResourceLimit)?;

    let spec = source.load()?;
    spec.check_contract().map_err(LoaderError::contract)?;
    info!(
        "Loaded specification: {} maps, {} programs",
        spec.maps().len(),
        spec.programs().len()
    );

    let unit = kernel
        .instantiate(&spec)
        .map_err(LoaderError::Instantiation)?;
    drop(spec);
    let mut resources = ResourceStack::<K>::new(unit);

    if !kernel.has_program(resources.unit(), ENTRY_PROGRAM, target.hook) {
        return Err(rollback(
            &mut kernel,
            resources,
            LoaderError::MissingProgram(ENTRY_PROGRAM.to_string()),
        ));
    }

    match kernel.attach(resources.unit_mut(), ENTRY_PROGRAM, target) {
        Ok(link) => resources.push_link(link),
        Err(source) => {
            let err = LoaderError::Attach {
                program: ENTRY_PROGRAM.to_string(),
                cgroup: target.cgroup_path.clone(),
                source,
            };
            return Err(rollback(&mut kernel, resources, err));
        }
    }
    info!(
        "Attached {} to {} ({})",
        ENTRY_PROGRAM,
        target.cgroup_path.display(),
        target.hook
    );

    let pins = match pin_root {
        Some(root) => match pin_unit(&mut kernel, &mut resources, root) {
            Ok(report) => Some(report),
            Err(err) => return Err(rollback(&mut kernel, resources, err)),
        },
        None => None,
    };

    Ok(Handle {
        kernel,
        resources: Some(resources),
        target: target.clone(),
        pins,
    })
}

fn pin_unit<K: Kernel>(
    kernel: &mut K,
    resources: &mut ResourceStack<K>,
    root: &Path,
) -> LoaderResult<PinReport> {
    pin::ensure_pin_root(root)?;
    let report = pin::pin_maps(kernel, resources.unit_mut(), root)?;
    info!(
        "Pinned {} maps under {} ({} already present)",
        report.pinned.len(),
        root.display(),
        report.preserved.len()
    );
    Ok(report)
}

/// Unwind everything acquired so far and hand back the error that caused it
fn rollback<K: Kernel>(
    kernel: &mut K,
    resources: ResourceStack<K>,
    cause: LoaderError,
) -> LoaderError {
    warn!("Rolling back after failure: {}", cause);
    if let Err(e) = resources.unwind(kernel) {
        warn!("Rollback did not complete cleanly: {}", e);
    }
    cause
}

/// Convenience for the production path: embedded object, Aya kernel
#[cfg(target_os = "linux")]
pub fn load_and_attach(
    cgroup_path: impl Into<PathBuf>,
    pin_root: Option<&Path>,
) -> LoaderResult<Handle<crate::AyaKernel>> {
    let target = HookTarget::inet4_connect(cgroup_path);
    attach(
        crate::AyaKernel::new(),
        &crate::source::EmbeddedObject::new(),
        &target,
        pin_root,
    )
}
