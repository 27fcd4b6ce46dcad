//! [`Kernel`] implementation backed by Aya

use crate::error::BoxError;
use crate::kernel::{HookTarget, Kernel, PinOutcome};
use crate::spec::{HookKind, Specification};
use aya::pin::PinError;
use aya::programs::cgroup_sock_addr::CgroupSockAddrLink;
use aya::programs::links::Link;
use aya::programs::{CgroupAttachMode, CgroupSockAddr, Program};
use aya::{Ebpf, EbpfLoader};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;

/// Loads objects into the running kernel
#[derive(Debug, Default, Clone)]
pub struct AyaKernel {
    /// Programs of the last instantiated unit declared in a `cgroup/connect4`
    /// section. `Program::CgroupSockAddr` alone does not carry the attach type.
    hooked: BTreeSet<(String, HookKind)>,
}

impl AyaKernel {
    pub fn new() -> Self {
        Self::default()
    }
}

fn hooked_programs(spec: &Specification) -> BTreeSet<(String, HookKind)> {
    spec.programs()
        .iter()
        .filter_map(|(name, program)| program.hook.map(|hook| (name.clone(), hook)))
        .collect()
}

impl Kernel for AyaKernel {
    type Unit = Ebpf;
    type Link = CgroupSockAddrLink;

    fn raise_memlock_limit(&mut self) -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: libc::RLIM_INFINITY,
            rlim_max: libc::RLIM_INFINITY,
        };
        let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn instantiate(&mut self, spec: &Specification) -> Result<Ebpf, BoxError> {
        // Maps are created here; on any error below `ebpf` is dropped, which
        // closes every fd created so far.
        let mut ebpf = EbpfLoader::new().load(spec.image())?;
        self.hooked = hooked_programs(spec);

        for (name, program) in ebpf.programs_mut() {
            if let Program::CgroupSockAddr(program) = program {
                program
                    .load()
                    .map_err(|e| format!("program {name} rejected by kernel: {e}"))?;
                debug!("Loaded program {}", name);
            }
        }

        Ok(ebpf)
    }

    fn has_program(&self, unit: &Ebpf, name: &str, hook: HookKind) -> bool {
        matches!(unit.program(name), Some(Program::CgroupSockAddr(_)))
            && self.hooked.contains(&(name.to_string(), hook))
    }

    fn attach(
        &mut self,
        unit: &mut Ebpf,
        program: &str,
        target: &HookTarget,
    ) -> Result<CgroupSockAddrLink, BoxError> {
        let cgroup = File::open(&target.cgroup_path)?;
        let program: &mut CgroupSockAddr = unit
            .program_mut(program)
            .ok_or_else(|| format!("program {program} not found"))?
            .try_into()?;
        let link_id = program.attach(cgroup, CgroupAttachMode::Single)?;
        // Owning the link lets it be detached without borrowing the unit.
        Ok(program.take_link(link_id)?)
    }

    fn detach(&mut self, link: CgroupSockAddrLink) -> Result<(), BoxError> {
        link.detach()?;
        Ok(())
    }

    fn release(&mut self, unit: Ebpf) -> Result<(), BoxError> {
        drop(unit);
        Ok(())
    }

    fn map_names(&self, unit: &Ebpf) -> Vec<String> {
        unit.maps().map(|(name, _)| name.to_string()).collect()
    }

    fn pin_map(
        &mut self,
        unit: &mut Ebpf,
        name: &str,
        path: &Path,
    ) -> Result<PinOutcome, BoxError> {
        let map = unit
            .map_mut(name)
            .ok_or_else(|| format!("map {name} not found"))?;
        match map.pin(path) {
            Ok(()) => Ok(PinOutcome::Pinned),
            Err(PinError::SyscallError(err)) if err.io_error.kind() == io::ErrorKind::AlreadyExists => {
                Ok(PinOutcome::AlreadyPinned)
            }
            Err(err) => Err(err.into()),
        }
    }
}
