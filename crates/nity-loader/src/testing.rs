//! Recording [`Kernel`] used by the lifecycle tests

use crate::error::BoxError;
use crate::kernel::{HookTarget, Kernel, PinOutcome};
use crate::spec::{HookKind, Specification};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

/// Operation the fake can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Memlock,
    Instantiate,
    Attach,
    Detach,
    Release,
    Pin,
}

/// One recorded kernel call; ids are per-kind counters starting at 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RaiseMemlock,
    Instantiate(u32),
    Attach(u32),
    Detach(u32),
    Release(u32),
    Pin(String),
}

#[derive(Debug)]
pub struct FakeUnit {
    id: u32,
    maps: Vec<String>,
    entry_loaded: bool,
}

#[derive(Debug)]
pub struct FakeLink {
    id: u32,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    failing: HashSet<Step>,
    failing_pin: Option<String>,
    drop_entry_program: bool,
    extra_maps: Vec<String>,
    units: u32,
    links: u32,
    live_units: usize,
    live_links: usize,
}

/// Clones share state, so a test can keep one copy while the lifecycle owns another
#[derive(Debug, Clone, Default)]
pub struct FakeKernel {
    state: Rc<RefCell<State>>,
}

impl FakeKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(self, step: Step) -> Self {
        self.state.borrow_mut().failing.insert(step);
        self
    }

    /// Fail pinning only for the named map
    pub fn failing_pin_of(self, map: &str) -> Self {
        self.state.borrow_mut().failing_pin = Some(map.to_string());
        self
    }

    /// Instantiate units whose entry point did not survive loading
    pub fn without_entry_program(self) -> Self {
        self.state.borrow_mut().drop_entry_program = true;
        self
    }

    /// Add a map to every instantiated unit beyond those in the specification
    pub fn with_extra_map(self, name: &str) -> Self {
        self.state.borrow_mut().extra_maps.push(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn live_units(&self) -> usize {
        self.state.borrow().live_units
    }

    pub fn live_links(&self) -> usize {
        self.state.borrow().live_links
    }

    /// Any kernel object still held
    pub fn leaked(&self) -> bool {
        self.live_units() + self.live_links() > 0
    }

    fn fails(&self, step: Step) -> bool {
        self.state.borrow().failing.contains(&step)
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

fn injected(step: Step) -> BoxError {
    format!("injected {step:?} failure").into()
}

impl Kernel for FakeKernel {
    type Unit = FakeUnit;
    type Link = FakeLink;

    fn raise_memlock_limit(&mut self) -> io::Result<()> {
        self.record(Call::RaiseMemlock);
        if self.fails(Step::Memlock) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(())
    }

    fn instantiate(&mut self, spec: &Specification) -> Result<FakeUnit, BoxError> {
        let mut state = self.state.borrow_mut();
        state.units += 1;
        let id = state.units;
        state.calls.push(Call::Instantiate(id));
        if state.failing.contains(&Step::Instantiate) {
            return Err(injected(Step::Instantiate));
        }
        state.live_units += 1;

        let mut maps: Vec<String> = spec.maps().keys().cloned().collect();
        maps.extend(state.extra_maps.iter().cloned());
        Ok(FakeUnit {
            id,
            maps,
            entry_loaded: !state.drop_entry_program,
        })
    }

    fn has_program(&self, unit: &FakeUnit, name: &str, hook: HookKind) -> bool {
        unit.entry_loaded && name == crate::contract::ENTRY_PROGRAM && hook == HookKind::Inet4Connect
    }

    fn attach(
        &mut self,
        _unit: &mut FakeUnit,
        _program: &str,
        _target: &HookTarget,
    ) -> Result<FakeLink, BoxError> {
        let mut state = self.state.borrow_mut();
        state.links += 1;
        let id = state.links;
        state.calls.push(Call::Attach(id));
        if state.failing.contains(&Step::Attach) {
            return Err(injected(Step::Attach));
        }
        state.live_links += 1;
        Ok(FakeLink { id })
    }

    fn detach(&mut self, link: FakeLink) -> Result<(), BoxError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Detach(link.id));
        // The link is consumed either way, as with a real fd.
        state.live_links -= 1;
        if state.failing.contains(&Step::Detach) {
            return Err(injected(Step::Detach));
        }
        Ok(())
    }

    fn release(&mut self, unit: FakeUnit) -> Result<(), BoxError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Release(unit.id));
        state.live_units -= 1;
        if state.failing.contains(&Step::Release) {
            return Err(injected(Step::Release));
        }
        Ok(())
    }

    fn map_names(&self, unit: &FakeUnit) -> Vec<String> {
        unit.maps.clone()
    }

    fn pin_map(
        &mut self,
        unit: &mut FakeUnit,
        name: &str,
        path: &Path,
    ) -> Result<PinOutcome, BoxError> {
        {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::Pin(name.to_string()));
            if state.failing.contains(&Step::Pin) || state.failing_pin.as_deref() == Some(name) {
                return Err(injected(Step::Pin));
            }
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Ok(PinOutcome::AlreadyPinned)
            }
            Err(e) => return Err(e.into()),
        };
        // Contents identify the unit generation so replacement is detectable.
        write!(file, "{name}@unit{}", unit.id)?;
        Ok(PinOutcome::Pinned)
    }
}
