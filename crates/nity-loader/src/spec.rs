//! In-memory description of a compiled kernel object
//!
//! A [`Specification`] is produced once per load attempt and never mutated.
//! It carries the raw image for instantiation alongside the map and program
//! tables used to check the contract surface before anything reaches the
//! kernel.

use crate::contract::{self, ENTRY_PROGRAM};
use std::collections::BTreeMap;
use std::fmt;

/// Kernel hook a program section binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookKind {
    /// `cgroup/connect4`: outbound IPv4 connection establishment
    Inet4Connect,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::Inet4Connect => write!(f, "cgroup/connect4"),
        }
    }
}

/// Shape of one map definition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapSpec {
    /// Raw `bpf_map_type`
    pub map_type: u32,
    pub key_size: u32,
    pub value_size: u32,
    pub max_entries: u32,
}

impl MapSpec {
    /// Human-readable kernel map type
    pub fn type_name(&self) -> &'static str {
        match self.map_type {
            1 => "hash",
            2 => "array",
            5 => "percpu_hash",
            6 => "percpu_array",
            9 => "lru_hash",
            10 => "lru_percpu_hash",
            _ => "other",
        }
    }
}

/// One program definition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramSpec {
    /// Hook the section binds to, `None` when it is not a hook this loader attaches
    pub hook: Option<HookKind>,
}

/// Immutable description of named programs and maps
#[derive(Clone)]
pub struct Specification {
    image: &'static [u8],
    maps: BTreeMap<String, MapSpec>,
    programs: BTreeMap<String, ProgramSpec>,
}

impl Specification {
    pub fn new(
        image: &'static [u8],
        maps: BTreeMap<String, MapSpec>,
        programs: BTreeMap<String, ProgramSpec>,
    ) -> Self {
        Self {
            image,
            maps,
            programs,
        }
    }

    /// Raw object bytes handed to the kernel on instantiation
    pub fn image(&self) -> &'static [u8] {
        self.image
    }

    pub fn maps(&self) -> &BTreeMap<String, MapSpec> {
        &self.maps
    }

    pub fn programs(&self) -> &BTreeMap<String, ProgramSpec> {
        &self.programs
    }

    pub fn map(&self, name: &str) -> Option<&MapSpec> {
        self.maps.get(name)
    }

    pub fn program(&self, name: &str) -> Option<&ProgramSpec> {
        self.programs.get(name)
    }

    /// Verify every contract map and the entry point are present.
    ///
    /// Reports all missing members at once so a build mismatch is diagnosed
    /// in a single run.
    pub fn check_contract(&self) -> Result<(), ContractViolation> {
        let missing_maps: Vec<String> = contract::contract_map_names()
            .filter(|name| !self.maps.contains_key(*name))
            .map(str::to_string)
            .collect();

        let program = match self.programs.get(ENTRY_PROGRAM) {
            None => ProgramStatus::Missing,
            Some(spec) if spec.hook != Some(HookKind::Inet4Connect) => ProgramStatus::WrongHook,
            Some(_) => ProgramStatus::Present,
        };

        if missing_maps.is_empty() && program == ProgramStatus::Present {
            Ok(())
        } else {
            Err(ContractViolation {
                missing_maps,
                program,
            })
        }
    }
}

impl fmt::Debug for Specification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("image_len", &self.image.len())
            .field("maps", &self.maps)
            .field("programs", &self.programs)
            .finish()
    }
}

/// State of the entry-point program in a specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStatus {
    Present,
    Missing,
    WrongHook,
}

/// Contract members absent from a specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractViolation {
    pub missing_maps: Vec<String>,
    pub program: ProgramStatus,
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing_maps.is_empty() {
            parts.push(format!("missing maps [{}]", self.missing_maps.join(", ")));
        }
        match self.program {
            ProgramStatus::Present => {}
            ProgramStatus::Missing => parts.push(format!("missing program {}", ENTRY_PROGRAM)),
            ProgramStatus::WrongHook => parts.push(format!(
                "program {} is not a {} program",
                ENTRY_PROGRAM,
                HookKind::Inet4Connect
            )),
        }
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
pub(crate) fn contract_specification() -> Specification {
    let maps = contract::contract_map_names()
        .map(|name| (name.to_string(), MapSpec::default()))
        .collect();
    let mut programs = BTreeMap::new();
    programs.insert(
        ENTRY_PROGRAM.to_string(),
        ProgramSpec {
            hook: Some(HookKind::Inet4Connect),
        },
    );
    Specification::new(&[], maps, programs)
}
