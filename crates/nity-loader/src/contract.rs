//! Contract surface shared with the control-plane agent
//!
//! The agent opens every map below by name under the pin root. Renaming or
//! restructuring any entry requires bumping [`CONTRACT_VERSION`] in lockstep
//! with the agent.

/// Version of the map/program naming schema
pub const CONTRACT_VERSION: u32 = 1;

/// Entry-point program bound to the cgroup connect4 hook
pub const ENTRY_PROGRAM: &str = "nity_connect4";

/// Backend table A (double-buffered with B)
pub const MAP_SLOT_TABLE_A: &str = "slot_table_A";
/// Backend table B (double-buffered with A)
pub const MAP_SLOT_TABLE_B: &str = "slot_table_B";
/// Single-entry selector: 0 serves table A, 1 serves table B
pub const MAP_ACTIVE_TABLE: &str = "active_table";
/// Incremented exactly when the selector flips
pub const MAP_EPOCH: &str = "epoch";
/// LRU flow cache holding sticky backend assignments
pub const MAP_CONNTRACK_LRU: &str = "conntrack_lru";
/// Last time the agent proved itself alive
pub const MAP_LAST_AGENT_SEEN_TS: &str = "last_agent_seen_ts";
/// Control flags
pub const MAP_RT_CONTROL: &str = "rt_control";
/// Number of valid entries in the fallback backend list
pub const MAP_FALLBACK_SIZE: &str = "fallback_size";
/// Backends used once agent liveness has expired
pub const MAP_FALLBACK_BACKENDS: &str = "fallback_backends";
/// Observability counters
pub const MAP_COUNTERS: &str = "counters";

/// Role of a contract map, as the agent interprets it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapRole {
    BackendTable,
    ActiveSelector,
    Epoch,
    ConnectionTracking,
    Liveness,
    Control,
    FallbackSize,
    FallbackBackends,
    Counters,
}

impl MapRole {
    pub fn describe(&self) -> &'static str {
        match self {
            MapRole::BackendTable => "double-buffered backend table",
            MapRole::ActiveSelector => "active backend table selector",
            MapRole::Epoch => "table flip epoch counter",
            MapRole::ConnectionTracking => "LRU connection tracking cache",
            MapRole::Liveness => "agent liveness timestamp",
            MapRole::Control => "control flags",
            MapRole::FallbackSize => "fallback list size",
            MapRole::FallbackBackends => "fallback backend list",
            MapRole::Counters => "observability counters",
        }
    }
}

/// One required map of the contract surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractMap {
    pub name: &'static str,
    pub role: MapRole,
}

/// Every map an accepted object must define, in agent documentation order
pub const CONTRACT_MAPS: [ContractMap; 10] = [
    ContractMap {
        name: MAP_SLOT_TABLE_A,
        role: MapRole::BackendTable,
    },
    ContractMap {
        name: MAP_SLOT_TABLE_B,
        role: MapRole::BackendTable,
    },
    ContractMap {
        name: MAP_ACTIVE_TABLE,
        role: MapRole::ActiveSelector,
    },
    ContractMap {
        name: MAP_EPOCH,
        role: MapRole::Epoch,
    },
    ContractMap {
        name: MAP_CONNTRACK_LRU,
        role: MapRole::ConnectionTracking,
    },
    ContractMap {
        name: MAP_LAST_AGENT_SEEN_TS,
        role: MapRole::Liveness,
    },
    ContractMap {
        name: MAP_RT_CONTROL,
        role: MapRole::Control,
    },
    ContractMap {
        name: MAP_FALLBACK_SIZE,
        role: MapRole::FallbackSize,
    },
    ContractMap {
        name: MAP_FALLBACK_BACKENDS,
        role: MapRole::FallbackBackends,
    },
    ContractMap {
        name: MAP_COUNTERS,
        role: MapRole::Counters,
    },
];

/// Iterate the contract map names
pub fn contract_map_names() -> impl Iterator<Item = &'static str> {
    CONTRACT_MAPS.iter().map(|m| m.name)
}

/// Look up the role of a map, if it belongs to the contract surface
pub fn role_of(name: &str) -> Option<MapRole> {
    CONTRACT_MAPS.iter().find(|m| m.name == name).map(|m| m.role)
}
