//! Bytecode source
//!
//! Supplies the [`Specification`] for one load attempt. The production source
//! parses the object embedded at build time (see `build.rs`); it has no side
//! effects beyond the parse.

use crate::spec::Specification;
use thiserror::Error;

/// Errors produced while turning object bytes into a specification
#[derive(Debug, Error)]
pub enum SourceError {
    /// The crate was built without a compiled object
    #[error("No eBPF object embedded at build time (set NITY_BPF_OBJECT)")]
    NotEmbedded,

    /// Bytes are malformed or not a BPF ELF object of a supported format
    #[cfg(target_os = "linux")]
    #[error("Failed to parse eBPF object: {0}")]
    Parse(#[from] aya_obj::ParseError),
}

/// Anything able to produce a [`Specification`]
pub trait SpecificationSource {
    fn load(&self) -> Result<Specification, SourceError>;
}

#[cfg(target_os = "linux")]
pub use embedded::EmbeddedObject;

#[cfg(target_os = "linux")]
mod embedded {
    use super::{SourceError, SpecificationSource};
    use crate::spec::{HookKind, MapSpec, ProgramSpec, Specification};
    use aya_obj::programs::CgroupSockAddrAttachType;
    use aya_obj::{Object, ProgramSection};
    use std::collections::BTreeMap;
    use tracing::debug;

    #[cfg(embedded_bpf_object)]
    const OBJECT: Option<&[u8]> = Some(aya::include_bytes_aligned!(concat!(
        env!("OUT_DIR"),
        "/nity.o"
    )));

    #[cfg(not(embedded_bpf_object))]
    const OBJECT: Option<&[u8]> = None;

    /// Object compiled alongside this crate
    #[derive(Debug, Clone, Copy)]
    pub struct EmbeddedObject {
        bytes: Option<&'static [u8]>,
    }

    impl EmbeddedObject {
        pub fn new() -> Self {
            Self { bytes: OBJECT }
        }

        /// Use a different static image, e.g. one included by a downstream crate
        pub fn from_static(bytes: &'static [u8]) -> Self {
            Self { bytes: Some(bytes) }
        }

        /// Whether an object was compiled in
        pub fn is_embedded(&self) -> bool {
            self.bytes.is_some_and(|b| !b.is_empty())
        }
    }

    impl Default for EmbeddedObject {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SpecificationSource for EmbeddedObject {
        fn load(&self) -> Result<Specification, SourceError> {
            let image = match self.bytes {
                Some(bytes) if !bytes.is_empty() => bytes,
                _ => return Err(SourceError::NotEmbedded),
            };
            let object = Object::parse(image)?;

            let maps: BTreeMap<String, MapSpec> = object
                .maps
                .iter()
                .map(|(name, map)| {
                    (
                        name.clone(),
                        MapSpec {
                            map_type: map.map_type(),
                            key_size: map.key_size(),
                            value_size: map.value_size(),
                            max_entries: map.max_entries(),
                        },
                    )
                })
                .collect();

            let programs: BTreeMap<String, ProgramSpec> = object
                .programs
                .iter()
                .map(|(name, program)| {
                    (
                        name.clone(),
                        ProgramSpec {
                            hook: hook_of(&program.section),
                        },
                    )
                })
                .collect();

            debug!(
                "Parsed eBPF object: {} bytes, {} maps, {} programs",
                image.len(),
                maps.len(),
                programs.len()
            );

            Ok(Specification::new(image, maps, programs))
        }
    }

    fn hook_of(section: &ProgramSection) -> Option<HookKind> {
        match section {
            ProgramSection::CgroupSockAddr {
                attach_type: CgroupSockAddrAttachType::Connect4,
                ..
            } => Some(HookKind::Inet4Connect),
            _ => None,
        }
    }
}
