//! Error types for nity-loader

use crate::source::SourceError;
use crate::spec::ContractViolation;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed originating kernel or filesystem error
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`crate::attach`] and [`crate::Handle::close`]
///
/// Every failure return leaves no kernel resource outstanding.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Host refused to raise RLIMIT_MEMLOCK
    #[error("Failed to raise memlock limit: {0}")]
    ResourceLimit(#[source] std::io::Error),

    /// Embedded object is missing, malformed or of an incompatible format
    #[error("Invalid bytecode specification: {0}")]
    Specification(#[from] SourceError),

    /// Object does not carry the contract surface
    #[error("Contract surface violation (contract v{version}): {violation}")]
    ContractSurface {
        version: u32,
        violation: ContractViolation,
    },

    /// Kernel rejected a map or program
    #[error("Failed to instantiate eBPF object: {0}")]
    Instantiation(#[source] BoxError),

    /// Entry point absent from the instantiated unit
    #[error("Program {0} not found in instantiated object")]
    MissingProgram(String),

    /// Hook target invalid or already bound incompatibly
    #[error("Failed to attach {program} to {}: {source}", .cgroup.display())]
    Attach {
        program: String,
        cgroup: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Pin root could not be created
    #[error("Failed to create pin root {}: {source}", .path.display())]
    PinRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A map could not be pinned
    #[error("Failed to pin map {map} at {}: {source}", .path.display())]
    Pin {
        map: String,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Releasing an attachment or the instantiated unit failed
    #[error("Failed to release {resource}: {source}")]
    Release {
        resource: &'static str,
        #[source]
        source: BoxError,
    },

    /// Handle was already closed
    #[error("Handle already closed")]
    AlreadyClosed,
}

impl LoaderError {
    /// The object does not match the expected schema or format.
    ///
    /// These are build-time defects; a retry will not fix them.
    pub fn is_build_defect(&self) -> bool {
        matches!(
            self,
            LoaderError::Specification(_)
                | LoaderError::ContractSurface { .. }
                | LoaderError::MissingProgram(_)
        )
    }

    /// A host precondition (privileges, cgroup, bpffs) was not met
    pub fn is_environment(&self) -> bool {
        matches!(
            self,
            LoaderError::ResourceLimit(_)
                | LoaderError::Attach { .. }
                | LoaderError::PinRoot { .. }
                | LoaderError::Pin { .. }
        )
    }

    pub(crate) fn contract(violation: ContractViolation) -> Self {
        LoaderError::ContractSurface {
            version: crate::contract::CONTRACT_VERSION,
            violation,
        }
    }
}

/// Result type for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;
