//! Ordered release of acquired kernel resources
//!
//! The instantiated unit sits at the base of the stack and every attachment
//! made from it is pushed on top. Unwinding pops attachments newest-first
//! and releases the unit last, so no attachment outlives the program backing
//! it.

use crate::error::LoaderError;
use crate::kernel::Kernel;
use tracing::warn;

pub struct ResourceStack<K: Kernel> {
    unit: K::Unit,
    links: Vec<K::Link>,
}

impl<K: Kernel> ResourceStack<K> {
    pub fn new(unit: K::Unit) -> Self {
        Self {
            unit,
            links: Vec::new(),
        }
    }

    pub fn unit(&self) -> &K::Unit {
        &self.unit
    }

    pub fn unit_mut(&mut self) -> &mut K::Unit {
        &mut self.unit
    }

    pub fn push_link(&mut self, link: K::Link) {
        self.links.push(link);
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Release every resource, newest first.
    ///
    /// A failed release does not stop the remaining ones; the first failure
    /// is returned once everything has been attempted.
    pub fn unwind(self, kernel: &mut K) -> Result<(), LoaderError> {
        let Self { unit, mut links } = self;
        let mut first_error = None;

        while let Some(link) = links.pop() {
            if let Err(source) = kernel.detach(link) {
                warn!("Detach failed during unwind: {}", source);
                first_error.get_or_insert(LoaderError::Release {
                    resource: "attachment",
                    source,
                });
            }
        }

        if let Err(source) = kernel.release(unit) {
            warn!("Release failed during unwind: {}", source);
            first_error.get_or_insert(LoaderError::Release {
                resource: "instantiated unit",
                source,
            });
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
