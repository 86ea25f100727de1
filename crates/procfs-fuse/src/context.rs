//! State shared by every handler.

use std::sync::Arc;

use crate::error::Result;
use crate::introspect::{HardwareProbe, Introspector};

/// Shared state every handler reads from. Built once at startup and never
/// mutated afterwards.
#[derive(Clone)]
pub struct ProcContext {
    /// Process, task and descriptor queries.
    pub introspector: Arc<dyn Introspector>,
    /// Processor, sensor and TPM queries.
    pub hardware: Arc<dyn HardwareProbe>,
    /// Processors found at startup.
    pub processor_count: usize,
}

impl ProcContext {
    /// Build the context, counting processors once.
    pub fn new(
        introspector: Arc<dyn Introspector>,
        hardware: Arc<dyn HardwareProbe>,
    ) -> Result<Self> {
        let processor_count = hardware.processor_count()?;
        Ok(ProcContext {
            introspector,
            hardware,
            processor_count,
        })
    }

    /// The introspection backend.
    pub fn introspector(&self) -> &dyn Introspector {
        self.introspector.as_ref()
    }
}

impl std::fmt::Debug for ProcContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcContext")
            .field("processor_count", &self.processor_count)
            .finish_non_exhaustive()
    }
}
