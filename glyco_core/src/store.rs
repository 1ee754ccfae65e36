//! Per-cycle parameter source.

use crate::config::Tunables;
use crate::error::{EngineError, Result};

/// External preference store supplying an immutable snapshot each cycle.
pub trait ParameterStore {
    fn snapshot(&self) -> Result<Tunables>;
}

/// Fixed snapshot; the store used when tunables never change at runtime.
#[derive(Debug, Clone, Default)]
pub struct StaticStore {
    tunables: Tunables,
}

impl StaticStore {
    pub fn new(tunables: Tunables) -> Self {
        Self { tunables }
    }
}

impl ParameterStore for StaticStore {
    fn snapshot(&self) -> Result<Tunables> {
        Ok(self.tunables.clone())
    }
}

/// Validated on every snapshot.
impl ParameterStore for glyco_config::Config {
    fn snapshot(&self) -> Result<Tunables> {
        self.validate()
            .map_err(|e| eyre::Report::new(EngineError::Config(e.to_string())))?;
        Ok(Tunables::from(self))
    }
}
