//! Test and helper mocks for glyco_core

use std::sync::{Arc, Mutex};

use glyco_traits::{AuditSink, BoxError};

use crate::config::Tunables;
use crate::error::EngineError;
use crate::store::ParameterStore;

/// Discards every row.
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn write_row(&mut self, _row: &[(&'static str, String)]) -> Result<(), BoxError> {
        Ok(())
    }
}

pub type AuditRow = Vec<(&'static str, String)>;

/// Keeps rows in memory; clones share the same buffer so a test can hand
/// one to the engine and inspect the other.
#[derive(Clone, Default)]
pub struct MemoryAudit {
    rows: Arc<Mutex<Vec<AuditRow>>>,
}

impl MemoryAudit {
    pub fn rows(&self) -> Vec<AuditRow> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAudit {
    fn write_row(&mut self, row: &[(&'static str, String)]) -> Result<(), BoxError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| Box::new(std::io::Error::other("audit buffer poisoned")) as BoxError)?;
        rows.push(row.to_vec());
        Ok(())
    }
}

/// Always errors; the engine must swallow it.
pub struct FailingAudit;

impl AuditSink for FailingAudit {
    fn write_row(&mut self, _row: &[(&'static str, String)]) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("audit disk full")))
    }
}

/// Parameter store that cannot produce a snapshot.
pub struct FailingStore;

impl ParameterStore for FailingStore {
    fn snapshot(&self) -> crate::error::Result<Tunables> {
        Err(eyre::Report::new(EngineError::Config(
            "preference store unavailable".into(),
        )))
    }
}
