//! JSON-lines audit sink: one object per decision cycle.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use eyre::{Result, WrapErr};
use glyco_traits::{AuditSink, BoxError};
use serde_json::{Map, Number, Value};

pub struct JsonlAudit {
    out: BufWriter<File>,
}

impl JsonlAudit {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .wrap_err_with(|| format!("open audit file {path:?}"))?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }
}

/// Audit values arrive pre-formatted; numbers and booleans are restored so
/// the file can be loaded without a schema.
fn typed(v: &str) -> Value {
    if let Ok(b) = v.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = v.parse::<i64>() {
        return Value::Number(i.into());
    }
    v.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(v.to_string()), Value::Number)
}

impl AuditSink for JsonlAudit {
    fn write_row(&mut self, row: &[(&'static str, String)]) -> Result<(), BoxError> {
        let obj: Map<String, Value> = row
            .iter()
            .map(|(k, v)| ((*k).to_string(), typed(v)))
            .collect();
        serde_json::to_writer(&mut self.out, &obj)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}
