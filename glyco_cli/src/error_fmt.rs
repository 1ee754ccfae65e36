//! Human-readable error descriptions and structured JSON error formatting.

/// Exit code for configuration problems (unreadable, unparsable or invalid).
pub const EXIT_CONFIG: i32 = 3;
/// Exit code for unusable input data (CSV files, CLI values).
pub const EXIT_DATA: i32 = 4;
/// Exit code for an internal engine fault.
pub const EXIT_FAULT: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    Config,
    Data,
    Fault,
    Other,
}

impl ErrorClass {
    fn name(self) -> &'static str {
        match self {
            ErrorClass::Config => "Config",
            ErrorClass::Data => "Data",
            ErrorClass::Fault => "Fault",
            ErrorClass::Other => "Error",
        }
    }
}

fn classify(err: &eyre::Report) -> ErrorClass {
    use glyco_core::{BuildError, EngineError};

    if err.downcast_ref::<BuildError>().is_some() {
        return ErrorClass::Config;
    }
    if let Some(e) = err.downcast_ref::<EngineError>() {
        return match e {
            EngineError::InvalidInput(_) => ErrorClass::Data,
            EngineError::Config(_) => ErrorClass::Config,
            EngineError::Fault(_) | EngineError::StateLock => ErrorClass::Fault,
        };
    }
    let lower = err.to_string().to_ascii_lowercase();
    if lower.contains("invalid configuration") {
        ErrorClass::Config
    } else if lower.contains("unreadable glucose data") {
        ErrorClass::Data
    } else {
        ErrorClass::Other
    }
}

/// Innermost message of the chain; wrappers only add the file name.
fn root_message(err: &eyre::Report) -> String {
    err.chain()
        .last()
        .map_or_else(|| err.to_string(), ToString::to_string)
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use glyco_core::{BuildError, EngineError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidHistoryCapacity => {
                "What happened: The delivery history ring was given zero capacity.\nLikely causes: The engine builder was configured with history_capacity(0).\nHow to fix: Use a capacity of at least 1 (the default is 5).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `glyco self-check`."
            ),
        };
    }

    if let Some(e) = err.downcast_ref::<EngineError>() {
        return match e {
            EngineError::InvalidInput(msg) => format!(
                "What happened: Input rejected ({msg}).\nLikely causes: A non-finite or missing value on the command line or in the data.\nHow to fix: Pass finite numbers (e.g., `--iob 1.5`)."
            ),
            EngineError::Config(msg) => format!(
                "What happened: Parameter store failed ({msg}).\nLikely causes: The configuration source is unavailable or inconsistent.\nHow to fix: Check the config file with `glyco self-check`."
            ),
            EngineError::Fault(_) | EngineError::StateLock => format!(
                "What happened: {e}.\nLikely causes: Internal engine fault.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from the loaders
    let msg = err.to_string();
    let root = root_message(err);
    let lower = root.to_ascii_lowercase();

    if lower.contains("csv must have headers") {
        return format!(
            "What happened: {msg}: {root}.\nLikely causes: Wrong file passed, or a CSV exported with different column names.\nHow to fix: History files need 'timestamp_ms,mmol'; replay traces need 'timestamp_ms,mmol,iob_u'."
        );
    }

    if lower.contains("strictly increasing") {
        return format!(
            "What happened: {msg}: {root}.\nLikely causes: Unsorted export or duplicated readings.\nHow to fix: Sort the file by timestamp_ms and drop duplicate rows."
        );
    }

    match classify(err) {
        ErrorClass::Config => {
            return format!(
                "What happened: Configuration is invalid ({root}).\nLikely causes: Unreadable file, TOML syntax error, or an out-of-range value.\nHow to fix: Edit the TOML config and run `glyco self-check`."
            );
        }
        ErrorClass::Data => {
            return format!(
                "What happened: {msg}: {root}.\nLikely causes: Missing file, malformed row, or non-finite values.\nHow to fix: Check the CSV file and try again."
            );
        }
        ErrorClass::Fault | ErrorClass::Other => {}
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 config, 4 data, 5 engine fault, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match classify(err) {
        ErrorClass::Config => EXIT_CONFIG,
        ErrorClass::Data => EXIT_DATA,
        ErrorClass::Fault => EXIT_FAULT,
        ErrorClass::Other => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "reason": classify(err).name(),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
