use std::fs::File;
use std::io::Write;

use glyco_config::{Config, GlucoseRow, load_glucose_csv, load_trace_csv};
use rstest::rstest;
use tempfile::tempdir;

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = File::create(&path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    path
}

#[rstest]
fn loads_glucose_history() {
    let dir = tempdir().unwrap();
    let path = write(
        &dir,
        "hist.csv",
        "timestamp_ms,mmol\n0,6.0\n300000,6.2\n600000, 6.5\n",
    );
    let rows = load_glucose_csv(&path).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[2],
        GlucoseRow {
            timestamp_ms: 600_000,
            mmol: 6.5
        }
    );
}

#[rstest]
fn rejects_wrong_headers() {
    let dir = tempdir().unwrap();
    let path = write(&dir, "hist.csv", "time,bg\n0,6.0\n");
    let err = load_glucose_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("CSV must have headers 'timestamp_ms,mmol'"));
}

#[rstest]
fn rejects_unordered_timestamps() {
    let dir = tempdir().unwrap();
    let path = write(&dir, "hist.csv", "timestamp_ms,mmol\n300000,6.0\n0,6.1\n");
    let err = load_glucose_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("strictly increasing"));
}

#[rstest]
fn rejects_garbage_rows_with_line_number() {
    let dir = tempdir().unwrap();
    let path = write(&dir, "hist.csv", "timestamp_ms,mmol\n0,6.0\n300000,abc\n");
    let err = load_glucose_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("row 3"), "got: {err}");
}

#[rstest]
fn loads_trace_rows() {
    let dir = tempdir().unwrap();
    let path = write(
        &dir,
        "trace.csv",
        "timestamp_ms,mmol,iob_u\n0,6.0,0.5\n300000,6.4,0.6\n",
    );
    let rows = load_trace_csv(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].iob_u, 0.6);
}

#[rstest]
fn config_from_path_validates() {
    let dir = tempdir().unwrap();
    let good = write(&dir, "good.toml", "[profile]\ntarget_mmol = 6.0\n");
    let cfg = Config::from_path(&good).unwrap();
    assert_eq!(cfg.profile.target_mmol, 6.0);

    let bad = write(&dir, "bad.toml", "[delivery]\nbolus_step_u = 0\n");
    assert!(Config::from_path(&bad).is_err());
}
