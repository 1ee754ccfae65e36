#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

pub const MIN: i64 = 60_000;
/// 2023-11-14 12:00 UTC: daytime under the default night window.
pub const NOON: i64 = 19_675 * 86_400_000 + 12 * 3_600_000;

pub fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

/// Six readings whose pairwise slopes climb 1.2..2.8 mmol/L/h, ending at
/// 9.0 mmol/L at `end_ms`.
pub fn rising_history_csv(dir: &TempDir, end_ms: i64) -> PathBuf {
    let slopes = [1.2, 1.6, 2.0, 2.4, 2.8];
    let mut bg = 9.0;
    let mut rows = vec![(end_ms, bg)];
    for (i, s) in slopes.iter().rev().enumerate() {
        bg -= s / 12.0;
        rows.push((end_ms - (i as i64 + 1) * 5 * MIN, bg));
    }
    rows.reverse();
    let mut body = String::from("timestamp_ms,mmol\n");
    for (t, v) in rows {
        body.push_str(&format!("{t},{v:.6}\n"));
    }
    write(dir, "history.csv", &body)
}

pub fn flat_history_csv(dir: &TempDir, end_ms: i64, n: i64) -> PathBuf {
    let mut body = String::from("timestamp_ms,mmol\n");
    for i in 0..n {
        body.push_str(&format!("{},6.0\n", end_ms - (n - 1 - i) * 5 * MIN));
    }
    write(dir, "flat.csv", &body)
}

/// `cycles` rows, 5 minutes apart from `start_ms`: flat for the first six,
/// then an accelerating rise with IOB creeping up.
pub fn meal_trace_csv(dir: &TempDir, start_ms: i64, cycles: i64) -> PathBuf {
    let mut body = String::from("timestamp_ms,mmol,iob_u\n");
    for i in 0..cycles {
        let k = (i - 5).max(0) as f64;
        let bg = 6.0 + 0.04 * k * k;
        let iob = 0.1 * k;
        body.push_str(&format!("{},{bg:.3},{iob:.2}\n", start_ms + i * 5 * MIN));
    }
    write(dir, "trace.csv", &body)
}
