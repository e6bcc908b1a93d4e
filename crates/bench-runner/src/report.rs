use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{BenchError, BenchResult};
use crate::model::Report;

/// `<label>_AutoRun_<YYYYMMDD_HHMMSS>.json`
pub fn report_file_name<Tz>(label: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("{}_AutoRun_{}.json", label, at.format("%Y%m%d_%H%M%S"))
}

/// Writes the report as 2-space pretty JSON, creating `dir` if needed.
/// A second report with the same label in the same second replaces the first.
pub fn write_report<Tz>(
    dir: &Path,
    label: &str,
    at: &DateTime<Tz>,
    report: &Report,
) -> BenchResult<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let path = dir.join(report_file_name(label, at));
    let bytes = serde_json::to_vec_pretty(report)?;
    atomic_write_bytes(&path, &bytes).map_err(|source| BenchError::Persist {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

pub fn read_report(path: &Path) -> BenchResult<Report> {
    let raw = fs::read_to_string(path).map_err(|source| BenchError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
