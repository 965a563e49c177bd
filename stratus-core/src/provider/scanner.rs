//! Scanner database.
//!
//! The out-of-band scanner tool probes real instances of each template and
//! stores one JSON record per template in a local directory. Template
//! selection reads those records when a request constrains GPU count or CPU
//! frequency, facts the backend catalog does not carry.

use crate::error::{Result, StratusError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hardware facts probed for one template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannedTemplate {
    pub template_id: String,
    pub template_name: String,
    pub gpu: i32,
    pub cpu_frequency_ghz: f32,
    pub disk_speed_mbps: f32,
}

/// Directory of per-template JSON records.
pub struct ScannerDb {
    dir: PathBuf,
}

impl ScannerDb {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default location, under the user's home.
    pub fn open_default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self::open(Path::new(&home).join(".stratus").join("scanner").join("db"))
    }

    /// All records; an absent directory reads as an absent database.
    pub fn read_all(&self) -> Result<Vec<ScannedTemplate>> {
        if !self.dir.is_dir() {
            return Err(StratusError::not_found("scanner database", self.dir.display().to_string()));
        }
        let mut records = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| StratusError::infra(format!("reading scanner database: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| StratusError::infra(format!("reading scanner database: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read(&path)
                .map_err(|e| StratusError::infra(format!("reading {}: {e}", path.display())))?;
            match serde_json::from_slice(&raw) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("skipping corrupted scanner record {}: {e}", path.display())
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_database_is_not_found() {
        let db = ScannerDb::open("/nonexistent/scanner/db");
        assert!(db.read_all().unwrap_err().is_not_found());
    }

    #[test]
    fn records_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let record = ScannedTemplate {
            template_id: "t-gpu".into(),
            template_name: "g3-30".into(),
            gpu: 1,
            cpu_frequency_ghz: 3.0,
            disk_speed_mbps: 420.0,
        };
        std::fs::write(
            dir.path().join("g3-30.json"),
            serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let records = ScannerDb::open(dir.path()).read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].template_id, "t-gpu");
    }
}
