//! Append-only CSV telemetry log.
//!
//! One row per cycle, matching the thesis log sheet: date and time first,
//! both light measurements, then soil and climate, then the two state
//! labels. A missing file is created with a header row on first write.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::error::PersistenceError;
use crate::ports::PersistencePort;
use crate::record::TelemetryRecord;

const HEADER: &str = "date,time,natural_lux,total_lux,soil_moisture_pct,\
                      ambient_temp_c,ambient_humidity_pct,light_state,irrigation_state";

pub struct CsvLog {
    path: PathBuf,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Degraded fields render as empty cells, not zeros, so a fault in the
    /// probe is distinguishable from a genuinely dry or cold reading.
    fn format_row(record: &TelemetryRecord) -> String {
        let opt_f32 = |v: Option<f32>| v.map(|x| format!("{x:.1}")).unwrap_or_default();
        format!(
            "{},{},{:.0},{:.0},{},{},{},{},{}",
            record.timestamp.format("%Y-%m-%d"),
            record.timestamp.format("%H:%M:%S"),
            record.natural_lux,
            record.total_lux,
            record
                .soil_moisture_pct
                .map(|p| p.to_string())
                .unwrap_or_default(),
            opt_f32(record.ambient_temp_c),
            opt_f32(record.ambient_humidity_pct),
            record.light_state,
            record.irrigation_state,
        )
    }
}

impl PersistencePort for CsvLog {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), PersistenceError> {
        let fresh = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| PersistenceError::Open {
                path: self.path.clone(),
                source,
            })?;

        let mut out = String::new();
        if fresh {
            out.push_str(HEADER);
            out.push('\n');
        }
        out.push_str(&Self::format_row(record));
        out.push('\n');

        file.write_all(out.as_bytes())
            .map_err(|source| PersistenceError::Append {
                path: self.path.clone(),
                source,
            })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::LightState;
    use crate::record::IrrigationState;
    use chrono::{Local, TimeZone};

    fn record() -> TelemetryRecord {
        TelemetryRecord {
            timestamp: Local.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap(),
            natural_lux: 312.4,
            total_lux: 845.6,
            soil_moisture_pct: Some(42),
            ambient_temp_c: Some(21.53),
            ambient_humidity_pct: Some(60.0),
            light_state: LightState::On,
            irrigation_state: IrrigationState::Idle,
        }
    }

    #[test]
    fn first_append_writes_header_then_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = CsvLog::new(&path);

        log.append(&record()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("date,time,natural_lux"));
        assert_eq!(
            lines[1],
            "2024-06-01,10:30:00,312,846,42,21.5,60.0,ON,IDLE"
        );
    }

    #[test]
    fn header_is_written_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = CsvLog::new(&path);

        log.append(&record()).unwrap();
        log.append(&record()).unwrap();
        log.append(&record()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let headers = contents
            .lines()
            .filter(|l| l.starts_with("date,time"))
            .count();
        assert_eq!(headers, 1);
        assert_eq!(contents.lines().count(), 4);
    }

    #[test]
    fn degraded_fields_render_as_empty_cells() {
        let mut r = record();
        r.soil_moisture_pct = None;
        r.ambient_temp_c = None;
        r.ambient_humidity_pct = None;

        let row = CsvLog::format_row(&r);
        assert_eq!(row, "2024-06-01,10:30:00,312,846,,,,ON,IDLE");
    }

    #[test]
    fn append_to_unwritable_path_is_an_open_error() {
        let mut log = CsvLog::new("/nonexistent-dir/log.csv");
        let err = log.append(&record()).unwrap_err();
        assert!(matches!(err, PersistenceError::Open { .. }));
    }
}
