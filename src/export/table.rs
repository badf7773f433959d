/// CSV export of the event table.

use std::path::{Path, PathBuf};

use super::ExportError;
use crate::data::reconcile::EventRow;
use crate::session::snapshot::write_atomic;

/// File written next to the trace after every re-derivation.
pub const AUTO_EXPORT_FILE_NAME: &str = "eventDiameters_output.csv";

pub fn auto_export_path(trace_path: &Path) -> PathBuf {
    trace_path.with_file_name(AUTO_EXPORT_FILE_NAME)
}

/// Render rows as CSV. The Frame column is present only when some row has a frame.
pub fn export_rows_csv(rows: &[EventRow]) -> Result<String, ExportError> {
    let with_frames = rows.iter().any(|r| r.frame.is_some());
    let mut writer = csv::Writer::from_writer(Vec::new());

    if with_frames {
        writer.write_record(["Event", "Time (s)", "Frame", "ID (µm)"])?;
    } else {
        writer.write_record(["Event", "Time (s)", "ID (µm)"])?;
    }

    for row in rows {
        let time = format!("{:.2}", row.time);
        let diameter = format!("{:.2}", row.diameter);
        if with_frames {
            let frame = row.frame.map(|f| f.to_string()).unwrap_or_default();
            writer.write_record([row.label.as_str(), time.as_str(), frame.as_str(), diameter.as_str()])?;
        } else {
            writer.write_record([row.label.as_str(), time.as_str(), diameter.as_str()])?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

pub fn write_rows_csv(path: &Path, rows: &[EventRow]) -> Result<(), ExportError> {
    let text = export_rows_csv(rows)?;
    write_atomic(path, text.as_bytes())?;
    log::info!("Exported {} rows to {}", rows.len(), path.display());
    Ok(())
}
