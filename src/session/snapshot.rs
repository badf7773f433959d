/// Session snapshots: the persisted form of a whole viewing session.
///
/// Snapshots are pretty-printed JSON. Fields added after the first format
/// version carry `#[serde(default)]` so older files keep loading.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::state::{PlotStyle, ViewState};
use crate::data::error::{SessionLoadError, SessionSaveError};
use crate::data::events::EventStore;
use crate::data::frames::DEFAULT_FRAME_INTERVAL_S;
use crate::data::pins::PinStore;
use crate::data::reconcile::EventRow;
use crate::data::trace::Trace;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

fn default_frame_interval() -> f64 {
    DEFAULT_FRAME_INTERVAL_S
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub format_version: u32,
    pub trace: Trace,
    pub events: EventStore,
    /// Rows as displayed when saved; recomputed on restore
    #[serde(default)]
    pub rows: Vec<EventRow>,
    #[serde(default)]
    pub pins: PinStore,
    #[serde(default)]
    pub view: ViewState,
    #[serde(default)]
    pub style: PlotStyle,
    #[serde(default = "default_frame_interval")]
    pub frame_interval_s: f64,
    #[serde(default)]
    pub stack_path: Option<PathBuf>,
}

pub fn save_snapshot(state: &SessionState) -> Result<Vec<u8>, SessionSaveError> {
    Ok(serde_json::to_vec_pretty(state)?)
}

/// Parse and validate a snapshot. Nothing is applied here; callers swap the
/// restored session in only after this succeeds.
pub fn load_snapshot(bytes: &[u8]) -> Result<SessionState, SessionLoadError> {
    let state: SessionState = serde_json::from_slice(bytes)?;
    if state.format_version > SNAPSHOT_FORMAT_VERSION {
        return Err(SessionLoadError::UnsupportedVersion {
            found: state.format_version,
            supported: SNAPSHOT_FORMAT_VERSION,
        });
    }
    validate(&state)?;
    Ok(state)
}

fn validate(state: &SessionState) -> Result<(), SessionLoadError> {
    let samples = state.trace.samples();
    if samples
        .iter()
        .any(|s| !s.time.is_finite() || !s.diameter.is_finite())
    {
        return Err(SessionLoadError::Invalid("non-finite trace sample".into()));
    }
    if let Some(i) = samples.windows(2).position(|w| w[1].time < w[0].time) {
        return Err(SessionLoadError::Invalid(format!(
            "trace time decreases at sample {}",
            i + 1
        )));
    }
    if let Some((i, e)) = state
        .events
        .iter()
        .enumerate()
        .find(|(_, e)| !e.time.is_finite() || e.diameter_override.is_some_and(|d| !d.is_finite()))
    {
        return Err(SessionLoadError::Invalid(format!(
            "event {} ({:?}) has a non-finite value",
            i, e.label
        )));
    }
    if state
        .pins
        .iter()
        .any(|p| !p.time.is_finite() || !p.diameter.is_finite())
    {
        return Err(SessionLoadError::Invalid("non-finite pin".into()));
    }
    if !(state.frame_interval_s.is_finite() && state.frame_interval_s > 0.0) {
        return Err(SessionLoadError::Invalid(format!(
            "frame interval {}",
            state.frame_interval_s
        )));
    }
    Ok(())
}

/// Write `bytes` to a temp file beside `path`, then rename it into place.
/// On failure the previous file at `path` is untouched.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn write_snapshot_file(path: &Path, state: &SessionState) -> Result<(), SessionSaveError> {
    let bytes = save_snapshot(state)?;
    write_atomic(path, &bytes)?;
    log::info!("Session saved to {}", path.display());
    Ok(())
}

pub fn read_snapshot_file(path: &Path) -> Result<SessionState, SessionLoadError> {
    let bytes = std::fs::read(path)?;
    load_snapshot(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::events::Event;
    use crate::data::testutil::ramp_trace;

    fn sample_state() -> SessionState {
        let trace = ramp_trace();
        let mut pins = PinStore::default();
        pins.add(&trace, 2.5).unwrap();
        let mut events = EventStore::new(vec![
            Event::new("Baseline", 0.0),
            Event::new("PE", 4.123456789).with_frame(29),
        ]);
        events.set_override(1, Some(11.111111111111)).unwrap();
        SessionState {
            format_version: SNAPSHOT_FORMAT_VERSION,
            trace,
            events,
            rows: Vec::new(),
            pins,
            view: ViewState::default(),
            style: PlotStyle::default(),
            frame_interval_s: 0.14,
            stack_path: Some(PathBuf::from("/data/vessel1.tif")),
        }
    }

    #[test]
    fn roundtrip_preserves_floats_exactly() {
        let state = sample_state();
        let bytes = save_snapshot(&state).unwrap();
        let loaded = load_snapshot(&bytes).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(
            loaded.events.as_slice()[1].time.to_bits(),
            4.123456789f64.to_bits()
        );
    }

    #[test]
    fn older_snapshot_gets_defaults() {
        let json = r#"{
            "format_version": 1,
            "trace": {"source_path": null, "time_header": "Time", "diameter_header": "Inner Diameter",
                      "samples": [{"time": 0.0, "diameter": 5.0}]},
            "events": {"events": [{"label": "A", "time": 0.0}]}
        }"#;
        let state = load_snapshot(json.as_bytes()).unwrap();
        assert_eq!(state.frame_interval_s, DEFAULT_FRAME_INTERVAL_S);
        assert!(state.pins.is_empty());
        assert_eq!(state.view, ViewState::default());
        assert_eq!(state.events.as_slice()[0].frame, None);
    }

    #[test]
    fn rejects_corrupt_and_newer_snapshots() {
        assert!(matches!(
            load_snapshot(b"{ not json").unwrap_err(),
            SessionLoadError::Parse(_)
        ));

        let mut state = sample_state();
        state.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        let bytes = save_snapshot(&state).unwrap();
        assert!(matches!(
            load_snapshot(&bytes).unwrap_err(),
            SessionLoadError::UnsupportedVersion { .. }
        ));
    }

    #[test]
    fn rejects_backwards_trace() {
        let json = r#"{
            "format_version": 1,
            "trace": {"source_path": null, "time_header": "Time", "diameter_header": "D",
                      "samples": [{"time": 1.0, "diameter": 5.0}, {"time": 0.5, "diameter": 5.0}]},
            "events": {"events": []}
        }"#;
        assert!(matches!(
            load_snapshot(json.as_bytes()).unwrap_err(),
            SessionLoadError::Invalid(_)
        ));
    }

    #[test]
    fn file_write_is_atomic_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"previous").unwrap();

        let state = sample_state();
        write_snapshot_file(&path, &state).unwrap();
        assert_eq!(read_snapshot_file(&path).unwrap(), state);

        // A failed read leaves nothing half-applied
        std::fs::write(&path, b"garbage").unwrap();
        assert!(read_snapshot_file(&path).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"garbage");
    }

    #[test]
    fn failed_write_keeps_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep.txt"), b"previous").unwrap();

        assert!(write_snapshot_file(&path, &sample_state()).is_err());
        assert!(path.is_dir());
        assert_eq!(std::fs::read(path.join("keep.txt")).unwrap(), b"previous");

        // No temp file is left next to the target
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("session.json")]);
    }
}
