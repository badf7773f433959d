/// The editable session: stores, derived rows, and undo history.
///
/// Every mutation goes through `Session`, which re-derives the event rows
/// afterwards so the table, the plot and the exports always agree.

pub mod snapshot;
pub mod state;

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::data::error::{DataUnavailable, IndexError, SessionError};
use crate::data::events::{Event, EventStore};
use crate::data::frames::{FrameClock, FrameStack, DEFAULT_FRAME_INTERVAL_S};
use crate::data::pins::{Pin, PinId, PinStore};
use crate::data::reconcile::{self, EventRow};
use crate::data::trace::Trace;

use snapshot::{SessionState, SNAPSHOT_FORMAT_VERSION};
use state::{PlotStyle, ViewState};

/// Undo history depth.
pub const UNDO_LIMIT: usize = 32;

/// One undoable edit together with the data needed to reverse it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEdit {
    /// A row value was overwritten; `pin` is set when a pin supplied the value
    ReplaceValue {
        index: usize,
        previous_override: Option<f64>,
        pin: Option<Pin>,
    },
    /// A pin was promoted to a new event row
    Insert { index: usize, pin: Pin },
    Delete { index: usize, event: Event },
}

impl SessionEdit {
    pub fn describe(&self) -> String {
        match self {
            SessionEdit::ReplaceValue { index, pin: None, .. } => {
                format!("value of row {}", index + 1)
            }
            SessionEdit::ReplaceValue { index, pin: Some(_), .. } => {
                format!("pin value on row {}", index + 1)
            }
            SessionEdit::Insert { index, .. } => format!("pin promoted to row {}", index + 1),
            SessionEdit::Delete { event, .. } => format!("delete {:?}", event.label),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub trace: Trace,
    pub events: EventStore,
    pub pins: PinStore,
    pub view: ViewState,
    pub style: PlotStyle,
    pub frame_interval_s: f64,
    /// Path of the image stack, kept even when the stack failed to load
    pub stack_path: Option<PathBuf>,
    stack: Option<FrameStack>,
    rows: Vec<EventRow>,
    undo: VecDeque<SessionEdit>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            trace: Trace::default(),
            events: EventStore::default(),
            pins: PinStore::default(),
            view: ViewState::default(),
            style: PlotStyle::default(),
            frame_interval_s: DEFAULT_FRAME_INTERVAL_S,
            stack_path: None,
            stack: None,
            rows: Vec::new(),
            undo: VecDeque::new(),
        }
    }
}

impl Session {
    pub fn new(frame_interval_s: f64) -> Self {
        Self {
            frame_interval_s,
            ..Self::default()
        }
    }

    /// Build a fresh session from a validated snapshot. The image stack is
    /// not reopened here; `stack_path` tells the caller where it was.
    pub fn restore(state: SessionState) -> Self {
        let mut session = Self {
            trace: state.trace,
            events: state.events,
            pins: state.pins,
            view: state.view,
            style: state.style,
            frame_interval_s: state.frame_interval_s,
            stack_path: state.stack_path,
            stack: None,
            rows: Vec::new(),
            undo: VecDeque::new(),
        };
        session.refresh();
        session
    }

    pub fn snapshot(&self) -> SessionState {
        SessionState {
            format_version: SNAPSHOT_FORMAT_VERSION,
            trace: self.trace.clone(),
            events: self.events.clone(),
            rows: self.rows.clone(),
            pins: self.pins.clone(),
            view: self.view.clone(),
            style: self.style.clone(),
            frame_interval_s: self.frame_interval_s,
            stack_path: self.stack_path.clone(),
        }
    }

    /// Replace the trace. Pins were snapped to the old trace, so they go too.
    pub fn set_trace(&mut self, trace: Trace) {
        self.trace = trace;
        self.pins.clear();
        self.view.window = None;
        self.undo.clear();
        self.refresh();
    }

    pub fn set_events(&mut self, events: EventStore) {
        self.events = events;
        self.undo.clear();
        self.refresh();
    }

    pub fn set_stack(&mut self, stack: Option<FrameStack>) {
        self.stack_path = stack.as_ref().and_then(|s| s.source_path.clone());
        self.stack = stack;
        self.refresh();
    }

    pub fn stack(&self) -> Option<&FrameStack> {
        self.stack.as_ref()
    }

    pub fn set_frame_interval(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.frame_interval_s = seconds;
            self.refresh();
        }
    }

    /// Frames are resolved only once a stack is open.
    pub fn frame_clock(&self) -> Option<FrameClock> {
        self.stack
            .as_ref()
            .map(|s| FrameClock::for_stack(s, self.frame_interval_s))
    }

    pub fn rows(&self) -> &[EventRow] {
        &self.rows
    }

    /// Re-run reconciliation and report why rows are missing, if they are.
    pub fn derive(&self) -> Result<Vec<EventRow>, DataUnavailable> {
        reconcile::reconcile(&self.trace, self.events.as_slice(), self.frame_clock().as_ref())
    }

    fn refresh(&mut self) {
        self.rows = self.derive().unwrap_or_default();
    }

    fn push_undo(&mut self, edit: SessionEdit) {
        if self.undo.len() == UNDO_LIMIT {
            self.undo.pop_front();
        }
        self.undo.push_back(edit);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn last_edit(&self) -> Option<&SessionEdit> {
        self.undo.back()
    }

    // ── Pins ──

    pub fn add_pin(&mut self, time: f64) -> Result<PinId, DataUnavailable> {
        self.pins.add(&self.trace, time)
    }

    pub fn remove_pin(&mut self, id: PinId) -> Option<Pin> {
        self.pins.remove(id)
    }

    // ── Event edits ──

    /// Overwrite the displayed diameter of row `index`; returns the value
    /// shown before the edit.
    pub fn replace_value(&mut self, index: usize, new_diameter: f64) -> Result<f64, SessionError> {
        let old = self.displayed_value(index)?;
        let previous_override = self.events.set_override(index, Some(new_diameter))?;
        self.push_undo(SessionEdit::ReplaceValue {
            index,
            previous_override,
            pin: None,
        });
        self.refresh();
        Ok(old)
    }

    /// Overwrite row `event_index` with a pin's diameter, consuming the pin.
    pub fn replace_event_value_with_pin(
        &mut self,
        id: PinId,
        event_index: usize,
    ) -> Result<f64, SessionError> {
        let pin = *self
            .pins
            .get(id)
            .ok_or_else(|| SessionError::UnknownPin(id.to_string()))?;
        let old = self.displayed_value(event_index)?;
        let previous_override = self.events.set_override(event_index, Some(pin.diameter))?;
        self.pins.remove(id);
        self.push_undo(SessionEdit::ReplaceValue {
            index: event_index,
            previous_override,
            pin: Some(pin),
        });
        self.refresh();
        Ok(old)
    }

    /// Turn a pin into a new event at `insert_index`, consuming the pin.
    pub fn promote_pin(
        &mut self,
        id: PinId,
        insert_index: usize,
        label: impl Into<String>,
    ) -> Result<EventRow, SessionError> {
        let pin = *self
            .pins
            .get(id)
            .ok_or_else(|| SessionError::UnknownPin(id.to_string()))?;
        if self.trace.is_empty() {
            return Err(DataUnavailable("Trace").into());
        }
        let mut event = Event::new(label, pin.time);
        event.diameter_override = Some(pin.diameter);
        self.events.insert(insert_index, event)?;
        self.pins.remove(id);
        self.push_undo(SessionEdit::Insert {
            index: insert_index,
            pin,
        });
        self.refresh();
        self.rows
            .get(insert_index)
            .cloned()
            .ok_or_else(|| DataUnavailable("Trace").into())
    }

    pub fn delete_event(&mut self, index: usize) -> Result<Event, SessionError> {
        let event = self.events.delete(index)?;
        self.push_undo(SessionEdit::Delete {
            index,
            event: event.clone(),
        });
        self.refresh();
        Ok(event)
    }

    /// Clear a manual value so the row goes back to the trace-derived one.
    pub fn clear_override(&mut self, index: usize) -> Result<(), SessionError> {
        let previous_override = self.events.set_override(index, None)?;
        if previous_override.is_some() {
            self.push_undo(SessionEdit::ReplaceValue {
                index,
                previous_override,
                pin: None,
            });
            self.refresh();
        }
        Ok(())
    }

    pub fn rename_event(&mut self, index: usize, label: String) -> Result<String, SessionError> {
        let old = self.events.set_label(index, label)?;
        self.refresh();
        Ok(old)
    }

    /// Reverse the most recent edit.
    pub fn undo(&mut self) -> Result<SessionEdit, SessionError> {
        let edit = self.undo.pop_back().ok_or(SessionError::NothingToUndo)?;
        let result = self.apply_inverse(&edit);
        if result.is_err() {
            // Leave the history as it was so the user can retry.
            self.undo.push_back(edit.clone());
        }
        result?;
        self.refresh();
        Ok(edit)
    }

    fn apply_inverse(&mut self, edit: &SessionEdit) -> Result<(), SessionError> {
        match edit {
            SessionEdit::ReplaceValue {
                index,
                previous_override,
                pin,
            } => {
                self.events.set_override(*index, *previous_override)?;
                if let Some(pin) = pin {
                    self.pins.restore(*pin);
                }
            }
            SessionEdit::Insert { index, pin } => {
                self.events.delete(*index)?;
                self.pins.restore(*pin);
            }
            SessionEdit::Delete { index, event } => {
                self.events.insert(*index, event.clone())?;
            }
        }
        Ok(())
    }

    fn displayed_value(&self, index: usize) -> Result<f64, SessionError> {
        if index >= self.events.len() {
            return Err(IndexError {
                index,
                len: self.events.len(),
            }
            .into());
        }
        self.rows
            .get(index)
            .map(|r| r.diameter)
            .ok_or_else(|| DataUnavailable("Trace").into())
    }
}
