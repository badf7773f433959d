/// Event store: labeled experimental markers in table order.
///
/// Each event is one record, so label, time and frame always move together.
/// Order is the user's table order, which need not be sorted by time.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::error::{IndexError, LoadError};
use super::table::Table;
use super::timefmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub label: String,
    /// Seconds since the start of the recording
    pub time: f64,
    /// Acquisition frame, when the events file or the user supplied one
    #[serde(default)]
    pub frame: Option<u32>,
    /// Manually entered diameter that replaces the derived value
    #[serde(default)]
    pub diameter_override: Option<f64>,
}

impl Event {
    pub fn new(label: impl Into<String>, time: f64) -> Self {
        Self {
            label: label.into(),
            time,
            frame: None,
            diameter_override: None,
        }
    }

    pub fn with_frame(mut self, frame: u32) -> Self {
        self.frame = Some(frame);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Load an events CSV/TSV from disk.
    pub fn read_file(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let store = Self::from_reader(BufReader::new(file))?;
        log::info!("Loaded {} events from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let table = Table::from_reader(reader)?;
        Self::from_table(&table)
    }

    /// Label column: first header containing "label", else column 0.
    /// Time column: first header containing "time", else column 1.
    /// Frame column: optional, first header containing "frame".
    pub fn from_table(table: &Table) -> Result<Self, LoadError> {
        let label_col = table.find_column("label").unwrap_or(0);
        let time_col = table
            .find_column("time")
            .or_else(|| (table.headers.len() > 1).then_some(1))
            .ok_or_else(|| LoadError::MissingColumn {
                role: "time",
                headers: table.header_list(),
            })?;
        let frame_col = table.find_column("frame");

        let mut events = Vec::with_capacity(table.rows.len());
        for (line, record) in &table.rows {
            let label = Table::cell(record, label_col).to_string();
            let raw_t = Table::cell(record, time_col);
            let time = timefmt::parse_seconds(raw_t).ok_or_else(|| LoadError::BadValue {
                line: *line,
                column: table.headers[time_col].clone(),
                value: raw_t.to_string(),
            })?;

            let frame = match frame_col {
                Some(col) => parse_frame(Table::cell(record, col)).map_err(|value| {
                    LoadError::BadValue {
                        line: *line,
                        column: table.headers[col].clone(),
                        value,
                    }
                })?,
                None => None,
            };

            let event = Event::new(label, time);
            events.push(match frame {
                Some(frame) => event.with_frame(frame),
                None => event,
            });
        }
        Ok(Self { events })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    /// Insert at `index` (0..=len).
    pub fn insert(&mut self, index: usize, event: Event) -> Result<(), IndexError> {
        if index > self.events.len() {
            return Err(IndexError {
                index,
                len: self.events.len(),
            });
        }
        self.events.insert(index, event);
        Ok(())
    }

    /// Remove and return the event at `index`.
    pub fn delete(&mut self, index: usize) -> Result<Event, IndexError> {
        self.check(index)?;
        Ok(self.events.remove(index))
    }

    /// Set or clear the manual diameter; returns the previous override.
    pub fn set_override(
        &mut self,
        index: usize,
        value: Option<f64>,
    ) -> Result<Option<f64>, IndexError> {
        self.check(index)?;
        Ok(std::mem::replace(
            &mut self.events[index].diameter_override,
            value,
        ))
    }

    pub fn set_label(&mut self, index: usize, label: String) -> Result<String, IndexError> {
        self.check(index)?;
        Ok(std::mem::replace(&mut self.events[index].label, label))
    }

    fn check(&self, index: usize) -> Result<(), IndexError> {
        if index < self.events.len() {
            Ok(())
        } else {
            Err(IndexError {
                index,
                len: self.events.len(),
            })
        }
    }
}

/// Empty cells mean "no frame"; fractional frame numbers are rounded.
fn parse_frame(raw: &str) -> Result<Option<u32>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(Some(v.round() as u32)),
        _ => Err(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_events() -> EventStore {
        EventStore::new(vec![
            Event::new("Baseline", 0.0).with_frame(0),
            Event::new("PE 1uM", 60.0).with_frame(429),
            Event::new("Washout", 120.0).with_frame(857),
        ])
    }

    #[test]
    fn loads_numeric_events_with_label_and_time_headers() {
        let csv = "EventLabel,Time (s)\nDrug A,3.0\nDrug B,7\n";
        let store = EventStore::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().label, "Drug A");
        assert_eq!(store.get(1).unwrap().time, 7.0);
        assert_eq!(store.get(1).unwrap().frame, None);
    }

    #[test]
    fn converts_duration_text_and_reads_frames() {
        let tsv = "Event Label\tTime\tFrame\nKCl\t00:01:30\t643\nCa-free\t0 days 00:02:00\t\n";
        let store = EventStore::from_reader(tsv.as_bytes()).unwrap();
        assert_eq!(store.get(0).unwrap().time, 90.0);
        assert_eq!(store.get(0).unwrap().frame, Some(643));
        assert_eq!(store.get(1).unwrap().time, 120.0);
        assert_eq!(store.get(1).unwrap().frame, None);
    }

    #[test]
    fn falls_back_to_first_two_columns() {
        let csv = "Name,Seconds\nA,1.5\n";
        let store = EventStore::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(store.get(0).unwrap().label, "A");
        assert_eq!(store.get(0).unwrap().time, 1.5);
    }

    #[test]
    fn bad_time_reports_line() {
        let csv = "Label,Time\nA,1\nB,soon\n";
        match EventStore::from_reader(csv.as_bytes()).unwrap_err() {
            LoadError::BadValue { line, value, .. } => {
                assert_eq!(line, 3);
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn insert_respects_bounds() {
        let mut store = three_events();
        store.insert(3, Event::new("End", 180.0)).unwrap();
        assert_eq!(store.get(3).unwrap().label, "End");
        store.insert(0, Event::new("Start", 200.0)).unwrap();
        assert_eq!(store.get(0).unwrap().label, "Start");
        assert_eq!(
            store.insert(9, Event::new("X", 1.0)),
            Err(IndexError { index: 9, len: 5 })
        );
    }

    #[test]
    fn delete_moves_every_field_together() {
        let mut store = three_events();
        let removed = store.delete(1).unwrap();
        assert_eq!(removed.label, "PE 1uM");
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).unwrap().label, "Washout");
        assert_eq!(store.get(1).unwrap().time, 120.0);
        assert_eq!(store.get(1).unwrap().frame, Some(857));
        assert!(store.delete(2).is_err());
    }

    #[test]
    fn override_returns_previous() {
        let mut store = three_events();
        assert_eq!(store.set_override(0, Some(15.2)), Ok(None));
        assert_eq!(store.set_override(0, None), Ok(Some(15.2)));
        assert!(store.set_override(5, None).is_err());
    }
}
