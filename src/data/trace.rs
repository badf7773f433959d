/// Trace store: the diameter-over-time series of one recording.
///
/// A trace is loaded wholesale from a delimited file and never mutated
/// afterwards; loading another file replaces the whole value.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::error::LoadError;
use super::table::Table;
use super::timefmt;

/// Fixed header name written by VasoTracker, used when nothing better matches.
pub const DEFAULT_DIAMETER_HEADER: &str = "Inner Diameter";

/// One sample of the trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    /// Seconds since the start of the recording
    pub time: f64,
    /// Inner diameter in µm
    pub diameter: f64,
}

/// Dense, time-ordered sample series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub source_path: Option<PathBuf>,
    pub time_header: String,
    pub diameter_header: String,
    samples: Vec<TraceSample>,
}

impl Trace {
    /// Build a trace from samples, rejecting times that go backwards.
    pub fn new(samples: Vec<TraceSample>) -> Result<Self, LoadError> {
        check_monotonic(&samples)?;
        Ok(Self {
            source_path: None,
            time_header: "Time (s)".to_string(),
            diameter_header: DEFAULT_DIAMETER_HEADER.to_string(),
            samples,
        })
    }

    /// Load a trace CSV/TSV from disk.
    pub fn read_file(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let mut trace = Self::from_reader(BufReader::new(file))?;
        trace.source_path = Some(path.to_path_buf());
        log::info!(
            "Loaded trace {} ({} samples, columns {:?}/{:?})",
            path.display(),
            trace.len(),
            trace.time_header,
            trace.diameter_header
        );
        Ok(trace)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let table = Table::from_reader(reader)?;
        Self::from_table(&table)
    }

    pub fn from_table(table: &Table) -> Result<Self, LoadError> {
        let time_col = table
            .find_column("time")
            .ok_or_else(|| LoadError::MissingColumn {
                role: "time",
                headers: table.header_list(),
            })?;
        let diam_col = detect_diameter_column(table).ok_or_else(|| LoadError::MissingColumn {
            role: "diameter",
            headers: table.header_list(),
        })?;

        if table.rows.is_empty() {
            return Err(LoadError::Empty);
        }

        let time_header = table.headers[time_col].clone();
        let diameter_header = table.headers[diam_col].clone();

        let mut samples = Vec::with_capacity(table.rows.len());
        for (line, record) in &table.rows {
            let raw_t = Table::cell(record, time_col);
            let time = timefmt::parse_seconds(raw_t).ok_or_else(|| LoadError::BadValue {
                line: *line,
                column: time_header.clone(),
                value: raw_t.to_string(),
            })?;
            let raw_d = Table::cell(record, diam_col);
            let diameter = raw_d
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite())
                .ok_or_else(|| LoadError::BadValue {
                    line: *line,
                    column: diameter_header.clone(),
                    value: raw_d.to_string(),
                })?;
            samples.push(TraceSample { time, diameter });
        }

        let mut trace = Self::new(samples).map_err(|e| match e {
            // Re-number with file lines rather than sample positions.
            LoadError::NonMonotonic { line, time, previous } => LoadError::NonMonotonic {
                line: table.rows.get(line).map(|r| r.0).unwrap_or(line),
                time,
                previous,
            },
            other => other,
        })?;
        trace.time_header = time_header;
        trace.diameter_header = diameter_header;
        Ok(trace)
    }

    pub fn samples(&self) -> &[TraceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&TraceSample> {
        self.samples.last()
    }

    pub fn diameter_at(&self, index: usize) -> Option<f64> {
        self.samples.get(index).map(|s| s.diameter)
    }

    /// (first time, last time)
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((self.samples.first()?.time, self.samples.last()?.time))
    }

    /// (min diameter, max diameter)
    pub fn diameter_range(&self) -> Option<(f64, f64)> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), s| (lo.min(s.diameter), hi.max(s.diameter)),
        ))
    }

    /// Index of the sample whose time is closest to `t`; ties go to the lower index.
    pub fn nearest_index(&self, t: f64) -> Option<usize> {
        let n = self.samples.len();
        if n == 0 {
            return None;
        }
        if t.is_nan() {
            return Some(0);
        }
        let upper = self.samples.partition_point(|s| s.time < t);
        if upper == 0 {
            return Some(0);
        }
        if upper == n {
            return Some(self.first_with_time(n - 1));
        }
        let below = self.first_with_time(upper - 1);
        let d_below = (t - self.samples[below].time).abs();
        let d_above = (self.samples[upper].time - t).abs();
        Some(if d_below <= d_above { below } else { upper })
    }

    pub fn sample_near(&self, t: f64) -> Option<TraceSample> {
        self.nearest_index(t).map(|i| self.samples[i])
    }

    /// First index of the run of equal times containing `index`.
    fn first_with_time(&self, index: usize) -> usize {
        let time = self.samples[index].time;
        self.samples[..index].partition_point(|s| s.time < time)
    }
}

fn check_monotonic(samples: &[TraceSample]) -> Result<(), LoadError> {
    for (i, pair) in samples.windows(2).enumerate() {
        if !(pair[1].time >= pair[0].time) {
            return Err(LoadError::NonMonotonic {
                line: i + 1,
                time: pair[1].time,
                previous: pair[0].time,
            });
        }
    }
    Ok(())
}

fn detect_diameter_column(table: &Table) -> Option<usize> {
    let exact = DEFAULT_DIAMETER_HEADER.to_lowercase();
    table
        .find_column_by(|h| h == exact)
        .or_else(|| table.find_column_by(|h| h.contains("inner") && h.contains("diam")))
        .or_else(|| table.find_column("diam"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testutil::ramp_trace;
    use proptest::prelude::*;

    fn linear_nearest(trace: &Trace, t: f64) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, s) in trace.samples().iter().enumerate() {
            let d = (s.time - t).abs();
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    #[test]
    fn loads_comma_trace_with_fixed_header() {
        let csv = "Time (s),Outer Diameter,Inner Diameter\n0,150,100\n0.5,151,101.5\n1.0,152,99\n";
        let trace = Trace::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.diameter_header, "Inner Diameter");
        assert_eq!(trace.diameter_at(1), Some(101.5));
    }

    #[test]
    fn autodetects_renamed_diameter_column() {
        let tsv = "Time\tID (um)\tPressure\n0\t80\t60\n1\t81\t60\n";
        let err = Trace::from_reader(tsv.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { role: "diameter", .. }));

        let tsv = "Time\tInner diam. (um)\tPressure\n0\t80\t60\n1\t81\t60\n";
        let trace = Trace::from_reader(tsv.as_bytes()).unwrap();
        assert_eq!(trace.diameter_header, "Inner diam. (um)");
        assert_eq!(trace.time_range(), Some((0.0, 1.0)));
    }

    #[test]
    fn missing_time_column_is_an_error() {
        let csv = "Seconds,Inner Diameter\n0,1\n";
        let err = Trace::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { role: "time", .. }));
    }

    #[test]
    fn bad_cells_and_backwards_time_are_rejected() {
        let csv = "Time (s),Inner Diameter\n0,1\n1,\n";
        match Trace::from_reader(csv.as_bytes()).unwrap_err() {
            LoadError::BadValue { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }

        let csv = "Time (s),Inner Diameter\n0,1\n2,1\n1,1\n";
        match Trace::from_reader(csv.as_bytes()).unwrap_err() {
            LoadError::NonMonotonic { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn header_only_file_is_empty() {
        let csv = "Time (s),Inner Diameter\n";
        assert!(matches!(
            Trace::from_reader(csv.as_bytes()).unwrap_err(),
            LoadError::Empty
        ));
    }

    #[test]
    fn nearest_index_basics() {
        let trace = ramp_trace();
        assert_eq!(trace.nearest_index(5.0), Some(5));
        assert_eq!(trace.nearest_index(5.4), Some(5));
        assert_eq!(trace.nearest_index(5.6), Some(6));
        assert_eq!(trace.nearest_index(-3.0), Some(0));
        assert_eq!(trace.nearest_index(99.0), Some(10));
        assert_eq!(Trace::default().nearest_index(1.0), None);
    }

    #[test]
    fn nearest_index_ties_go_low() {
        let trace = ramp_trace();
        assert_eq!(trace.nearest_index(5.5), Some(5));

        let samples = vec![
            TraceSample { time: 0.0, diameter: 1.0 },
            TraceSample { time: 1.0, diameter: 2.0 },
            TraceSample { time: 1.0, diameter: 3.0 },
            TraceSample { time: 1.0, diameter: 4.0 },
            TraceSample { time: 2.0, diameter: 5.0 },
        ];
        let trace = Trace::new(samples).unwrap();
        assert_eq!(trace.nearest_index(1.2), Some(1));
        assert_eq!(trace.nearest_index(0.9), Some(1));
        assert_eq!(trace.nearest_index(5.0), Some(4));
    }

    proptest! {
        #[test]
        fn nearest_index_minimizes_distance(
            mut times in proptest::collection::vec(-1000.0f64..1000.0, 1..200),
            t in -1200.0f64..1200.0,
        ) {
            times.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let samples = times
                .iter()
                .map(|&time| TraceSample { time, diameter: 0.0 })
                .collect();
            let trace = Trace::new(samples).unwrap();
            let i = trace.nearest_index(t).unwrap();
            let reference = linear_nearest(&trace, t);
            let d = (trace.samples()[i].time - t).abs();
            for s in trace.samples() {
                prop_assert!(d <= (s.time - t).abs());
            }
            prop_assert_eq!(i, reference);
        }
    }
}
