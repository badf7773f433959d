/// Delimited-text tables shared by the trace and event loaders.

use std::io::Read;

use super::error::LoadError;

/// A parsed delimited file: header row plus data records with their line numbers.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    /// (1-based file line, cells)
    pub rows: Vec<(usize, csv::StringRecord)>,
}

/// What a dropped or opened delimited file most likely holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Trace,
    Events,
}

/// Comma if the first line contains one, otherwise tab.
pub fn detect_delimiter(first_line: &str) -> u8 {
    if first_line.contains(',') {
        b','
    } else {
        b'\t'
    }
}

impl Table {
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, LoadError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, LoadError> {
        let text = text.trim_start_matches('\u{feff}');
        let first_line = text.lines().next().unwrap_or_default();
        let delimiter = detect_delimiter(first_line);

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .has_headers(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(rows.len() + 2);
            rows.push((line, record));
        }

        Ok(Self {
            headers,
            rows,
        })
    }

    /// Index of the first header containing `needle` (case-insensitive).
    pub fn find_column(&self, needle: &str) -> Option<usize> {
        let needle = needle.to_lowercase();
        self.headers
            .iter()
            .position(|h| h.to_lowercase().contains(&needle))
    }

    /// Index of the first header matching `pred` on its lowercased form.
    pub fn find_column_by(&self, pred: impl Fn(&str) -> bool) -> Option<usize> {
        self.headers.iter().position(|h| pred(&h.to_lowercase()))
    }

    /// A diameter column means a trace; anything else is read as events.
    pub fn kind(&self) -> TableKind {
        if self.find_column("diam").is_some() {
            TableKind::Trace
        } else {
            TableKind::Events
        }
    }

    pub fn header_list(&self) -> String {
        self.headers.join(", ")
    }

    /// Cell text for a row, empty if the row is short.
    pub fn cell<'a>(record: &'a csv::StringRecord, column: usize) -> &'a str {
        record.get(column).map(str::trim).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_comma_and_tab() {
        assert_eq!(detect_delimiter("Time (s),Inner Diameter"), b',');
        assert_eq!(detect_delimiter("Time (s)\tInner Diameter"), b'\t');
    }

    #[test]
    fn parses_tab_table_and_skips_blank_rows() {
        let text = "Label\tTime\nA\t1.0\n\t\nB\t2.0\n";
        let table = Table::parse(text).unwrap();
        assert_eq!(table.headers, vec!["Label", "Time"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].0, 4);
        assert_eq!(Table::cell(&table.rows[1].1, 0), "B");
    }

    #[test]
    fn strips_bom_and_finds_columns() {
        let text = "\u{feff}Time (s),Outer Diameter,Inner Diameter\n0,1,2\n";
        let table = Table::parse(text).unwrap();
        assert_eq!(table.find_column("time"), Some(0));
        assert_eq!(table.find_column("INNER"), Some(2));
        assert_eq!(table.find_column("pressure"), None);
    }

    #[test]
    fn sniffs_trace_or_events() {
        let trace = Table::parse("Time (s),Inner Diameter\n0,10\n").unwrap();
        assert_eq!(trace.kind(), TableKind::Trace);
        let events = Table::parse("Label\tTime\nPE\t0:30\n").unwrap();
        assert_eq!(events.kind(), TableKind::Events);
    }
}
