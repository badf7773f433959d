/// In-place cell edits of existing `.xlsx` workbooks.
///
/// Only the worksheet part of the active sheet is rewritten, and within it
/// only the bytes of the edited `<c>` element (or a newly inserted `<row>`)
/// change. Every other zip entry is copied raw, so formatting, formulas and
/// other sheets survive untouched.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::SpreadsheetError;

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// Default first target row (rows 1-2 hold the sheet header).
pub const DEFAULT_START_ROW: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    /// 1-based column (A = 1)
    pub column: u32,
    /// 1-based row
    pub row: u32,
}

impl CellRef {
    pub fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Parse an A1-style reference such as `C3` or `AB12`.
    pub fn parse(text: &str) -> Result<Self, SpreadsheetError> {
        let invalid = || SpreadsheetError::InvalidCell(text.to_string());
        let text = text.trim().trim_start_matches('$');
        let split = text
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let column = column_index(text[..split].trim_end_matches('$')).ok_or_else(invalid)?;
        let row: u32 = text[split..].parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }
        Ok(Self { column, row })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.column), self.row)
    }
}

/// `A` → 1, `Z` → 26, `AA` → 27.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, c| {
        c.is_ascii_alphabetic()
            .then(|| acc * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1))
    })
}

pub fn column_letters(mut column: u32) -> String {
    let mut out = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        out.push((b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    out.iter().rev().collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Numbers are written numerically, anything else as text.
    pub fn from_input(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => CellValue::Number(v),
            _ => CellValue::Text(text.to_string()),
        }
    }

    fn to_xml(&self, cell: CellRef, style: Option<&str>) -> String {
        let style = style
            .map(|s| format!(" s=\"{}\"", quick_xml::escape::escape(s)))
            .unwrap_or_default();
        match self {
            CellValue::Number(v) => format!("<c r=\"{cell}\"{style}><v>{v}</v></c>"),
            CellValue::Text(t) => format!(
                "<c r=\"{cell}\"{style} t=\"inlineStr\"><is><t>{}</t></is></c>",
                quick_xml::escape::escape(t.as_str())
            ),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::Text(t) => f.write_str(t),
        }
    }
}

/// One applied cell write, with the raw XML of the cell it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub cell: CellRef,
    /// `None` when the cell did not exist before
    pub previous: Option<String>,
    pub value: CellValue,
}

fn xml_err(e: impl fmt::Display) -> SpreadsheetError {
    SpreadsheetError::Xml(e.to_string())
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, SpreadsheetError> {
    for a in e.attributes() {
        let a = a.map_err(xml_err)?;
        if a.key.local_name().as_ref() == name {
            return Ok(Some(a.unescape_value().map_err(xml_err)?.into_owned()));
        }
    }
    Ok(None)
}

fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, SpreadsheetError> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(Some(text))
}

fn require_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, SpreadsheetError> {
    read_part(archive, name)?.ok_or_else(|| SpreadsheetError::MissingPart(name.to_string()))
}

/// An open workbook with its active sheet loaded for editing.
#[derive(Debug, Clone)]
pub struct Workbook {
    path: PathBuf,
    pub sheet_name: String,
    sheet_part: String,
    sheet_xml: String,
    shared_strings: Vec<String>,
    /// A formula cell was overwritten, so the calculation chain is stale
    formula_replaced: bool,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self, SpreadsheetError> {
        let mut archive = ZipArchive::new(File::open(path)?)?;

        let workbook_xml = require_part(&mut archive, "xl/workbook.xml")?;
        let (sheets, active) = parse_workbook(&workbook_xml)?;
        let (sheet_name, rel_id) = sheets
            .get(active)
            .or_else(|| sheets.first())
            .cloned()
            .ok_or_else(|| SpreadsheetError::MissingPart("worksheet".into()))?;

        let rels_xml = require_part(&mut archive, WORKBOOK_RELS_PART)?;
        let target = parse_relationship_target(&rels_xml, &rel_id)?
            .ok_or_else(|| SpreadsheetError::MissingPart(format!("relationship {rel_id}")))?;
        let sheet_part = resolve_target(&target);
        let sheet_xml = require_part(&mut archive, &sheet_part)?;

        let shared_strings = match read_part(&mut archive, "xl/sharedStrings.xml")? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        log::debug!("Opened workbook {} (sheet {:?} at {})", path.display(), sheet_name, sheet_part);
        Ok(Self {
            path: path.to_path_buf(),
            sheet_name,
            sheet_part,
            sheet_xml,
            shared_strings,
            formula_replaced: false,
        })
    }

    /// Raw XML of a cell, if present.
    pub fn raw_cell(&self, cell: CellRef) -> Result<Option<&str>, SpreadsheetError> {
        match locate(&self.sheet_xml, cell)? {
            Location::Cell { start, end, .. } => Ok(Some(&self.sheet_xml[start..end])),
            _ => Ok(None),
        }
    }

    /// Read a cell's value: numbers, inline strings, shared strings and
    /// cached formula results.
    pub fn value(&self, cell: CellRef) -> Result<Option<CellValue>, SpreadsheetError> {
        let Some(raw) = self.raw_cell(cell)? else {
            return Ok(None);
        };
        let mut reader = Reader::from_str(raw);
        let mut kind = None;
        let mut in_v = false;
        let mut in_t = false;
        let mut v_text = String::new();
        let mut inline = String::new();
        loop {
            match reader.read_event().map_err(xml_err)? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                    kind = attr(&e, b"t")?;
                }
                Event::Start(e) if e.local_name().as_ref() == b"v" => in_v = true,
                Event::Start(e) if e.local_name().as_ref() == b"t" => in_t = true,
                Event::End(e) if e.local_name().as_ref() == b"v" => in_v = false,
                Event::End(e) if e.local_name().as_ref() == b"t" => in_t = false,
                Event::Text(t) if in_v => v_text.push_str(&t.unescape().map_err(xml_err)?),
                Event::Text(t) if in_t => inline.push_str(&t.unescape().map_err(xml_err)?),
                Event::Eof => break,
                _ => {}
            }
        }

        let value = match kind.as_deref() {
            Some("inlineStr") => Some(CellValue::Text(inline)),
            Some("s") => v_text
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| self.shared_strings.get(i))
                .map(|s| CellValue::Text(s.clone())),
            Some("str") | Some("e") => Some(CellValue::Text(v_text)),
            Some("b") => Some(CellValue::Text(
                if v_text.trim() == "1" { "TRUE" } else { "FALSE" }.to_string(),
            )),
            _ if v_text.is_empty() => None,
            _ => Some(CellValue::from_input(&v_text)),
        };
        Ok(value)
    }

    /// Write a value, keeping the cell's style. Returns the replaced raw cell XML.
    pub fn set_cell(
        &mut self,
        cell: CellRef,
        value: &CellValue,
    ) -> Result<Option<String>, SpreadsheetError> {
        self.splice(cell, |style| Some(value.to_xml(cell, style)))
    }

    /// Put back a cell exactly as it was (`None` removes it).
    pub fn restore_cell(
        &mut self,
        cell: CellRef,
        previous: Option<&str>,
    ) -> Result<(), SpreadsheetError> {
        self.splice(cell, |_| previous.map(str::to_string))?;
        Ok(())
    }

    fn splice(
        &mut self,
        cell: CellRef,
        make: impl FnOnce(Option<&str>) -> Option<String>,
    ) -> Result<Option<String>, SpreadsheetError> {
        let location = locate(&self.sheet_xml, cell)?;
        let row_open = |extra: &str| format!("<row r=\"{}\"{extra}>", cell.row);
        match location {
            Location::Cell { start, end, style } => {
                let previous = self.sheet_xml[start..end].to_string();
                if has_formula(&previous)? {
                    self.formula_replaced = true;
                }
                let new = make(style.as_deref()).unwrap_or_default();
                self.sheet_xml.replace_range(start..end, &new);
                Ok(Some(previous))
            }
            Location::InRow { at } => {
                if let Some(new) = make(None) {
                    self.sheet_xml.insert_str(at, &new);
                }
                Ok(None)
            }
            Location::EmptyRow { start, end } => {
                if let Some(new) = make(None) {
                    let tag = &self.sheet_xml[start..end];
                    let open = format!("{}>", tag.trim_end_matches('>').trim_end_matches('/').trim_end());
                    self.sheet_xml
                        .replace_range(start..end, &format!("{open}{new}</row>"));
                }
                Ok(None)
            }
            Location::NewRow { at } => {
                if let Some(new) = make(None) {
                    self.sheet_xml
                        .insert_str(at, &format!("{}{new}</row>", row_open("")));
                }
                Ok(None)
            }
            Location::EmptySheetData { start, end } => {
                if let Some(new) = make(None) {
                    self.sheet_xml.replace_range(
                        start..end,
                        &format!("<sheetData>{}{new}</row></sheetData>", row_open("")),
                    );
                }
                Ok(None)
            }
        }
    }

    /// Rewrite the workbook file: the edited sheet is recompressed, every
    /// other entry is copied raw. The write goes through a temp file, so a
    /// failure leaves the original workbook as it was.
    ///
    /// Once a formula cell has been overwritten the calculation chain no
    /// longer matches the sheet; it is dropped together with its
    /// relationship and content type, and Excel rebuilds it on open.
    pub fn save(&self) -> Result<(), SpreadsheetError> {
        let mut archive = ZipArchive::new(File::open(&self.path)?)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = ZipWriter::new(tmp.as_file());
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for i in 0..archive.len() {
                let entry = archive.by_index_raw(i)?;
                let name = entry.name().to_string();
                if name == self.sheet_part {
                    drop(entry);
                    writer.start_file(name.as_str(), options)?;
                    writer.write_all(self.sheet_xml.as_bytes())?;
                } else if self.formula_replaced && name == CALC_CHAIN_PART {
                    log::debug!("Dropping stale {}", CALC_CHAIN_PART);
                } else if self.formula_replaced
                    && (name == WORKBOOK_RELS_PART || name == CONTENT_TYPES_PART)
                {
                    drop(entry);
                    let xml = require_part(&mut archive, &name)?;
                    let pruned = remove_empty_elements(&xml, |e| {
                        Ok(match e.local_name().as_ref() {
                            b"Relationship" => attr(e, b"Type")?
                                .is_some_and(|t| t.ends_with("/calcChain")),
                            b"Override" => attr(e, b"PartName")?
                                .is_some_and(|p| p.strip_prefix('/') == Some(CALC_CHAIN_PART)),
                            _ => false,
                        })
                    })?;
                    writer.start_file(name.as_str(), options)?;
                    writer.write_all(pruned.as_bytes())?;
                } else {
                    writer.raw_copy_file(entry)?;
                }
            }
            writer.finish()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        log::info!("Saved workbook {}", self.path.display());
        Ok(())
    }
}

/// Write `values` into `column` from `start_row` downwards and save.
pub fn write_column(
    path: &Path,
    column: &str,
    start_row: u32,
    values: &[CellValue],
) -> Result<Vec<CellEdit>, SpreadsheetError> {
    let column = column_index(column).ok_or_else(|| SpreadsheetError::InvalidCell(column.into()))?;
    let mut workbook = Workbook::open(path)?;
    let mut edits = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let cell = CellRef::new(column, start_row + i as u32);
        let previous = workbook.set_cell(cell, value)?;
        edits.push(CellEdit {
            cell,
            previous,
            value: value.clone(),
        });
    }
    workbook.save()?;
    Ok(edits)
}

/// Interactive column mapping: values are written one at a time into
/// successive rows of one column, each write saved immediately.
#[derive(Debug, Clone)]
pub struct ColumnMapper {
    pub workbook_path: PathBuf,
    pub column: u32,
    pub next_row: u32,
    history: Vec<CellEdit>,
}

impl ColumnMapper {
    pub fn new(workbook_path: PathBuf, column: u32, start_row: u32) -> Self {
        Self {
            workbook_path,
            column,
            next_row: start_row.max(1),
            history: Vec::new(),
        }
    }

    pub fn next_cell(&self) -> CellRef {
        CellRef::new(self.column, self.next_row)
    }

    pub fn history(&self) -> &[CellEdit] {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Text of column A on the target row, used as a hint for the user.
    pub fn describe_next(&self) -> Result<Option<String>, SpreadsheetError> {
        let workbook = Workbook::open(&self.workbook_path)?;
        Ok(workbook
            .value(CellRef::new(1, self.next_row))?
            .map(|v| v.to_string()))
    }

    pub fn assign(&mut self, value: CellValue) -> Result<CellRef, SpreadsheetError> {
        let cell = self.next_cell();
        let mut workbook = Workbook::open(&self.workbook_path)?;
        let previous = workbook.set_cell(cell, &value)?;
        workbook.save()?;
        self.history.push(CellEdit {
            cell,
            previous,
            value,
        });
        self.next_row += 1;
        Ok(cell)
    }

    pub fn skip(&mut self) {
        self.next_row += 1;
    }

    /// Restore the most recently overwritten cell and move the cursor back to it.
    pub fn undo_last(&mut self) -> Result<Option<CellRef>, SpreadsheetError> {
        let Some(edit) = self.history.last() else {
            return Ok(None);
        };
        let mut workbook = Workbook::open(&self.workbook_path)?;
        workbook.restore_cell(edit.cell, edit.previous.as_deref())?;
        workbook.save()?;
        let cell = edit.cell;
        self.history.pop();
        self.next_row = cell.row;
        Ok(Some(cell))
    }
}

/// Where a cell lives (or would be inserted) in the worksheet XML.
#[derive(Debug, PartialEq)]
enum Location {
    Cell {
        start: usize,
        end: usize,
        style: Option<String>,
    },
    /// Row exists; insert the cell at this byte offset
    InRow { at: usize },
    /// Row exists as `<row .../>`
    EmptyRow { start: usize, end: usize },
    /// Row missing; insert a new row at this byte offset
    NewRow { at: usize },
    /// `<sheetData/>`
    EmptySheetData { start: usize, end: usize },
}

fn locate(xml: &str, target: CellRef) -> Result<Location, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    let mut in_data = false;
    let mut in_target_row = false;
    let mut last_row = 0u32;
    let mut last_col = 0u32;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(xml_err)?;
        let after = reader.buffer_position() as usize;
        let self_closing = matches!(event, Event::Empty(_));
        match event {
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                return Ok(Location::EmptySheetData { start: before, end: after });
            }
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => in_data = true,
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                return Ok(Location::NewRow { at: before });
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if in_data && e.local_name().as_ref() == b"row" =>
            {
                let number = match attr(e, b"r")? {
                    Some(r) => r.trim().parse().map_err(xml_err)?,
                    None => last_row + 1,
                };
                last_row = number;
                last_col = 0;
                if number > target.row {
                    return Ok(Location::NewRow { at: before });
                }
                if number == target.row {
                    if self_closing {
                        return Ok(Location::EmptyRow { start: before, end: after });
                    }
                    in_target_row = true;
                }
            }
            Event::End(e) if in_target_row && e.local_name().as_ref() == b"row" => {
                return Ok(Location::InRow { at: before });
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if in_target_row && e.local_name().as_ref() == b"c" =>
            {
                let column = match attr(e, b"r")? {
                    Some(r) => CellRef::parse(&r)?.column,
                    None => last_col + 1,
                };
                last_col = column;
                if column > target.column {
                    return Ok(Location::InRow { at: before });
                }
                if column == target.column {
                    let style = attr(e, b"s")?;
                    let end = if self_closing {
                        after
                    } else {
                        skip_to_cell_end(&mut reader)?
                    };
                    return Ok(Location::Cell { start: before, end, style });
                }
            }
            Event::Eof => return Err(SpreadsheetError::MissingPart("sheetData".into())),
            _ => {}
        }
    }
}

fn has_formula(raw_cell: &str) -> Result<bool, SpreadsheetError> {
    let mut reader = Reader::from_str(raw_cell);
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                return Ok(true)
            }
            Event::Eof => return Ok(false),
            _ => {}
        }
    }
}

/// Copy `xml` without the self-closing elements `remove` selects.
fn remove_empty_elements(
    xml: &str,
    remove: impl Fn(&BytesStart<'_>) -> Result<bool, SpreadsheetError>,
) -> Result<String, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::with_capacity(xml.len());
    let mut copied = 0;
    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(xml_err)?;
        let after = reader.buffer_position() as usize;
        match event {
            Event::Empty(e) if remove(&e)? => {
                out.push_str(&xml[copied..before]);
                copied = after;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    out.push_str(&xml[copied..]);
    Ok(out)
}

fn skip_to_cell_end(reader: &mut Reader<&[u8]>) -> Result<usize, SpreadsheetError> {
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::End(e) if e.local_name().as_ref() == b"c" => {
                return Ok(reader.buffer_position() as usize)
            }
            Event::Eof => return Err(SpreadsheetError::Xml("unterminated <c> element".into())),
            _ => {}
        }
    }
}

/// Sheet (name, relationship id) pairs and the active tab index.
fn parse_workbook(xml: &str) -> Result<(Vec<(String, String)>, usize), SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    let mut active = 0usize;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"workbookView" => {
                    if let Some(tab) = attr(&e, b"activeTab")? {
                        active = tab.trim().parse().unwrap_or(0);
                    }
                }
                b"sheet" => {
                    let name = attr(&e, b"name")?.unwrap_or_default();
                    let id = attr(&e, b"id")?
                        .ok_or_else(|| SpreadsheetError::Xml(format!("sheet {name:?} has no r:id")))?;
                    sheets.push((name, id));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok((sheets, active))
}

fn parse_relationship_target(xml: &str, id: &str) -> Result<Option<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if attr(&e, b"Id")?.as_deref() == Some(id) {
                    return attr(&e, b"Target");
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut phonetic = false;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                b"rPh" => phonetic = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                b"rPh" => phonetic = false,
                _ => {}
            },
            Event::Text(t) if in_t && !phonetic => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>ID</t></is></c></row><row r="3"><c r="A3" t="s"><v>1</v></c><c r="B3" s="1"><v>5</v></c></row><row r="4"><c r="A4" t="s"><v>2</v></c><c r="C4" s="2"><v>1.5</v></c><c r="D4"><f>C4*2</f><v>3</v></c></row><row r="6" spans="1:4"/></sheetData></worksheet>"#;

    const SHARED: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>Condition</t></si><si><t>Baseline</t></si><si><r><t>PE </t></r><r><t>1 µM</t></r></si></sst>"#;

    fn workbook_xml(active_tab: Option<u32>) -> String {
        let view = active_tab
            .map(|t| format!(r#"<bookViews><workbookView activeTab="{t}"/></bookViews>"#))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">{view}<sheets><sheet name="Notes" sheetId="1" r:id="rId1"/><sheet name="Vessel" sheetId="2" r:id="rId2"/></sheets></workbook>"#
        )
    }

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#;

    const CALC_CHAIN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="D4" i="2"/></calcChain>"#;

    const NOTES_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;

    fn write_workbook(path: &Path, active_tab: Option<u32>) {
        write_workbook_with_sheet(path, active_tab, SHEET);
    }

    fn write_workbook_with_sheet(path: &Path, active_tab: Option<u32>, sheet: &str) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("xl/workbook.xml", workbook_xml(active_tab)),
            ("xl/_rels/workbook.xml.rels", RELS.to_string()),
            ("xl/worksheets/sheet1.xml", NOTES_SHEET.to_string()),
            ("xl/worksheets/sheet2.xml", sheet.to_string()),
            ("xl/sharedStrings.xml", SHARED.to_string()),
            ("xl/calcChain.xml", CALC_CHAIN.to_string()),
        ];
        for (name, body) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        read_part(&mut archive, name).unwrap().unwrap()
    }

    #[test]
    fn cell_references() {
        assert_eq!(CellRef::parse("C3").unwrap(), CellRef::new(3, 3));
        assert_eq!(CellRef::parse("$AB$12").unwrap(), CellRef::new(28, 12));
        assert!(CellRef::parse("3C").is_err());
        assert!(CellRef::parse("C0").is_err());
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(CellRef::new(3, 6).to_string(), "C6");
    }

    #[test]
    fn opens_active_sheet_and_reads_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");
        write_workbook(&path, Some(1));

        let wb = Workbook::open(&path).unwrap();
        assert_eq!(wb.sheet_name, "Vessel");
        assert_eq!(
            wb.value(CellRef::new(1, 3)).unwrap(),
            Some(CellValue::Text("Baseline".into()))
        );
        assert_eq!(
            wb.value(CellRef::new(1, 4)).unwrap(),
            Some(CellValue::Text("PE 1 µM".into()))
        );
        assert_eq!(
            wb.value(CellRef::new(3, 1)).unwrap(),
            Some(CellValue::Text("ID".into()))
        );
        assert_eq!(wb.value(CellRef::new(4, 4)).unwrap(), Some(CellValue::Number(3.0)));
        assert_eq!(wb.value(CellRef::new(3, 5)).unwrap(), None);
    }

    #[test]
    fn defaults_to_first_sheet_without_active_tab() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");
        write_workbook(&path, None);
        let mut wb = Workbook::open(&path).unwrap();
        assert_eq!(wb.sheet_name, "Notes");

        // <sheetData/> grows a row on first write
        wb.set_cell(CellRef::new(2, 3), &CellValue::Number(7.0)).unwrap();
        assert_eq!(wb.value(CellRef::new(2, 3)).unwrap(), Some(CellValue::Number(7.0)));
    }

    #[test]
    fn write_column_fills_rows_and_leaves_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");
        write_workbook(&path, Some(1));
        let before = Workbook::open(&path).unwrap();

        let values = [
            CellValue::Number(10.5),
            CellValue::Number(11.25),
            CellValue::Number(12.0),
            CellValue::Text("n/a".into()),
        ];
        let edits = write_column(&path, "C", 3, &values).unwrap();
        assert_eq!(edits.len(), 4);
        assert_eq!(edits[0].previous, None);
        assert_eq!(edits[1].previous.as_deref(), Some(r#"<c r="C4" s="2"><v>1.5</v></c>"#));

        let after = Workbook::open(&path).unwrap();
        for (i, value) in values.iter().enumerate() {
            let cell = CellRef::new(3, 3 + i as u32);
            assert_eq!(after.value(cell).unwrap().as_ref(), Some(value), "{cell}");
        }
        // Style of the overwritten cell is kept
        assert_eq!(
            after.raw_cell(CellRef::new(3, 4)).unwrap(),
            Some(r#"<c r="C4" s="2"><v>11.25</v></c>"#)
        );
        for cell in ["A1", "C1", "A3", "B3", "A4", "D4"] {
            let cell = CellRef::parse(cell).unwrap();
            assert_eq!(after.raw_cell(cell).unwrap(), before.raw_cell(cell).unwrap());
        }
        assert!(after.raw_cell(CellRef::new(3, 7)).unwrap().is_none());

        // Untouched parts are byte-identical
        assert_eq!(read_entry(&path, "xl/sharedStrings.xml"), SHARED);
        assert_eq!(read_entry(&path, "xl/worksheets/sheet1.xml"), NOTES_SHEET);
        assert_eq!(read_entry(&path, "xl/calcChain.xml"), CALC_CHAIN);
        assert_eq!(read_entry(&path, "xl/_rels/workbook.xml.rels"), RELS);

        // Rows stay in ascending order
        let sheet = read_entry(&path, "xl/worksheets/sheet2.xml");
        let r4 = sheet.find(r#"<row r="4""#).unwrap();
        let r5 = sheet.find(r#"<row r="5""#).unwrap();
        let r6 = sheet.find(r#"<row r="6""#).unwrap();
        assert!(r4 < r5 && r5 < r6);
        assert!(sheet.contains(r#"<row r="6" spans="1:4"><c r="C6" t="inlineStr"><is><t>n/a</t></is></c></row>"#));
    }

    #[test]
    fn overwriting_a_formula_drops_the_calc_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");
        write_workbook(&path, Some(1));

        let edits = write_column(&path, "D", 4, &[CellValue::Number(8.0)]).unwrap();
        assert_eq!(edits[0].previous.as_deref(), Some("<c r=\"D4\"><f>C4*2</f><v>3</v></c>"));

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert!(read_part(&mut archive, "xl/calcChain.xml").unwrap().is_none());
        let rels = read_entry(&path, "xl/_rels/workbook.xml.rels");
        assert!(!rels.contains("calcChain"));
        assert!(rels.contains(r#"Id="rId1""#) && rels.contains(r#"Id="rId2""#));
        let types = read_entry(&path, "[Content_Types].xml");
        assert!(!types.contains("calcChain"));
        assert!(types.contains(r#"<Default Extension="xml""#));
        assert_eq!(read_entry(&path, "xl/sharedStrings.xml"), SHARED);

        let wb = Workbook::open(&path).unwrap();
        assert_eq!(wb.value(CellRef::new(4, 4)).unwrap(), Some(CellValue::Number(8.0)));
        assert_eq!(wb.sheet_name, "Vessel");
    }

    #[test]
    fn failed_write_leaves_workbook_bytes_unchanged() {
        let dir = tempfile::tempdir().unwrap();

        let no_data = dir.path().join("no_data.xlsx");
        write_workbook_with_sheet(
            &no_data,
            Some(1),
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"></worksheet>"#,
        );
        let original = std::fs::read(&no_data).unwrap();
        assert!(write_column(&no_data, "C", 3, &[CellValue::Number(1.0)]).is_err());
        assert_eq!(std::fs::read(&no_data).unwrap(), original);

        // First cell succeeds in memory, the second hits a malformed row
        let bad_row = dir.path().join("bad_row.xlsx");
        write_workbook_with_sheet(
            &bad_row,
            Some(1),
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="3"><c r="C3"><v>1</v></c></row><row r="bad"/></sheetData></worksheet>"#,
        );
        let original = std::fs::read(&bad_row).unwrap();
        let values = [CellValue::Number(2.0), CellValue::Number(3.0), CellValue::Number(4.0)];
        assert!(write_column(&bad_row, "C", 3, &values).is_err());
        assert_eq!(std::fs::read(&bad_row).unwrap(), original);

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 2);
    }

    #[test]
    fn mapper_assign_skip_and_undo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");
        write_workbook(&path, Some(1));
        let original_c4 = Workbook::open(&path)
            .unwrap()
            .raw_cell(CellRef::new(3, 4))
            .unwrap()
            .map(str::to_string);

        let mut mapper = ColumnMapper::new(path.clone(), 3, DEFAULT_START_ROW);
        assert_eq!(mapper.describe_next().unwrap().as_deref(), Some("Baseline"));
        mapper.skip();
        assert_eq!(mapper.next_row, 4);
        let cell = mapper.assign(CellValue::from_input("98.76")).unwrap();
        assert_eq!(cell.to_string(), "C4");
        assert_eq!(mapper.next_row, 5);

        let undone = mapper.undo_last().unwrap();
        assert_eq!(undone, Some(CellRef::new(3, 4)));
        assert_eq!(mapper.next_row, 4);
        let wb = Workbook::open(&path).unwrap();
        assert_eq!(
            wb.raw_cell(CellRef::new(3, 4)).unwrap().map(str::to_string),
            original_c4
        );
        assert_eq!(mapper.undo_last().unwrap(), None);
    }

    #[test]
    fn undo_removes_a_cell_that_did_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");
        write_workbook(&path, Some(1));

        let mut mapper = ColumnMapper::new(path.clone(), 3, 3);
        mapper.assign(CellValue::Text("a & b".into())).unwrap();
        let wb = Workbook::open(&path).unwrap();
        assert_eq!(
            wb.value(CellRef::new(3, 3)).unwrap(),
            Some(CellValue::Text("a & b".into()))
        );

        mapper.undo_last().unwrap();
        let wb = Workbook::open(&path).unwrap();
        assert_eq!(wb.value(CellRef::new(3, 3)).unwrap(), None);
        assert_eq!(wb.value(CellRef::new(2, 3)).unwrap(), Some(CellValue::Number(5.0)));
    }
}
