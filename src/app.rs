/// Main application state and eframe::App implementation
///
/// Owns the editable session and wires the toolbar, trace plot, event
/// table, frame viewer and dialogs to it. Core errors end up in the status
/// bar and the application log; nothing here panics on bad input.

use std::fmt;
use std::path::{Path, PathBuf};

use eframe::egui;

use crate::config::AppConfig;
use crate::data::error::{DataUnavailable, LoadError, SessionSaveError};
use crate::data::events::EventStore;
use crate::data::frames::FrameStack;
use crate::data::table::{Table, TableKind};
use crate::data::trace::Trace;
use crate::export::plot_image::{self, ImageExportSettings, PlotRender};
use crate::export::spreadsheet::{self, CellValue, ColumnMapper, Workbook};
use crate::export::table as table_export;
use crate::export::ExportError;
use crate::gui::event_table::{self, EventTableAction, EventTableState};
use crate::gui::frame_viewer::{self, FrameViewerState};
use crate::gui::mapping_dialog::{self, MappingAction, MappingDialogState};
use crate::gui::style_dialog::{self, StyleAction, StyleDialogState};
use crate::gui::theme::{self, AppTheme, ThemeColors};
use crate::gui::toolbar::{self, ToolbarAction};
use crate::gui::trace_view::{self, TracePlot, TraceViewAction, TraceViewState};
use crate::log::activity::ActivityLog;
use crate::session::snapshot::{self, SessionState};
use crate::session::Session;

/// The main application
pub struct VasoApp {
    session: Session,
    /// Ordered record of everything the user did
    activity: ActivityLog,
    config: AppConfig,

    /// GUI sub-states
    trace_view: TraceViewState,
    table_state: EventTableState,
    frame_state: FrameViewerState,
    style_dialog: StyleDialogState,
    mapping_dialog: MappingDialogState,

    /// Status messages
    status_message: String,
    show_log_window: bool,
    show_about: bool,

    /// Current theme
    current_theme: AppTheme,
    theme_colors: ThemeColors,

    /// Dropped files buffer
    dropped_files: Vec<PathBuf>,
}

impl VasoApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        // ── Apply default theme ──
        let default_theme = AppTheme::Light;
        theme::apply_theme(&cc.egui_ctx, default_theme);

        // ── Typography: scale for monitor DPI ──
        let ppi = cc.egui_ctx.pixels_per_point();
        let base_size = if ppi > 1.5 { 14.0 } else { 13.0 };
        let mut style = (*cc.egui_ctx.style()).clone();
        style.text_styles.insert(
            egui::TextStyle::Body,
            egui::FontId::new(base_size, egui::FontFamily::Proportional),
        );
        style.text_styles.insert(
            egui::TextStyle::Button,
            egui::FontId::new(base_size, egui::FontFamily::Proportional),
        );
        style.text_styles.insert(
            egui::TextStyle::Heading,
            egui::FontId::new(base_size * 1.25, egui::FontFamily::Proportional),
        );
        style.text_styles.insert(
            egui::TextStyle::Small,
            egui::FontId::new(base_size * 0.85, egui::FontFamily::Proportional),
        );
        style.text_styles.insert(
            egui::TextStyle::Monospace,
            egui::FontId::new(base_size * 0.92, egui::FontFamily::Monospace),
        );
        style.spacing.item_spacing = egui::vec2(8.0, 5.0);
        style.spacing.button_padding = egui::vec2(8.0, 4.0);
        style.spacing.indent = 18.0;
        cc.egui_ctx.set_style(style);

        let config = AppConfig::load();
        let mapping_dialog = MappingDialogState {
            start_row: config.excel_start_row,
            ..MappingDialogState::default()
        };

        let mut app = Self {
            session: Session::new(config.frame_interval_s),
            activity: ActivityLog::new(),
            config,
            trace_view: TraceViewState::default(),
            table_state: EventTableState::default(),
            frame_state: FrameViewerState::default(),
            style_dialog: StyleDialogState::default(),
            mapping_dialog,
            status_message: "Ready. Open or drop a diameter trace to begin".to_string(),
            show_log_window: false,
            show_about: false,
            current_theme: default_theme,
            theme_colors: ThemeColors::from_theme(default_theme),
            dropped_files: Vec::new(),
        };
        app.restore_last_session();
        app
    }

    fn fail(&mut self, what: &str, err: impl fmt::Display) {
        log::error!("{} failed: {}", what, err);
        self.status_message = format!("❌ {} failed: {}", what, err);
    }

    // ── Loading ──

    /// Open a dropped or picked file by its extension and contents.
    fn load_path(&mut self, path: PathBuf) {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "tif" | "tiff" => self.open_stack(&path),
            "json" => self.load_session(&path),
            _ => {
                let kind = std::fs::File::open(&path)
                    .map_err(LoadError::from)
                    .and_then(Table::from_reader)
                    .map(|t| t.kind());
                match kind {
                    Ok(TableKind::Trace) => self.open_trace(&path),
                    Ok(TableKind::Events) => self.open_events(&path),
                    Err(e) => self.fail(&format!("Opening {}", path.display()), e),
                }
            }
        }
    }

    fn open_trace(&mut self, path: &Path) {
        match Trace::read_file(path) {
            Ok(trace) => {
                let n = trace.len();
                self.session.set_trace(trace);
                self.activity.set_source(&path.display().to_string());
                self.activity.add_entry(
                    "Load Trace",
                    &format!("{} ({} samples)", path.display(), n),
                );
                self.trace_view.reset_view = true;
                self.trace_view.selected_event = None;
                self.status_message = format!("Loaded trace: {} samples", n);
                self.after_change();
            }
            Err(e) => self.fail("Trace load", e),
        }
    }

    fn open_events(&mut self, path: &Path) {
        match EventStore::read_file(path) {
            Ok(events) => {
                let n = events.len();
                self.session.set_events(events);
                self.activity
                    .add_entry("Load Events", &format!("{} ({} events)", path.display(), n));
                self.trace_view.selected_event = None;
                self.table_state = EventTableState::default();
                self.status_message = match self.session.derive() {
                    Ok(_) => format!("Loaded {} events", n),
                    Err(e) => format!("Loaded {} events ({})", n, e),
                };
                self.after_change();
            }
            Err(e) => self.fail("Event load", e),
        }
    }

    fn open_stack(&mut self, path: &Path) {
        match FrameStack::read_file(path, self.config.max_frames) {
            Ok(stack) => {
                let msg = format!(
                    "{} of {} pages from {}",
                    stack.len(),
                    stack.total_pages,
                    path.display()
                );
                self.session.set_stack(Some(stack));
                self.frame_state.reset();
                self.activity.add_entry("Load TIFF", &msg);
                self.status_message = format!("Loaded {}", msg);
                self.after_change();
            }
            Err(e) => self.fail("TIFF load", e),
        }
    }

    // ── Session persistence ──

    fn save_session(&mut self, path: &Path) {
        match snapshot::write_snapshot_file(path, &self.session.snapshot()) {
            Ok(()) => {
                self.activity
                    .add_entry("Save Session", &path.display().to_string());
                self.config.last_session_path = Some(path.to_path_buf());
                if let Err(e) = self.config.save() {
                    log::warn!("Could not save settings: {}", e);
                }
                self.status_message = format!("Session saved: {}", path.display());
            }
            Err(e) => self.fail("Session save", e),
        }
    }

    /// The live session is replaced only once the snapshot parsed and validated.
    fn load_session(&mut self, path: &Path) {
        match snapshot::read_snapshot_file(path) {
            Ok(state) => {
                self.apply_snapshot(state);
                self.activity
                    .add_entry("Load Session", &path.display().to_string());
                self.config.last_session_path = Some(path.to_path_buf());
                if let Err(e) = self.config.save() {
                    log::warn!("Could not save settings: {}", e);
                }
                self.status_message = format!("Session loaded: {}", path.display());
            }
            Err(e) => self.fail("Session load", e),
        }
    }

    fn restore_last_session(&mut self) {
        let Some(path) = AppConfig::last_session_file() else {
            return;
        };
        if !path.exists() {
            return;
        }
        match snapshot::read_snapshot_file(&path) {
            Ok(state) => {
                self.apply_snapshot(state);
                self.activity.add_entry("Restore", &path.display().to_string());
                self.status_message = "Restored previous session".to_string();
            }
            Err(e) => log::warn!("Ignoring last session {}: {}", path.display(), e),
        }
    }

    fn apply_snapshot(&mut self, state: SessionState) {
        self.session = Session::restore(state);
        if let Some(source) = &self.session.trace.source_path {
            self.activity.set_source(&source.display().to_string());
        }
        self.reopen_stack();
        self.trace_view = TraceViewState::default();
        self.table_state = EventTableState::default();
    }

    /// A missing stack is not fatal: the session keeps its path and runs without frames.
    fn reopen_stack(&mut self) {
        self.frame_state.reset();
        let Some(path) = self.session.stack_path.clone() else {
            return;
        };
        match FrameStack::read_file(&path, self.config.max_frames) {
            Ok(stack) => self.session.set_stack(Some(stack)),
            Err(e) => {
                log::warn!("Could not reopen image stack {}: {}", path.display(), e);
                self.status_message = format!("⚠ Image stack unavailable: {}", e);
            }
        }
    }

    /// Runs after every successful mutation of the session.
    fn after_change(&mut self) {
        self.table_state.clamp_to(self.session.rows().len());
        if self
            .trace_view
            .selected_event
            .is_some_and(|i| i >= self.session.events.len())
        {
            self.trace_view.selected_event = None;
        }
        self.auto_save();
    }

    /// Event CSV next to the trace and the last-session snapshot. Failures warn only.
    fn auto_save(&mut self) {
        if self.config.auto_export && !self.session.trace.is_empty() {
            if let Some(trace_path) = &self.session.trace.source_path {
                let out = table_export::auto_export_path(trace_path);
                if let Err(e) = table_export::write_rows_csv(&out, self.session.rows()) {
                    log::warn!("Auto-export to {} failed: {}", out.display(), e);
                    self.status_message = format!("⚠ Auto-export failed: {}", e);
                }
            }
        }

        if let Some(path) = AppConfig::last_session_file() {
            let result = path
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .map_err(SessionSaveError::from)
                .and_then(|()| snapshot::write_snapshot_file(&path, &self.session.snapshot()));
            if let Err(e) = result {
                log::warn!("Auto-save to {} failed: {}", path.display(), e);
            }
        }
    }

    // ── Edits ──

    fn undo(&mut self) {
        match self.session.undo() {
            Ok(edit) => {
                let what = edit.describe();
                self.activity.add_entry("Undo", &what);
                self.status_message = format!("Undone: {}", what);
                self.after_change();
            }
            Err(e) => self.status_message = e.to_string(),
        }
    }

    fn select_event(&mut self, index: usize) {
        self.table_state.selected = Some(index);
        self.trace_view.selected_event = Some(index);
        // Offer the pin closest to the row for "replace with pin"
        if let Some(row) = self.session.rows().get(index) {
            if let Some((id, _)) = self.session.pins.find_nearest(row.time, row.diameter) {
                self.table_state.selected_pin = Some(id);
            }
        }
        let interval = self.session.frame_interval_s;
        let position = match (self.session.stack(), self.session.events.get(index)) {
            (Some(stack), Some(event)) => stack.position_near(event.time, interval),
            _ => None,
        };
        if let Some(position) = position {
            self.frame_state.seek(position);
        }
    }

    fn handle_table_action(&mut self, action: EventTableAction) {
        match action {
            EventTableAction::Select(index) => self.select_event(index),
            EventTableAction::ReplaceValue { index, value } => {
                match self.session.replace_value(index, value) {
                    Ok(old) => {
                        self.activity.add_entry(
                            "Edit Value",
                            &format!("row {}: {:.2} → {:.2} µm", index + 1, old, value),
                        );
                        self.status_message = format!("Row {} set to {:.2} µm", index + 1, value);
                        self.after_change();
                    }
                    Err(e) => self.fail("Edit", e),
                }
            }
            EventTableAction::ClearOverride(index) => match self.session.clear_override(index) {
                Ok(()) => {
                    self.activity
                        .add_entry("Clear Value", &format!("row {} back to trace", index + 1));
                    self.after_change();
                }
                Err(e) => self.fail("Clear value", e),
            },
            EventTableAction::Rename { index, label } => {
                match self.session.rename_event(index, label.clone()) {
                    Ok(old) => {
                        self.activity
                            .add_entry("Rename Event", &format!("{:?} → {:?}", old, label));
                        self.after_change();
                    }
                    Err(e) => self.fail("Rename", e),
                }
            }
            EventTableAction::Delete(index) => match self.session.delete_event(index) {
                Ok(event) => {
                    self.activity.add_entry(
                        "Delete Event",
                        &format!("{:?} at {:.2} s", event.label, event.time),
                    );
                    self.table_state.selected = None;
                    self.trace_view.selected_event = None;
                    self.status_message = format!("Deleted {:?}", event.label);
                    self.after_change();
                }
                Err(e) => self.fail("Delete", e),
            },
            EventTableAction::ReplaceWithPin { pin, index } => {
                match self.session.replace_event_value_with_pin(pin, index) {
                    Ok(old) => {
                        let new = self
                            .session
                            .rows()
                            .get(index)
                            .map(|r| r.diameter)
                            .unwrap_or(old);
                        self.activity.add_entry(
                            "Replace With Pin",
                            &format!("row {}: {:.2} → {:.2} µm", index + 1, old, new),
                        );
                        self.status_message =
                            format!("Row {} now {:.2} µm (from pin)", index + 1, new);
                        self.after_change();
                    }
                    Err(e) => self.fail("Replace with pin", e),
                }
            }
            EventTableAction::PromotePin { pin, index, label } => {
                match self.session.promote_pin(pin, index, label) {
                    Ok(row) => {
                        self.activity.add_entry(
                            "Promote Pin",
                            &format!(
                                "{:?} at {:.2} s = {:.2} µm (row {})",
                                row.label,
                                row.time,
                                row.diameter,
                                index + 1
                            ),
                        );
                        self.table_state.selected = Some(index);
                        self.trace_view.selected_event = Some(index);
                        self.status_message = format!("Added event {:?}", row.label);
                        self.after_change();
                    }
                    Err(e) => self.fail("Insert pin", e),
                }
            }
            EventTableAction::RemovePin(id) => {
                if let Some(pin) = self.session.remove_pin(id) {
                    self.activity.add_entry(
                        "Remove Pin",
                        &format!("{:.2} s, {:.2} µm", pin.time, pin.diameter),
                    );
                    self.status_message = "Pin removed".to_string();
                    self.after_change();
                }
            }
            EventTableAction::Undo => self.undo(),
            EventTableAction::InvalidValue(text) => {
                self.status_message = format!("Not a number: {:?}", text);
            }
            EventTableAction::None => {}
        }
    }

    fn handle_plot_action(&mut self, action: TraceViewAction) {
        match action {
            TraceViewAction::AddPin(time) => match self.session.add_pin(time) {
                Ok(id) => {
                    if let Some(pin) = self.session.pins.get(id) {
                        let msg = format!("{:.2} s, {:.2} µm", pin.time, pin.diameter);
                        self.activity.add_entry("Add Pin", &msg);
                        self.status_message = format!("📍 Pin at {}", msg);
                    }
                    self.after_change();
                }
                Err(e) => self.fail("Pin", e),
            },
            TraceViewAction::RemovePinAt { click, transform } => {
                let removed = self.session.pins.remove_near(
                    (click.x as f64, click.y as f64),
                    self.config.pin_tolerance_px,
                    |t, d| trace_view::to_screen(&transform, t, d),
                );
                if let Some(pin) = removed {
                    self.activity.add_entry(
                        "Remove Pin",
                        &format!("{:.2} s, {:.2} µm", pin.time, pin.diameter),
                    );
                    self.status_message = "Pin removed".to_string();
                    self.after_change();
                }
            }
            TraceViewAction::None => {}
        }
    }

    // ── Exports ──

    fn export_csv(&mut self, path: &Path) {
        match table_export::write_rows_csv(path, self.session.rows()) {
            Ok(()) => {
                self.activity.add_entry(
                    "Export CSV",
                    &format!("{} rows to {}", self.session.rows().len(), path.display()),
                );
                self.status_message = format!("✅ Exported: {}", path.display());
            }
            Err(e) => self.fail("CSV export", e),
        }
    }

    fn export_image(&mut self, path: &Path, settings: &ImageExportSettings) {
        if self.session.trace.is_empty() {
            self.fail("Image export", DataUnavailable("Trace"));
            return;
        }
        let window = if self.style_dialog.use_view_window {
            self.session.view.window
        } else {
            None
        };
        let render = PlotRender {
            trace: &self.session.trace,
            events: self.session.events.as_slice(),
            pins: self.session.pins.as_slice(),
            window,
            selected_event: self.trace_view.selected_event,
        };
        let result: Result<(), ExportError> = plot_image::save_plot_png(path, &render, settings);
        match result {
            Ok(()) => {
                self.activity.add_entry(
                    "Export Image",
                    &format!("{}x{} to {}", settings.width, settings.height, path.display()),
                );
                self.status_message = format!("✅ Image exported: {}", path.display());
            }
            Err(e) => self.fail("Image export", e),
        }
    }

    fn refresh_mapping_hint(&mut self) {
        let hint = match &self.mapping_dialog.mapper {
            Some(mapper) => match mapper.describe_next() {
                Ok(hint) => hint,
                Err(e) => {
                    log::warn!("Cannot read workbook hint: {}", e);
                    None
                }
            },
            None => None,
        };
        self.mapping_dialog.next_hint = hint;
        self.mapping_dialog.next_event = self
            .mapping_dialog
            .mapper
            .as_ref()
            .map_or(0, |m| m.history().len());
    }

    fn handle_mapping_action(&mut self, action: MappingAction) {
        match action {
            MappingAction::ChooseWorkbook => {
                if let Some(path) = toolbar::open_workbook_dialog() {
                    match Workbook::open(&path) {
                        Ok(workbook) => {
                            self.status_message = format!(
                                "Workbook {} (sheet {:?})",
                                path.display(),
                                workbook.sheet_name
                            );
                            self.mapping_dialog.workbook_path = Some(path);
                            self.mapping_dialog.mapper = None;
                        }
                        Err(e) => self.fail("Open workbook", e),
                    }
                }
            }
            MappingAction::WriteAll => {
                let Some(path) = self.mapping_dialog.workbook_path.clone() else {
                    return;
                };
                let values: Vec<CellValue> = self
                    .session
                    .rows()
                    .iter()
                    .map(|r| CellValue::Number(r.diameter))
                    .collect();
                let column = self.mapping_dialog.column.trim().to_uppercase();
                let start_row = self.mapping_dialog.start_row;
                match spreadsheet::write_column(&path, &column, start_row, &values) {
                    Ok(edits) => {
                        let range = match (edits.first(), edits.last()) {
                            (Some(a), Some(b)) => format!("{}..{}", a.cell, b.cell),
                            _ => "nothing".to_string(),
                        };
                        self.activity.add_entry(
                            "Export Excel",
                            &format!("{} values to {} {}", edits.len(), path.display(), range),
                        );
                        self.status_message = format!("✅ Wrote {} to {}", range, path.display());
                    }
                    Err(e) => self.fail("Excel export", e),
                }
            }
            MappingAction::Start => {
                if let (Some(path), Some(column)) = (
                    self.mapping_dialog.workbook_path.clone(),
                    self.mapping_dialog.column_number(),
                ) {
                    self.mapping_dialog.mapper =
                        Some(ColumnMapper::new(path, column, self.mapping_dialog.start_row));
                    self.refresh_mapping_hint();
                }
            }
            MappingAction::Assign(index) => {
                let Some(row) = self.session.rows().get(index).cloned() else {
                    return;
                };
                let Some(mapper) = self.mapping_dialog.mapper.as_mut() else {
                    return;
                };
                match mapper.assign(CellValue::Number(row.diameter)) {
                    Ok(cell) => {
                        self.activity.add_entry(
                            "Excel Cell",
                            &format!("{} = {:.2} ({})", cell, row.diameter, row.label),
                        );
                        self.status_message = format!("{} ← {:.2} µm", cell, row.diameter);
                        self.refresh_mapping_hint();
                    }
                    Err(e) => self.fail("Excel write", e),
                }
            }
            MappingAction::Skip => {
                if let Some(mapper) = self.mapping_dialog.mapper.as_mut() {
                    mapper.skip();
                }
                self.refresh_mapping_hint();
            }
            MappingAction::Undo => {
                let Some(mapper) = self.mapping_dialog.mapper.as_mut() else {
                    return;
                };
                match mapper.undo_last() {
                    Ok(Some(cell)) => {
                        self.activity.add_entry("Excel Undo", &format!("restored {}", cell));
                        self.status_message = format!("Restored {}", cell);
                        self.refresh_mapping_hint();
                    }
                    Ok(None) => {}
                    Err(e) => self.fail("Excel undo", e),
                }
            }
            MappingAction::Close => {
                self.mapping_dialog.open = false;
                self.mapping_dialog.mapper = None;
            }
            MappingAction::None => {}
        }
    }

    fn handle_style_action(&mut self, action: StyleAction) {
        match action {
            StyleAction::Apply => {
                self.session.style = self.style_dialog.style.clone();
                self.activity.add_entry("Plot Style", "updated fonts and line widths");
                self.status_message = "Plot style applied".to_string();
                self.after_change();
            }
            StyleAction::ExportImage => {
                self.session.style = self.style_dialog.style.clone();
                if let Some(path) = toolbar::save_image_dialog() {
                    let settings = self.style_dialog.export_settings();
                    self.export_image(&path, &settings);
                    self.style_dialog.open = false;
                }
            }
            StyleAction::Cancel => self.style_dialog.open = false,
            StyleAction::None => {}
        }
    }

    /// Handle toolbar actions
    fn handle_toolbar_action(&mut self, action: ToolbarAction) {
        match action {
            ToolbarAction::OpenTrace => {
                if let Some(path) = toolbar::open_trace_dialog() {
                    self.open_trace(&path);
                }
            }
            ToolbarAction::OpenEvents => {
                if let Some(path) = toolbar::open_events_dialog() {
                    self.open_events(&path);
                }
            }
            ToolbarAction::OpenStack => {
                if let Some(path) = toolbar::open_stack_dialog() {
                    self.open_stack(&path);
                }
            }
            ToolbarAction::SaveSession => {
                if let Some(path) = toolbar::save_session_dialog() {
                    self.save_session(&path);
                }
            }
            ToolbarAction::LoadSession => {
                if let Some(path) = toolbar::load_session_dialog() {
                    self.load_session(&path);
                }
            }
            ToolbarAction::ExportCsv => {
                if let Some(path) = toolbar::save_csv_dialog(self.session.trace.source_path.as_deref())
                {
                    self.export_csv(&path);
                }
            }
            ToolbarAction::ExportImage | ToolbarAction::StyleDialog => {
                self.style_dialog
                    .open_with(&self.session.style, self.session.view.show_grid);
            }
            ToolbarAction::MapToExcel => {
                self.mapping_dialog.open = true;
            }
            ToolbarAction::ExportLog => {
                if let Some(path) = toolbar::save_log_dialog() {
                    self.save_log(&path);
                }
            }
            ToolbarAction::Undo => self.undo(),
            ToolbarAction::ZoomReset => {
                self.session.view.window = None;
                self.trace_view.reset_view = true;
                self.status_message = "Zoom reset".to_string();
            }
            ToolbarAction::ToggleGrid => {
                self.session.view.show_grid = !self.session.view.show_grid;
            }
            ToolbarAction::ThemeToggle => {
                self.current_theme = self.current_theme.next();
                self.theme_colors = ThemeColors::from_theme(self.current_theme);
                // Applied on the next frame in update()
            }
            ToolbarAction::ShowLog => self.show_log_window = true,
            ToolbarAction::ShowAbout => self.show_about = true,
            ToolbarAction::None => {}
        }
    }

    fn save_log(&mut self, path: &Path) {
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let result = if is_json {
            self.activity.save_json(path)
        } else {
            self.activity.save_text(path)
        };
        match result {
            Ok(()) => self.status_message = format!("Log saved: {}", path.display()),
            Err(e) => self.fail("Log export", e),
        }
    }
}

impl eframe::App for VasoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ── Re-apply theme each frame (ensures toggle takes effect) ──
        theme::apply_theme(ctx, self.current_theme);

        // Handle drag-and-drop
        ctx.input(|i| {
            for file in &i.raw.dropped_files {
                if let Some(path) = &file.path {
                    self.dropped_files.push(path.clone());
                }
            }
        });
        for path in std::mem::take(&mut self.dropped_files) {
            self.load_path(path);
        }

        // Keyboard shortcuts, skipped while a text field has focus
        if !ctx.wants_keyboard_input() {
            let (undo, open) = ctx.input(|i| {
                let cmd = i.modifiers.command;
                (
                    cmd && i.key_pressed(egui::Key::Z),
                    cmd && i.key_pressed(egui::Key::O),
                )
            });
            if undo {
                self.undo();
            }
            if open {
                if let Some(path) = toolbar::open_trace_dialog() {
                    self.open_trace(&path);
                }
            }
        }

        // ── Dialogs ──
        let style_action = style_dialog::show_style_dialog(ctx, &mut self.style_dialog);
        self.handle_style_action(style_action);

        let mapping_action = mapping_dialog::show_mapping_dialog(
            ctx,
            &mut self.mapping_dialog,
            self.session.rows(),
            &self.theme_colors,
        );
        self.handle_mapping_action(mapping_action);

        // ── Toolbar ──
        let toolbar_action = toolbar::show_toolbar(
            ctx,
            self.current_theme.label(),
            self.session.can_undo(),
            self.session.last_edit().map(|e| e.describe()),
        );
        if toolbar_action != ToolbarAction::None {
            self.handle_toolbar_action(toolbar_action);
        }

        // ── Status Bar ──
        let tc = &self.theme_colors;
        egui::TopBottomPanel::bottom("status_bar")
            .frame(
                egui::Frame::new()
                    .fill(tc.status_bar_bg)
                    .inner_margin(egui::Margin::symmetric(12, 4)),
            )
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(
                        egui::RichText::new(&self.status_message)
                            .size(11.5)
                            .color(tc.status_text),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("📋 Log").clicked() {
                            self.show_log_window = !self.show_log_window;
                        }
                        ui.label(
                            egui::RichText::new(format!("{} ops", self.activity.len()))
                                .size(11.0)
                                .color(tc.text_muted),
                        );
                        ui.separator();
                        ui.label(
                            egui::RichText::new(format!(
                                "{} events | {} pins | undo {}",
                                self.session.events.len(),
                                self.session.pins.len(),
                                self.session.undo_depth()
                            ))
                            .size(11.0)
                            .color(tc.text_muted),
                        );
                        if self.session.stack().is_some() {
                            ui.separator();
                            ui.label(
                                egui::RichText::new(format!(
                                    "{:.3} s/frame",
                                    self.session.frame_interval_s
                                ))
                                .size(11.0)
                                .color(tc.text_muted),
                            );
                        }
                    });
                });
            });

        // ── Right Panel: event table above, frames below ──
        let mut table_action = EventTableAction::None;
        let mut frame_time = None;
        let mut interval = self.session.frame_interval_s;
        let unavailable = (self.session.rows().is_empty() && !self.session.events.is_empty())
            .then_some("Load a trace to compute diameters");
        egui::SidePanel::right("side_panel")
            .resizable(true)
            .default_width(400.0)
            .min_width(300.0)
            .show(ctx, |ui| {
                egui::TopBottomPanel::bottom("frame_panel")
                    .resizable(true)
                    .default_height(360.0)
                    .show_inside(ui, |ui| {
                        frame_time = frame_viewer::show_frame_viewer(
                            ui,
                            self.session.stack(),
                            &mut interval,
                            &mut self.frame_state,
                            &self.theme_colors,
                        );
                    });
                egui::CentralPanel::default().show_inside(ui, |ui| {
                    table_action = event_table::show_event_table(
                        ui,
                        self.session.rows(),
                        &self.session.pins,
                        self.session.can_undo(),
                        unavailable,
                        &mut self.table_state,
                        &self.theme_colors,
                    );
                });
            });
        self.trace_view.frame_time = frame_time;
        if interval != self.session.frame_interval_s {
            self.session.set_frame_interval(interval);
            self.config.frame_interval_s = self.session.frame_interval_s;
            self.after_change();
        }

        // ── Central Panel: trace plot ──
        let mut plot_action = TraceViewAction::None;
        let mut view = self.session.view.clone();
        egui::CentralPanel::default().show(ctx, |ui| {
            let plot = TracePlot {
                trace: &self.session.trace,
                events: self.session.events.as_slice(),
                pins: &self.session.pins,
                style: &self.session.style,
            };
            plot_action = trace_view::show_trace_plot(
                ui,
                &plot,
                &mut view,
                &mut self.trace_view,
                &self.theme_colors,
            );
        });
        self.session.view = view;

        self.handle_table_action(table_action);
        self.handle_plot_action(plot_action);

        // ── Log Window ──
        if self.show_log_window {
            let mut save_to: Option<PathBuf> = None;
            egui::Window::new("📋 Activity Log")
                .open(&mut self.show_log_window)
                .default_size([600.0, 400.0])
                .resizable(true)
                .show(ctx, |ui| {
                    if ui.button("💾 Save…").clicked() {
                        save_to = toolbar::save_log_dialog();
                    }
                    ui.separator();
                    if self.activity.is_empty() {
                        ui.label(egui::RichText::new("No operations yet").italics());
                        return;
                    }
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        ui.style_mut().override_font_id = Some(egui::FontId::monospace(12.0));
                        for entry in self.activity.recent(500) {
                            ui.label(entry.to_text());
                        }
                    });
                });
            if let Some(path) = save_to {
                self.save_log(&path);
            }
        }

        // ── About Dialog ──
        if self.show_about {
            egui::Window::new("About")
                .open(&mut self.show_about)
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.heading("🩸 Vessel Diameter Viewer");
                    ui.label(format!("Version {}", env!("CARGO_PKG_VERSION")));
                    ui.add_space(10.0);
                    ui.label("Built with Rust + egui");
                    ui.add_space(10.0);
                    ui.label("Features:");
                    ui.label("• Diameter traces with event markers");
                    ui.label("• Pins, manual values and undo");
                    ui.label("• TIFF stack viewer synchronized to the trace");
                    ui.label("• CSV, Excel and PNG export");
                    ui.label("• Session snapshots and activity log");
                });
        }
    }
}
