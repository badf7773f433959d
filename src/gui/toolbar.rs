/// Toolbar: top menu bar with file operations and quick actions

use std::path::{Path, PathBuf};

/// Actions that can be triggered from the toolbar
#[derive(Debug, Clone, PartialEq)]
pub enum ToolbarAction {
    None,
    OpenTrace,
    OpenEvents,
    OpenStack,
    SaveSession,
    LoadSession,
    ExportCsv,
    ExportImage,
    MapToExcel,
    ExportLog,
    Undo,
    ZoomReset,
    ToggleGrid,
    StyleDialog,
    ThemeToggle,
    ShowLog,
    ShowAbout,
}

/// Render the toolbar and return any triggered action
pub fn show_toolbar(
    ctx: &egui::Context,
    theme_label: &str,
    can_undo: bool,
    undo_hint: Option<String>,
) -> ToolbarAction {
    let mut action = ToolbarAction::None;

    egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            // File menu
            ui.menu_button("📁 File", |ui| {
                if ui.button("📈 Open Trace…").clicked() {
                    action = ToolbarAction::OpenTrace;
                    ui.close_menu();
                }
                if ui.button("🏷 Open Events…").clicked() {
                    action = ToolbarAction::OpenEvents;
                    ui.close_menu();
                }
                if ui.button("🖼 Open TIFF Stack…").clicked() {
                    action = ToolbarAction::OpenStack;
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("💾 Save Session…").clicked() {
                    action = ToolbarAction::SaveSession;
                    ui.close_menu();
                }
                if ui.button("📂 Load Session…").clicked() {
                    action = ToolbarAction::LoadSession;
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("📄 Export Event CSV…").clicked() {
                    action = ToolbarAction::ExportCsv;
                    ui.close_menu();
                }
                if ui.button("🖼 Export Plot Image…").clicked() {
                    action = ToolbarAction::ExportImage;
                    ui.close_menu();
                }
                if ui.button("📊 Map to Excel…").clicked() {
                    action = ToolbarAction::MapToExcel;
                    ui.close_menu();
                }
                if ui.button("📋 Export Log…").clicked() {
                    action = ToolbarAction::ExportLog;
                    ui.close_menu();
                }
            });

            // Edit menu
            ui.menu_button("✏️ Edit", |ui| {
                let label = match &undo_hint {
                    Some(hint) => format!("↩ Undo {}", hint),
                    None => "↩ Undo".to_string(),
                };
                if ui.add_enabled(can_undo, egui::Button::new(label)).clicked() {
                    action = ToolbarAction::Undo;
                    ui.close_menu();
                }
            });

            // View menu
            ui.menu_button("🔍 View", |ui| {
                if ui.button("🔄 Reset Zoom").clicked() {
                    action = ToolbarAction::ZoomReset;
                    ui.close_menu();
                }
                if ui.button("▦ Toggle Grid").clicked() {
                    action = ToolbarAction::ToggleGrid;
                    ui.close_menu();
                }
                if ui.button("🔤 Plot Style…").clicked() {
                    action = ToolbarAction::StyleDialog;
                    ui.close_menu();
                }
                if ui.button("📋 Activity Log").clicked() {
                    action = ToolbarAction::ShowLog;
                    ui.close_menu();
                }
                ui.separator();
                if ui.button(format!("🎨 Theme: {}", theme_label)).clicked() {
                    action = ToolbarAction::ThemeToggle;
                    ui.close_menu();
                }
            });

            // Help menu
            ui.menu_button("❓ Help", |ui| {
                if ui.button("ℹ About").clicked() {
                    action = ToolbarAction::ShowAbout;
                    ui.close_menu();
                }
            });

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui
                    .add(
                        egui::Button::new(egui::RichText::new(theme_label).size(12.0))
                            .corner_radius(12.0),
                    )
                    .clicked()
                {
                    action = ToolbarAction::ThemeToggle;
                }
                ui.separator();
                ui.label(
                    egui::RichText::new("Vessel Diameter Viewer")
                        .color(egui::Color32::from_rgb(0x70, 0x75, 0x80))
                        .size(12.0),
                );
            });
        });
    });

    action
}

/// Show file-open dialog for a diameter trace
pub fn open_trace_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Open Diameter Trace")
        .add_filter("Trace table", &["csv", "txt", "tsv"])
        .add_filter("All Files", &["*"])
        .pick_file()
}

/// Show file-open dialog for an event table
pub fn open_events_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Open Event Table")
        .add_filter("Event table", &["csv", "txt", "tsv"])
        .add_filter("All Files", &["*"])
        .pick_file()
}

pub fn open_stack_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Open TIFF Stack")
        .add_filter("TIFF", &["tif", "tiff"])
        .pick_file()
}

pub fn save_session_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Save Session")
        .set_file_name("session.json")
        .add_filter("Session", &["json"])
        .save_file()
}

pub fn load_session_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Load Session")
        .add_filter("Session", &["json"])
        .pick_file()
}

/// Show save dialog for the event CSV, starting next to the trace file
pub fn save_csv_dialog(near: Option<&Path>) -> Option<PathBuf> {
    let mut dialog = rfd::FileDialog::new()
        .set_title("Export Event Diameters")
        .set_file_name(crate::export::table::AUTO_EXPORT_FILE_NAME)
        .add_filter("CSV (comma-separated)", &["csv"]);
    if let Some(dir) = near.and_then(Path::parent) {
        dialog = dialog.set_directory(dir);
    }
    dialog.save_file()
}

/// Show save dialog for image export
pub fn save_image_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Export Plot Image")
        .set_file_name("trace.png")
        .add_filter("PNG Image", &["png"])
        .save_file()
}

pub fn open_workbook_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Choose Excel Workbook")
        .add_filter("Excel Workbook", &["xlsx"])
        .pick_file()
}

/// Show save dialog for log export
pub fn save_log_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Export Activity Log")
        .add_filter("Text File", &["txt"])
        .add_filter("JSON", &["json"])
        .save_file()
}
