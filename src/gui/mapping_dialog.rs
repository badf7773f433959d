/// Excel mapping dialog: write event diameters into one column of an
/// existing workbook, either all at once or row by row

use std::path::PathBuf;

use crate::data::reconcile::EventRow;
use crate::export::spreadsheet::{column_index, ColumnMapper, DEFAULT_START_ROW};

use super::theme::ThemeColors;

#[derive(Debug, Clone)]
pub struct MappingDialogState {
    pub open: bool,
    pub workbook_path: Option<PathBuf>,
    /// Target column letters, e.g. "C"
    pub column: String,
    pub start_row: u32,
    /// Live row-by-row session, started on demand
    pub mapper: Option<ColumnMapper>,
    /// Event row offered for the next assignment
    pub next_event: usize,
    /// Column-A text of the next target row
    pub next_hint: Option<String>,
}

impl Default for MappingDialogState {
    fn default() -> Self {
        Self {
            open: false,
            workbook_path: None,
            column: "C".to_string(),
            start_row: DEFAULT_START_ROW,
            mapper: None,
            next_event: 0,
            next_hint: None,
        }
    }
}

impl MappingDialogState {
    pub fn column_number(&self) -> Option<u32> {
        column_index(self.column.trim())
    }
}

/// Action from the mapping dialog
#[derive(Debug, Clone, PartialEq)]
pub enum MappingAction {
    None,
    ChooseWorkbook,
    WriteAll,
    Start,
    /// Write this event row's value into the next cell
    Assign(usize),
    Skip,
    Undo,
    Close,
}

/// Show the mapping dialog. Returns the action taken.
pub fn show_mapping_dialog(
    ctx: &egui::Context,
    state: &mut MappingDialogState,
    rows: &[EventRow],
    colors: &ThemeColors,
) -> MappingAction {
    if !state.open {
        return MappingAction::None;
    }

    let mut action = MappingAction::None;
    let mut keep_open = true;

    egui::Window::new("📊 Map Diameters to Excel")
        .open(&mut keep_open)
        .collapsible(false)
        .resizable(false)
        .default_width(420.0)
        .show(ctx, |ui| {
            // ── Target ──
            ui.group(|ui| {
                ui.horizontal(|ui| {
                    ui.label("Workbook:");
                    let name = state
                        .workbook_path
                        .as_ref()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "none".to_string());
                    ui.label(egui::RichText::new(name).strong());
                    if ui.button("📂 Choose…").clicked() {
                        action = MappingAction::ChooseWorkbook;
                    }
                });
                ui.horizontal(|ui| {
                    ui.label("Column:");
                    ui.add(
                        egui::TextEdit::singleline(&mut state.column)
                            .desired_width(40.0)
                            .interactive(state.mapper.is_none()),
                    );
                    ui.label("Start row:");
                    ui.add_enabled(
                        state.mapper.is_none(),
                        egui::DragValue::new(&mut state.start_row).range(1..=1_048_576),
                    );
                });
                if state.column_number().is_none() {
                    ui.colored_label(colors.error, "Column must be letters A–XFD");
                }
            });

            let ready = state.workbook_path.is_some() && state.column_number().is_some();

            ui.add_space(4.0);

            // ── Batch ──
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(
                        ready && !rows.is_empty() && state.mapper.is_none(),
                        egui::Button::new(format!("⬇ Write all {} values", rows.len())),
                    )
                    .clicked()
                {
                    action = MappingAction::WriteAll;
                }
                if ui
                    .add_enabled(ready && state.mapper.is_none(), egui::Button::new("▶ Row by row"))
                    .clicked()
                {
                    action = MappingAction::Start;
                }
            });

            // ── Row by row ──
            if let Some(mapper) = &state.mapper {
                ui.separator();
                let cell = mapper.next_cell();
                ui.horizontal(|ui| {
                    ui.label("Next cell:");
                    ui.label(egui::RichText::new(cell.to_string()).strong().color(colors.accent));
                    if let Some(hint) = &state.next_hint {
                        ui.label(egui::RichText::new(format!("({})", hint)).italics());
                    }
                });

                match rows.get(state.next_event) {
                    Some(row) => {
                        ui.label(format!(
                            "Event {} of {}: {} → {:.2} µm",
                            state.next_event + 1,
                            rows.len(),
                            row.label,
                            row.diameter
                        ));
                    }
                    None => {
                        ui.label(
                            egui::RichText::new("All events written")
                                .color(colors.success),
                        );
                    }
                }

                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(
                            state.next_event < rows.len(),
                            egui::Button::new("✔ Assign"),
                        )
                        .clicked()
                    {
                        action = MappingAction::Assign(state.next_event);
                    }
                    if ui.button("⏭ Skip row").clicked() {
                        action = MappingAction::Skip;
                    }
                    if ui
                        .add_enabled(mapper.can_undo(), egui::Button::new("↩ Undo last"))
                        .clicked()
                    {
                        action = MappingAction::Undo;
                    }
                });
                ui.label(
                    egui::RichText::new(format!("{} cells written", mapper.history().len()))
                        .size(11.0)
                        .color(colors.text_muted),
                );
            }

            ui.add_space(8.0);
            if ui.button("Close").clicked() {
                action = MappingAction::Close;
            }
        });

    if !keep_open {
        action = MappingAction::Close;
    }
    action
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_are_validated() {
        let mut state = MappingDialogState::default();
        assert_eq!(state.column_number(), Some(3));
        state.column = " ab ".into();
        assert_eq!(state.column_number(), Some(28));
        state.column = "3".into();
        assert_eq!(state.column_number(), None);
    }
}
