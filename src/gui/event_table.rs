/// Event table: one row per event with its derived diameter, plus the
/// controls that edit events and turn pins into values

use egui_extras::{Column, TableBuilder};

use crate::data::pins::{PinId, PinStore};
use crate::data::reconcile::EventRow;

use super::theme::ThemeColors;

#[derive(Debug, Clone, Default)]
pub struct EventTableState {
    pub selected: Option<usize>,
    /// Row whose diameter is being typed, with the text so far
    pub editing_value: Option<(usize, String)>,
    /// Row whose label is being typed
    pub editing_label: Option<(usize, String)>,
    pub selected_pin: Option<PinId>,
    /// Label given to a promoted pin
    pub new_label: String,
}

impl EventTableState {
    /// Forget row-bound state after the rows changed shape.
    pub fn clamp_to(&mut self, row_count: usize) {
        if self.selected.is_some_and(|i| i >= row_count) {
            self.selected = None;
        }
        self.editing_value = None;
        self.editing_label = None;
    }
}

/// Action from the event table
#[derive(Debug, Clone, PartialEq)]
pub enum EventTableAction {
    None,
    Select(usize),
    ReplaceValue { index: usize, value: f64 },
    ClearOverride(usize),
    Rename { index: usize, label: String },
    Delete(usize),
    ReplaceWithPin { pin: PinId, index: usize },
    PromotePin { pin: PinId, index: usize, label: String },
    RemovePin(PinId),
    Undo,
    /// Typed text that is not a finite number
    InvalidValue(String),
}

/// Row at which an event at `time` keeps the table in time order.
pub fn insert_position(rows: &[EventRow], time: f64) -> usize {
    rows.iter().position(|r| r.time > time).unwrap_or(rows.len())
}

/// Parse a typed diameter.
pub fn parse_value(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Show the event table. `unavailable` explains why rows are missing.
pub fn show_event_table(
    ui: &mut egui::Ui,
    rows: &[EventRow],
    pins: &PinStore,
    can_undo: bool,
    unavailable: Option<&str>,
    state: &mut EventTableState,
    colors: &ThemeColors,
) -> EventTableAction {
    let mut action = EventTableAction::None;

    ui.heading("Events");
    ui.add_space(4.0);

    // ── Row actions ──
    ui.horizontal(|ui| {
        if ui.add_enabled(can_undo, egui::Button::new("↩ Undo")).clicked() {
            action = EventTableAction::Undo;
        }
        let selected = state.selected.filter(|&i| i < rows.len());
        if ui
            .add_enabled(selected.is_some(), egui::Button::new("🗑 Delete"))
            .clicked()
        {
            if let Some(i) = selected {
                action = EventTableAction::Delete(i);
            }
        }
    });

    // ── Pins → events ──
    if state.selected_pin.is_some_and(|id| pins.get(id).is_none()) {
        state.selected_pin = None;
    }
    ui.group(|ui| {
        ui.label(format!("📍 Pins ({})", pins.len()));
        let current = state
            .selected_pin
            .and_then(|id| pins.get(id))
            .map(|p| format!("{:.2} s  {:.2} µm", p.time, p.diameter))
            .unwrap_or_else(|| "choose a pin".to_string());
        egui::ComboBox::from_id_salt("pin_picker")
            .selected_text(current)
            .show_ui(ui, |ui| {
                for pin in pins.iter() {
                    ui.selectable_value(
                        &mut state.selected_pin,
                        Some(pin.id),
                        format!("{:.2} s  {:.2} µm", pin.time, pin.diameter),
                    );
                }
            });

        let pin = state.selected_pin.and_then(|id| pins.get(id)).copied();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(pin.is_some(), egui::Button::new("🗑 Remove pin"))
                .clicked()
            {
                if let Some(pin) = pin {
                    action = EventTableAction::RemovePin(pin.id);
                }
            }
            ui.label("Label:");
            ui.add(
                egui::TextEdit::singleline(&mut state.new_label)
                    .hint_text("Pin")
                    .desired_width(90.0),
            );
            if ui
                .add_enabled(pin.is_some(), egui::Button::new("➕ Insert"))
                .on_hover_text("Add the pin as a new event, in time order")
                .clicked()
            {
                if let Some(pin) = pin {
                    let label = match state.new_label.trim() {
                        "" => "Pin".to_string(),
                        text => text.to_string(),
                    };
                    action = EventTableAction::PromotePin {
                        pin: pin.id,
                        index: insert_position(rows, pin.time),
                        label,
                    };
                }
            }
        });
        let target = state.selected.filter(|&i| i < rows.len());
        if ui
            .add_enabled(
                pin.is_some() && target.is_some(),
                egui::Button::new("⇄ Replace selected value with pin"),
            )
            .clicked()
        {
            if let (Some(pin), Some(index)) = (pin, target) {
                action = EventTableAction::ReplaceWithPin { pin: pin.id, index };
            }
        }
    });

    ui.add_space(4.0);

    if rows.is_empty() {
        ui.label(
            match unavailable {
                Some(reason) => egui::RichText::new(format!("⚠ {}", reason)).color(colors.warning),
                None => egui::RichText::new("No events loaded")
                    .italics()
                    .color(colors.text_muted),
            },
        );
        return action;
    }

    let show_frames = rows.iter().any(|r| r.frame.is_some());

    let mut table = TableBuilder::new(ui)
        .striped(true)
        .resizable(true)
        .sense(egui::Sense::click())
        .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
        .column(Column::auto().at_least(24.0)) // #
        .column(Column::auto().at_least(90.0)) // Event
        .column(Column::auto().at_least(60.0)); // Time
    if show_frames {
        table = table.column(Column::auto().at_least(44.0));
    }
    table
        .column(Column::remainder().at_least(90.0)) // ID
        .header(20.0, |mut header| {
            header.col(|ui| {
                ui.strong("#");
            });
            header.col(|ui| {
                ui.strong("Event");
            });
            header.col(|ui| {
                ui.strong("Time (s)");
            });
            if show_frames {
                header.col(|ui| {
                    ui.strong("Frame");
                });
            }
            header.col(|ui| {
                ui.strong("ID (µm)");
            });
        })
        .body(|mut body| {
            for (idx, event_row) in rows.iter().enumerate() {
                body.row(20.0, |mut row| {
                    let is_selected = state.selected == Some(idx);
                    row.set_selected(is_selected);

                    row.col(|ui| {
                        ui.label(format!("{}", idx + 1));
                    });

                    row.col(|ui| match &mut state.editing_label {
                        Some((i, text)) if *i == idx => {
                            let resp = ui.add(
                                egui::TextEdit::singleline(text).desired_width(90.0),
                            );
                            if resp.lost_focus() {
                                if ui.input(|inp| inp.key_pressed(egui::Key::Enter)) {
                                    action = EventTableAction::Rename {
                                        index: idx,
                                        label: text.trim().to_string(),
                                    };
                                }
                                state.editing_label = None;
                            } else {
                                resp.request_focus();
                            }
                        }
                        _ => {
                            let resp = ui.selectable_label(is_selected, &event_row.label);
                            if resp.double_clicked() {
                                state.editing_label = Some((idx, event_row.label.clone()));
                            } else if resp.clicked() {
                                action = EventTableAction::Select(idx);
                            }
                        }
                    });

                    row.col(|ui| {
                        ui.label(format!("{:.2}", event_row.time));
                    });

                    if show_frames {
                        row.col(|ui| {
                            ui.label(
                                event_row
                                    .frame
                                    .map(|f| f.to_string())
                                    .unwrap_or_default(),
                            );
                        });
                    }

                    row.col(|ui| match &mut state.editing_value {
                        Some((i, text)) if *i == idx => {
                            let resp = ui.add(
                                egui::TextEdit::singleline(text).desired_width(70.0),
                            );
                            if resp.lost_focus() {
                                if ui.input(|inp| inp.key_pressed(egui::Key::Enter)) {
                                    action = match parse_value(text) {
                                        Some(value) => {
                                            EventTableAction::ReplaceValue { index: idx, value }
                                        }
                                        None => EventTableAction::InvalidValue(text.clone()),
                                    };
                                }
                                state.editing_value = None;
                            } else {
                                resp.request_focus();
                            }
                        }
                        _ => {
                            let text = egui::RichText::new(format!("{:.2}", event_row.diameter));
                            let text = if event_row.manual {
                                text.color(colors.manual_value).strong()
                            } else {
                                text
                            };
                            ui.label(text);
                            if ui
                                .small_button("✏")
                                .on_hover_text("Type a new value")
                                .clicked()
                            {
                                state.editing_value =
                                    Some((idx, format!("{:.2}", event_row.diameter)));
                            }
                            if event_row.manual
                                && ui
                                    .small_button("↺")
                                    .on_hover_text("Back to the trace value")
                                    .clicked()
                            {
                                action = EventTableAction::ClearOverride(idx);
                            }
                        }
                    });

                    if row.response().clicked() {
                        action = EventTableAction::Select(idx);
                    }
                });
            }
        });

    action
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(time: f64) -> EventRow {
        EventRow {
            label: format!("E{}", time),
            time,
            frame: None,
            diameter: 10.0,
            manual: false,
        }
    }

    #[test]
    fn insert_keeps_time_order() {
        let rows = vec![row(1.0), row(3.0), row(5.0)];
        assert_eq!(insert_position(&rows, 0.5), 0);
        assert_eq!(insert_position(&rows, 3.0), 2);
        assert_eq!(insert_position(&rows, 4.0), 2);
        assert_eq!(insert_position(&rows, 9.0), 3);
        assert_eq!(insert_position(&[], 1.0), 0);
    }

    #[test]
    fn parses_typed_values() {
        assert_eq!(parse_value(" 15.2 "), Some(15.2));
        assert_eq!(parse_value("abc"), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("inf"), None);
    }

    #[test]
    fn clamp_drops_stale_selection() {
        let mut state = EventTableState {
            selected: Some(4),
            editing_value: Some((1, "3".into())),
            ..Default::default()
        };
        state.clamp_to(3);
        assert_eq!(state.selected, None);
        assert!(state.editing_value.is_none());

        state.selected = Some(1);
        state.clamp_to(3);
        assert_eq!(state.selected, Some(1));
    }
}
