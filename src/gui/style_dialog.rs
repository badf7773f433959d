/// Plot style dialog: fonts, line widths and image export options

use crate::export::plot_image::ImageExportSettings;
use crate::session::state::{FontChoice, PlotStyle};

/// Dialog state. `style` is a working copy applied on demand.
#[derive(Debug, Clone)]
pub struct StyleDialogState {
    pub open: bool,
    pub style: PlotStyle,
    pub image: ImageExportSettings,
    /// Use the on-screen zoom for the image instead of fitting the trace
    pub use_view_window: bool,
}

impl Default for StyleDialogState {
    fn default() -> Self {
        Self {
            open: false,
            style: PlotStyle::default(),
            image: ImageExportSettings::default(),
            use_view_window: true,
        }
    }
}

impl StyleDialogState {
    /// Open with the session's current style.
    pub fn open_with(&mut self, style: &PlotStyle, show_grid: bool) {
        self.style = style.clone();
        let sized = ImageExportSettings::from_style(style, show_grid);
        self.image = ImageExportSettings {
            width: self.image.width,
            height: self.image.height,
            title: self.image.title.clone(),
            show_events: self.image.show_events,
            show_pins: self.image.show_pins,
            ..sized
        };
        self.open = true;
    }

    /// Image settings that match the working style.
    pub fn export_settings(&self) -> ImageExportSettings {
        ImageExportSettings {
            font_scale: self.style.tick_font_size / 12.0,
            line_width: self.style.trace_line_width,
            marker_size: self.style.marker_size,
            ..self.image.clone()
        }
    }
}

/// Action from the style dialog
#[derive(Debug, Clone, PartialEq)]
pub enum StyleAction {
    None,
    Apply,
    ExportImage,
    Cancel,
}

/// Show the style dialog. Returns the action taken.
pub fn show_style_dialog(ctx: &egui::Context, state: &mut StyleDialogState) -> StyleAction {
    if !state.open {
        return StyleAction::None;
    }

    let mut action = StyleAction::None;

    egui::Window::new("🔤 Plot Style & Image Export")
        .open(&mut state.open)
        .collapsible(false)
        .resizable(false)
        .default_width(380.0)
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            // ── Fonts ──
            ui.group(|ui| {
                ui.label("🔤 Fonts");
                egui::Grid::new("style_fonts").num_columns(2).show(ui, |ui| {
                    for (label, value) in [
                        ("Axis labels:", &mut state.style.axis_font_size),
                        ("Tick labels:", &mut state.style.tick_font_size),
                        ("Event labels:", &mut state.style.event_font_size),
                        ("Pin labels:", &mut state.style.pin_font_size),
                    ] {
                        ui.label(label);
                        ui.add(
                            egui::DragValue::new(value)
                                .speed(0.5)
                                .range(6.0..=48.0)
                                .suffix(" pt"),
                        );
                        ui.end_row();
                    }
                    ui.label("Family:");
                    egui::ComboBox::from_id_salt("style_font_family")
                        .selected_text(state.style.font_family.label())
                        .show_ui(ui, |ui| {
                            for choice in FontChoice::ALL {
                                ui.selectable_value(
                                    &mut state.style.font_family,
                                    choice,
                                    choice.label(),
                                );
                            }
                        });
                    ui.end_row();
                });
            });

            ui.add_space(4.0);

            // ── Lines ──
            ui.group(|ui| {
                ui.label("📈 Lines & markers");
                egui::Grid::new("style_lines").num_columns(2).show(ui, |ui| {
                    ui.label("Trace width:");
                    ui.add(
                        egui::DragValue::new(&mut state.style.trace_line_width)
                            .speed(0.1)
                            .range(0.5..=8.0)
                            .fixed_decimals(1),
                    );
                    ui.end_row();
                    ui.label("Event width:");
                    ui.add(
                        egui::DragValue::new(&mut state.style.event_line_width)
                            .speed(0.1)
                            .range(0.5..=8.0)
                            .fixed_decimals(1),
                    );
                    ui.end_row();
                    ui.label("Pin size:");
                    ui.add(
                        egui::DragValue::new(&mut state.style.marker_size)
                            .speed(0.2)
                            .range(1.0..=20.0)
                            .fixed_decimals(1),
                    );
                    ui.end_row();
                });
            });

            ui.add_space(4.0);

            // ── Image ──
            ui.group(|ui| {
                ui.label("🖼 Image export");
                ui.horizontal(|ui| {
                    ui.label("Width:");
                    ui.add(
                        egui::DragValue::new(&mut state.image.width)
                            .speed(10)
                            .range(400..=8000)
                            .suffix(" px"),
                    );
                    ui.label("Height:");
                    ui.add(
                        egui::DragValue::new(&mut state.image.height)
                            .speed(10)
                            .range(300..=6000)
                            .suffix(" px"),
                    );
                });
                ui.horizontal(|ui| {
                    ui.label("Title:");
                    ui.text_edit_singleline(&mut state.image.title);
                });
                ui.checkbox(&mut state.image.show_grid, "Grid");
                ui.checkbox(&mut state.image.show_events, "Event markers");
                ui.checkbox(&mut state.image.show_pins, "Pins");
                ui.checkbox(&mut state.use_view_window, "Use current zoom");
            });

            ui.add_space(12.0);

            ui.horizontal(|ui| {
                if ui.button("✔ Apply").clicked() {
                    action = StyleAction::Apply;
                }
                if ui.button("📥 Export PNG…").clicked() {
                    action = StyleAction::ExportImage;
                }
                if ui.button("Reset").clicked() {
                    state.style = PlotStyle::default();
                }
                if ui.button("Cancel").clicked() {
                    action = StyleAction::Cancel;
                }
            });
        });

    action
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_settings_follow_working_style() {
        let mut state = StyleDialogState::default();
        state.image.width = 2000;
        let style = PlotStyle {
            tick_font_size: 24.0,
            trace_line_width: 3.0,
            ..PlotStyle::default()
        };
        state.open_with(&style, false);
        assert!(state.open);
        assert_eq!(state.image.width, 2000);
        assert!(!state.image.show_grid);

        state.style.marker_size = 9.0;
        let settings = state.export_settings();
        assert_eq!(settings.font_scale, 2.0);
        assert_eq!(settings.line_width, 3.0);
        assert_eq!(settings.marker_size, 9.0);
        assert_eq!(settings.width, 2000);
    }
}
