/// Frame viewer: current TIFF frame scaled to fit, a slider across the
/// kept frames, and the frame's metadata

use crate::data::frames::FrameStack;

use super::theme::ThemeColors;

#[derive(Default)]
pub struct FrameViewerState {
    /// Position among the kept frames
    pub position: usize,
    /// Uploaded texture and the position it shows
    texture: Option<(usize, egui::TextureHandle)>,
}

impl FrameViewerState {
    /// Drop the cached texture, e.g. after a new stack is opened.
    pub fn reset(&mut self) {
        self.position = 0;
        self.texture = None;
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }
}

/// Show the frame viewer. Returns the trace time of the frame on screen.
/// `interval_s` is editable; the caller applies a changed value.
pub fn show_frame_viewer(
    ui: &mut egui::Ui,
    stack: Option<&FrameStack>,
    interval_s: &mut f64,
    state: &mut FrameViewerState,
    colors: &ThemeColors,
) -> Option<f64> {
    ui.horizontal(|ui| {
        ui.heading("Frames");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.add(
                egui::DragValue::new(interval_s)
                    .speed(0.005)
                    .range(0.001..=60.0)
                    .fixed_decimals(3)
                    .suffix(" s"),
            )
            .on_hover_text("Seconds per frame when the stack has no timestamps");
            ui.label("Interval:");
        });
    });
    let Some(stack) = stack.filter(|s| !s.is_empty()) else {
        ui.label(
            egui::RichText::new("No TIFF stack loaded")
                .italics()
                .color(colors.text_muted),
        );
        return None;
    };

    let last = stack.len() - 1;
    state.position = state.position.min(last);

    ui.horizontal(|ui| {
        if ui.small_button("◀").clicked() {
            state.position = state.position.saturating_sub(1);
        }
        ui.add(egui::Slider::new(&mut state.position, 0..=last).text("frame"));
        if ui.small_button("▶").clicked() {
            state.position = (state.position + 1).min(last);
        }
    });

    let frame = stack.get(state.position)?;
    let time = stack.frame_time(state.position, *interval_s);

    ui.label(
        egui::RichText::new(format!(
            "page {} of {}{}{}",
            frame.page_index + 1,
            stack.total_pages,
            if stack.step > 1 {
                format!(" (every {}th)", stack.step)
            } else {
                String::new()
            },
            time.map(|t| format!(" | t = {:.2} s", t)).unwrap_or_default()
        ))
        .size(11.0)
        .color(colors.text_secondary),
    );

    let needs_upload = state
        .texture
        .as_ref()
        .map_or(true, |(pos, _)| *pos != state.position);
    if needs_upload {
        let image = egui::ColorImage::from_rgba_unmultiplied(
            [frame.width as usize, frame.height as usize],
            &frame.rgba_pixels(),
        );
        let handle = ui.ctx().load_texture(
            format!("frame_{}", state.position),
            image,
            egui::TextureOptions::LINEAR,
        );
        state.texture = Some((state.position, handle));
    }

    if let Some((_, texture)) = &state.texture {
        let avail = ui.available_size();
        let w = frame.width.max(1) as f32;
        let h = frame.height.max(1) as f32;
        let scale = (avail.x / w).min(avail.y * 0.7 / h).max(0.01);
        ui.image((texture.id(), egui::vec2(w * scale, h * scale)));
    }

    egui::CollapsingHeader::new("Metadata")
        .default_open(false)
        .show(ui, |ui| {
            let meta = &frame.metadata;
            if meta.fields.is_empty() {
                ui.label(meta.raw.as_deref().unwrap_or("(no ImageDescription)"));
                return;
            }
            egui::ScrollArea::vertical()
                .max_height(160.0)
                .show(ui, |ui| {
                    egui::Grid::new("frame_metadata")
                        .num_columns(2)
                        .striped(true)
                        .show(ui, |ui| {
                            for (key, value) in &meta.fields {
                                ui.label(egui::RichText::new(key).strong());
                                ui.label(value);
                                ui.end_row();
                            }
                        });
                });
        });

    time
}
