/// Trace viewer widget: interactive diameter plot with events, pins and
/// the current-frame marker

use egui_plot::{
    Line, LineStyle, MarkerShape, Plot, PlotBounds, PlotPoint, PlotPoints, PlotTransform, PlotUi,
    Points, Text, VLine,
};

use crate::data::events::Event;
use crate::data::pins::PinStore;
use crate::data::trace::{Trace, TraceSample};
use crate::session::state::{PlotStyle, ViewState, ViewWindow};

use super::theme::{plot_font_family, ThemeColors};

/// Event labels cycle through this many heights so neighbours stay readable
const LABEL_ROWS: usize = 3;

/// State for the trace viewer
#[derive(Debug, Clone)]
pub struct TraceViewState {
    /// Apply the stored view window (or auto-fit) on the next frame
    pub reset_view: bool,
    /// Incremented on reset to give the plot a fresh ID (drops egui's zoom memory)
    pub plot_generation: u32,
    pub selected_event: Option<usize>,
    /// Time of the frame shown in the frame viewer
    pub frame_time: Option<f64>,
    /// Sample nearest the pointer, from the previous frame
    pub hover: Option<TraceSample>,
}

impl Default for TraceViewState {
    fn default() -> Self {
        Self {
            reset_view: true,
            plot_generation: 0,
            selected_event: None,
            frame_time: None,
            hover: None,
        }
    }
}

/// What the user did on the plot this frame
#[derive(Debug, Clone)]
pub enum TraceViewAction {
    None,
    /// Left click: pin the trace at this time
    AddPin(f64),
    /// Right click: remove the pin under the pointer, if any
    RemovePinAt {
        click: egui::Pos2,
        transform: PlotTransform,
    },
}

/// Everything the plot draws, borrowed from the session
pub struct TracePlot<'a> {
    pub trace: &'a Trace,
    pub events: &'a [Event],
    pub pins: &'a PinStore,
    pub style: &'a PlotStyle,
}

/// Show the trace plot. Writes the visible window back into `view`.
pub fn show_trace_plot(
    ui: &mut egui::Ui,
    plot: &TracePlot<'_>,
    view: &mut ViewState,
    state: &mut TraceViewState,
    colors: &ThemeColors,
) -> TraceViewAction {
    if plot.trace.is_empty() {
        ui.centered_and_justified(|ui| {
            ui.heading("No trace loaded. Open or drop a diameter CSV");
        });
        return TraceViewAction::None;
    }

    ui.horizontal(|ui| {
        ui.checkbox(&mut view.show_grid, "Grid");
        ui.separator();
        if ui.button("⊞ Fit").clicked() {
            view.window = None;
            state.reset_view = true;
        }
        ui.separator();
        if let Some((t0, t1)) = plot.trace.time_range() {
            ui.label(format!(
                "{} samples | {:.1}–{:.1} s",
                plot.trace.len(),
                t0,
                t1
            ));
        }
        if !plot.pins.is_empty() {
            ui.separator();
            ui.label(format!("📍 {} pins", plot.pins.len()));
        }
        if let Some(sample) = state.hover {
            ui.separator();
            ui.colored_label(
                colors.hover_marker,
                format!("t = {:.2} s   d = {:.2} µm", sample.time, sample.diameter),
            );
        }
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(
                egui::RichText::new("click: pin · right-click: remove pin")
                    .size(10.5)
                    .italics()
                    .color(colors.text_muted),
            );
        });
    });

    let restore = if state.reset_view {
        state.plot_generation = state.plot_generation.wrapping_add(1);
        view.window.filter(ViewWindow::is_valid)
    } else {
        None
    };
    state.reset_view = false;

    let style = plot.style;
    let family = plot_font_family(style.font_family);
    let event_font = egui::FontId::new(style.event_font_size, family.clone());
    let pin_font = egui::FontId::new(style.pin_font_size, family);
    let selected = state.selected_event;
    let frame_time = state.frame_time;
    let mut hover = None;

    let trace_plot = Plot::new(format!("trace_plot_{}", state.plot_generation))
        .height(ui.available_height() - 4.0)
        .x_axis_label("Time (s)")
        .y_axis_label("Inner Diameter (µm)")
        .show_grid(view.show_grid)
        .allow_boxed_zoom(true)
        .allow_double_click_reset(true);

    let plot_resp = trace_plot.show(ui, |plot_ui: &mut PlotUi| {
        if let Some(w) = restore {
            plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                [w.x[0], w.y[0]],
                [w.x[1], w.y[1]],
            ));
        }

        let points: PlotPoints = plot
            .trace
            .samples()
            .iter()
            .map(|s| [s.time, s.diameter])
            .collect();
        plot_ui.line(
            Line::new(points)
                .name("Diameter")
                .color(colors.trace_line)
                .width(style.trace_line_width),
        );

        // ── Events: dashed lines, labels hanging from the top edge ──
        let bounds = plot_ui.plot_bounds();
        let top = bounds.max()[1];
        let step = bounds.height() * 0.04;
        for (i, event) in plot.events.iter().enumerate() {
            let is_selected = selected == Some(i);
            let (color, label_color, width) = if is_selected {
                (colors.selected_event, colors.selected_event, style.event_line_width * 2.0)
            } else {
                (colors.event_line, colors.event_label, style.event_line_width)
            };
            plot_ui.vline(
                VLine::new(event.time)
                    .color(color)
                    .width(width)
                    .style(LineStyle::dashed_loose()),
            );
            let y = top - step * (i % LABEL_ROWS) as f64;
            plot_ui.text(
                Text::new(
                    PlotPoint::new(event.time, y),
                    egui::RichText::new(&event.label)
                        .font(event_font.clone())
                        .color(label_color),
                )
                .anchor(egui::Align2::LEFT_TOP),
            );
        }

        if let Some(t) = frame_time {
            plot_ui.vline(VLine::new(t).name("Frame").color(colors.frame_marker).width(1.5));
        }

        // ── Pins ──
        if !plot.pins.is_empty() {
            let pts: PlotPoints = plot.pins.iter().map(|p| [p.time, p.diameter]).collect();
            plot_ui.points(
                Points::new(pts)
                    .name("Pins")
                    .color(colors.pin_marker)
                    .radius(style.marker_size)
                    .shape(MarkerShape::Square)
                    .filled(true),
            );
            for pin in plot.pins.iter() {
                plot_ui.text(
                    Text::new(
                        PlotPoint::new(pin.time, pin.diameter),
                        egui::RichText::new(pin.label())
                            .font(pin_font.clone())
                            .color(colors.pin_label),
                    )
                    .anchor(egui::Align2::LEFT_BOTTOM),
                );
            }
        }

        // ── Hover readout ──
        if let Some(coord) = plot_ui.pointer_coordinate() {
            hover = plot.trace.sample_near(coord.x);
            if let Some(s) = hover {
                plot_ui.points(
                    Points::new(PlotPoints::from(vec![[s.time, s.diameter]]))
                        .color(colors.hover_marker)
                        .radius(3.5)
                        .shape(MarkerShape::Circle),
                );
            }
        }
    });

    state.hover = hover;

    let transform = plot_resp.transform;
    let b = transform.bounds();
    view.window = Some(ViewWindow {
        x: [b.min()[0], b.max()[0]],
        y: [b.min()[1], b.max()[1]],
    });

    let response = &plot_resp.response;
    match response.hover_pos() {
        Some(pos) if response.clicked() => {
            TraceViewAction::AddPin(transform.value_from_position(pos).x)
        }
        Some(pos) if response.secondary_clicked() => TraceViewAction::RemovePinAt {
            click: pos,
            transform,
        },
        _ => TraceViewAction::None,
    }
}

/// Screen position of a data point under a plot transform.
pub fn to_screen(transform: &PlotTransform, time: f64, diameter: f64) -> (f64, f64) {
    let p = transform.position_from_point(&PlotPoint::new(time, diameter));
    (p.x as f64, p.y as f64)
}
