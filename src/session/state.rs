/// View and styling state that travels with a session.

use serde::{Deserialize, Serialize};

/// Visible axis window of the trace plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewWindow {
    /// [min, max] time (s)
    pub x: [f64; 2],
    /// [min, max] diameter (µm)
    pub y: [f64; 2],
}

impl ViewWindow {
    pub fn is_valid(&self) -> bool {
        self.x.iter().chain(self.y.iter()).all(|v| v.is_finite())
            && self.x[0] < self.x[1]
            && self.y[0] < self.y[1]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    /// `None` means fit to data
    pub window: Option<ViewWindow>,
    pub show_grid: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            window: None,
            show_grid: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontChoice {
    Proportional,
    Monospace,
}

impl FontChoice {
    pub const ALL: [FontChoice; 2] = [FontChoice::Proportional, FontChoice::Monospace];

    pub fn label(&self) -> &'static str {
        match self {
            FontChoice::Proportional => "Proportional",
            FontChoice::Monospace => "Monospace",
        }
    }
}

/// Plot appearance chosen in the style dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotStyle {
    pub axis_font_size: f32,
    pub tick_font_size: f32,
    pub event_font_size: f32,
    pub pin_font_size: f32,
    pub font_family: FontChoice,
    pub trace_line_width: f32,
    pub event_line_width: f32,
    pub marker_size: f32,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            axis_font_size: 14.0,
            tick_font_size: 12.0,
            event_font_size: 10.0,
            pin_font_size: 10.0,
            font_family: FontChoice::Proportional,
            trace_line_width: 1.5,
            event_line_width: 1.0,
            marker_size: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_window_validity() {
        assert!(ViewWindow { x: [0.0, 10.0], y: [50.0, 60.0] }.is_valid());
        assert!(!ViewWindow { x: [10.0, 0.0], y: [50.0, 60.0] }.is_valid());
        assert!(!ViewWindow { x: [0.0, f64::NAN], y: [50.0, 60.0] }.is_valid());
    }

    #[test]
    fn partial_style_fills_defaults() {
        let style: PlotStyle = serde_json::from_str(r#"{"marker_size": 8.0}"#).unwrap();
        assert_eq!(style.marker_size, 8.0);
        assert_eq!(style.axis_font_size, PlotStyle::default().axis_font_size);
        let view: ViewState = serde_json::from_str("{}").unwrap();
        assert!(view.show_grid);
    }
}
