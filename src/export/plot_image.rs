/// Raster export of the trace plot
///
/// Draws the trace, event markers, pins, grid and axes into an RGB image
/// with a small built-in bitmap font, so figure export does not depend on
/// the GUI being open.

use image::{Rgb, RgbImage};
use std::path::Path;

use super::ExportError;
use crate::data::events::Event;
use crate::data::pins::Pin;
use crate::data::trace::Trace;
use crate::session::state::{PlotStyle, ViewWindow};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([230, 230, 235]);
const BORDER: Rgb<u8> = Rgb([100, 100, 110]);
const AXIS_TEXT: Rgb<u8> = Rgb([60, 60, 70]);
const TRACE: Rgb<u8> = Rgb([26, 58, 107]);
const EVENT: Rgb<u8> = Rgb([110, 110, 120]);
const SELECTED: Rgb<u8> = Rgb([30, 100, 230]);
const PIN: Rgb<u8> = Rgb([224, 48, 48]);

#[derive(Debug, Clone, PartialEq)]
pub struct ImageExportSettings {
    pub width: u32,
    pub height: u32,
    pub title: String,
    /// Multiplier on the bitmap font size
    pub font_scale: f32,
    /// Trace line thickness in pixels
    pub line_width: f32,
    pub marker_size: f32,
    pub show_grid: bool,
    pub show_events: bool,
    pub show_pins: bool,
}

impl Default for ImageExportSettings {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 900,
            title: String::new(),
            font_scale: 1.0,
            line_width: 1.5,
            marker_size: 5.0,
            show_grid: true,
            show_events: true,
            show_pins: true,
        }
    }
}

impl ImageExportSettings {
    /// Carry the on-screen style over to the exported figure.
    pub fn from_style(style: &PlotStyle, show_grid: bool) -> Self {
        Self {
            font_scale: style.tick_font_size / 12.0,
            line_width: style.trace_line_width,
            marker_size: style.marker_size,
            show_grid,
            ..Self::default()
        }
    }
}

/// What to draw.
pub struct PlotRender<'a> {
    pub trace: &'a Trace,
    pub events: &'a [Event],
    pub pins: &'a [Pin],
    /// Axis window; `None` fits the trace
    pub window: Option<ViewWindow>,
    pub selected_event: Option<usize>,
}

/// Axis window that fits the trace with a small margin.
pub fn fit_window(trace: &Trace) -> ViewWindow {
    let (x0, x1) = trace.time_range().unwrap_or((0.0, 1.0));
    let (y0, y1) = trace.diameter_range().unwrap_or((0.0, 1.0));
    let (x0, x1) = widen(x0, x1);
    let (y0, y1) = widen(y0, y1);
    let pad = (y1 - y0) * 0.05;
    ViewWindow {
        x: [x0, x1],
        y: [y0 - pad, y1 + pad],
    }
}

fn widen(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, lo + 0.5)
    }
}

pub fn render_plot(plot: &PlotRender<'_>, settings: &ImageExportSettings) -> RgbImage {
    let width = settings.width.max(200);
    let height = settings.height.max(150);
    let mut img = RgbImage::from_pixel(width, height, WHITE);

    let ts = (2.0 * settings.font_scale).round().max(1.0) as u32;
    let title_ts = ts + 1;
    let char_w = 4 * ts;
    let char_h = 5 * ts;

    let window = plot
        .window
        .filter(ViewWindow::is_valid)
        .unwrap_or_else(|| fit_window(plot.trace));
    let [x_min, x_max] = window.x;
    let [y_min, y_max] = window.y;

    let margin_left = char_w * 9 + 20;
    let margin_right = 30;
    let margin_top = char_h * 5 + 20;
    let margin_bottom = char_h * 4 + 30;
    let plot_w = width.saturating_sub(margin_left + margin_right).max(10);
    let plot_h = height.saturating_sub(margin_top + margin_bottom).max(10);

    let to_px = |t: f64, d: f64| -> (i32, i32) {
        let fx = (t - x_min) / (x_max - x_min);
        let fy = 1.0 - (d - y_min) / (y_max - y_min);
        (
            margin_left as i32 + (fx * plot_w as f64).round() as i32,
            margin_top as i32 + (fy * plot_h as f64).round() as i32,
        )
    };
    let inside_x = |px: i32| px >= margin_left as i32 && px <= (margin_left + plot_w) as i32;

    let x_step = nice_step(x_max - x_min);
    let y_step = nice_step(y_max - y_min);

    if settings.show_grid {
        for t in ticks(x_min, x_max, x_step) {
            let (gx, _) = to_px(t, y_min);
            for y in margin_top + 1..margin_top + plot_h {
                put(&mut img, gx, y as i32, GRID);
            }
        }
        for d in ticks(y_min, y_max, y_step) {
            let (_, gy) = to_px(x_min, d);
            for x in margin_left + 1..margin_left + plot_w {
                put(&mut img, x as i32, gy, GRID);
            }
        }
    }

    // Trace, clipped to the plot rectangle
    let thickness = settings.line_width.round().max(1.0) as i32;
    let mut prev: Option<(i32, i32)> = None;
    for s in plot.trace.samples() {
        if s.time < x_min || s.time > x_max {
            prev = None;
            continue;
        }
        let (px, py) = to_px(s.time, s.diameter.clamp(y_min, y_max));
        if let Some((qx, qy)) = prev {
            for off in 0..thickness {
                let o = off - thickness / 2;
                draw_line(&mut img, qx, qy + o, px, py + o, TRACE);
            }
        }
        prev = Some((px, py));
    }

    if settings.show_events {
        let dash = (6 * ts) as i32;
        for (i, event) in plot.events.iter().enumerate() {
            if event.time < x_min || event.time > x_max {
                continue;
            }
            let color = if plot.selected_event == Some(i) { SELECTED } else { EVENT };
            let (ex, _) = to_px(event.time, y_min);
            for y in margin_top..margin_top + plot_h {
                if ((y - margin_top) as i32 / dash) % 2 == 0 {
                    put(&mut img, ex, y as i32, color);
                }
            }
            // Labels stack in three rows above the plot so neighbours don't collide
            let row = (i % 3) as u32;
            let label: String = event.label.chars().take(16).collect();
            let label_y = margin_top - (row + 1) * (char_h + 4);
            let label_w = label.chars().count() as u32 * char_w;
            draw_text(
                &mut img,
                &label,
                (ex.max(0) as u32).saturating_sub(label_w / 2),
                label_y,
                color,
                ts,
            );
        }
    }

    if settings.show_pins {
        let half = (settings.marker_size / 2.0).round().max(2.0) as i32;
        for pin in plot.pins {
            let (px, py) = to_px(pin.time, pin.diameter);
            if !inside_x(px) {
                continue;
            }
            for dy in -half..=half {
                for dx in -half..=half {
                    put(&mut img, px + dx, py + dy, PIN);
                }
            }
            let label = format!("{:.2}s {:.1}µm", pin.time, pin.diameter);
            draw_text(
                &mut img,
                &label,
                (px + half + 3).max(0) as u32,
                (py - half - char_h as i32 - 2).max(0) as u32,
                PIN,
                ts,
            );
        }
    }

    // Border
    for x in margin_left..=margin_left + plot_w {
        put(&mut img, x as i32, margin_top as i32, BORDER);
        put(&mut img, x as i32, (margin_top + plot_h) as i32, BORDER);
    }
    for y in margin_top..=margin_top + plot_h {
        put(&mut img, margin_left as i32, y as i32, BORDER);
        put(&mut img, (margin_left + plot_w) as i32, y as i32, BORDER);
    }

    // Ticks and tick labels
    let tick_len = 2 * ts as i32;
    for t in ticks(x_min, x_max, x_step) {
        let (gx, _) = to_px(t, y_min);
        for dy in 0..tick_len {
            put(&mut img, gx, (margin_top + plot_h) as i32 + dy, BORDER);
        }
        let label = format_tick(t, x_step);
        let w = label.len() as u32 * char_w;
        draw_text(
            &mut img,
            &label,
            (gx.max(0) as u32).saturating_sub(w / 2),
            margin_top + plot_h + tick_len as u32 + 4,
            AXIS_TEXT,
            ts,
        );
    }
    for d in ticks(y_min, y_max, y_step) {
        let (_, gy) = to_px(x_min, d);
        for dx in 0..tick_len {
            put(&mut img, margin_left as i32 - dx, gy, BORDER);
        }
        let label = format_tick(d, y_step);
        let w = label.len() as u32 * char_w;
        draw_text(
            &mut img,
            &label,
            margin_left.saturating_sub(w + tick_len as u32 + 4),
            (gy.max(0) as u32).saturating_sub(char_h / 2),
            AXIS_TEXT,
            ts,
        );
    }

    // Axis titles
    let x_title = "Time (s)";
    let x_title_w = x_title.len() as u32 * char_w;
    draw_text(
        &mut img,
        x_title,
        (margin_left + plot_w / 2).saturating_sub(x_title_w / 2),
        margin_top + plot_h + tick_len as u32 + char_h + 16,
        AXIS_TEXT,
        ts,
    );
    draw_text(&mut img, "Inner Diameter (µm)", 10, margin_top.saturating_sub(char_h * 4 + 12), AXIS_TEXT, ts);

    if !settings.title.is_empty() {
        let w = settings.title.chars().count() as u32 * 4 * title_ts;
        draw_text(
            &mut img,
            &settings.title,
            (width / 2).saturating_sub(w / 2),
            6,
            Rgb([40, 40, 50]),
            title_ts,
        );
    }

    img
}

pub fn save_plot_png(
    path: &Path,
    plot: &PlotRender<'_>,
    settings: &ImageExportSettings,
) -> Result<(), ExportError> {
    let img = render_plot(plot, settings);
    img.save(path)?;
    log::info!(
        "Exported plot image {} ({}x{})",
        path.display(),
        img.width(),
        img.height()
    );
    Ok(())
}

/// 1, 2 or 5 × 10^k so that roughly eight ticks fit in `range`.
pub fn nice_step(range: f64) -> f64 {
    if !(range.is_finite() && range > 0.0) {
        return 1.0;
    }
    let raw = range / 8.0;
    let magnitude = 10f64.powf(raw.log10().floor());
    let norm = raw / magnitude;
    let nice = if norm <= 1.0 {
        1.0
    } else if norm <= 2.0 {
        2.0
    } else if norm <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn ticks(lo: f64, hi: f64, step: f64) -> impl Iterator<Item = f64> {
    let first = (lo / step).ceil() as i64;
    let last = (hi / step).floor() as i64;
    (first..=last).map(move |k| k as f64 * step)
}

fn format_tick(value: f64, step: f64) -> String {
    let decimals = if step >= 1.0 {
        0
    } else {
        (-step.log10().floor()) as usize
    };
    format!("{:.*}", decimals, value)
}

fn put(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham line, clipped to the image.
fn draw_line(img: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx: i32 = if x0 < x1 { 1 } else { -1 };
    let sy: i32 = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut cx = x0;
    let mut cy = y0;
    loop {
        put(img, cx, cy, color);
        if cx == x1 && cy == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            cx += sx;
        }
        if e2 <= dx {
            err += dx;
            cy += sy;
        }
    }
}

fn glyph(c: char) -> [u8; 5] {
    match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        '-' | '–' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        '=' => [0b000, 0b111, 0b000, 0b111, 0b000],
        '(' => [0b010, 0b100, 0b100, 0b100, 0b010],
        ')' => [0b010, 0b001, 0b001, 0b001, 0b010],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        'µ' => [0b000, 0b101, 0b101, 0b111, 0b100],
        ' ' => [0b000, 0b000, 0b000, 0b000, 0b000],
        'A' | 'a' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' | 'b' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' | 'c' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' | 'd' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' | 'e' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' | 'f' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' | 'g' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' | 'h' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' | 'i' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' | 'j' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' | 'k' => [0b101, 0b110, 0b100, 0b110, 0b101],
        'L' | 'l' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' | 'm' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' | 'n' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' | 'o' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' | 'p' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' | 'q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' | 'r' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' | 's' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' | 't' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' | 'u' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' | 'v' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' | 'w' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' | 'x' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' | 'y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' | 'z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        _ => [0b000, 0b000, 0b010, 0b000, 0b000],
    }
}

/// 3×5 bitmap text, `scale` pixels per font dot.
fn draw_text(img: &mut RgbImage, text: &str, x: u32, y: u32, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1);
    let mut cx = x;
    for ch in text.chars() {
        for (row, &bits) in glyph(ch).iter().enumerate() {
            for col in 0..3u32 {
                if (bits >> (2 - col)) & 1 == 1 {
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let px = cx + col * scale + sx;
                            let py = y + row as u32 * scale + sy;
                            if px < img.width() && py < img.height() {
                                img.put_pixel(px, py, color);
                            }
                        }
                    }
                }
            }
        }
        cx += 4 * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::pins::PinStore;
    use crate::data::testutil::ramp_trace;
    use approx::assert_relative_eq;

    fn count(img: &RgbImage, color: Rgb<u8>) -> usize {
        img.pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn nice_steps() {
        assert_relative_eq!(nice_step(10.0), 2.0);
        assert_relative_eq!(nice_step(80.0), 10.0);
        assert_relative_eq!(nice_step(0.5), 0.1);
        assert_eq!(nice_step(0.0), 1.0);
        assert_eq!(format_tick(2.5, 0.5), "2.5");
        assert_eq!(format_tick(40.0, 10.0), "40");
    }

    #[test]
    fn renders_trace_events_and_pins() {
        let trace = ramp_trace();
        let events = vec![Event::new("Drug A", 3.0), Event::new("Drug B", 7.0)];
        let mut pins = PinStore::default();
        pins.add(&trace, 5.0).unwrap();

        let settings = ImageExportSettings {
            width: 800,
            height: 500,
            title: "Vessel 1".into(),
            ..Default::default()
        };
        let plot = PlotRender {
            trace: &trace,
            events: &events,
            pins: pins.as_slice(),
            window: None,
            selected_event: Some(1),
        };
        let img = render_plot(&plot, &settings);
        assert_eq!((img.width(), img.height()), (800, 500));
        assert!(count(&img, TRACE) > 100);
        assert!(count(&img, EVENT) > 50);
        assert!(count(&img, SELECTED) > 50);
        assert!(count(&img, PIN) > 10);
    }

    #[test]
    fn empty_trace_and_bad_window_still_render() {
        let trace = Trace::default();
        let plot = PlotRender {
            trace: &trace,
            events: &[],
            pins: &[],
            window: Some(ViewWindow { x: [5.0, 5.0], y: [0.0, 1.0] }),
            selected_event: None,
        };
        let img = render_plot(&plot, &ImageExportSettings::default());
        assert_eq!(count(&img, TRACE), 0);
        assert!(count(&img, BORDER) > 0);
    }

    #[test]
    fn saves_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.png");
        let trace = ramp_trace();
        let plot = PlotRender {
            trace: &trace,
            events: &[],
            pins: &[],
            window: Some(ViewWindow { x: [2.0, 6.0], y: [10.0, 12.0] }),
            selected_event: None,
        };
        let settings = ImageExportSettings::from_style(&PlotStyle::default(), false);
        save_plot_png(&path, &plot, &settings).unwrap();
        let loaded = image::open(&path).unwrap();
        assert_eq!(loaded.width(), settings.width);
    }
}
