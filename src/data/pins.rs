/// Pinned annotations placed by the user on the trace plot.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::DataUnavailable;
use super::trace::Trace;

/// Stable identifier of a pin, unique within and across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(uuid::Uuid);

impl PinId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PinId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub id: PinId,
    /// Clicked time (s)
    pub time: f64,
    /// Diameter of the trace sample nearest `time` (µm)
    pub diameter: f64,
}

impl Pin {
    pub fn label(&self) -> String {
        format!("{:.2} s\n{:.1} µm", self.time, self.diameter)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinStore {
    pins: Vec<Pin>,
}

impl PinStore {
    /// Pin the trace at `time`. The diameter always comes from the trace.
    pub fn add(&mut self, trace: &Trace, time: f64) -> Result<PinId, DataUnavailable> {
        let sample = trace.sample_near(time).ok_or(DataUnavailable("Trace"))?;
        let pin = Pin {
            id: PinId::new(),
            time,
            diameter: sample.diameter,
        };
        self.pins.push(pin);
        Ok(pin.id)
    }

    /// Put back a pin previously taken out (used by undo).
    pub fn restore(&mut self, pin: Pin) {
        if self.get(pin.id).is_none() {
            self.pins.push(pin);
        }
    }

    pub fn remove(&mut self, id: PinId) -> Option<Pin> {
        let pos = self.pins.iter().position(|p| p.id == id)?;
        Some(self.pins.remove(pos))
    }

    pub fn get(&self, id: PinId) -> Option<&Pin> {
        self.pins.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pin> {
        self.pins.iter()
    }

    pub fn as_slice(&self) -> &[Pin] {
        &self.pins
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn clear(&mut self) {
        self.pins.clear();
    }

    /// Nearest pin under an arbitrary distance metric.
    pub fn find_nearest_by(&self, metric: impl Fn(&Pin) -> f64) -> Option<(PinId, f64)> {
        self.pins
            .iter()
            .map(|p| (p.id, metric(p)))
            .filter(|(_, d)| !d.is_nan())
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Nearest pin by Euclidean distance in data coordinates.
    pub fn find_nearest(&self, time: f64, diameter: f64) -> Option<(PinId, f64)> {
        self.find_nearest_by(|p| (p.time - time).hypot(p.diameter - diameter))
    }

    /// Remove the pin closest to `click` in screen space if it lies within
    /// `tolerance` pixels. `to_pixel` maps (time, diameter) to screen (x, y).
    pub fn remove_near(
        &mut self,
        click: (f64, f64),
        tolerance: f64,
        to_pixel: impl Fn(f64, f64) -> (f64, f64),
    ) -> Option<Pin> {
        let (id, dist) = self.find_nearest_by(|p| {
            let (x, y) = to_pixel(p.time, p.diameter);
            (x - click.0).hypot(y - click.1)
        })?;
        if dist < tolerance {
            self.remove(id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testutil::ramp_trace;

    #[test]
    fn add_snaps_diameter_to_trace() {
        let trace = ramp_trace();
        let mut pins = PinStore::default();
        let id = pins.add(&trace, 4.9).unwrap();
        let pin = pins.get(id).unwrap();
        assert_eq!(pin.time, 4.9);
        assert_eq!(pin.diameter, trace.samples()[5].diameter);
    }

    #[test]
    fn add_without_trace_fails() {
        let mut pins = PinStore::default();
        assert_eq!(pins.add(&Trace::default(), 1.0), Err(DataUnavailable("Trace")));
        assert!(pins.is_empty());
    }

    #[test]
    fn find_and_remove() {
        let trace = ramp_trace();
        let mut pins = PinStore::default();
        let a = pins.add(&trace, 1.0).unwrap();
        let b = pins.add(&trace, 8.0).unwrap();
        let (nearest, _) = pins.find_nearest(7.5, 11.6).unwrap();
        assert_eq!(nearest, b);
        assert!(pins.remove(a).is_some());
        assert!(pins.remove(a).is_none());
        assert_eq!(pins.len(), 1);
    }

    #[test]
    fn remove_near_uses_pixel_tolerance() {
        let trace = ramp_trace();
        let mut pins = PinStore::default();
        pins.add(&trace, 2.0).unwrap();
        pins.add(&trace, 6.0).unwrap();
        // 100 px per second, diameter ignored
        let to_pixel = |t: f64, _d: f64| (t * 100.0, 0.0);

        assert!(pins.remove_near((215.0, 0.0), 10.0, to_pixel).is_none());
        let removed = pins.remove_near((605.0, 3.0), 10.0, to_pixel).unwrap();
        assert_eq!(removed.time, 6.0);
        assert_eq!(pins.len(), 1);
    }
}
