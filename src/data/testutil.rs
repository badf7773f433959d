use super::trace::{Trace, TraceSample};

/// Samples at t = 0..=10 s with diameter 10.0 + 0.2·t.
pub(crate) fn ramp_trace() -> Trace {
    let samples = (0..=10)
        .map(|i| TraceSample {
            time: i as f64,
            diameter: 10.0 + 0.2 * i as f64,
        })
        .collect();
    Trace::new(samples).unwrap()
}
