/// Derive one summary row per event from the trace.
///
/// For event i the representative diameter is sampled just before the next
/// event starts (`PRE_TRANSITION_OFFSET_S` earlier), so each row reports the
/// steady state reached under that condition. The last event uses the final
/// sample of the trace, whatever its timestamp.

use serde::{Deserialize, Serialize};

use super::error::DataUnavailable;
use super::events::Event;
use super::frames::FrameClock;
use super::trace::Trace;

/// Seconds before the next event at which the diameter is read.
pub const PRE_TRANSITION_OFFSET_S: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub label: String,
    /// Event time rounded to 2 decimals
    pub time: f64,
    pub frame: Option<u32>,
    /// Diameter rounded to 2 decimals
    pub diameter: f64,
    /// Value comes from a manual override rather than the trace
    pub manual: bool,
}

/// Round to two decimals, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Trace diameter that represents event `index`: the sample nearest the
/// next event minus the offset, or the final sample for the last event.
pub fn pre_transition_diameter(trace: &Trace, events: &[Event], index: usize) -> Option<f64> {
    match events.get(index + 1) {
        Some(next) => {
            let idx = trace.nearest_index(next.time - PRE_TRANSITION_OFFSET_S)?;
            trace.diameter_at(idx)
        }
        None => trace.last().map(|s| s.diameter),
    }
}

pub fn reconcile(
    trace: &Trace,
    events: &[Event],
    clock: Option<&FrameClock>,
) -> Result<Vec<EventRow>, DataUnavailable> {
    if events.is_empty() {
        return Ok(Vec::new());
    }
    if trace.is_empty() {
        return Err(DataUnavailable("Trace"));
    }

    let mut rows = Vec::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        let (diameter, manual) = match event.diameter_override {
            Some(value) => (value, true),
            None => {
                let diameter =
                    pre_transition_diameter(trace, events, i).ok_or(DataUnavailable("Trace"))?;
                (diameter, false)
            }
        };
        let frame = event
            .frame
            .or_else(|| clock.and_then(|c| c.frame_at(event.time)));

        rows.push(EventRow {
            label: event.label.clone(),
            time: round2(event.time),
            frame,
            diameter: round2(diameter),
            manual,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testutil::ramp_trace;
    use crate::data::trace::TraceSample;
    use approx::assert_relative_eq;

    fn events_at(times: &[(&str, f64)]) -> Vec<Event> {
        times.iter().map(|(l, t)| Event::new(*l, *t)).collect()
    }

    #[test]
    fn samples_two_seconds_before_next_event() {
        let trace = ramp_trace();
        let events = events_at(&[("A", 3.0), ("B", 7.0)]);
        let rows = reconcile(&trace, &events, None).unwrap();
        assert_eq!(rows.len(), 2);
        // A: sampled at 7 - 2 = 5 s
        assert_eq!(rows[0].label, "A");
        assert_relative_eq!(rows[0].diameter, 11.0);
        assert_eq!(rows[0].time, 3.0);
        // B: last event, sampled at the final trace time (10 s)
        assert_relative_eq!(rows[1].diameter, 12.0);
        assert!(!rows[1].manual);
        assert_eq!(rows[1].frame, None);
    }

    #[test]
    fn single_event_uses_last_sample_even_beyond_range() {
        let trace = ramp_trace();
        let rows = reconcile(&trace, &events_at(&[("Late", 42.0)]), None).unwrap();
        assert_relative_eq!(rows[0].diameter, 12.0);
        assert_eq!(rows[0].time, 42.0);
    }

    #[test]
    fn early_next_event_clamps_to_first_sample() {
        let trace = ramp_trace();
        let events = events_at(&[("A", 0.0), ("B", 1.0)]);
        let rows = reconcile(&trace, &events, None).unwrap();
        assert_relative_eq!(rows[0].diameter, 10.0);
    }

    #[test]
    fn unsorted_events_follow_table_order() {
        let trace = ramp_trace();
        let events = events_at(&[("B", 7.0), ("A", 3.0)]);
        let rows = reconcile(&trace, &events, None).unwrap();
        // B is sampled at 3 - 2 = 1 s
        assert_relative_eq!(rows[0].diameter, 10.2);
        assert_eq!(rows[1].label, "A");
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(reconcile(&Trace::default(), &[], None), Ok(vec![]));
        assert_eq!(
            reconcile(&Trace::default(), &events_at(&[("A", 1.0)]), None),
            Err(DataUnavailable("Trace"))
        );
    }

    #[test]
    fn override_marks_row_manual() {
        let trace = ramp_trace();
        let mut events = events_at(&[("A", 3.0), ("B", 7.0)]);
        events[1].diameter_override = Some(15.234);
        let rows = reconcile(&trace, &events, None).unwrap();
        assert!(rows[1].manual);
        assert_eq!(rows[1].diameter, 15.23);
        assert!(!rows[0].manual);
    }

    #[test]
    fn frames_prefer_explicit_then_clock() {
        let trace = ramp_trace();
        let events = vec![Event::new("A", 1.4).with_frame(3), Event::new("B", 2.8)];
        let clock = FrameClock::Interval { seconds: 0.14 };
        let rows = reconcile(&trace, &events, Some(&clock)).unwrap();
        assert_eq!(rows[0].frame, Some(3));
        assert_eq!(rows[1].frame, Some(20));
    }

    #[test]
    fn reconcile_is_idempotent() {
        let trace = ramp_trace();
        let events = events_at(&[("A", 1.234), ("B", 5.0), ("C", 8.5)]);
        let first = reconcile(&trace, &events, None).unwrap();
        let second = reconcile(&trace, &events, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].time, 1.23);
    }

    #[test]
    fn last_event_takes_final_sample_with_repeated_end_time() {
        let trace = Trace::new(vec![
            TraceSample { time: 0.0, diameter: 10.0 },
            TraceSample { time: 1.0, diameter: 11.0 },
            TraceSample { time: 1.0, diameter: 12.0 },
        ])
        .unwrap();
        let rows = reconcile(&trace, &events_at(&[("A", 0.5)]), None).unwrap();
        assert_eq!(rows[0].diameter, 12.0);
        assert_eq!(pre_transition_diameter(&trace, &events_at(&[("A", 0.5)]), 0), Some(12.0));
    }

    #[test]
    fn round2_breaks_ties_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(-0.125), -0.12);
        assert_eq!(round2(12.125), 12.12);
        assert_eq!(round2(2.375), 2.38);
        assert_eq!(round2(1.234), 1.23);
    }

    #[test]
    fn rows_round_time_ties_to_even() {
        let trace = ramp_trace();
        let rows = reconcile(&trace, &events_at(&[("A", 0.125)]), None).unwrap();
        assert_eq!(rows[0].time, 0.12);
    }
}
