//! Time-domain waveforms.

use std::iter::FusedIterator;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::bits::{is_logical_high, is_logical_low};

/// A time-data point.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TimePoint {
    t: f64,
    x: f64,
}

impl TimePoint {
    /// Creates a new [`TimePoint`].
    pub fn new(t: f64, x: f64) -> Self {
        Self { t, x }
    }

    /// The time associated with this point.
    #[inline]
    pub fn t(&self) -> f64 {
        self.t
    }

    /// The value associated with this point.
    #[inline]
    pub fn x(&self) -> f64 {
        self.x
    }
}

impl From<(f64, f64)> for TimePoint {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1)
    }
}

/// A time-dependent waveform that owns its data.
#[derive(Debug, Default, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Waveform {
    values: Vec<TimePoint>,
}

impl Waveform {
    /// Creates a new, empty waveform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a waveform with a single point, `x` at time 0.
    pub fn with_initial_value(x: f64) -> Self {
        Self {
            values: vec![TimePoint::new(0.0, x)],
        }
    }

    /// Creates a waveform from a list of time points.
    ///
    /// The points must already be sorted in time.
    pub fn from_points(values: Vec<TimePoint>) -> Self {
        Self { values }
    }

    /// The number of time points in the waveform.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the waveform has no time points.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The time point at index `idx`, if it exists.
    pub fn get(&self, idx: usize) -> Option<TimePoint> {
        self.values.get(idx).copied()
    }

    /// The first time point, if any.
    pub fn first(&self) -> Option<TimePoint> {
        self.values.first().copied()
    }

    /// The last time point, if any.
    pub fn last(&self) -> Option<TimePoint> {
        self.values.last().copied()
    }

    /// The time of the first point, if any.
    pub fn first_t(&self) -> Option<f64> {
        self.first().map(|p| p.t)
    }

    /// The value of the first point, if any.
    pub fn first_x(&self) -> Option<f64> {
        self.first().map(|p| p.x)
    }

    /// The time of the last point, if any.
    pub fn last_t(&self) -> Option<f64> {
        self.last().map(|p| p.t)
    }

    /// The value of the last point, if any.
    pub fn last_x(&self) -> Option<f64> {
        self.last().map(|p| p.x)
    }

    /// An iterator over the time points in the waveform.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = TimePoint> + '_ {
        self.values.iter().copied()
    }

    /// Adds a point to the waveform.
    ///
    /// # Panics
    ///
    /// Panics if `t` is not strictly larger than the time of the last point.
    pub fn push(&mut self, t: f64, x: f64) {
        if let Some(tp) = self.last_t() {
            assert!(t > tp, "time must be strictly increasing");
        }
        self.values.push(TimePoint::new(t, x));
    }

    /// Holds the waveform at `vdd` until time `until`.
    ///
    /// If the waveform currently ends at a logical low, a rising ramp
    /// of duration `tr` is inserted first.
    pub fn push_high(&mut self, until: f64, vdd: f64, tr: f64) {
        match self.last() {
            None => self.push(0.0, vdd),
            Some(last) => {
                if is_logical_low(last.x, vdd) {
                    self.push(last.t + tr, vdd);
                }
            }
        }
        self.push(until, vdd);
    }

    /// Holds the waveform at 0 until time `until`.
    ///
    /// If the waveform currently ends at a logical high, a falling ramp
    /// of duration `tf` is inserted first.
    pub fn push_low(&mut self, until: f64, vdd: f64, tf: f64) {
        match self.last() {
            None => self.push(0.0, 0.0),
            Some(last) => {
                if is_logical_high(last.x, vdd) {
                    self.push(last.t + tf, 0.0);
                }
            }
        }
        self.push(until, 0.0);
    }

    /// Holds the waveform high or low until time `until`, depending on `bit`.
    pub fn push_bit(&mut self, bit: bool, until: f64, vdd: f64, tr: f64, tf: f64) {
        if bit {
            self.push_high(until, vdd, tr);
        } else {
            self.push_low(until, vdd, tf);
        }
    }

    /// An iterator over the edges of the waveform, using the given threshold.
    pub fn edges(&self, thresh: f64) -> Edges<'_> {
        Edges {
            values: &self.values,
            idx: 0,
            thresh,
        }
    }

    /// An iterator over the transitions of the waveform between settled
    /// logic levels.
    ///
    /// # Panics
    ///
    /// Panics if `low_thresh` is not less than `high_thresh`.
    pub fn transitions(&self, low_thresh: f64, high_thresh: f64) -> Transitions<'_> {
        assert!(low_thresh < high_thresh);
        Transitions {
            values: &self.values,
            state: TransitionState::Unknown,
            prev_idx: 0,
            idx: 0,
            low_thresh,
            high_thresh,
        }
    }

    /// The index of the last point at or before time `t`, if any.
    pub fn time_index_before(&self, t: f64) -> Option<usize> {
        match self.values.binary_search_by(|p| p.t.total_cmp(&t)) {
            Ok(idx) => Some(idx),
            Err(0) => None,
            Err(idx) => Some(idx - 1),
        }
    }

    /// The value of the waveform at time `t`, linearly interpolated
    /// between the two nearest points.
    ///
    /// # Panics
    ///
    /// Panics if `t` lies outside the waveform's time range.
    pub fn sample_at(&self, t: f64) -> f64 {
        let idx = self
            .time_index_before(t)
            .expect("cannot extrapolate before the first time point");
        let p0 = self.values[idx];
        if idx + 1 == self.values.len() {
            assert!(t <= p0.t, "cannot extrapolate beyond the last time point");
            return p0.x;
        }
        let p1 = self.values[idx + 1];
        p0.x + (p1.x - p0.x) * (t - p0.t) / (p1.t - p0.t)
    }

    /// The integral of the waveform over its full time range, computed
    /// by the trapezoidal rule.
    pub fn integral(&self) -> f64 {
        self.values
            .windows(2)
            .map(|w| (w[1].t - w[0].t) * (w[0].x + w[1].x) / 2.0)
            .sum()
    }
}

impl From<Vec<TimePoint>> for Waveform {
    fn from(value: Vec<TimePoint>) -> Self {
        Self::from_points(value)
    }
}

impl Index<usize> for Waveform {
    type Output = TimePoint;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl IndexMut<usize> for Waveform {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.values[index]
    }
}

/// The time at which the segment from `p0` to `p1` crosses `thresh`,
/// linearly interpolated.
pub(crate) fn edge_crossing_time(p0: TimePoint, p1: TimePoint, thresh: f64) -> f64 {
    p0.t + (p1.t - p0.t) * (thresh - p0.x) / (p1.x - p0.x)
}

/// The direction of an edge or transition.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EdgeDir {
    /// A falling edge.
    Falling,
    /// A rising edge.
    Rising,
}

impl EdgeDir {
    /// Returns `true` if this is a rising edge.
    pub fn is_rising(&self) -> bool {
        matches!(self, Self::Rising)
    }

    /// Returns `true` if this is a falling edge.
    pub fn is_falling(&self) -> bool {
        matches!(self, Self::Falling)
    }
}

/// A threshold crossing of a waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    t: f64,
    start_idx: usize,
    dir: EdgeDir,
}

impl Edge {
    /// The interpolated time at which the waveform crosses the threshold.
    pub fn t(&self) -> f64 {
        self.t
    }

    /// The index of the last point before the crossing.
    pub fn idx(&self) -> usize {
        self.start_idx
    }

    /// The direction of the edge.
    pub fn dir(&self) -> EdgeDir {
        self.dir
    }
}

/// An iterator over the edges of a waveform.
///
/// Produced by [`Waveform::edges`].
pub struct Edges<'a> {
    values: &'a [TimePoint],
    idx: usize,
    thresh: f64,
}

impl<'a> Iterator for Edges<'a> {
    type Item = Edge;

    fn next(&mut self) -> Option<Self::Item> {
        while self.idx + 1 < self.values.len() {
            let p0 = self.values[self.idx];
            let p1 = self.values[self.idx + 1];
            self.idx += 1;
            let low0 = p0.x < self.thresh;
            let low1 = p1.x < self.thresh;
            if low0 != low1 {
                return Some(Edge {
                    t: edge_crossing_time(p0, p1, self.thresh),
                    start_idx: self.idx - 1,
                    dir: if low0 {
                        EdgeDir::Rising
                    } else {
                        EdgeDir::Falling
                    },
                });
            }
        }
        None
    }
}

impl<'a> FusedIterator for Edges<'a> {}

/// A full swing between settled logic levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    start_t: f64,
    end_t: f64,
    dir: EdgeDir,
}

impl Transition {
    /// The time of the last settled point before the transition.
    pub fn start_time(&self) -> f64 {
        self.start_t
    }

    /// The time of the first settled point after the transition.
    pub fn end_time(&self) -> f64 {
        self.end_t
    }

    /// The midpoint of the transition in time.
    pub fn center_time(&self) -> f64 {
        (self.start_t + self.end_t) / 2.0
    }

    /// The duration of the transition.
    pub fn duration(&self) -> f64 {
        self.end_t - self.start_t
    }

    /// The direction of the transition.
    pub fn dir(&self) -> EdgeDir {
        self.dir
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum TransitionState {
    Unknown,
    Low,
    High,
}

/// An iterator over the transitions of a waveform.
///
/// Produced by [`Waveform::transitions`].
pub struct Transitions<'a> {
    values: &'a [TimePoint],
    state: TransitionState,
    prev_idx: usize,
    idx: usize,
    low_thresh: f64,
    high_thresh: f64,
}

impl<'a> Iterator for Transitions<'a> {
    type Item = Transition;

    fn next(&mut self) -> Option<Self::Item> {
        use TransitionState::*;
        while self.idx < self.values.len() {
            let p = self.values[self.idx];
            let state = if p.x <= self.low_thresh {
                Some(Low)
            } else if p.x >= self.high_thresh {
                Some(High)
            } else {
                None
            };
            let idx = self.idx;
            self.idx += 1;
            if let Some(state) = state {
                match (self.state, state) {
                    (Low, High) | (High, Low) => {
                        let t = Transition {
                            start_t: self.values[self.prev_idx].t,
                            end_t: p.t,
                            dir: if state == High {
                                EdgeDir::Rising
                            } else {
                                EdgeDir::Falling
                            },
                        };
                        self.state = state;
                        self.prev_idx = idx;
                        return Some(t);
                    }
                    _ => {
                        self.state = state;
                        self.prev_idx = idx;
                    }
                }
            }
        }
        None
    }
}

impl<'a> FusedIterator for Transitions<'a> {}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;
    use itertools::Itertools;

    use super::*;

    fn square_wave() -> Waveform {
        Waveform::from_points(
            vec![
                (0.0, 0.0),
                (1.0, 0.0),
                (1.1, 1.0),
                (2.0, 1.0),
                (2.1, 0.0),
                (3.0, 0.0),
                (3.1, 1.0),
            ]
            .into_iter()
            .map(TimePoint::from)
            .collect(),
        )
    }

    #[test]
    fn waveform_edges() {
        let wav = square_wave();
        let edges = wav.edges(0.5).collect_vec();
        assert_eq!(edges.len(), 3);
        assert_float_eq!(edges[0].t(), 1.05, abs <= 1e-12);
        assert!(edges[0].dir().is_rising());
        assert_eq!(edges[0].idx(), 1);
        assert_float_eq!(edges[1].t(), 2.05, abs <= 1e-12);
        assert!(edges[1].dir().is_falling());
        assert_float_eq!(edges[2].t(), 3.05, abs <= 1e-12);
        assert!(edges[2].dir().is_rising());
    }

    #[test]
    fn waveform_transitions() {
        let wav = square_wave();
        let transitions = wav.transitions(0.2, 0.8).collect_vec();
        assert_eq!(transitions.len(), 3);
        assert_float_eq!(transitions[0].start_time(), 1.0, abs <= 1e-12);
        assert_float_eq!(transitions[0].end_time(), 1.1, abs <= 1e-12);
        assert!(transitions[0].dir().is_rising());
        assert_float_eq!(transitions[1].center_time(), 2.05, abs <= 1e-12);
        assert!(transitions[1].dir().is_falling());
        assert_float_eq!(transitions[2].duration(), 0.1, abs <= 1e-9);
        assert!(transitions[2].dir().is_rising());
    }

    #[test]
    fn waveform_integral() {
        let wav = Waveform::from_points(
            vec![(0.0, 0.0), (1.0, 1.0), (2.0, 1.0), (3.0, 0.0)]
                .into_iter()
                .map(TimePoint::from)
                .collect(),
        );
        assert_float_eq!(wav.integral(), 2.0, abs <= 1e-12);
    }

    #[test]
    fn waveform_sampling() {
        let wav = Waveform::from_points(
            vec![(0.0, 0.0), (1.0, 1.0), (2.0, 0.5)]
                .into_iter()
                .map(TimePoint::from)
                .collect(),
        );
        assert_eq!(wav.time_index_before(0.5), Some(0));
        assert_eq!(wav.time_index_before(1.0), Some(1));
        assert_eq!(wav.time_index_before(-0.1), None);
        assert_float_eq!(wav.sample_at(0.5), 0.5, abs <= 1e-12);
        assert_float_eq!(wav.sample_at(1.5), 0.75, abs <= 1e-12);
        assert_float_eq!(wav.sample_at(2.0), 0.5, abs <= 1e-12);
    }

    #[test]
    #[should_panic]
    fn waveform_rejects_nonincreasing_time() {
        let mut wav = Waveform::with_initial_value(0.0);
        wav.push(0.0, 1.0);
    }

    #[test]
    fn push_bits_forms_pulse_train() {
        let mut wav = Waveform::new();
        wav.push_bit(false, 5e-9, 1.0, 1e-10, 1e-10);
        wav.push_bit(true, 10e-9, 1.0, 1e-10, 1e-10);
        wav.push_bit(true, 15e-9, 1.0, 1e-10, 1e-10);
        wav.push_bit(false, 20e-9, 1.0, 1e-10, 1e-10);

        assert_float_eq!(wav.sample_at(4e-9), 0.0, abs <= 1e-12);
        assert_float_eq!(wav.sample_at(8e-9), 1.0, abs <= 1e-12);
        assert_float_eq!(wav.sample_at(14e-9), 1.0, abs <= 1e-12);
        assert_float_eq!(wav.sample_at(19e-9), 0.0, abs <= 1e-12);
        assert_eq!(wav.edges(0.5).count(), 2);
    }
}
