use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FillPolicy, IdentifierTuple};
use crate::error::PipelineError;

/// Tolerance, in samples, when deciding whether an instant falls on a sample.
const SAMPLE_EPSILON: f64 = 1e-6;

/// A continuous, evenly sampled run of data for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: IdentifierTuple,
    pub start: DateTime<Utc>,
    pub sampling_rate: f64,
    pub samples: Vec<f64>,
}

impl Trace {
    pub fn new(
        id: IdentifierTuple,
        start: DateTime<Utc>,
        sampling_rate: f64,
        samples: Vec<f64>,
    ) -> Self {
        Self {
            id,
            start,
            sampling_rate,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Instant the sample after the last one would fall on.
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        self.start + span(self.samples.len(), self.sampling_rate)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(PipelineError::Codec(format!(
                "trace {} has invalid sampling rate {}",
                self.id, self.sampling_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stream {
    traces: Vec<Trace>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    pub fn extend(&mut self, other: Stream) {
        self.traces.extend(other.traces);
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn into_traces(self) -> Vec<Trace> {
        self.traces
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.traces.iter().map(Trace::len).sum()
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.traces.iter().try_for_each(Trace::validate)
    }
}

impl From<Vec<Trace>> for Stream {
    fn from(traces: Vec<Trace>) -> Self {
        Self { traces }
    }
}

impl FromIterator<Trace> for Stream {
    fn from_iter<I: IntoIterator<Item = Trace>>(iter: I) -> Self {
        Self {
            traces: iter.into_iter().collect(),
        }
    }
}

/// A stretch with no samples between two traces of the same identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub id: IdentifierTuple,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub missing_samples: u64,
}

impl Gap {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// `network,station,location,channel,start,end,duration_s,missing_samples`
    pub fn log_line(&self) -> String {
        let seconds = self.duration().num_milliseconds() as f64 / 1000.0;
        [
            self.id.network.clone(),
            self.id.station.clone(),
            self.id.location.clone(),
            self.id.channel.clone(),
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            format!("{seconds:.3}"),
            self.missing_samples.to_string(),
        ]
        .join(",")
    }
}

/// Reports every discontinuity of at least `min_gap_samples` (never less than one).
/// Overlapping traces are not gaps.
pub fn detect_gaps(stream: &Stream, min_gap_samples: u64) -> Vec<Gap> {
    let threshold = min_gap_samples.max(1) as f64;
    let mut gaps = Vec::new();

    for (id, mut traces) in group_by_id(stream.traces.iter()) {
        traces.sort_by_key(|trace| trace.start);
        let mut frontier: Option<(DateTime<Utc>, f64)> = None;
        for trace in traces.into_iter().filter(|trace| !trace.is_empty()) {
            if let Some((edge, rate)) = frontier {
                let missing = samples_between(edge, trace.start, rate).round();
                if missing >= threshold {
                    gaps.push(Gap {
                        id: id.clone(),
                        start: edge,
                        end: trace.start,
                        missing_samples: missing as u64,
                    });
                }
            }
            let end = trace.end_exclusive();
            frontier = match frontier {
                Some((edge, rate)) if edge >= end => Some((edge, rate)),
                _ => Some((end, trace.sampling_rate)),
            };
        }
    }
    gaps
}

/// Missing stretches between the window edges and the first or last sample of
/// each identifier, reported when at least `min_gap_samples` long.
pub fn edge_gaps(
    stream: &Stream,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    min_gap_samples: u64,
) -> Vec<Gap> {
    let threshold = min_gap_samples.max(1) as f64;
    let mut gaps = Vec::new();

    for (id, traces) in group_by_id(stream.traces.iter()) {
        let present = traces.into_iter().filter(|trace| !trace.is_empty());
        let Some(first) = present.clone().min_by_key(|trace| trace.start) else {
            continue;
        };
        let Some(last) = present.max_by_key(|trace| trace.end_exclusive()) else {
            continue;
        };

        let head = samples_between(start, first.start, first.sampling_rate).round();
        if head >= threshold {
            gaps.push(Gap {
                id: id.clone(),
                start,
                end: first.start,
                missing_samples: head as u64,
            });
        }
        let tail_start = last.end_exclusive();
        let tail = samples_between(tail_start, end, last.sampling_rate).round();
        if tail >= threshold {
            gaps.push(Gap {
                id,
                start: tail_start,
                end,
                missing_samples: tail as u64,
            });
        }
    }
    gaps
}

/// Joins traces per identifier. Overlapping samples keep the earlier trace's
/// values. Discontinuities are zero-filled under `ZeroFill` and otherwise left
/// as separate traces.
pub fn merge(stream: Stream, policy: FillPolicy) -> Stream {
    let mut merged = Vec::new();

    for (_, mut traces) in group_by_id(stream.traces.into_iter()) {
        traces.retain(|trace| !trace.is_empty());
        traces.sort_by_key(|trace| trace.start);
        let mut traces = traces.into_iter();
        let Some(mut current) = traces.next() else {
            continue;
        };

        for next in traces {
            if !same_rate(&current, &next) {
                merged.push(std::mem::replace(&mut current, next));
                continue;
            }
            let position = samples_between(current.start, next.start, current.sampling_rate).round();
            let held = current.samples.len() as f64;
            if position <= held {
                let skip = (held - position) as usize;
                if skip < next.samples.len() {
                    current.samples.extend_from_slice(&next.samples[skip..]);
                }
            } else if policy.fabricates_samples() {
                let missing = (position - held) as usize;
                current.samples.extend(std::iter::repeat_n(0.0, missing));
                current.samples.extend(next.samples);
            } else {
                merged.push(std::mem::replace(&mut current, next));
            }
        }
        merged.push(current);
    }

    Stream::from(merged)
}

/// Keeps samples falling in `[start, end)`.
pub fn trim(stream: Stream, start: DateTime<Utc>, end: DateTime<Utc>) -> Stream {
    stream
        .traces
        .into_iter()
        .filter_map(|trace| trim_trace(trace, start, end))
        .collect()
}

fn trim_trace(mut trace: Trace, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Trace> {
    let rate = trace.sampling_rate;
    let len = trace.samples.len();
    let first = ceil_index(samples_between(trace.start, start, rate)).min(len);
    let last = ceil_index(samples_between(trace.start, end, rate)).min(len);
    if first >= last {
        return None;
    }
    trace.samples.truncate(last);
    trace.samples.drain(..first);
    trace.start += span(first, rate);
    Some(trace)
}

fn group_by_id<T, I>(traces: I) -> BTreeMap<IdentifierTuple, Vec<T>>
where
    T: std::borrow::Borrow<Trace>,
    I: Iterator<Item = T>,
{
    let mut groups: BTreeMap<IdentifierTuple, Vec<T>> = BTreeMap::new();
    for trace in traces {
        let id = trace.borrow().id.clone();
        groups.entry(id).or_default().push(trace);
    }
    groups
}

fn same_rate(a: &Trace, b: &Trace) -> bool {
    (a.sampling_rate - b.sampling_rate).abs() <= f64::EPSILON * a.sampling_rate.max(1.0) * 16.0
}

fn samples_between(from: DateTime<Utc>, to: DateTime<Utc>, rate: f64) -> f64 {
    let delta = to - from;
    let nanos = delta
        .num_nanoseconds()
        .map(|nanos| nanos as f64)
        .unwrap_or_else(|| delta.num_milliseconds() as f64 * 1e6);
    nanos * rate / 1e9
}

fn span(samples: usize, rate: f64) -> TimeDelta {
    TimeDelta::nanoseconds((samples as f64 * 1e9 / rate).round() as i64)
}

fn ceil_index(position: f64) -> usize {
    let index = (position - SAMPLE_EPSILON).ceil();
    if index <= 0.0 { 0 } else { index as usize }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn id() -> IdentifierTuple {
        "XX.STA1.00.BHZ".parse().unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn trace(offset_s: i64, samples: usize) -> Trace {
        Trace::new(
            id(),
            t0() + TimeDelta::seconds(offset_s),
            1.0,
            (0..samples).map(|i| i as f64 + 1.0).collect(),
        )
    }

    #[test]
    fn contiguous_traces_merge_without_gaps() {
        let stream = Stream::from(vec![trace(10, 10), trace(0, 10), trace(20, 10)]);
        assert!(detect_gaps(&stream, 1).is_empty());

        let merged = merge(stream, FillPolicy::LeaveGap);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.sample_count(), 30);
        assert_eq!(merged.traces()[0].start, t0());
    }

    #[test]
    fn overlap_keeps_earlier_samples() {
        let mut later = trace(5, 10);
        later.samples = vec![-1.0; 10];
        let merged = merge(Stream::from(vec![trace(0, 10), later]), FillPolicy::ZeroFill);

        let samples = &merged.traces()[0].samples;
        assert_eq!(samples.len(), 15);
        assert_eq!(samples[9], 10.0);
        assert_eq!(samples[10], -1.0);
    }

    #[test]
    fn gap_is_zero_filled_or_left() {
        let stream = Stream::from(vec![trace(0, 10), trace(25, 5)]);
        let gaps = detect_gaps(&stream, 1);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].missing_samples, 15);
        assert_eq!(gaps[0].start, t0() + TimeDelta::seconds(10));
        assert_eq!(gaps[0].end, t0() + TimeDelta::seconds(25));

        let filled = merge(stream.clone(), FillPolicy::ZeroFill);
        assert_eq!(filled.len(), 1);
        assert_eq!(filled.sample_count(), 30);
        assert!(filled.traces()[0].samples[10..25].iter().all(|v| *v == 0.0));

        let left = merge(stream, FillPolicy::LeaveGap);
        assert_eq!(left.len(), 2);
        assert_eq!(left.sample_count(), 15);
    }

    #[test]
    fn threshold_filters_short_gaps() {
        let stream = Stream::from(vec![trace(0, 10), trace(12, 5)]);
        assert_eq!(detect_gaps(&stream, 1).len(), 1);
        assert!(detect_gaps(&stream, 3).is_empty());
    }

    #[test]
    fn edge_gaps_find_missing_head_and_tail() {
        let stream = Stream::from(vec![trace(30, 40)]);
        let gaps = edge_gaps(&stream, t0(), t0() + TimeDelta::seconds(100), 1);
        assert_eq!(gaps.len(), 2);
        assert_eq!((gaps[0].start, gaps[0].end), (t0(), t0() + TimeDelta::seconds(30)));
        assert_eq!(gaps[0].missing_samples, 30);
        assert_eq!(gaps[1].start, t0() + TimeDelta::seconds(70));
        assert_eq!(gaps[1].missing_samples, 30);

        let full = Stream::from(vec![trace(0, 100)]);
        assert!(edge_gaps(&full, t0(), t0() + TimeDelta::seconds(100), 1).is_empty());
        assert!(edge_gaps(&stream, t0(), t0() + TimeDelta::seconds(100), 31).is_empty());
    }

    #[test]
    fn trim_keeps_half_open_window() {
        let stream = Stream::from(vec![trace(0, 100)]);
        let trimmed = trim(
            stream,
            t0() + TimeDelta::seconds(10),
            t0() + TimeDelta::seconds(20),
        );
        let trace = &trimmed.traces()[0];
        assert_eq!(trace.len(), 10);
        assert_eq!(trace.start, t0() + TimeDelta::seconds(10));
        assert_eq!(trace.samples[0], 11.0);
    }

    #[test]
    fn gap_log_line_is_comma_joined() {
        let gap = Gap {
            id: id(),
            start: t0(),
            end: t0() + TimeDelta::seconds(90),
            missing_samples: 90,
        };
        assert_eq!(
            gap.log_line(),
            "XX,STA1,00,BHZ,2024-01-01T00:00:00+00:00,2024-01-01T00:01:30+00:00,90.000,90"
        );
    }
}
