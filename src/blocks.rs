//! Effort block detection
//!
//! Turns the smoothed, zone-labeled sample series into contiguous effort
//! blocks. Transient spikes and dips shorter than the minimum block duration
//! are folded into a neighbouring block so the athlete's deliberate efforts
//! remain visible.

use serde::Serialize;
use std::ops::Range;
use tracing::debug;

use crate::models::{Channel, SampleStream};
use crate::smoothing::active_weights;
use crate::zones::{Zone, ZoneClassifier, ZoneSet};

/// Default minimum block duration (seconds)
pub const DEFAULT_MIN_BLOCK_S: f64 = 20.0;

/// Smoothed, zone-labeled stream with prefix sums for window statistics
#[derive(Debug, Clone)]
pub struct LabeledStream {
    pub channel: Channel,
    pub threshold: f64,
    times: Vec<f64>,
    zones: Vec<Zone>,
    weights: Vec<f64>,
    prefix_active: Vec<f64>,
    prefix_raw: Vec<f64>,
    prefix_zone: Vec<[f64; 5]>,
}

impl LabeledStream {
    /// Label a stream; `smoothed` must be the smoothed version of `raw`
    pub fn new(
        raw: &SampleStream,
        smoothed: &SampleStream,
        classifier: &ZoneClassifier,
        max_gap_s: f64,
    ) -> Self {
        debug_assert_eq!(raw.len(), smoothed.len());

        let weights = active_weights(&raw.samples, max_gap_s);
        let zones: Vec<Zone> = smoothed
            .samples
            .iter()
            .map(|s| classifier.classify(s.value))
            .collect();

        let n = raw.len();
        let mut prefix_active = Vec::with_capacity(n + 1);
        let mut prefix_raw = Vec::with_capacity(n + 1);
        let mut prefix_zone = Vec::with_capacity(n + 1);
        prefix_active.push(0.0);
        prefix_raw.push(0.0);
        prefix_zone.push([0.0; 5]);

        for i in 0..n {
            let w = weights[i];
            prefix_active.push(prefix_active[i] + w);
            prefix_raw.push(prefix_raw[i] + raw.samples[i].value * w);
            let mut zone_seconds = prefix_zone[i];
            zone_seconds[zones[i].index()] += w;
            prefix_zone.push(zone_seconds);
        }

        Self {
            channel: raw.channel,
            threshold: classifier.threshold,
            times: raw.samples.iter().map(|s| s.time_s).collect(),
            zones,
            weights,
            prefix_active,
            prefix_raw,
            prefix_zone,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn start_time(&self) -> f64 {
        self.times.first().copied().unwrap_or(0.0)
    }

    /// Time at which the sample boundary `index` lies; `len()` is the end of the stream
    pub fn boundary_time(&self, index: usize) -> f64 {
        match self.times.get(index) {
            Some(t) => *t,
            None => match (self.times.last(), self.weights.last()) {
                (Some(t), Some(w)) => t + w,
                _ => 0.0,
            },
        }
    }

    /// Total active seconds in the stream
    pub fn active_s(&self) -> f64 {
        self.prefix_active.last().copied().unwrap_or(0.0)
    }

    /// Statistics of the samples in `range`
    pub fn window(&self, range: Range<usize>) -> WindowStats {
        let Range { start, end } = range;
        let active_s = self.prefix_active[end] - self.prefix_active[start];
        let raw_sum = self.prefix_raw[end] - self.prefix_raw[start];

        let mut zone_seconds = [0.0; 5];
        for (z, seconds) in zone_seconds.iter_mut().enumerate() {
            *seconds = self.prefix_zone[end][z] - self.prefix_zone[start][z];
        }

        let avg_value = if active_s > 0.0 { raw_sum / active_s } else { 0.0 };

        WindowStats {
            start_index: start,
            end_index: end,
            start_s: self.boundary_time(start),
            end_s: self.boundary_time(end),
            active_s,
            avg_value,
            avg_pct: avg_value / self.threshold * 100.0,
            zone_seconds,
        }
    }

    /// Sample index splitting `range` so the left part holds about
    /// `fraction` of its active time
    pub fn split_index(&self, range: Range<usize>, fraction: f64) -> usize {
        let base = self.prefix_active[range.start];
        let total = self.prefix_active[range.end] - base;
        let target = base + total * fraction.clamp(0.0, 1.0);

        let offset = self.prefix_active[range.start..=range.end].partition_point(|&a| a < target);
        let upper = (range.start + offset).min(range.end);
        let lower = upper.saturating_sub(1).max(range.start);

        if (self.prefix_active[upper] - target).abs() <= (target - self.prefix_active[lower]).abs() {
            upper
        } else {
            lower
        }
    }
}

/// Aggregate statistics of a contiguous sample window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    pub start_index: usize,
    pub end_index: usize,
    /// Window covers `[start_s, end_s)`
    pub start_s: f64,
    pub end_s: f64,
    /// Recorded (non-paused) seconds
    pub active_s: f64,
    /// Time-weighted mean of the raw values (W or bpm)
    pub avg_value: f64,
    /// `avg_value` as percent of threshold
    pub avg_pct: f64,
    /// Active seconds spent in each zone (smoothed classification)
    pub zone_seconds: [f64; 5],
}

impl WindowStats {
    pub fn seconds_in(&self, zones: ZoneSet) -> f64 {
        zones.iter().map(|z| self.zone_seconds[z.index()]).sum()
    }

    /// Share of active time spent inside `zones`, in [0, 1]
    pub fn fraction_in(&self, zones: ZoneSet) -> f64 {
        if self.active_s <= 0.0 {
            return 0.0;
        }
        (self.seconds_in(zones) / self.active_s).clamp(0.0, 1.0)
    }

    /// Zone holding the most time (lowest zone on ties)
    pub fn majority_zone(&self) -> Zone {
        let mut best = Zone::Z1;
        for zone in Zone::ALL {
            if self.zone_seconds[zone.index()] > self.zone_seconds[best.index()] {
                best = zone;
            }
        }
        best
    }
}

/// Contiguous interval with a stable zone classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffortBlock {
    /// Position in the detected sequence
    pub index: usize,
    /// Dominant zone after transient merging
    pub zone: Zone,
    pub window: WindowStats,
}

impl EffortBlock {
    pub fn start_s(&self) -> f64 {
        self.window.start_s
    }

    pub fn end_s(&self) -> f64 {
        self.window.end_s
    }

    pub fn duration_s(&self) -> f64 {
        self.window.active_s
    }

    pub fn avg_pct(&self) -> f64 {
        self.window.avg_pct
    }

    pub fn samples(&self) -> Range<usize> {
        self.window.start_index..self.window.end_index
    }
}

/// Block boundaries as sample ranges with their zone label
#[derive(Debug, Clone, PartialEq)]
pub struct BlockBounds {
    pub samples: Range<usize>,
    pub zone: Zone,
    pub active_s: f64,
}

/// Detects effort blocks by zone transitions and merges short transients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffortBlockDetector {
    pub min_block_s: f64,
}

impl Default for EffortBlockDetector {
    fn default() -> Self {
        Self {
            min_block_s: DEFAULT_MIN_BLOCK_S,
        }
    }
}

impl EffortBlockDetector {
    pub fn new(min_block_s: f64) -> Self {
        Self { min_block_s }
    }

    pub fn detect<'a>(&self, stream: &'a LabeledStream) -> DetectedBlocks<'a> {
        let mut blocks = Self::zone_runs(stream);
        let initial = blocks.len();

        while blocks.len() > 1 {
            let shortest = blocks
                .iter()
                .enumerate()
                .filter(|(_, b)| b.active_s < self.min_block_s)
                .min_by(|a, b| a.1.active_s.total_cmp(&b.1.active_s))
                .map(|(i, _)| i);

            match shortest {
                Some(i) => Self::merge_into_neighbour(&mut blocks, i),
                None => break,
            }
        }

        debug!(
            initial_runs = initial,
            blocks = blocks.len(),
            min_block_s = self.min_block_s,
            "detected effort blocks"
        );

        DetectedBlocks { stream, blocks }
    }

    /// Initial pass: a new block at every zone change
    fn zone_runs(stream: &LabeledStream) -> Vec<BlockBounds> {
        let mut runs: Vec<BlockBounds> = Vec::new();

        for (i, &zone) in stream.zones().iter().enumerate() {
            match runs.last_mut() {
                Some(run) if run.zone == zone => run.samples.end = i + 1,
                _ => runs.push(BlockBounds {
                    samples: i..i + 1,
                    zone,
                    active_s: 0.0,
                }),
            }
        }

        for run in &mut runs {
            run.active_s = stream.window(run.samples.clone()).active_s;
        }
        runs
    }

    /// Fold block `i` into its longer neighbour (the following one on ties),
    /// then coalesce neighbours that now share a zone
    fn merge_into_neighbour(blocks: &mut Vec<BlockBounds>, i: usize) {
        let previous = i.checked_sub(1);
        let next = (i + 1 < blocks.len()).then_some(i + 1);

        let target = match (previous, next) {
            (Some(p), Some(n)) => {
                if blocks[p].active_s > blocks[n].active_s {
                    p
                } else {
                    n
                }
            }
            (Some(p), None) => p,
            (None, Some(n)) => n,
            (None, None) => return,
        };

        let short = blocks.remove(i);
        let target = if target > i { target - 1 } else { target };
        let absorbing = &mut blocks[target];
        absorbing.samples.start = absorbing.samples.start.min(short.samples.start);
        absorbing.samples.end = absorbing.samples.end.max(short.samples.end);
        absorbing.active_s += short.active_s;

        let mut t = target;
        if t + 1 < blocks.len() && blocks[t + 1].zone == blocks[t].zone {
            let following = blocks.remove(t + 1);
            blocks[t].samples.end = following.samples.end;
            blocks[t].active_s += following.active_s;
        }
        if t > 0 && blocks[t - 1].zone == blocks[t].zone {
            let current = blocks.remove(t);
            t -= 1;
            blocks[t].samples.end = current.samples.end;
            blocks[t].active_s += current.active_s;
        }
    }
}

/// Result of block detection over one stream
#[derive(Debug, Clone)]
pub struct DetectedBlocks<'a> {
    stream: &'a LabeledStream,
    blocks: Vec<BlockBounds>,
}

impl<'a> DetectedBlocks<'a> {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn bounds(&self) -> &[BlockBounds] {
        &self.blocks
    }

    pub fn stream(&self) -> &'a LabeledStream {
        self.stream
    }

    /// Lazily materialize the blocks; may be called any number of times
    pub fn iter(&self) -> EffortBlocks<'_> {
        EffortBlocks {
            stream: self.stream,
            bounds: &self.blocks,
            next: 0,
        }
    }
}

impl<'b, 'a> IntoIterator for &'b DetectedBlocks<'a> {
    type Item = EffortBlock;
    type IntoIter = EffortBlocks<'b>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy, finite iterator over detected effort blocks
#[derive(Debug, Clone)]
pub struct EffortBlocks<'b> {
    stream: &'b LabeledStream,
    bounds: &'b [BlockBounds],
    next: usize,
}

impl Iterator for EffortBlocks<'_> {
    type Item = EffortBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let bounds = self.bounds.get(self.next)?;
        let block = EffortBlock {
            index: self.next,
            zone: bounds.zone,
            window: self.stream.window(bounds.samples.clone()),
        };
        self.next += 1;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bounds.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for EffortBlocks<'_> {}
