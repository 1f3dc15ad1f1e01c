//! Planned segment to effort block alignment
//!
//! Athletes start intervals early or late, stretch recoveries and skip
//! segments, so segments are aligned against detected blocks with a
//! dynamic-programming table over (segment index, block index) instead of a
//! positional zip. Besides one segment to one block, the alignment may let a
//! segment span several consecutive blocks (an effort that was detected as
//! split) or let consecutive segments share one block (efforts in the same
//! zone that were detected as merged).

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, trace};

use crate::blocks::{EffortBlock, LabeledStream, WindowStats};
use crate::models::PlannedSegment;
use crate::zones::{Zone, ZoneClassifier, ZoneSet};

const COST_EPSILON: f64 = 1e-9;

/// Alignment tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Weight of the zone mismatch term
    pub zone_weight: f64,
    /// Weight of the duration mismatch term
    pub duration_weight: f64,
    /// Cost of leaving a planned segment unmatched
    pub unmatched_penalty: f64,
    /// Extra cost per additional block joined into one segment
    pub combine_penalty: f64,
    /// Extra cost per additional segment sharing one block
    pub share_penalty: f64,
    /// Most consecutive blocks one segment may span
    pub max_combined_blocks: usize,
    /// Most consecutive segments that may share one block
    pub max_shared_segments: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            zone_weight: 0.6,
            duration_weight: 0.4,
            unmatched_penalty: 0.6,
            combine_penalty: 0.02,
            share_penalty: 0.05,
            max_combined_blocks: 6,
            max_shared_segments: 4,
        }
    }
}

/// How the matched effort was assembled from detected blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Exactly one detected block
    Single,
    /// Several consecutive blocks joined
    Combined,
    /// A slice of a block shared with neighbouring segments
    Shared,
}

/// Confidence bucket of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    Strong,
    Moderate,
    Weak,
    Unmatched,
}

impl MatchQuality {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.75 {
            MatchQuality::Strong
        } else if confidence >= 0.4 {
            MatchQuality::Moderate
        } else {
            MatchQuality::Weak
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchQuality::Strong => "strong",
            MatchQuality::Moderate => "moderate",
            MatchQuality::Weak => "weak",
            MatchQuality::Unmatched => "unmatched",
        }
    }
}

/// The actual effort assigned to a planned segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedEffort {
    pub kind: MatchKind,
    /// Indices of the detected blocks the effort was taken from
    pub blocks: Range<usize>,
    /// Dominant zone of the effort
    pub zone: Zone,
    pub window: WindowStats,
}

/// Pairing of one planned segment with zero or one actual effort
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub segment_index: usize,
    pub segment: PlannedSegment,
    pub target_zones: ZoneSet,
    /// Where the plan expected the segment, seconds from activity start
    pub planned_start_s: f64,
    /// Where the matched effort began, seconds from activity start
    pub actual_start_s: Option<f64>,
    pub effort: Option<MatchedEffort>,
    pub dissimilarity: f64,
    /// 1 for a perfect match, 0 for one no better than leaving it unmatched
    pub confidence: f64,
    pub quality: MatchQuality,
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        self.effort.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
struct Cost {
    dissimilarity: f64,
    drift: f64,
}

impl Cost {
    const ZERO: Cost = Cost {
        dissimilarity: 0.0,
        drift: 0.0,
    };

    fn plus(self, dissimilarity: f64, drift: f64) -> Cost {
        Cost {
            dissimilarity: self.dissimilarity + dissimilarity,
            drift: self.drift + drift,
        }
    }

    /// Lower dissimilarity wins; equal dissimilarity falls back to less drift
    fn beats(&self, other: &Cost) -> bool {
        if (self.dissimilarity - other.dissimilarity).abs() > COST_EPSILON {
            self.dissimilarity < other.dissimilarity
        } else {
            self.drift < other.drift - COST_EPSILON
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Done,
    SkipSegment,
    SkipBlock,
    Match { span: usize },
    Share { count: usize },
}

/// Candidate effort for one segment
#[derive(Debug, Clone)]
struct Candidate {
    kind: MatchKind,
    blocks: Range<usize>,
    zone: Zone,
    window: WindowStats,
}

/// Segments sharing one block: `None` entries are skipped inside the group
struct SharedGroup {
    pieces: Vec<Option<WindowStats>>,
    cost: f64,
    drift: f64,
}

/// Aligns planned segments to detected effort blocks
pub struct SegmentMatcher<'a> {
    stream: &'a LabeledStream,
    classifier: ZoneClassifier,
    config: MatcherConfig,
}

impl<'a> SegmentMatcher<'a> {
    pub fn new(stream: &'a LabeledStream, classifier: ZoneClassifier, config: MatcherConfig) -> Self {
        Self {
            stream,
            classifier,
            config,
        }
    }

    /// Weighted zone and duration mismatch between a segment and an effort
    pub fn dissimilarity(
        &self,
        segment: &PlannedSegment,
        targets: ZoneSet,
        zone: Zone,
        active_s: f64,
    ) -> f64 {
        let zone_mismatch = match zone.distance_to(targets) {
            0 => 0.0,
            steps => (0.5 + 0.25 * (steps - 1) as f64).min(1.0),
        };

        let ratio = active_s / segment.planned_duration_s;
        let duration_mismatch = if ratio > 0.0 && ratio.is_finite() {
            ratio.ln().abs().min(2.0) / 2.0
        } else {
            1.0
        };

        self.config.zone_weight * zone_mismatch + self.config.duration_weight * duration_mismatch
    }

    /// Order-preserving minimum-dissimilarity assignment
    pub fn align(&self, segments: &[PlannedSegment], blocks: &[EffortBlock]) -> Vec<MatchResult> {
        let n = segments.len();
        let m = blocks.len();
        let width = m + 1;
        let origin = self.stream.start_time();

        let targets: Vec<ZoneSet> = segments
            .iter()
            .map(|s| self.classifier.target_zones(s))
            .collect();
        let planned_starts: Vec<f64> = segments
            .iter()
            .scan(0.0, |offset, s| {
                let start = *offset;
                *offset += s.planned_duration_s;
                Some(start)
            })
            .collect();

        let mut table = vec![(Cost::ZERO, Step::Done); (n + 1) * width];

        for i in (0..n).rev() {
            for j in (0..=m).rev() {
                let skip = table[(i + 1) * width + j].0.plus(self.config.unmatched_penalty, 0.0);
                let mut best = (skip, Step::SkipSegment);

                if j < m {
                    let max_span = self.config.max_combined_blocks.max(1).min(m - j);
                    for span in 1..=max_span {
                        let candidate = self.combined(blocks, j..j + span);
                        let cost = self.dissimilarity(
                            &segments[i],
                            targets[i],
                            candidate.zone,
                            candidate.window.active_s,
                        ) + self.config.combine_penalty * (span - 1) as f64;
                        let drift = (candidate.window.start_s - origin - planned_starts[i]).abs();
                        let total = table[(i + 1) * width + j + span].0.plus(cost, drift);
                        if total.beats(&best.0) {
                            best = (total, Step::Match { span });
                        }
                    }

                    let max_share = self.config.max_shared_segments.min(n - i);
                    for count in 2..=max_share {
                        let group = self.shared(
                            &segments[i..i + count],
                            &targets[i..i + count],
                            &planned_starts[i..i + count],
                            &blocks[j],
                            origin,
                        );
                        if let Some(group) = group {
                            let total = table[(i + count) * width + j + 1]
                                .0
                                .plus(group.cost, group.drift);
                            if total.beats(&best.0) {
                                best = (total, Step::Share { count });
                            }
                        }
                    }

                    let skip_block = table[i * width + j + 1].0;
                    if skip_block.beats(&best.0) {
                        best = (skip_block, Step::SkipBlock);
                    }
                }

                table[i * width + j] = best;
            }
        }

        let mut results = Vec::with_capacity(n);
        let (mut i, mut j) = (0, 0);
        while i < n {
            let step = table[i * width + j].1;
            trace!(segment = i, block = j, ?step, "alignment step");
            match step {
                Step::SkipSegment => {
                    results.push(self.unmatched(i, &segments[i], targets[i], planned_starts[i]));
                    i += 1;
                }
                Step::SkipBlock => j += 1,
                Step::Match { span } => {
                    let candidate = self.combined(blocks, j..j + span);
                    results.push(self.matched(i, &segments[i], targets[i], planned_starts[i], candidate));
                    i += 1;
                    j += span;
                }
                Step::Share { count } => {
                    let group = self.shared(
                        &segments[i..i + count],
                        &targets[i..i + count],
                        &planned_starts[i..i + count],
                        &blocks[j],
                        origin,
                    );
                    let pieces = group.map(|g| g.pieces).unwrap_or_else(|| vec![None; count]);
                    for (k, piece) in pieces.into_iter().enumerate() {
                        let index = i + k;
                        let result = match piece {
                            Some(window) => self.matched(
                                index,
                                &segments[index],
                                targets[index],
                                planned_starts[index],
                                Candidate {
                                    kind: MatchKind::Shared,
                                    blocks: j..j + 1,
                                    zone: blocks[j].zone,
                                    window,
                                },
                            ),
                            None => self.unmatched(
                                index,
                                &segments[index],
                                targets[index],
                                planned_starts[index],
                            ),
                        };
                        results.push(result);
                    }
                    i += count;
                    j += 1;
                }
                Step::Done => break,
            }
        }

        debug!(
            segments = n,
            blocks = m,
            matched = results.iter().filter(|r| r.is_matched()).count(),
            total_dissimilarity = table[0].0.dissimilarity,
            "aligned planned segments"
        );

        results
    }

    /// Consecutive blocks joined into one effort
    fn combined(&self, blocks: &[EffortBlock], range: Range<usize>) -> Candidate {
        let first = &blocks[range.start];
        let last = &blocks[range.end - 1];

        if range.len() == 1 {
            return Candidate {
                kind: MatchKind::Single,
                blocks: range,
                zone: first.zone,
                window: first.window,
            };
        }

        let mut by_label = [0.0; 5];
        for block in &blocks[range.clone()] {
            by_label[block.zone.index()] += block.duration_s();
        }
        let mut zone = Zone::Z1;
        for candidate in Zone::ALL {
            if by_label[candidate.index()] > by_label[zone.index()] {
                zone = candidate;
            }
        }

        Candidate {
            kind: MatchKind::Combined,
            blocks: range,
            zone,
            window: self
                .stream
                .window(first.samples().start..last.samples().end),
        }
    }

    /// Slice one block among consecutive segments in proportion to their
    /// planned durations. The first and last segment must target the block's
    /// zone; segments in between that do not are left unmatched.
    fn shared(
        &self,
        segments: &[PlannedSegment],
        targets: &[ZoneSet],
        planned_starts: &[f64],
        block: &EffortBlock,
        origin: f64,
    ) -> Option<SharedGroup> {
        let fits: Vec<bool> = targets.iter().map(|t| t.contains(block.zone)).collect();
        if !fits.first().copied().unwrap_or(false) || !fits.last().copied().unwrap_or(false) {
            return None;
        }

        let included_s: f64 = segments
            .iter()
            .zip(&fits)
            .filter(|(_, fits)| **fits)
            .map(|(s, _)| s.planned_duration_s)
            .sum();

        let range = block.samples();
        let mut pieces = Vec::with_capacity(segments.len());
        let mut cost = self.config.share_penalty * (segments.len() - 1) as f64;
        let mut drift = 0.0;
        let mut consumed_s = 0.0;
        let mut cut = range.start;

        for (k, segment) in segments.iter().enumerate() {
            if !fits[k] {
                pieces.push(None);
                cost += self.config.unmatched_penalty;
                continue;
            }

            consumed_s += segment.planned_duration_s;
            let next_cut = self.stream.split_index(range.clone(), consumed_s / included_s);
            if next_cut <= cut {
                return None;
            }

            let window = self.stream.window(cut..next_cut);
            cost += self.dissimilarity(segment, targets[k], block.zone, window.active_s);
            drift += (window.start_s - origin - planned_starts[k]).abs();
            pieces.push(Some(window));
            cut = next_cut;
        }

        Some(SharedGroup {
            pieces,
            cost,
            drift,
        })
    }

    fn matched(
        &self,
        index: usize,
        segment: &PlannedSegment,
        targets: ZoneSet,
        planned_start_s: f64,
        candidate: Candidate,
    ) -> MatchResult {
        let dissimilarity =
            self.dissimilarity(segment, targets, candidate.zone, candidate.window.active_s);
        let confidence = if self.config.unmatched_penalty > 0.0 {
            (1.0 - dissimilarity / self.config.unmatched_penalty).clamp(0.0, 1.0)
        } else {
            0.0
        };

        MatchResult {
            segment_index: index,
            segment: segment.clone(),
            target_zones: targets,
            planned_start_s,
            actual_start_s: Some(candidate.window.start_s - self.stream.start_time()),
            effort: Some(MatchedEffort {
                kind: candidate.kind,
                blocks: candidate.blocks,
                zone: candidate.zone,
                window: candidate.window,
            }),
            dissimilarity,
            confidence,
            quality: MatchQuality::from_confidence(confidence),
        }
    }

    fn unmatched(
        &self,
        index: usize,
        segment: &PlannedSegment,
        targets: ZoneSet,
        planned_start_s: f64,
    ) -> MatchResult {
        MatchResult {
            segment_index: index,
            segment: segment.clone(),
            target_zones: targets,
            planned_start_s,
            actual_start_s: None,
            effort: None,
            dissimilarity: self.config.unmatched_penalty,
            confidence: 0.0,
            quality: MatchQuality::Unmatched,
        }
    }
}
