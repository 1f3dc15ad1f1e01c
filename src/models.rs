use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{
    ChannelMismatchError, ComplianceError, InsufficientDataError, InvalidPlanError, Result,
};

/// Physiological channel a compliance analysis is computed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Power,
    HeartRate,
}

impl Channel {
    /// Unit of the raw sample values
    pub fn unit(&self) -> &'static str {
        match self {
            Channel::Power => "W",
            Channel::HeartRate => "bpm",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Power => write!(f, "power"),
            Channel::HeartRate => write!(f, "heart rate"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "power" | "watts" => Ok(Channel::Power),
            "heart-rate" | "heart_rate" | "heartrate" | "hr" => Ok(Channel::HeartRate),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

/// Athlete threshold reference, supplied per analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    /// Functional Threshold Power (watts)
    pub ftp_watts: f64,

    /// Lactate threshold heart rate (bpm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_hr_bpm: Option<f64>,
}

impl ThresholdProfile {
    pub fn new(ftp_watts: f64) -> Self {
        Self {
            ftp_watts,
            threshold_hr_bpm: None,
        }
    }

    pub fn with_threshold_hr(mut self, threshold_hr_bpm: f64) -> Self {
        self.threshold_hr_bpm = Some(threshold_hr_bpm);
        self
    }

    /// Threshold used as the 100% reference for a channel
    pub fn threshold_for(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Power => Some(self.ftp_watts),
            Channel::HeartRate => self.threshold_hr_bpm,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.ftp_watts.is_finite() || self.ftp_watts <= 0.0 {
            return Err(ComplianceError::InvalidProfile(format!(
                "FTP must be a positive number of watts, got {}",
                self.ftp_watts
            )));
        }
        if let Some(hr) = self.threshold_hr_bpm {
            if !hr.is_finite() || hr <= 0.0 {
                return Err(ComplianceError::InvalidProfile(format!(
                    "threshold heart rate must be a positive number of bpm, got {}",
                    hr
                )));
            }
        }
        Ok(())
    }
}

/// Semantic role of a planned segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    #[serde(alias = "warm_up")]
    Warmup,
    #[serde(alias = "cool_down")]
    Cooldown,
    #[serde(alias = "tempo")]
    Steady,
    #[serde(alias = "hard", alias = "hard_effort")]
    Interval,
    #[serde(alias = "rest")]
    Recovery,
}

impl SegmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentType::Warmup => "warmup",
            SegmentType::Cooldown => "cooldown",
            SegmentType::Steady => "steady",
            SegmentType::Interval => "interval",
            SegmentType::Recovery => "recovery",
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of an expanded segment inside its repeat set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repetition {
    /// Zero-based repetition index
    pub index: u32,
    /// Total repetitions in the set
    pub count: u32,
}

/// One planned, intentional phase of a structured workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSegment {
    #[serde(rename = "type")]
    pub segment_type: SegmentType,

    /// Lower bound of the target range (% of threshold)
    pub target_min_pct: f64,

    /// Upper bound of the target range (% of threshold)
    pub target_max_pct: f64,

    /// Planned duration in seconds
    pub planned_duration_s: f64,

    /// Optional label shown in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Repeat this segment n times in a row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,

    /// Set on expanded instances that came from a repeat structure
    #[serde(skip)]
    pub repetition: Option<Repetition>,
}

impl PlannedSegment {
    pub fn new(
        segment_type: SegmentType,
        target_min_pct: f64,
        target_max_pct: f64,
        planned_duration_s: f64,
    ) -> Self {
        Self {
            segment_type,
            target_min_pct,
            target_max_pct,
            planned_duration_s,
            name: None,
            repeat: None,
            repetition: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn repeated(mut self, times: u32) -> Self {
        self.repeat = Some(times);
        self
    }

    /// Whether an intensity (% of threshold) lies inside the target range
    pub fn contains_pct(&self, pct: f64) -> bool {
        pct >= self.target_min_pct && pct <= self.target_max_pct
    }

    fn validate(&self, index: usize) -> std::result::Result<(), InvalidPlanError> {
        if !self.planned_duration_s.is_finite() || self.planned_duration_s <= 0.0 {
            return Err(InvalidPlanError::NonPositiveDuration {
                index,
                duration_s: self.planned_duration_s,
            });
        }
        for value in [self.target_min_pct, self.target_max_pct] {
            if !value.is_finite() || value < 0.0 {
                return Err(InvalidPlanError::InvalidTarget { index, value });
            }
        }
        if self.target_max_pct < self.target_min_pct {
            return Err(InvalidPlanError::InvertedRange {
                index,
                min_pct: self.target_min_pct,
                max_pct: self.target_max_pct,
            });
        }
        Ok(())
    }
}

/// A group of segments repeated as a set, e.g. 5 x (3' on, 2' off)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatGroup {
    pub repeat: u32,
    pub segments: Vec<PlannedSegment>,
}

/// One entry of a workout plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanEntry {
    Repeat(RepeatGroup),
    Segment(PlannedSegment),
}

/// A previously planned structured workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedWorkout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub segments: Vec<PlanEntry>,
}

impl PlannedWorkout {
    pub fn from_segments(segments: Vec<PlannedSegment>) -> Self {
        Self {
            name: None,
            segments: segments.into_iter().map(PlanEntry::Segment).collect(),
        }
    }

    /// Flatten repeat structures into the ordered list of segment instances
    pub fn expand(&self) -> std::result::Result<Vec<PlannedSegment>, InvalidPlanError> {
        let mut expanded = Vec::new();

        for (index, entry) in self.segments.iter().enumerate() {
            match entry {
                PlanEntry::Segment(segment) => push_repeated(&mut expanded, segment, index, None)?,
                PlanEntry::Repeat(group) => {
                    if group.repeat == 0 {
                        return Err(InvalidPlanError::ZeroRepeat { index });
                    }
                    for rep in 0..group.repeat {
                        let repetition = Repetition {
                            index: rep,
                            count: group.repeat,
                        };
                        for segment in &group.segments {
                            push_repeated(&mut expanded, segment, index, Some(repetition))?;
                        }
                    }
                }
            }
        }

        Ok(expanded)
    }

    /// Expanded segments, rejected if the plan is not analyzable
    pub fn validated_segments(&self) -> Result<Vec<PlannedSegment>> {
        let segments = self.expand()?;
        if segments.is_empty() {
            return Err(InvalidPlanError::NoSegments.into());
        }
        for (index, segment) in segments.iter().enumerate() {
            segment.validate(index)?;
        }
        Ok(segments)
    }

    /// Total planned duration in seconds (after repeat expansion)
    pub fn total_planned_s(&self) -> f64 {
        self.expand()
            .map(|segments| segments.iter().map(|s| s.planned_duration_s).sum())
            .unwrap_or(0.0)
    }
}

fn push_repeated(
    out: &mut Vec<PlannedSegment>,
    segment: &PlannedSegment,
    entry_index: usize,
    group: Option<Repetition>,
) -> std::result::Result<(), InvalidPlanError> {
    let times = segment.repeat.unwrap_or(1);
    if times == 0 {
        return Err(InvalidPlanError::ZeroRepeat { index: entry_index });
    }

    for rep in 0..times {
        let mut instance = segment.clone();
        instance.repeat = None;
        instance.repetition = match (group, segment.repeat) {
            (Some(outer), _) => Some(outer),
            (None, Some(_)) => Some(Repetition {
                index: rep,
                count: times,
            }),
            (None, None) => None,
        };
        out.push(instance);
    }
    Ok(())
}

/// Co-indexed activity streams as delivered by the activity provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStreams {
    /// Seconds since activity start
    pub time_s: Vec<f64>,

    /// Power in watts; `null` marks a dropout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watts: Option<Vec<Option<f64>>>,

    /// Heart rate in bpm; `null` marks a dropout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartrate: Option<Vec<Option<f64>>>,
}

impl ActivityStreams {
    pub fn new(time_s: Vec<f64>) -> Self {
        Self {
            time_s,
            watts: None,
            heartrate: None,
        }
    }

    pub fn with_watts(mut self, watts: Vec<f64>) -> Self {
        self.watts = Some(watts.into_iter().map(Some).collect());
        self
    }

    pub fn with_heartrate(mut self, heartrate: Vec<f64>) -> Self {
        self.heartrate = Some(heartrate.into_iter().map(Some).collect());
        self
    }

    /// Build a 1 Hz stream from constant-value chunks of (seconds, value)
    pub fn from_power_steps(steps: &[(u32, f64)]) -> Self {
        let mut time_s = Vec::new();
        let mut watts = Vec::new();
        for &(seconds, value) in steps {
            for _ in 0..seconds {
                time_s.push(time_s.len() as f64);
                watts.push(value);
            }
        }
        Self::new(time_s).with_watts(watts)
    }

    /// Extract the sample stream for one channel
    ///
    /// Dropouts (null, negative or non-finite values) are removed and leave a
    /// gap in the resulting stream.
    pub fn stream(&self, channel: Channel) -> Result<SampleStream> {
        let values = match channel {
            Channel::Power => self.watts.as_ref(),
            Channel::HeartRate => self.heartrate.as_ref(),
        }
        .ok_or(ChannelMismatchError::MissingStream { channel })?;

        if self.time_s.is_empty() {
            return Err(InsufficientDataError::EmptyStream { channel }.into());
        }

        if values.len() != self.time_s.len() {
            return Err(ComplianceError::InvalidStream(format!(
                "{} stream has {} values for {} timestamps",
                channel,
                values.len(),
                self.time_s.len()
            )));
        }

        if let Some(i) = self.time_s.iter().position(|t| !t.is_finite()) {
            return Err(ComplianceError::InvalidStream(format!(
                "timestamp at index {} is not a finite number ({})",
                i, self.time_s[i]
            )));
        }

        for (i, pair) in self.time_s.windows(2).enumerate() {
            if !(pair[1] > pair[0]) {
                return Err(ComplianceError::InvalidStream(format!(
                    "timestamps must be strictly increasing (index {}: {} -> {})",
                    i + 1,
                    pair[0],
                    pair[1]
                )));
            }
        }

        let samples: Vec<Sample> = self
            .time_s
            .iter()
            .zip(values)
            .filter_map(|(&time_s, value)| match value {
                Some(v) if v.is_finite() && *v >= 0.0 => Some(Sample { time_s, value: *v }),
                _ => None,
            })
            .collect();

        if samples.is_empty() {
            return Err(InsufficientDataError::NoUsableSamples {
                channel,
                dropped: values.len(),
            }
            .into());
        }

        Ok(SampleStream::new(channel, samples))
    }
}

/// One timestamped value of a physiological channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time_s: f64,
    pub value: f64,
}

/// Time-ordered samples of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStream {
    pub channel: Channel,
    pub samples: Vec<Sample>,
}

impl SampleStream {
    pub fn new(channel: Channel, samples: Vec<Sample>) -> Self {
        Self { channel, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    /// Wall-clock span between the first and last sample
    pub fn span_s(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.time_s - first.time_s,
            _ => 0.0,
        }
    }
}
