//! Rolling-average smoothing and gap handling for sample streams

use tracing::debug;

use crate::error::{InsufficientDataError, Result};
use crate::models::{Sample, SampleStream};

/// Default trailing window (seconds)
pub const DEFAULT_WINDOW_S: f64 = 30.0;

/// Default longest spacing still counted as continuous recording (seconds)
pub const DEFAULT_MAX_GAP_S: f64 = 10.0;

/// Trailing fixed-window rolling average
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSmoother {
    pub window_s: f64,
}

impl Default for StreamSmoother {
    fn default() -> Self {
        Self {
            window_s: DEFAULT_WINDOW_S,
        }
    }
}

impl StreamSmoother {
    pub fn new(window_s: f64) -> Self {
        Self { window_s }
    }

    /// Replace every value by the mean of the samples in `(t - window, t]`
    ///
    /// The window is measured on timestamps, so a recording gap empties it
    /// instead of averaging across the stop. Streams shorter than the window
    /// are averaged over whatever is available.
    pub fn smooth(&self, stream: &SampleStream) -> Result<SampleStream> {
        if stream.is_empty() {
            return Err(InsufficientDataError::EmptyStream {
                channel: stream.channel,
            }
            .into());
        }

        let samples = &stream.samples;
        let mut smoothed = Vec::with_capacity(samples.len());
        let mut window_start = 0;
        let mut sum = 0.0;

        for (i, sample) in samples.iter().enumerate() {
            sum += sample.value;
            // the newest sample always stays in the window
            while window_start < i && samples[window_start].time_s <= sample.time_s - self.window_s {
                sum -= samples[window_start].value;
                window_start += 1;
            }
            let count = (i + 1 - window_start) as f64;
            smoothed.push(Sample {
                time_s: sample.time_s,
                value: sum / count,
            });
        }

        debug!(
            channel = %stream.channel,
            samples = samples.len(),
            window_s = self.window_s,
            "smoothed sample stream"
        );

        Ok(SampleStream::new(stream.channel, smoothed))
    }
}

/// Active seconds each sample stands for
///
/// A sample covers the time until the next one. Spacing above `max_gap_s`
/// is a pause and only earns the nominal sampling interval, as does the last
/// sample.
pub fn active_weights(samples: &[Sample], max_gap_s: f64) -> Vec<f64> {
    let nominal = nominal_interval(samples, max_gap_s);

    samples
        .iter()
        .enumerate()
        .map(|(i, sample)| match samples.get(i + 1) {
            Some(next) => {
                let dt = next.time_s - sample.time_s;
                if dt > max_gap_s {
                    nominal
                } else {
                    dt
                }
            }
            None => nominal,
        })
        .collect()
}

/// Median spacing of continuous samples
///
/// A recording sampled slower than `max_gap_s` has no continuous spacing;
/// its smallest spacing is the sampling interval then. A single sample
/// counts as 1 s.
fn nominal_interval(samples: &[Sample], max_gap_s: f64) -> f64 {
    let positive: Vec<f64> = samples
        .windows(2)
        .map(|pair| pair[1].time_s - pair[0].time_s)
        .filter(|dt| *dt > 0.0 && dt.is_finite())
        .collect();

    let mut continuous: Vec<f64> = positive.iter().copied().filter(|dt| *dt <= max_gap_s).collect();

    if continuous.is_empty() {
        return positive.into_iter().reduce(f64::min).unwrap_or(1.0);
    }

    continuous.sort_by(|a, b| a.total_cmp(b));
    continuous[continuous.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;

    fn stream_from(values: &[(f64, f64)]) -> SampleStream {
        SampleStream::new(
            Channel::Power,
            values
                .iter()
                .map(|&(time_s, value)| Sample { time_s, value })
                .collect(),
        )
    }

    #[test]
    fn test_empty_stream_fails() {
        let smoother = StreamSmoother::default();
        let result = smoother.smooth(&SampleStream::new(Channel::Power, vec![]));
        assert!(result.is_err());
    }

    #[test]
    fn test_short_stream_averages_available_samples() {
        let smoother = StreamSmoother::new(30.0);
        let stream = stream_from(&[(0.0, 100.0), (1.0, 200.0), (2.0, 300.0)]);

        let smoothed = smoother.smooth(&stream).unwrap();
        let values: Vec<f64> = smoothed.values().collect();

        assert_eq!(smoothed.len(), 3);
        assert_eq!(values, vec![100.0, 150.0, 200.0]);
    }

    #[test]
    fn test_trailing_window() {
        let smoother = StreamSmoother::new(3.0);
        let stream = stream_from(&[
            (0.0, 0.0),
            (1.0, 30.0),
            (2.0, 60.0),
            (3.0, 90.0),
            (4.0, 120.0),
        ]);

        let values: Vec<f64> = smoother.smooth(&stream).unwrap().values().collect();

        // window (t-3, t]: at t=3 holds t=1..3
        assert_eq!(values, vec![0.0, 15.0, 30.0, 60.0, 90.0]);
    }

    #[test]
    fn test_gap_empties_window() {
        let smoother = StreamSmoother::new(30.0);
        let stream = stream_from(&[(0.0, 300.0), (1.0, 300.0), (100.0, 100.0), (101.0, 120.0)]);

        let values: Vec<f64> = smoother.smooth(&stream).unwrap().values().collect();
        assert_eq!(values, vec![300.0, 300.0, 100.0, 110.0]);
    }

    #[test]
    fn test_window_keeps_newest_sample() {
        // t - 30 == t in f64 at this magnitude
        let stream = stream_from(&[(1e18, 200.0), (1e18 + 256.0, 210.0)]);
        let values: Vec<f64> = StreamSmoother::default().smooth(&stream).unwrap().values().collect();
        assert_eq!(values, vec![200.0, 210.0]);

        let raw = stream_from(&[(0.0, 100.0), (1.0, 200.0), (2.0, 300.0)]);
        let values: Vec<f64> = StreamSmoother::new(0.0).smooth(&raw).unwrap().values().collect();
        assert_eq!(values, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn test_active_weights_with_pause() {
        let stream = stream_from(&[(0.0, 1.0), (1.0, 1.0), (2.0, 1.0), (120.0, 1.0), (121.0, 1.0)]);
        let weights = active_weights(&stream.samples, DEFAULT_MAX_GAP_S);

        assert_eq!(weights, vec![1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_active_weights_uneven_recording() {
        let stream = stream_from(&[(0.0, 1.0), (2.0, 1.0), (4.0, 1.0), (5.0, 1.0)]);
        let weights = active_weights(&stream.samples, DEFAULT_MAX_GAP_S);

        // nominal spacing is the median of [2, 2, 1]
        assert_eq!(weights, vec![2.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_slow_sampling_keeps_its_interval() {
        // sampled every 15 s, with one missed sample at t=45
        let stream = stream_from(&[(0.0, 1.0), (15.0, 1.0), (30.0, 1.0), (60.0, 1.0)]);
        let weights = active_weights(&stream.samples, DEFAULT_MAX_GAP_S);

        assert_eq!(weights, vec![15.0, 15.0, 15.0, 15.0]);
    }

    #[test]
    fn test_single_sample_weight() {
        let stream = stream_from(&[(5.0, 1.0)]);
        assert_eq!(active_weights(&stream.samples, DEFAULT_MAX_GAP_S), vec![1.0]);
    }
}
