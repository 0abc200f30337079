//! F0 contour aggregation.
//!
//! Frame-level pitch predictions are collapsed into segments of constant frequency, each
//! tagged with its (fractional) MIDI note number.

use serde::{Deserialize, Serialize};

/// Frequencies closer than this are one run; frequencies below it are silence.
const EPS: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct F0Segment {
    /// Seconds, rounded to 6 decimals.
    pub start_time: f64,
    /// Seconds, rounded to 6 decimals. Exclusive.
    pub end_time: f64,
    /// Hz.
    pub frequency: f64,
    /// Fractional MIDI note number.
    pub pitch: f64,
}

/// `12 * log2(hz / 440) + 69`.
pub fn hz_to_midi(hz: f64) -> f64 {
    12.0 * (hz / 440.0).log2() + 69.0
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// Groups consecutive frames of equal frequency into segments.
///
/// `pred[i]` is the frequency of frame `i` in Hz and `t_unit` the frame hop in seconds.
/// Runs at ~0 Hz are dropped.
///
/// ```rust
/// use transcribe_rs::contour::aggregate_f0_info;
///
/// let segments = aggregate_f0_info(&[0.0, 440.0, 440.0, 0.0, 220.0], 0.01);
/// assert_eq!(segments.len(), 2);
/// assert_eq!((segments[0].start_time, segments[0].end_time), (0.01, 0.03));
/// assert_eq!(segments[0].pitch, 69.0);
/// assert_eq!(segments[1].frequency, 220.0);
/// ```
pub fn aggregate_f0_info(pred: &[f64], t_unit: f64) -> Vec<F0Segment> {
    let Some(&first) = pred.first() else {
        return Vec::new();
    };

    let mut segments = Vec::new();
    let mut start = 0;
    let mut last_hz = first;

    // A trailing zero closes the final run.
    for (idx, hz) in pred.iter().copied().chain(std::iter::once(0.0)).enumerate() {
        if (hz - last_hz).abs() < EPS {
            last_hz = hz;
            continue;
        }

        if last_hz >= EPS {
            segments.push(F0Segment {
                start_time: round6(start as f64 * t_unit),
                end_time: round6(idx as f64 * t_unit),
                frequency: last_hz,
                pitch: hz_to_midi(last_hz),
            });
        }
        start = idx;
        last_hz = hz;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_silent_input() {
        assert!(aggregate_f0_info(&[], 0.02).is_empty());
        assert!(aggregate_f0_info(&[0.0, 0.0, 0.0], 0.02).is_empty());
    }

    #[test]
    fn test_final_run_is_closed() {
        let segments = aggregate_f0_info(&[261.63, 261.63, 261.63], 0.02);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_time, 0.0);
        assert_eq!(segments[0].end_time, 0.06);
        assert!((segments[0].pitch - 60.0).abs() < 1e-3);
    }

    #[test]
    fn test_adjacent_runs_split() {
        let segments = aggregate_f0_info(&[440.0, 880.0, 880.0], 0.5);
        let bounds: Vec<_> = segments.iter().map(|s| (s.start_time, s.end_time)).collect();
        assert_eq!(bounds, vec![(0.0, 0.5), (0.5, 1.5)]);
        assert_eq!(segments[1].pitch, 81.0);
    }

    #[test]
    fn test_times_rounded() {
        let segments = aggregate_f0_info(&[0.0, 100.0], 1.0 / 3.0);
        assert_eq!(segments[0].start_time, 0.333333);
        assert_eq!(segments[0].end_time, 0.666667);
    }
}
