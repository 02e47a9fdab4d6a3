// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Trigger-range arithmetic.
//!
//! A trigger gates statistics to the sub-ranges where the signal satisfies
//! a level condition for a minimum duration, e.g. "motor current above 5 A
//! for at least 10 samples". Aggregates over those ranges feed the `Real*`
//! trail points of measurements that declare a statistics policy.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Level condition gating the statistics of one measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerPolicy {
    /// Trigger level in translated measurement units.
    pub level: f64,
    /// True triggers on values greater than the level, false on smaller.
    pub is_greater: bool,
    /// Ranges shorter than this many samples are ignored (debounce).
    pub min_duration_samples: usize,
}

/// Contiguous sample ranges satisfying the trigger condition.
pub fn trigger_ranges(samples: &[f64], policy: &TriggerPolicy) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &value) in samples.iter().enumerate() {
        let active = if policy.is_greater {
            value > policy.level
        } else {
            value < policy.level
        };
        match (active, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= policy.min_duration_samples {
                    ranges.push(s..i);
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if samples.len() - s >= policy.min_duration_samples {
            ranges.push(s..samples.len());
        }
    }
    ranges
}

/// Aggregates over the samples inside trigger ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub sigma: f64,
    pub sum: f64,
    pub count: usize,
}

/// Aggregate `samples` restricted to `ranges`; `None` when the ranges
/// select nothing.
pub fn range_stats(samples: &[f64], ranges: &[Range<usize>]) -> Option<RangeStats> {
    let mut avg = 0.0;
    let mut var_times_n = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut count = 0usize;

    for range in ranges {
        for &value in &samples[range.start..range.end.min(samples.len())] {
            let next = count + 1;
            var_times_n += (value - avg) * (value - avg) * count as f64 / next as f64;
            avg += (value - avg) / next as f64;
            min = min.min(value);
            max = max.max(value);
            sum += value;
            count = next;
        }
    }

    if count == 0 {
        return None;
    }
    let sigma = if count > 1 {
        (var_times_n / (count - 1) as f64).sqrt()
    } else {
        0.0
    };
    Some(RangeStats {
        avg,
        min,
        max,
        sigma,
        sum,
        count,
    })
}

/// Total triggered time in ms, given the recordset's average time step.
pub fn time_sum_ms(ranges: &[Range<usize>], average_time_step_ms: f64) -> f64 {
    let samples: usize = ranges.iter().map(|r| r.len()).sum();
    samples as f64 * average_time_step_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(level: f64, min: usize) -> TriggerPolicy {
        TriggerPolicy {
            level,
            is_greater: true,
            min_duration_samples: min,
        }
    }

    #[test]
    fn test_ranges_with_debounce() {
        let samples = [0.0, 6.0, 7.0, 0.0, 6.0, 0.0, 6.0, 6.0, 6.0];
        let ranges = trigger_ranges(&samples, &policy(5.0, 2));
        // The single-sample burst at index 4 is debounced away.
        assert_eq!(ranges, vec![1..3, 6..9]);
    }

    #[test]
    fn test_range_open_at_end() {
        let samples = [0.0, 6.0, 6.0];
        assert_eq!(trigger_ranges(&samples, &policy(5.0, 1)), vec![1..3]);
    }

    #[test]
    fn test_less_than_trigger() {
        let samples = [5.0, 1.0, 1.0, 5.0];
        let p = TriggerPolicy {
            level: 2.0,
            is_greater: false,
            min_duration_samples: 1,
        };
        assert_eq!(trigger_ranges(&samples, &p), vec![1..3]);
    }

    #[test]
    fn test_range_stats() {
        let samples = [0.0, 2.0, 4.0, 0.0, 6.0, 8.0];
        let stats = range_stats(&samples, &[1..3, 4..6]).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.avg, 5.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 8.0);
        assert_eq!(stats.sum, 20.0);
        assert!((stats.sigma - (20.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_ranges() {
        assert!(range_stats(&[1.0, 2.0], &[]).is_none());
    }

    #[test]
    fn test_time_sum() {
        assert_eq!(time_sum_ms(&[1..3, 6..9], 100.0), 500.0);
    }
}
