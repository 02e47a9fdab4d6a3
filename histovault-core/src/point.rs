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

//! Encoded trail points and the fixed trail/score vocabularies.
//!
//! All statistical values are persisted as integers with three implied
//! decimal digits (`value * 1000`). Raw bit/token accumulators are the
//! exception and store unscaled values.

use serde::{Deserialize, Serialize};

/// Scale factor between real values and encoded points.
pub const POINT_SCALE: f64 = 1000.0;

/// Encode a real value as a trail point.
///
/// Magnitudes beyond the `i64` range saturate; NaN encodes as 0. The cast
/// itself saturates, the clamp documents the contract.
pub fn encode(value: f64) -> i64 {
    (value * POINT_SCALE).round().clamp(i64::MIN as f64, i64::MAX as f64) as i64
}

/// Decode a trail point back into a real value.
pub fn decode(point: i64) -> f64 {
    point as f64 / POINT_SCALE
}

/// Named statistical summary kinds attached to a compartment.
///
/// Discriminants are persisted as map keys and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum TrailKind {
    RealAvg = 0,
    RealMax = 1,
    RealMin = 2,
    RealSd = 3,
    RealFirst = 4,
    RealLast = 5,
    RealSumTriggered = 6,
    RealTimeSumTriggered = 7,
    RealCountTriggered = 8,
    RealMaxRatioTriggered = 9,
    RealCount = 10,
    Avg = 11,
    Max = 12,
    Min = 13,
    Sd = 14,
    Q0 = 15,
    Q1 = 16,
    Q2 = 17,
    Q3 = 18,
    Q4 = 19,
    Q25Permille = 20,
    Q975Permille = 21,
    QLowerWhisker = 22,
    QUpperWhisker = 23,
    First = 24,
    Last = 25,
    Sum = 26,
    Count = 27,
    /// Unscaled maximum raw sample, for quality-control display.
    RawMax = 28,
    /// Unscaled bitwise OR over all raw samples.
    RawOr = 29,
}

impl TrailKind {
    pub fn ordinal(self) -> u32 {
        self as u32
    }
}

/// Fixed vocabulary of score compartments.
///
/// Ordinals key the `scores` section of a vault and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum ScoreLabel {
    /// Log duration in minutes, encoded.
    DurationMm = 0,
    AverageTimeStepMs = 1,
    MaximumTimeStepMs = 2,
    MinimumTimeStepMs = 3,
    SigmaTimeStepMs = 4,
    /// Readings present in the source log.
    TotalReadings = 5,
    /// Readings that survived sampling.
    SampledReadings = 6,
    /// Source recordset size in bytes.
    LogRecordSetBytes = 7,
}

impl ScoreLabel {
    pub const ALL: [ScoreLabel; 8] = [
        ScoreLabel::DurationMm,
        ScoreLabel::AverageTimeStepMs,
        ScoreLabel::MaximumTimeStepMs,
        ScoreLabel::MinimumTimeStepMs,
        ScoreLabel::SigmaTimeStepMs,
        ScoreLabel::TotalReadings,
        ScoreLabel::SampledReadings,
        ScoreLabel::LogRecordSetBytes,
    ];

    pub fn ordinal(self) -> u32 {
        self as u32
    }

    /// Display name used as the score compartment name.
    pub fn label(self) -> &'static str {
        match self {
            ScoreLabel::DurationMm => "duration_mm",
            ScoreLabel::AverageTimeStepMs => "average_time_step_ms",
            ScoreLabel::MaximumTimeStepMs => "maximum_time_step_ms",
            ScoreLabel::MinimumTimeStepMs => "minimum_time_step_ms",
            ScoreLabel::SigmaTimeStepMs => "sigma_time_step_ms",
            ScoreLabel::TotalReadings => "total_readings",
            ScoreLabel::SampledReadings => "sampled_readings",
            ScoreLabel::LogRecordSetBytes => "log_record_set_bytes",
        }
    }
}

/// Semantic tag deciding special downstream formatting of a compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataKind {
    #[default]
    Default,
    GpsLatitude,
    GpsLongitude,
    GpsAltitude,
    GpsAzimuth,
    Speed,
    DateTime,
    Current,
    Voltage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_three_implied_decimals() {
        assert_eq!(encode(1.2345), 1235);
        assert_eq!(encode(-1.2345), -1235);
        assert_eq!(encode(0.0), 0);
        assert_eq!(decode(1235), 1.235);
    }

    #[test]
    fn test_encode_saturates() {
        assert_eq!(encode(f64::MAX), i64::MAX);
        assert_eq!(encode(f64::MIN), i64::MIN);
        assert_eq!(encode(f64::NAN), 0);
    }

    #[test]
    fn test_trail_ordinals_stable() {
        assert_eq!(TrailKind::RealAvg.ordinal(), 0);
        assert_eq!(TrailKind::Q0.ordinal(), 15);
        assert_eq!(TrailKind::RawOr.ordinal(), 29);
        assert_eq!(ScoreLabel::LogRecordSetBytes.ordinal(), 7);
    }
}
