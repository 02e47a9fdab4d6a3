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

//! Statistical reduction of one measurement's samples into a compartment.
//!
//! Three encoding modes, selected by the measurement's declared kind:
//!
//! - [`MeasurementKind::Point`]: ordinary numeric values: full quantile
//!   trail set, outliers and constant scraps;
//! - [`MeasurementKind::BitMask`]: up-to-22-bit fields: every set bit
//!   position feeds an index quantile, all samples OR into a raw
//!   accumulator;
//! - [`MeasurementKind::Token`]: enumerated values mapped to power-of-two
//!   buckets (bucket 0 reserved for "zero observed", up to 31 tokens),
//!   then the same OR/quantile treatment.
//!
//! All modes emit the unscaled raw maximum and raw OR for quality-control
//! display. Given the same samples and settings the output mapping is
//! byte-identical.

use serde::{Deserialize, Serialize};
use tracing::debug;

use histovault_core::{encode, Compartment, DataKind, TrailKind};

use crate::quantile::{ReduceSettings, SampleQuantile};

/// Width of a bit-mask measurement's value field.
pub const BIT_FIELD_WIDTH: u32 = 22;

/// Highest token bucket; bucket 0 is reserved for "zero observed".
pub const TOKEN_BUCKET_MAX: u32 = 31;

/// How a measurement's raw samples are encoded into trail points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasurementKind {
    #[default]
    Point,
    BitMask,
    Token,
}

/// Reduce `samples` into a fresh compartment.
///
/// A measurement without usable sample data yields an empty compartment
/// rather than an error, so one dead measurement never aborts the vault.
pub fn reduce_compartment(
    name: &str,
    data_kind: DataKind,
    kind: MeasurementKind,
    samples: &[f64],
    settings: &ReduceSettings,
) -> Compartment {
    let mut compartment = Compartment::new(name, data_kind);
    match kind {
        MeasurementKind::Point => reduce_point(&mut compartment, samples, settings),
        MeasurementKind::BitMask => reduce_bits(&mut compartment, samples, settings),
        MeasurementKind::Token => reduce_tokens(&mut compartment, samples, settings),
    }
    compartment
}

fn reduce_point(compartment: &mut Compartment, samples: &[f64], settings: &ReduceSettings) {
    let quantile = match SampleQuantile::new(samples, settings) {
        Ok(quantile) => quantile,
        Err(_) => {
            debug!(name = %compartment.name, "no reasonable data");
            return;
        }
    };
    put_quantile_trails(compartment, &quantile);
    put_raw_trails(compartment, samples);
}

fn reduce_bits(compartment: &mut Compartment, samples: &[f64], settings: &ReduceSettings) {
    let mask = (1u64 << BIT_FIELD_WIDTH) - 1;
    let mut indices: Vec<f64> = Vec::new();
    for &sample in samples {
        let bits = raw_value(sample) as u64 & mask;
        for position in 0..BIT_FIELD_WIDTH {
            if bits & (1 << position) != 0 {
                indices.push(position as f64);
            }
        }
    }
    if let Ok(quantile) = SampleQuantile::new(&indices, settings) {
        put_quantile_trails(compartment, &quantile);
    } else {
        debug!(name = %compartment.name, "no set bits");
    }
    put_raw_trails(compartment, samples);
}

fn reduce_tokens(compartment: &mut Compartment, samples: &[f64], settings: &ReduceSettings) {
    let mut buckets: Vec<f64> = Vec::new();
    for &sample in samples {
        buckets.push(token_bucket(sample) as f64);
    }
    if let Ok(quantile) = SampleQuantile::new(&buckets, settings) {
        put_quantile_trails(compartment, &quantile);
    } else {
        debug!(name = %compartment.name, "no tokens");
    }
    // The raw OR accumulates bucket bits, not sample bits: token values may
    // exceed the field width.
    let mut or_accumulator: i64 = 0;
    let mut raw_max: i64 = i64::MIN;
    for &sample in samples {
        or_accumulator |= 1 << token_bucket(sample);
        raw_max = raw_max.max(raw_value(sample));
    }
    if !samples.is_empty() {
        compartment.put(TrailKind::RawMax, raw_max);
        compartment.put(TrailKind::RawOr, or_accumulator);
    }
}

/// Bucket index of an enumerated token value: 0 for zero, otherwise the
/// 1-based position of the highest set bit, capped at the bucket maximum.
pub fn token_bucket(sample: f64) -> u32 {
    let value = raw_value(sample);
    if value <= 0 {
        0
    } else {
        (64 - (value as u64).leading_zeros()).min(TOKEN_BUCKET_MAX)
    }
}

fn put_quantile_trails(compartment: &mut Compartment, quantile: &SampleQuantile) {
    if !quantile.outliers().is_empty() {
        compartment.set_outliers(quantile.outliers().iter().map(|&v| encode(v)).collect());
    }
    if !quantile.scraps().is_empty() {
        compartment.set_scraps(quantile.scraps().iter().map(|&v| encode(v)).collect());
    }

    compartment.put(TrailKind::Avg, encode(quantile.avg()));
    compartment.put(TrailKind::Max, encode(quantile.population_max()));
    compartment.put(TrailKind::Min, encode(quantile.population_min()));
    compartment.put(TrailKind::Sd, encode(quantile.sigma()));
    compartment.put(TrailKind::Q0, encode(quantile.quartile0()));
    compartment.put(TrailKind::Q1, encode(quantile.quartile1()));
    compartment.put(TrailKind::Q2, encode(quantile.quartile2()));
    compartment.put(TrailKind::Q3, encode(quantile.quartile3()));
    compartment.put(TrailKind::Q4, encode(quantile.quartile4()));
    compartment.put(TrailKind::Q25Permille, encode(quantile.quantile(0.025)));
    compartment.put(TrailKind::Q975Permille, encode(quantile.quantile(0.975)));
    compartment.put(TrailKind::QLowerWhisker, encode(quantile.lower_whisker()));
    compartment.put(TrailKind::QUpperWhisker, encode(quantile.upper_whisker()));
    compartment.put(TrailKind::First, encode(quantile.first()));
    compartment.put(TrailKind::Last, encode(quantile.last()));
    compartment.put(TrailKind::Sum, encode(quantile.sum()));
    compartment.put(TrailKind::Count, encode(quantile.size() as f64));
}

/// Unscaled maximum and OR over the raw samples, for quality control.
fn put_raw_trails(compartment: &mut Compartment, samples: &[f64]) {
    if samples.is_empty() {
        return;
    }
    let mut raw_max = i64::MIN;
    let mut or_accumulator: i64 = 0;
    for &sample in samples {
        let value = raw_value(sample);
        raw_max = raw_max.max(value);
        or_accumulator |= value;
    }
    compartment.put(TrailKind::RawMax, raw_max);
    compartment.put(TrailKind::RawOr, or_accumulator);
}

fn raw_value(sample: f64) -> i64 {
    sample.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use histovault_core::decode;

    fn settings() -> ReduceSettings {
        ReduceSettings::default()
    }

    #[test]
    fn test_point_mode_trail_set() {
        let samples: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let c = reduce_compartment("height", DataKind::GpsAltitude, MeasurementKind::Point, &samples, &settings());
        assert_eq!(c.trail(TrailKind::Avg), Some(5500));
        assert_eq!(c.trail(TrailKind::Min), Some(1000));
        assert_eq!(c.trail(TrailKind::Max), Some(10000));
        assert_eq!(c.trail(TrailKind::Q1), Some(2750));
        assert_eq!(c.trail(TrailKind::Q2), Some(5500));
        assert_eq!(c.trail(TrailKind::Q3), Some(8250));
        assert_eq!(c.trail(TrailKind::First), Some(1000));
        assert_eq!(c.trail(TrailKind::Last), Some(10000));
        assert_eq!(c.trail(TrailKind::Count), Some(10000));
        assert_eq!(c.trail(TrailKind::RawMax), Some(10));
        assert!(c.outliers.is_empty());
    }

    #[test]
    fn test_point_mode_outlier_recorded() {
        let mut samples: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        samples.push(1000.0);
        let c = reduce_compartment("current", DataKind::Current, MeasurementKind::Point, &samples, &settings());
        assert_eq!(c.outliers, vec![1_000_000]);
        assert_eq!(c.trail(TrailKind::Max), Some(1_000_000));
        assert_eq!(c.trail(TrailKind::Q4), Some(10000));
    }

    #[test]
    fn test_point_mode_empty_is_empty_compartment() {
        let c = reduce_compartment("dead", DataKind::Default, MeasurementKind::Point, &[], &settings());
        assert!(c.is_empty());
    }

    #[test]
    fn test_bit_mode_or_and_indices() {
        // 0b101 and 0b110: set bits 0,2,1,2.
        let samples = [5.0, 6.0];
        let c = reduce_compartment("alarms", DataKind::Default, MeasurementKind::BitMask, &samples, &settings());
        assert_eq!(c.trail(TrailKind::RawOr), Some(7));
        assert_eq!(c.trail(TrailKind::RawMax), Some(6));
        // Index population is [0, 2, 1, 2].
        assert_eq!(c.trail(TrailKind::Q0), Some(0));
        assert_eq!(c.trail(TrailKind::Q4), Some(2000));
        assert_eq!(decode(c.trail(TrailKind::Avg).unwrap()), 1.25);
    }

    #[test]
    fn test_bit_mode_masks_to_field_width() {
        let wide = (1u64 << 30) as f64 + 1.0;
        let c = reduce_compartment("alarms", DataKind::Default, MeasurementKind::BitMask, &[wide], &settings());
        // Bit 30 is outside the 22-bit field; only bit 0 remains.
        assert_eq!(c.trail(TrailKind::Q4), Some(0));
    }

    #[test]
    fn test_token_mode_buckets() {
        assert_eq!(token_bucket(0.0), 0);
        assert_eq!(token_bucket(1.0), 1);
        assert_eq!(token_bucket(2.0), 2);
        assert_eq!(token_bucket(3.0), 2);
        assert_eq!(token_bucket(4.0), 3);
        assert_eq!(token_bucket(f64::MAX.min(1e18)), TOKEN_BUCKET_MAX);

        let samples = [0.0, 1.0, 4.0];
        let c = reduce_compartment("events", DataKind::Default, MeasurementKind::Token, &samples, &settings());
        // Buckets 0, 1 and 3 observed.
        assert_eq!(c.trail(TrailKind::RawOr), Some(0b1011));
        assert_eq!(c.trail(TrailKind::RawMax), Some(4));
    }

    #[test]
    fn test_determinism_byte_identical() {
        let samples: Vec<f64> = (0..500).map(|v| ((v * 37) % 101) as f64 / 3.0).collect();
        let a = reduce_compartment("m", DataKind::Default, MeasurementKind::Point, &samples, &settings());
        let b = reduce_compartment("m", DataKind::Default, MeasurementKind::Point, &samples, &settings());
        assert_eq!(a, b);
    }
}
