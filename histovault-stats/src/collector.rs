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

//! Data collection for a serializable histo vault.
//!
//! The collector promotes a truss into a full vault from one decoded
//! recordset: measurement compartments via the reduction engine, settlement
//! compartments via the transition evaluators, score compartments from
//! recordset timing plus caller-supplied scalars.
//!
//! Promotion is atomic: all compartments are staged and committed together.
//! A failing settlement rule leaves the truss untouched; a measurement
//! without reasonable data merely yields an empty compartment.

use std::collections::BTreeMap;
use std::ops::Range;

use tracing::debug;

use histovault_core::{encode, Compartment, Result, ScoreLabel, TrailKind, Vault};

use crate::quantile::ReduceSettings;
use crate::record::{Record, RecordSet, StatisticsPolicy};
use crate::reduce::reduce_compartment;
use crate::settlement::{evaluate, SettlementDef, Transition};
use crate::trigger::{range_stats, time_sum_ms, trigger_ranges};

/// Score scalars only the log reader knows.
#[derive(Debug, Clone, Default)]
pub struct ScoreInputs {
    /// Readings present in the source log before sampling.
    pub total_readings: Option<i64>,
    /// Size of the source recordset in bytes.
    pub log_record_set_bytes: Option<i64>,
}

/// Promotes trusses into fully populated vaults.
pub struct VaultCollector<'a> {
    settlements: &'a [SettlementDef],
    settings: ReduceSettings,
}

impl<'a> VaultCollector<'a> {
    pub fn new(settlements: &'a [SettlementDef], settings: ReduceSettings) -> Self {
        Self {
            settlements,
            settings,
        }
    }

    /// Make a full vault from the truss.
    ///
    /// A recordset without readings leaves the truss a truss.
    pub fn promote(
        &self,
        vault: &mut Vault,
        record_set: &RecordSet,
        transitions: &[Transition],
        inputs: &ScoreInputs,
    ) -> Result<()> {
        if record_set.record_data_size() == 0 {
            debug!(vault = %vault.vault_name, "recordset has no readings, truss kept");
            return Ok(());
        }

        let measurements = self.collect_measurements(record_set);
        let settlements = self.collect_settlements(record_set, transitions)?;
        let scores = self.collect_scores(record_set, inputs);

        vault.log_start_timestamp_ms = record_set.start_timestamp_ms;
        vault.measurements = measurements;
        vault.settlements = settlements;
        vault.scores = scores;
        Ok(())
    }

    fn collect_measurements(&self, record_set: &RecordSet) -> BTreeMap<u32, Compartment> {
        let mut measurements = BTreeMap::new();
        for (ordinal, record) in record_set.records.iter().enumerate() {
            let mut compartment = reduce_compartment(
                &record.name,
                record.data_kind,
                record.kind,
                &record.samples,
                &self.settings,
            );
            if !record.has_reasonable_data() {
                debug!(name = %record.name, "no reasonable data");
            } else if let Some(statistics) = &record.statistics {
                set_statistics_points(&mut compartment, record, statistics, record_set);
            }
            measurements.insert(ordinal as u32, compartment);
        }
        measurements
    }

    fn collect_settlements(
        &self,
        record_set: &RecordSet,
        transitions: &[Transition],
    ) -> Result<BTreeMap<u32, Compartment>> {
        let mut settlements = BTreeMap::new();
        for def in self.settlements {
            let series = evaluate(&def.rule, record_set, transitions)?;
            let mut compartment = reduce_compartment(
                &def.name,
                histovault_core::DataKind::Default,
                crate::reduce::MeasurementKind::Point,
                &series,
                &self.settings,
            );
            if !series.is_empty() && !compartment.is_empty() {
                // Settlement series are short; the real points equal the
                // reduced ones.
                compartment.put(TrailKind::RealFirst, encode(series[0]));
                compartment.put(TrailKind::RealLast, encode(series[series.len() - 1]));
                copy_real_points(&mut compartment);
            }
            settlements.insert(def.settlement_id, compartment);
        }
        Ok(settlements)
    }

    fn collect_scores(
        &self,
        record_set: &RecordSet,
        inputs: &ScoreInputs,
    ) -> BTreeMap<u32, Compartment> {
        let mut scores = BTreeMap::new();
        let mut put = |label: ScoreLabel, point: i64| {
            scores.insert(
                label.ordinal(),
                Compartment::scalar(label.label(), TrailKind::Avg, point),
            );
        };

        put(
            ScoreLabel::DurationMm,
            encode(record_set.max_time_ms / 60_000.0),
        );
        put(
            ScoreLabel::AverageTimeStepMs,
            encode(record_set.average_time_step_ms),
        );
        put(
            ScoreLabel::MaximumTimeStepMs,
            encode(record_set.maximum_time_step_ms),
        );
        put(
            ScoreLabel::MinimumTimeStepMs,
            encode(record_set.minimum_time_step_ms),
        );
        put(
            ScoreLabel::SigmaTimeStepMs,
            encode(record_set.sigma_time_step_ms),
        );
        // Counters and byte sizes stay unscaled.
        if let Some(total) = inputs.total_readings {
            put(ScoreLabel::TotalReadings, total);
        }
        put(
            ScoreLabel::SampledReadings,
            record_set.record_data_size() as i64,
        );
        if let Some(bytes) = inputs.log_record_set_bytes {
            put(ScoreLabel::LogRecordSetBytes, bytes);
        }
        scores
    }
}

/// Trail points for trail kinds marked as 'real': unreduced aggregates,
/// trigger-gated where the statistics policy asks for it.
fn set_statistics_points(
    compartment: &mut Compartment,
    record: &Record,
    statistics: &StatisticsPolicy,
    record_set: &RecordSet,
) {
    let samples = &record.samples;
    compartment.put(TrailKind::RealFirst, encode(samples[0]));
    compartment.put(TrailKind::RealLast, encode(samples[samples.len() - 1]));

    let plain = range_stats(samples, &[0..samples.len()]);
    let gating = resolve_gating_ranges(record, statistics, record_set);
    let triggered = gating
        .as_deref()
        .and_then(|ranges| range_stats(samples, ranges));

    if let Some(plain) = &plain {
        let gated = triggered.as_ref();
        let pick = |use_gated: bool, gated_value: Option<f64>, plain_value: f64| {
            if use_gated {
                gated_value.unwrap_or(plain_value)
            } else {
                plain_value
            }
        };
        compartment.put(
            TrailKind::RealAvg,
            encode(pick(statistics.is_avg, gated.map(|s| s.avg), plain.avg)),
        );
        compartment.put(
            TrailKind::RealMax,
            encode(pick(statistics.is_max, gated.map(|s| s.max), plain.max)),
        );
        compartment.put(
            TrailKind::RealMin,
            encode(pick(statistics.is_min, gated.map(|s| s.min), plain.min)),
        );
        compartment.put(
            TrailKind::RealSd,
            encode(pick(statistics.is_sigma, gated.map(|s| s.sigma), plain.sigma)),
        );
    }

    if let Some(ref_ordinal) = statistics.sum_by_trigger_ref_ordinal {
        if let Some(ranges) = referenced_trigger_ranges(record_set, ref_ordinal) {
            if let Some(own) = range_stats(samples, &ranges) {
                if own.sum > 0.0 {
                    compartment.put(TrailKind::RealSumTriggered, encode(own.sum));

                    // While the summarized value is zero a ratio makes no
                    // sense.
                    if let Some(ratio_ordinal) = statistics.ratio_ref_ordinal {
                        let referenced = record_set
                            .record(ratio_ordinal)
                            .and_then(|r| range_stats(&r.samples, &ranges));
                        if let Some(referenced) = referenced {
                            if referenced.sum > 0.0 {
                                compartment.put(
                                    TrailKind::RealMaxRatioTriggered,
                                    encode(referenced.sum / own.sum),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    if let Some(ranges) = gating.as_deref() {
        if statistics.is_sum_trigger_time {
            // Encoding seconds instead of ms keeps the implied decimals.
            compartment.put(
                TrailKind::RealTimeSumTriggered,
                encode(time_sum_ms(ranges, record_set.average_time_step_ms) / 1000.0),
            );
        }
        if statistics.is_count_by_trigger {
            compartment.put(TrailKind::RealCountTriggered, encode(ranges.len() as f64));
        }
    }

    compartment.put(TrailKind::RealCount, encode(samples.len() as f64));
}

/// The trigger ranges gating this record: its own trigger, or the trigger
/// of the referenced measurement.
fn resolve_gating_ranges(
    record: &Record,
    statistics: &StatisticsPolicy,
    record_set: &RecordSet,
) -> Option<Vec<Range<usize>>> {
    if let Some(policy) = &statistics.trigger {
        return Some(trigger_ranges(&record.samples, policy));
    }
    statistics
        .trigger_ref_ordinal
        .and_then(|ordinal| referenced_trigger_ranges(record_set, ordinal))
}

fn referenced_trigger_ranges(
    record_set: &RecordSet,
    ordinal: u32,
) -> Option<Vec<Range<usize>>> {
    let referenced = record_set.record(ordinal)?;
    let policy = referenced.statistics.as_ref()?.trigger.as_ref()?;
    Some(trigger_ranges(&referenced.samples, policy))
}

/// Mirror the reduced aggregates into the real trail kinds.
fn copy_real_points(compartment: &mut Compartment) {
    for (reduced, real) in [
        (TrailKind::Avg, TrailKind::RealAvg),
        (TrailKind::Max, TrailKind::RealMax),
        (TrailKind::Min, TrailKind::RealMin),
        (TrailKind::Sd, TrailKind::RealSd),
        (TrailKind::Sum, TrailKind::RealSumTriggered),
        (TrailKind::Count, TrailKind::RealCount),
    ] {
        if let Some(point) = compartment.trail(reduced) {
            compartment.put(real, point);
        }
    }
}
