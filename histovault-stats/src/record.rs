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

//! Decoded record sets as delivered by the device-specific log readers.
//!
//! The cache never parses raw logs; readers hand over one [`RecordSet`] per
//! recordset with samples already translated into device-independent units.

use serde::{Deserialize, Serialize};

use histovault_core::DataKind;

use crate::reduce::MeasurementKind;
use crate::trigger::TriggerPolicy;

/// Statistics policy of one measurement from the channel definition.
///
/// The flags mirror the device XML: a measurement may ask for trigger-gated
/// aggregates, sums over a referenced trigger, ratios against another
/// measurement, or plain counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsPolicy {
    pub is_avg: bool,
    pub is_min: bool,
    pub is_max: bool,
    pub is_sigma: bool,
    /// Own trigger gating this measurement's aggregates.
    pub trigger: Option<TriggerPolicy>,
    /// Gate aggregates by another measurement's trigger instead.
    pub trigger_ref_ordinal: Option<u32>,
    /// Sum own samples over the referenced measurement's trigger ranges.
    pub sum_by_trigger_ref_ordinal: Option<u32>,
    /// Ratio of the referenced measurement's triggered sum to the own one.
    pub ratio_ref_ordinal: Option<u32>,
    pub is_count_by_trigger: bool,
    pub is_sum_trigger_time: bool,
}

/// One measurement's decoded samples plus its channel-definition metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub data_kind: DataKind,
    pub kind: MeasurementKind,
    /// Device-unit-translated samples in recording order.
    pub samples: Vec<f64>,
    pub statistics: Option<StatisticsPolicy>,
}

impl Record {
    pub fn new(name: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data_kind: DataKind::Default,
            kind: MeasurementKind::Point,
            samples,
            statistics: None,
        }
    }

    pub fn has_reasonable_data(&self) -> bool {
        !self.samples.is_empty()
    }
}

/// One decoded recordset of a source log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    pub start_timestamp_ms: i64,
    /// Recording span in ms.
    pub max_time_ms: f64,
    pub average_time_step_ms: f64,
    pub maximum_time_step_ms: f64,
    pub minimum_time_step_ms: f64,
    pub sigma_time_step_ms: f64,
    /// Ordered as in the channel definition; the index is the measurement
    /// ordinal.
    pub records: Vec<Record>,
}

impl RecordSet {
    /// Number of readings, i.e. the longest record length.
    pub fn record_data_size(&self) -> usize {
        self.records.iter().map(|r| r.samples.len()).max().unwrap_or(0)
    }

    pub fn record(&self, ordinal: u32) -> Option<&Record> {
        self.records.get(ordinal as usize)
    }
}
