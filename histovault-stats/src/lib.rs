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

//! HistoVault Stats
//!
//! The statistical reduction engine and the vault collector: raw sample
//! sequences in, fixed-shape trail-point compartments out.

pub mod collector;
pub mod quantile;
pub mod record;
pub mod reduce;
pub mod settlement;
pub mod trigger;

pub use collector::{ScoreInputs, VaultCollector};
pub use quantile::{ReduceSettings, SampleQuantile, BOXPLOT_OUTLIER_FACTOR, DEFAULT_SCRAP_RUN_MIN};
pub use record::{Record, RecordSet, StatisticsPolicy};
pub use reduce::{
    reduce_compartment, token_bucket, MeasurementKind, BIT_FIELD_WIDTH, TOKEN_BUCKET_MAX,
};
pub use settlement::{
    evaluate, AmountMode, AmountRule, CalculusRule, EvaluationRule, FigureRule, SettlementDef,
    Transition,
};
pub use trigger::{range_stats, time_sum_ms, trigger_ranges, RangeStats, TriggerPolicy};
