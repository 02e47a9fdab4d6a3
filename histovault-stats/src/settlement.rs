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

//! Settlements: synthetic measurements derived from *transitions* in a raw
//! signal.
//!
//! Transition detection itself is an external collaborator's job; the cache
//! consumes ready-made event intervals. Each settlement definition carries
//! exactly one evaluation rule (figure, amount or calculus), resolved once
//! at configuration time into a closed [`EvaluationRule`] variant, so an
//! unrecognized rule is a construction error, not a runtime surprise.

use serde::{Deserialize, Serialize};

use histovault_core::{Result, VaultError};

use crate::record::RecordSet;

/// An externally detected event interval in a raw signal.
///
/// Indices address samples of the recordset. The reference phase precedes
/// the threshold phase; the recovery index closes the interval (exclusive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Transition group the settlement rules select by.
    pub group_id: u32,
    pub reference_start_index: usize,
    pub threshold_start_index: usize,
    pub recovery_end_index: usize,
}

impl Transition {
    /// Samples of the threshold phase.
    pub fn threshold_extent(&self) -> usize {
        self.recovery_end_index
            .saturating_sub(self.threshold_start_index)
    }
}

/// What an amount evaluator extracts from the referenced record per
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountMode {
    Avg,
    Min,
    Max,
    /// Last minus first value across the threshold phase.
    Delta,
}

/// Figure rule: one value per transition from the transition shape alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureRule {
    pub transition_group_id: u32,
}

/// Amount rule: one value per transition from a referenced measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountRule {
    pub transition_group_id: u32,
    pub ref_ordinal: u32,
    pub mode: AmountMode,
}

/// Calculus rule: one ratio per transition between two referenced
/// measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculusRule {
    pub transition_group_id: u32,
    pub numerator_ordinal: u32,
    pub denominator_ordinal: u32,
}

/// The three settlement evaluator strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvaluationRule {
    Figure(FigureRule),
    Amount(AmountRule),
    Calculus(CalculusRule),
}

impl EvaluationRule {
    /// Resolve a raw configuration triple into the one declared rule.
    ///
    /// Exactly one sub-rule must be present; anything else is a
    /// configuration error fatal to the settlement being built.
    pub fn from_parts(
        figure: Option<FigureRule>,
        amount: Option<AmountRule>,
        calculus: Option<CalculusRule>,
    ) -> Result<Self> {
        match (figure, amount, calculus) {
            (Some(rule), None, None) => Ok(EvaluationRule::Figure(rule)),
            (None, Some(rule), None) => Ok(EvaluationRule::Amount(rule)),
            (None, None, Some(rule)) => Ok(EvaluationRule::Calculus(rule)),
            (None, None, None) => Err(VaultError::Config(
                "settlement declares no evaluation rule".into(),
            )),
            _ => Err(VaultError::Config(
                "settlement declares more than one evaluation rule".into(),
            )),
        }
    }

    pub fn transition_group_id(&self) -> u32 {
        match self {
            EvaluationRule::Figure(rule) => rule.transition_group_id,
            EvaluationRule::Amount(rule) => rule.transition_group_id,
            EvaluationRule::Calculus(rule) => rule.transition_group_id,
        }
    }
}

/// One settlement from the channel definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementDef {
    pub settlement_id: u32,
    pub name: String,
    pub rule: EvaluationRule,
}

/// Derive the settlement series: one value per matching transition.
pub fn evaluate(
    rule: &EvaluationRule,
    record_set: &RecordSet,
    transitions: &[Transition],
) -> Result<Vec<f64>> {
    let matching = transitions
        .iter()
        .filter(|t| t.group_id == rule.transition_group_id());

    match rule {
        EvaluationRule::Figure(_) => Ok(matching
            .map(|t| t.threshold_extent() as f64 * record_set.average_time_step_ms / 1000.0)
            .collect()),
        EvaluationRule::Amount(amount) => {
            let record = record_set.record(amount.ref_ordinal).ok_or_else(|| {
                VaultError::Config(format!(
                    "amount rule references unknown measurement ordinal {}",
                    amount.ref_ordinal
                ))
            })?;
            let mut series = Vec::new();
            for transition in matching {
                let phase =
                    phase_samples(&record.samples, transition.threshold_start_index, transition.recovery_end_index);
                if phase.is_empty() {
                    continue;
                }
                let value = match amount.mode {
                    AmountMode::Avg => phase.iter().sum::<f64>() / phase.len() as f64,
                    AmountMode::Min => phase.iter().copied().fold(f64::INFINITY, f64::min),
                    AmountMode::Max => phase.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    AmountMode::Delta => phase[phase.len() - 1] - phase[0],
                };
                series.push(value);
            }
            Ok(series)
        }
        EvaluationRule::Calculus(calculus) => {
            let numerator = record_set.record(calculus.numerator_ordinal).ok_or_else(|| {
                VaultError::Config(format!(
                    "calculus rule references unknown measurement ordinal {}",
                    calculus.numerator_ordinal
                ))
            })?;
            let denominator = record_set.record(calculus.denominator_ordinal).ok_or_else(|| {
                VaultError::Config(format!(
                    "calculus rule references unknown measurement ordinal {}",
                    calculus.denominator_ordinal
                ))
            })?;
            let mut series = Vec::new();
            for transition in matching {
                let start = transition.threshold_start_index;
                let end = transition.recovery_end_index;
                let top = phase_samples(&numerator.samples, start, end);
                let bottom = phase_samples(&denominator.samples, start, end);
                if top.is_empty() || bottom.is_empty() {
                    continue;
                }
                let top_avg = top.iter().sum::<f64>() / top.len() as f64;
                let bottom_avg = bottom.iter().sum::<f64>() / bottom.len() as f64;
                if bottom_avg != 0.0 {
                    series.push(top_avg / bottom_avg);
                }
            }
            Ok(series)
        }
    }
}

fn phase_samples(samples: &[f64], start: usize, end: usize) -> &[f64] {
    let start = start.min(samples.len());
    let end = end.clamp(start, samples.len());
    &samples[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn record_set() -> RecordSet {
        RecordSet {
            start_timestamp_ms: 0,
            max_time_ms: 900.0,
            average_time_step_ms: 100.0,
            maximum_time_step_ms: 100.0,
            minimum_time_step_ms: 100.0,
            sigma_time_step_ms: 0.0,
            records: vec![
                Record::new("height", vec![0.0, 10.0, 20.0, 30.0, 20.0, 10.0, 0.0, 0.0, 0.0, 0.0]),
                Record::new("current", vec![1.0, 2.0, 4.0, 8.0, 4.0, 2.0, 1.0, 1.0, 1.0, 1.0]),
            ],
        }
    }

    fn transition(group_id: u32) -> Transition {
        Transition {
            group_id,
            reference_start_index: 0,
            threshold_start_index: 1,
            recovery_end_index: 6,
        }
    }

    #[test]
    fn test_from_parts_exactly_one() {
        let figure = FigureRule { transition_group_id: 1 };
        assert!(EvaluationRule::from_parts(Some(figure.clone()), None, None).is_ok());
        assert!(matches!(
            EvaluationRule::from_parts(None, None, None),
            Err(VaultError::Config(_))
        ));
        let amount = AmountRule {
            transition_group_id: 1,
            ref_ordinal: 0,
            mode: AmountMode::Delta,
        };
        assert!(matches!(
            EvaluationRule::from_parts(Some(figure), Some(amount), None),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_figure_rule_duration_seconds() {
        let rule = EvaluationRule::Figure(FigureRule { transition_group_id: 1 });
        let series = evaluate(&rule, &record_set(), &[transition(1), transition(2)]).unwrap();
        // One matching transition, 5 samples of 100 ms each.
        assert_eq!(series, vec![0.5]);
    }

    #[test]
    fn test_amount_rule_modes() {
        let set = record_set();
        let t = [transition(1)];
        let base = AmountRule {
            transition_group_id: 1,
            ref_ordinal: 0,
            mode: AmountMode::Max,
        };

        let max = evaluate(&EvaluationRule::Amount(base.clone()), &set, &t).unwrap();
        assert_eq!(max, vec![30.0]);

        let delta = evaluate(
            &EvaluationRule::Amount(AmountRule { mode: AmountMode::Delta, ..base }),
            &set,
            &t,
        )
        .unwrap();
        assert_eq!(delta, vec![0.0]);
    }

    #[test]
    fn test_calculus_rule_ratio() {
        let rule = EvaluationRule::Calculus(CalculusRule {
            transition_group_id: 1,
            numerator_ordinal: 0,
            denominator_ordinal: 1,
        });
        let series = evaluate(&rule, &record_set(), &[transition(1)]).unwrap();
        // avg(height[1..6]) = 18, avg(current[1..6]) = 4.
        assert_eq!(series, vec![4.5]);
    }

    #[test]
    fn test_unknown_reference_is_config_error() {
        let rule = EvaluationRule::Amount(AmountRule {
            transition_group_id: 1,
            ref_ordinal: 9,
            mode: AmountMode::Avg,
        });
        assert!(matches!(
            evaluate(&rule, &record_set(), &[transition(1)]),
            Err(VaultError::Config(_))
        ));
    }
}
