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

//! Quantile calculation over a probability distribution after removing
//! constant scraps and outliers.
//!
//! The *trunk* is the sorted remainder of the population. Outliers are
//! values beyond the quartile bounds plus a configurable multiple of the
//! inter-quartile distance; constant scraps are runs of one identical value
//! longer than a threshold, recorded once instead of run-length many times.
//! Population min/max look at the full population, everything else at the
//! trunk. Based on a merge sort and thus avg O(n log n).

use histovault_core::{Result, VaultError};

/// Outlier distance limit as a multiple of the inter-quartile range,
/// matching the Tukey boxplot whisker factor.
pub const BOXPLOT_OUTLIER_FACTOR: f64 = 1.5;

/// Minimum run length before identical values count as a constant scrap.
pub const DEFAULT_SCRAP_RUN_MIN: usize = 10;

/// Tuning knobs of one reduction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceSettings {
    /// Standard deviation denominator: sample (n-1) when true.
    pub is_sample: bool,
    /// Outlier distance limit from the quartiles in IQR multiples.
    pub outlier_factor: f64,
    /// Runs of one identical value at least this long become scraps.
    pub scrap_run_min: usize,
}

impl Default for ReduceSettings {
    fn default() -> Self {
        Self {
            is_sample: true,
            outlier_factor: BOXPLOT_OUTLIER_FACTOR,
            scrap_run_min: DEFAULT_SCRAP_RUN_MIN,
        }
    }
}

/// Immutable quantile view over one measurement's samples.
#[derive(Debug, Clone)]
pub struct SampleQuantile {
    trunk: Vec<f64>,
    outliers: Vec<f64>,
    scraps: Vec<f64>,
    first_valid: f64,
    last_valid: f64,
    population_min: f64,
    population_max: f64,
    sum: f64,
    avg: f64,
    sigma: f64,
    is_sample: bool,
}

impl SampleQuantile {
    pub fn new(samples: &[f64], settings: &ReduceSettings) -> Result<Self> {
        if samples.is_empty() {
            return Err(VaultError::InvalidArgument("empty population".into()));
        }

        // Constant-scrap pass over the raw sequence: mark members of long
        // identical runs, record each run value once.
        let mut scrapped = vec![false; samples.len()];
        let mut scraps: Vec<f64> = Vec::new();
        let mut run_start = 0;
        for i in 1..=samples.len() {
            if i == samples.len() || samples[i] != samples[run_start] {
                if i - run_start >= settings.scrap_run_min {
                    scraps.push(samples[run_start]);
                    scrapped[run_start..i].iter_mut().for_each(|m| *m = true);
                }
                run_start = i;
            }
        }

        let mut trunk: Vec<f64> = samples
            .iter()
            .zip(&scrapped)
            .filter(|(_, &m)| !m)
            .map(|(&v, _)| v)
            .collect();
        if trunk.is_empty() {
            return Err(VaultError::InvalidArgument("empty trunk".into()));
        }
        trunk.sort_by(|a, b| a.total_cmp(b));

        // Outlier bounds from the untrimmed trunk.
        let iqr = quantile_sorted(&trunk, 0.75, settings.is_sample)
            - quantile_sorted(&trunk, 0.25, settings.is_sample);
        let lower_bound = quantile_sorted(&trunk, 0.25, settings.is_sample)
            - iqr * settings.outlier_factor;
        let upper_bound = quantile_sorted(&trunk, 0.75, settings.is_sample)
            + iqr * settings.outlier_factor;

        let mut outliers: Vec<f64> = Vec::new();
        while let Some(&low) = trunk.first() {
            if low < lower_bound {
                outliers.push(low);
                trunk.remove(0);
            } else {
                break;
            }
        }
        while let Some(&high) = trunk.last() {
            if high > upper_bound {
                outliers.push(high);
                trunk.pop();
            } else {
                break;
            }
        }
        // If all outliers share one value we expect them to carry a real
        // value (e.g. height 0 m) and keep them in the trunk.
        if !outliers.is_empty() && trunk.is_empty() {
            return Err(VaultError::InvalidArgument("empty trunk".into()));
        }
        if outliers.len() > 1 && outliers.iter().all(|&v| v == outliers[0]) {
            for v in outliers.drain(..) {
                let at = trunk.partition_point(|&t| t < v);
                trunk.insert(at, v);
            }
        }

        // First/last elements of the original order which are neither
        // scrapped nor outliers.
        let is_valid = |i: usize, v: f64| !scrapped[i] && !outliers.iter().any(|&o| o == v);
        let first_valid = samples
            .iter()
            .enumerate()
            .find(|&(i, &v)| is_valid(i, v))
            .map(|(_, &v)| v);
        let last_valid = samples
            .iter()
            .enumerate()
            .rev()
            .find(|&(i, &v)| is_valid(i, v))
            .map(|(_, &v)| v);
        let (first_valid, last_valid) = match (first_valid, last_valid) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(VaultError::InvalidArgument("empty trunk".into())),
        };

        let population_min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let population_max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        // Incremental mean and variance in one pass.
        let mut avg = 0.0;
        let mut var_times_n = 0.0;
        for (count, &value) in trunk.iter().enumerate() {
            let next = count + 1;
            var_times_n += (value - avg) * (value - avg) * count as f64 / next as f64;
            avg += (value - avg) / next as f64;
        }
        let denominator = if settings.is_sample {
            trunk.len().saturating_sub(1)
        } else {
            trunk.len()
        };
        let sigma = if denominator > 0 {
            (var_times_n / denominator as f64).sqrt()
        } else {
            0.0
        };
        let sum = trunk.iter().sum();

        Ok(Self {
            trunk,
            outliers,
            scraps,
            first_valid,
            last_valid,
            population_min,
            population_max,
            sum,
            avg,
            sigma,
            is_sample: settings.is_sample,
        })
    }

    /// The sample quantile according to R-6, SAS-4, SciPy-(0,0), Maple-5,
    /// which is piecewise linear and symmetric.
    pub fn quantile(&self, probability_cut_point: f64) -> f64 {
        quantile_sorted(&self.trunk, probability_cut_point, self.is_sample)
    }

    pub fn quartile0(&self) -> f64 {
        self.trunk[0]
    }

    pub fn quartile1(&self) -> f64 {
        self.quantile(0.25)
    }

    pub fn quartile2(&self) -> f64 {
        self.quantile(0.5)
    }

    pub fn quartile3(&self) -> f64 {
        self.quantile(0.75)
    }

    pub fn quartile4(&self) -> f64 {
        self.trunk[self.trunk.len() - 1]
    }

    pub fn inter_quartile_range(&self) -> f64 {
        self.quartile3() - self.quartile1()
    }

    /// Lower whisker: the smallest in-range sample quantile above
    /// `Q1 - 1.5 * IQR`, clamped to that limit.
    pub fn lower_whisker(&self) -> f64 {
        let start = self.quartile1();
        let limit = start - self.inter_quartile_range() * BOXPLOT_OUTLIER_FACTOR;
        let size = self.trunk.len();
        for (i, &value) in self.trunk.iter().enumerate() {
            if i as f64 >= size as f64 * 0.25 {
                break;
            }
            if value >= limit {
                // add .5 due to zero-based index and rule 0<p<1 which
                // implies an index average value
                let corrected = self.quantile((0.5 + i as f64) / size as f64);
                return corrected.max(limit);
            }
        }
        start
    }

    /// Upper whisker: the largest in-range sample quantile below
    /// `Q3 + 1.5 * IQR`, clamped to that limit.
    pub fn upper_whisker(&self) -> f64 {
        let start = self.quartile3();
        let limit = start + self.inter_quartile_range() * BOXPLOT_OUTLIER_FACTOR;
        let size = self.trunk.len();
        for i in (0..size).rev() {
            if i as f64 <= size as f64 * 0.75 {
                break;
            }
            if self.trunk[i] <= limit {
                let corrected = self.quantile((0.5 + i as f64) / size as f64);
                return corrected.min(limit);
            }
        }
        start
    }

    /// First element after scrap elimination and outlier removal.
    pub fn first(&self) -> f64 {
        self.first_valid
    }

    /// Last element after scrap elimination and outlier removal.
    pub fn last(&self) -> f64 {
        self.last_valid
    }

    /// Minimum over the full population, outliers included.
    pub fn population_min(&self) -> f64 {
        self.population_min
    }

    /// Maximum over the full population, outliers included.
    pub fn population_max(&self) -> f64 {
        self.population_max
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn avg(&self) -> f64 {
        self.avg
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Trunk size after eliminations.
    pub fn size(&self) -> usize {
        self.trunk.len()
    }

    pub fn outliers(&self) -> &[f64] {
        &self.outliers
    }

    pub fn scraps(&self) -> &[f64] {
        &self.scraps
    }
}

/// R-6 sample quantile over a sorted slice; population fallback averages
/// the two straddling elements at integer positions.
fn quantile_sorted(sorted: &[f64], p: f64, is_sample: bool) -> f64 {
    let size = sorted.len();
    let n = size as f64;
    if is_sample {
        if p >= 1.0 / (n + 1.0) && p < n / (n + 1.0) {
            let position = (n + 1.0) * p;
            let index = position as usize;
            sorted[index - 1] + (position - index as f64) * (sorted[index] - sorted[index - 1])
        } else if p < 1.0 / (n + 1.0) {
            sorted[0]
        } else {
            sorted[size - 1]
        }
    } else if p > 0.0 && p < 1.0 {
        let position = n * p;
        if position.fract() == 0.0 {
            let index = position as usize;
            (sorted[index - 1] + sorted[index]) / 2.0
        } else {
            sorted[position as usize]
        }
    } else if p == 0.0 {
        sorted[0]
    } else {
        sorted[size - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_to_ten() -> Vec<f64> {
        (1..=10).map(|v| v as f64).collect()
    }

    #[test]
    fn test_closed_form_one_to_ten() {
        let q = SampleQuantile::new(&one_to_ten(), &ReduceSettings::default()).unwrap();
        assert_eq!(q.avg(), 5.5);
        assert!((q.sigma() - 3.0276503540974917).abs() < 1e-12);
        assert_eq!(q.quartile0(), 1.0);
        assert_eq!(q.quartile1(), 2.75);
        assert_eq!(q.quartile2(), 5.5);
        assert_eq!(q.quartile3(), 8.25);
        assert_eq!(q.quartile4(), 10.0);
        assert_eq!(q.first(), 1.0);
        assert_eq!(q.last(), 10.0);
        assert_eq!(q.size(), 10);
        assert!(q.outliers().is_empty());
        assert!(q.scraps().is_empty());
    }

    #[test]
    fn test_whiskers_without_outliers() {
        let q = SampleQuantile::new(&one_to_ten(), &ReduceSettings::default()).unwrap();
        assert_eq!(q.lower_whisker(), 1.0);
        assert_eq!(q.upper_whisker(), 10.0);
    }

    #[test]
    fn test_extreme_value_flagged_as_outlier() {
        let mut samples = one_to_ten();
        samples.push(1000.0);
        let q = SampleQuantile::new(&samples, &ReduceSettings::default()).unwrap();
        assert_eq!(q.outliers(), &[1000.0]);
        assert_eq!(q.size(), 10);
        assert_eq!(q.population_max(), 1000.0);
        assert_eq!(q.quartile4(), 10.0);
        assert_eq!(q.last(), 10.0);
    }

    #[test]
    fn test_identical_outliers_carry_a_real_value() {
        // Two identical extremes are kept: they look like a real level.
        let mut samples = one_to_ten();
        samples.push(1000.0);
        samples.push(1000.0);
        let q = SampleQuantile::new(&samples, &ReduceSettings::default()).unwrap();
        assert!(q.outliers().is_empty());
        assert_eq!(q.size(), 12);
        assert_eq!(q.quartile4(), 1000.0);
    }

    #[test]
    fn test_constant_scrap_extraction() {
        let mut samples = vec![5.0; 32];
        samples.extend(one_to_ten());
        let q = SampleQuantile::new(&samples, &ReduceSettings::default()).unwrap();
        assert_eq!(q.scraps(), &[5.0]);
        // The run is gone from the trunk, the loose 5.0 of 1..=10 stays.
        assert_eq!(q.size(), 10);
        assert_eq!(q.first(), 1.0);
    }

    #[test]
    fn test_empty_population_rejected() {
        assert!(SampleQuantile::new(&[], &ReduceSettings::default()).is_err());
    }

    #[test]
    fn test_all_scrap_is_empty_trunk() {
        let samples = vec![7.0; 64];
        assert!(SampleQuantile::new(&samples, &ReduceSettings::default()).is_err());
    }

    #[test]
    fn test_determinism() {
        let mut samples = one_to_ten();
        samples.push(1000.0);
        let a = SampleQuantile::new(&samples, &ReduceSettings::default()).unwrap();
        let b = SampleQuantile::new(&samples, &ReduceSettings::default()).unwrap();
        assert_eq!(a.quantile(0.025).to_bits(), b.quantile(0.025).to_bits());
        assert_eq!(a.sigma().to_bits(), b.sigma().to_bits());
    }
}
