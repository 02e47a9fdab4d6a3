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

//! One measurement/settlement/score section of a vault: the mapping from
//! trail kind to encoded point, plus the optional outlier and constant-scrap
//! side lists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::point::{DataKind, TrailKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compartment {
    /// Display name, e.g. the measurement name from the channel definition.
    pub name: String,

    /// Formatting hint for trend views; carries no statistical meaning.
    #[serde(rename = "dataKind", default)]
    pub data_kind: DataKind,

    /// Trail-kind ordinal to encoded point.
    #[serde(default)]
    pub trails: BTreeMap<u32, i64>,

    /// Distinct encoded values found beyond the whisker bounds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outliers: Vec<i64>,

    /// Distinct encoded values of constant runs, recorded once instead of
    /// run-length many times.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scraps: Vec<i64>,
}

impl Compartment {
    pub fn new(name: impl Into<String>, data_kind: DataKind) -> Self {
        Self {
            name: name.into(),
            data_kind,
            trails: BTreeMap::new(),
            outliers: Vec::new(),
            scraps: Vec::new(),
        }
    }

    /// A single-point compartment, used for score scalars.
    pub fn scalar(name: impl Into<String>, kind: TrailKind, point: i64) -> Self {
        let mut compartment = Self::new(name, DataKind::Default);
        compartment.put(kind, point);
        compartment
    }

    pub fn put(&mut self, kind: TrailKind, point: i64) {
        self.trails.insert(kind.ordinal(), point);
    }

    pub fn trail(&self, kind: TrailKind) -> Option<i64> {
        self.trails.get(&kind.ordinal()).copied()
    }

    /// True when no trail point was recorded, e.g. for a measurement
    /// without reasonable data.
    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    pub fn set_outliers(&mut self, mut values: Vec<i64>) {
        values.sort_unstable();
        values.dedup();
        self.outliers = values;
    }

    pub fn set_scraps(&mut self, mut values: Vec<i64>) {
        values.sort_unstable();
        values.dedup();
        self.scraps = values;
    }
}
