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

//! HistoVault Core
//!
//! Fundamental data structures and identities of the historical-statistics
//! cache: vaults and trusses, compartments of encoded trail points, and the
//! SHA-1 fingerprints that key the persistent store.

pub mod compartment;
pub mod error;
pub mod fingerprint;
pub mod point;
pub mod vault;

pub use compartment::Compartment;
pub use error::{Result, VaultError};
pub use fingerprint::{
    sha1_file, sha1_hex, DeviceKeyMemo, Environment, StatisticsSettings, SHA1_DELIMITER,
};
pub use point::{decode, encode, DataKind, ScoreLabel, TrailKind, POINT_SCALE};
pub use vault::{ExtendedVault, SourceIdentity, Vault};
