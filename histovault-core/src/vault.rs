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

//! The vault data model.
//!
//! A [`Vault`] holds the aggregated history of one recordset: measurement,
//! settlement and score compartments keyed by small integers. A vault whose
//! `measurements` mapping is empty is a *truss*: the identity-only skeleton
//! created when a source file is discovered, before any statistics exist.
//!
//! [`ExtendedVault`] adds load-time-only context (the originating load path)
//! which is never persisted.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compartment::Compartment;
use crate::fingerprint::Environment;
use crate::point::{ScoreLabel, TrailKind};

/// Identity of one recordset within a source log file, known at discovery
/// time without reading the file contents.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceIdentity {
    /// Origin log file (not a link file).
    pub file_path: PathBuf,
    pub file_last_modified_ms: i64,
    pub file_length: u64,
    /// Version of the log origin file format.
    pub file_version: i32,
    /// Identifies multiple recordsets in one single file (0-based).
    pub record_set_ordinal: u32,
    /// Base name without the recordset number.
    pub recordset_base_name: String,
    pub device_name: String,
    /// May differ from UI settings in case of channel mix.
    pub channel_number: u32,
    /// May be empty; bin file readers supply the validated parent path.
    pub object_key: String,
    pub start_timestamp_ms: i64,
}

impl SourceIdentity {
    /// Final path component entering the vault id.
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Aggregated history recordset data for measurements, settlements and
/// scores, suitable for persistence and structured serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    /// Vault id: SHA-1 unique to the source file + recordset within a scope.
    #[serde(rename = "vaultName")]
    pub vault_name: String,

    /// Scope id: SHA-1 shared by all vaults produced under identical
    /// environment settings; equals the scope directory name.
    #[serde(rename = "vaultDirectory")]
    pub vault_directory: String,

    #[serde(rename = "vaultCreated_ms")]
    pub vault_created_ms: i64,

    #[serde(rename = "logFilePath")]
    pub log_file_path: String,

    #[serde(rename = "logFileLastModified")]
    pub log_file_last_modified: i64,

    #[serde(rename = "logFileLength")]
    pub log_file_length: u64,

    #[serde(rename = "logFileVersion")]
    pub log_file_version: i32,

    #[serde(rename = "logRecordSetOrdinal")]
    pub log_record_set_ordinal: u32,

    #[serde(rename = "logRecordsetBaseName")]
    pub log_recordset_base_name: String,

    #[serde(rename = "logDeviceName")]
    pub log_device_name: String,

    #[serde(rename = "logChannelNumber")]
    pub log_channel_number: u32,

    #[serde(rename = "logObjectKey")]
    pub log_object_key: String,

    #[serde(rename = "logStartTimestampMs")]
    pub log_start_timestamp_ms: i64,

    /// Keyed by measurement ordinal within the channel definition.
    pub measurements: BTreeMap<u32, Compartment>,

    /// Keyed by settlement definition id.
    pub settlements: BTreeMap<u32, Compartment>,

    /// Keyed by score label ordinal.
    pub scores: BTreeMap<u32, Compartment>,
}

impl Vault {
    /// Create the identity-only skeleton for a freshly discovered recordset.
    ///
    /// The scope id and vault id are derived here; statistics follow later
    /// when a collector promotes the truss.
    pub fn truss(env: &Environment, identity: &SourceIdentity) -> Self {
        let vault_directory = env.scope_id();
        let vault_name = env.vault_id(
            &identity.file_name(),
            identity.file_last_modified_ms,
            identity.file_length,
            identity.record_set_ordinal,
        );
        tracing::debug!(
            vault = %vault_name,
            scope = %vault_directory,
            path = %identity.file_path.display(),
            ordinal = identity.record_set_ordinal,
            "truss created"
        );
        Self {
            vault_name,
            vault_directory,
            vault_created_ms: chrono::Utc::now().timestamp_millis(),
            log_file_path: identity.file_path.to_string_lossy().into_owned(),
            log_file_last_modified: identity.file_last_modified_ms,
            log_file_length: identity.file_length,
            log_file_version: identity.file_version,
            log_record_set_ordinal: identity.record_set_ordinal,
            log_recordset_base_name: identity.recordset_base_name.clone(),
            log_device_name: identity.device_name.clone(),
            log_channel_number: identity.channel_number,
            log_object_key: identity.object_key.clone(),
            log_start_timestamp_ms: identity.start_timestamp_ms,
            measurements: BTreeMap::new(),
            settlements: BTreeMap::new(),
            scores: BTreeMap::new(),
        }
    }

    /// A truss carries identity only; promotion fills `measurements`.
    pub fn is_truss(&self) -> bool {
        self.measurements.is_empty()
    }

    /// True if recomputing the vault id from the stored identity fields
    /// under `env` reproduces the persisted name, i.e. the vault still
    /// conforms to the current environment.
    pub fn is_valid(&self, env: &Environment) -> bool {
        let file_name = Path::new(&self.log_file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.vault_name
            == env.vault_id(
                &file_name,
                self.log_file_last_modified,
                self.log_file_length,
                self.log_record_set_ordinal,
            )
    }

    /// Duplicate criterion: trusses or vaults with the same origin log data
    /// (copied log files, bin-to-osd conversions) compare equal here.
    pub fn duplicate_key(&self) -> (&str, u32, i64) {
        (
            &self.log_device_name,
            self.log_channel_number,
            self.log_start_timestamp_ms,
        )
    }

    /// Sort comparator: the newest vault first.
    pub fn newest_first(a: &Vault, b: &Vault) -> Ordering {
        b.log_start_timestamp_ms.cmp(&a.log_start_timestamp_ms)
    }

    pub fn measurement_point(&self, ordinal: u32, kind: TrailKind) -> Option<i64> {
        self.measurements.get(&ordinal).and_then(|c| c.trail(kind))
    }

    pub fn settlement_point(&self, settlement_id: u32, kind: TrailKind) -> Option<i64> {
        self.settlements
            .get(&settlement_id)
            .and_then(|c| c.trail(kind))
    }

    /// Score scalars are stored as single-point compartments under the
    /// `Avg` trail.
    pub fn score_point(&self, label: ScoreLabel) -> Option<i64> {
        self.scores
            .get(&label.ordinal())
            .and_then(|c| c.trail(TrailKind::Avg))
    }
}

/// A vault plus the load context of the current session.
///
/// The load path may differ from `log_file_path` when the file was reached
/// through a link; none of this survives serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedVault {
    pub vault: Vault,
    /// Source file the vault was loaded for in this session.
    pub load_file_path: PathBuf,
    /// Validated object directory; differs from the persisted object key.
    pub load_object_directory: String,
    /// Link through which the source file was reached, if any.
    pub load_link_path: Option<PathBuf>,
}

impl ExtendedVault {
    /// Attach load context from the truss the cache hit was resolved for.
    pub fn from_cache(vault: Vault, truss: &Vault) -> Self {
        Self {
            vault,
            load_file_path: PathBuf::from(&truss.log_file_path),
            load_object_directory: truss.log_object_key.clone(),
            load_link_path: None,
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn load_file_extension(&self) -> Option<String> {
        self.load_file_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
    }
}
