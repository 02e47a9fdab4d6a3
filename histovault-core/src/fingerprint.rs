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

//! Cache-scope and vault fingerprint derivation.
//!
//! Two SHA-1 identities rule the cache:
//!
//! - the *scope id* encodes the environment (application version, device
//!   definition hash, channel, statistics settings, reader variant) and
//!   names the scope directory shared by all vaults produced under
//!   identical settings;
//! - the *vault id* extends the scope id with the source file identity
//!   (name, modified time, length, recordset ordinal) and names one
//!   persisted entry.
//!
//! Both are pure functions of their inputs: no I/O, no hidden state,
//! byte-identical across processes. The device definition hash is the one
//! input that does require I/O; [`DeviceKeyMemo`] owns that cost and its
//! invalidation rule.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::Result;

/// Delimiter for hashing combined keys.
pub const SHA1_DELIMITER: &str = ",";

/// SHA-1 hash rendered as a lowercase hexadecimal number, 40 digits long.
pub fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-1 over a file's full contents.
///
/// Reads in 8 KiB blocks; most file systems use block sizes of 4096 or 8192.
pub fn sha1_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut block = [0u8; 8192];
    loop {
        let read = file.read(&mut block)?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Statistics settings that shape every vault produced under a scope.
///
/// Any change here changes the scope id and therefore invalidates the whole
/// scope directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSettings {
    /// Sampling timespan in ms applied by the log readers.
    pub sampling_timespan_ms: i64,
    /// Quantile distance for min/max display smoothing.
    pub minmax_quantile_distance: f64,
    /// Absolute transition level for settlement detection.
    pub absolute_transition_level: f64,
    pub canonical_quantiles: bool,
    pub symmetric_tolerance_interval: bool,
    /// Outlier distance limit as a multiple of the tolerance interval.
    pub outlier_tolerance_spread: f64,
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        Self {
            sampling_timespan_ms: 10_000,
            minmax_quantile_distance: 0.1,
            absolute_transition_level: 0.5,
            canonical_quantiles: true,
            symmetric_tolerance_interval: true,
            outlier_tolerance_spread: 9.0,
        }
    }
}

impl StatisticsSettings {
    /// Delimiter-joined fragment entering the scope id.
    fn fragment(&self) -> String {
        let d = SHA1_DELIMITER;
        format!(
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            self.sampling_timespan_ms,
            self.minmax_quantile_distance,
            self.absolute_transition_level,
            self.canonical_quantiles,
            self.symmetric_tolerance_interval,
            self.outlier_tolerance_spread,
        )
    }
}

/// The environment a vault is produced under.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    /// Application version string.
    pub version: String,
    /// SHA-1 of the active device definition file contents.
    pub device_key: String,
    /// Active channel number.
    pub channel_number: u32,
    pub settings: StatisticsSettings,
    /// Non-empty when the file reader delivers values that depend on
    /// device settings; empty otherwise.
    pub reader_settings: String,
}

impl Environment {
    /// Scope directory name: a unique identifier encoding the application
    /// version, the device definition contents, the channel number and the
    /// statistics settings.
    pub fn scope_id(&self) -> String {
        let d = SHA1_DELIMITER;
        let long_key = format!(
            "{}{d}{}{d}{}{d}{}{d}{}",
            self.version,
            self.device_key,
            self.channel_number,
            self.settings.fragment(),
            self.reader_settings,
        );
        sha1_hex(&long_key)
    }

    /// Vault entry name, derived without reading any log file contents:
    /// file name + modified time + length are a cheap stand-in for a hash
    /// of the file contents.
    pub fn vault_id(
        &self,
        file_name: &str,
        file_last_modified_ms: i64,
        file_length: u64,
        record_set_ordinal: u32,
    ) -> String {
        let d = SHA1_DELIMITER;
        let long_key = format!(
            "{}{d}{}{d}{}{d}{}{d}{}",
            self.scope_id(),
            file_name,
            file_last_modified_ms,
            file_length,
            record_set_ordinal,
        );
        sha1_hex(&long_key)
    }
}

/// Memoized SHA-1 of the active device definition file.
///
/// The key is recomputed only when the file path or its last-modified time
/// changes. A compute-and-publish race produces a value that is still a pure
/// function of the file bytes; a stale value is corrected by the next
/// change-detecting call.
#[derive(Debug, Default)]
pub struct DeviceKeyMemo {
    inner: RwLock<Option<MemoEntry>>,
}

#[derive(Debug, Clone)]
struct MemoEntry {
    path: PathBuf,
    modified: SystemTime,
    key: String,
}

impl DeviceKeyMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// The SHA-1 key for the device definition file, recomputing on path or
    /// modified-time change.
    pub fn device_key(&self, path: &Path) -> Result<String> {
        let modified = std::fs::metadata(path)?.modified()?;
        {
            let memo = self.inner.read();
            if let Some(entry) = memo.as_ref() {
                if entry.path == path && entry.modified == modified {
                    return Ok(entry.key.clone());
                }
            }
        }
        let key = sha1_file(path)?;
        *self.inner.write() = Some(MemoEntry {
            path: path.to_path_buf(),
            modified,
            key: key.clone(),
        });
        Ok(key)
    }
}
