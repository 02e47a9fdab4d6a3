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

//! Batch reconciliation of trusses against the cache layers.
//!
//! Given trusses grouped by source file, each is resolved against the front
//! cache, then the persistent store. Hits replace the truss with the
//! decoded vault and leave the pending map; a source file whose truss list
//! empties is removed from the map entirely, so the caller can tell by map
//! emptiness that no log reading is required. The remainder is produced by
//! the external log-reading collaborator and written back through
//! [`Reconciler::store_back`].
//!
//! The persistent store handle is not safe for concurrent structural
//! access; a mutex serializes whole traversals, so at most one scan is in
//! flight per process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use histovault_core::{ExtendedVault, Result, Vault};

use crate::codec::{VaultCodec, VaultFormat};
use crate::front_cache::{FrontCache, DEFAULT_MAX_ENTRIES};
use crate::store::{StoreLayout, VaultStore};

/// Trusses bound for reading into a full vault, grouped by source file.
///
/// Duplicates originating from copied log files or file conversions are
/// discarded on insert.
#[derive(Debug, Default)]
pub struct TrussJobs {
    jobs: BTreeMap<PathBuf, Vec<Vault>>,
}

impl TrussJobs {
    /// Build the workload map, discarding duplicate trusses.
    pub fn create(trusses: Vec<Vault>) -> Self {
        let mut jobs = TrussJobs::default();
        let mut seen: Vec<(String, u32, i64)> = Vec::new();
        for truss in trusses {
            let key = {
                let (device, channel, timestamp) = truss.duplicate_key();
                (device.to_string(), channel, timestamp)
            };
            if seen.contains(&key) {
                warn!(vault = %truss.vault_name, path = %truss.log_file_path, "duplicate truss discarded");
                continue;
            }
            seen.push(key);
            jobs.add(truss);
        }
        jobs
    }

    pub fn add(&mut self, truss: Vault) {
        self.jobs
            .entry(PathBuf::from(&truss.log_file_path))
            .or_default()
            .push(truss);
    }

    /// Number of source files still pending.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True when no log reading is required anymore.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn truss_count(&self) -> usize {
        self.jobs.values().map(Vec::len).sum()
    }

    pub fn get(&self, path: &Path) -> Option<&[Vault]> {
        self.jobs.get(path).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Vec<Vault>)> {
        self.jobs.iter()
    }

    fn retain_unresolved<F>(&mut self, mut resolve: F)
    where
        F: FnMut(&Vault) -> bool,
    {
        self.jobs.retain(|_, trusses| {
            trusses.retain(|truss| !resolve(truss));
            !trusses.is_empty()
        });
    }
}

/// Resolves truss batches through front cache and persistent store.
pub struct Reconciler {
    cache_dir: PathBuf,
    layout: StoreLayout,
    format: VaultFormat,
    codec: VaultCodec,
    front_cache: FrontCache,
    /// At most one store traversal in flight per process.
    scan_guard: Mutex<()>,
}

impl Reconciler {
    pub fn new(cache_dir: impl Into<PathBuf>, layout: StoreLayout) -> Self {
        Self::with_format(cache_dir, layout, VaultFormat::Strict)
    }

    pub fn with_format(
        cache_dir: impl Into<PathBuf>,
        layout: StoreLayout,
        format: VaultFormat,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            layout,
            format,
            codec: VaultCodec::new(),
            front_cache: FrontCache::new(DEFAULT_MAX_ENTRIES),
            scan_guard: Mutex::new(()),
        }
    }

    pub fn front_cache(&self) -> &FrontCache {
        &self.front_cache
    }

    /// Resolve every truss against front cache, then persistent store.
    ///
    /// Resolved trusses are removed from `jobs` and returned as vaults with
    /// load context; files whose truss lists empty are removed entirely.
    pub fn reconcile(&self, jobs: &mut TrussJobs) -> Result<Vec<ExtendedVault>> {
        let _guard = self.scan_guard.lock();

        // One store handle per distinct scope in the batch; a scope that
        // cannot be opened is an empty cache for this pass.
        let mut stores: BTreeMap<String, Option<VaultStore>> = BTreeMap::new();
        for (_, trusses) in jobs.iter() {
            for truss in trusses {
                stores
                    .entry(truss.vault_directory.clone())
                    .or_insert_with(|| self.open_scope(&truss.vault_directory));
            }
        }

        let mut resolved = Vec::new();
        let before = jobs.truss_count();
        jobs.retain_unresolved(|truss| {
            let store = match stores.get(&truss.vault_directory) {
                Some(Some(store)) => store,
                _ => return false,
            };
            match self.resolve_one(truss, store) {
                Some(vault) => {
                    resolved.push(ExtendedVault::from_cache((*vault).clone(), truss));
                    true
                }
                None => false,
            }
        });

        info!(
            resolved = resolved.len(),
            pending = jobs.truss_count(),
            total = before,
            "reconciliation pass done"
        );
        Ok(resolved)
    }

    /// Persist promoted vaults, idempotently, and refresh the front cache.
    ///
    /// Returns the number of bytes written. Write failures are loud: an
    /// unwritable scope is an error, not a skip.
    pub fn store_back(&self, vaults: &[Vault]) -> Result<u64> {
        let _guard = self.scan_guard.lock();

        let mut stores: BTreeMap<String, VaultStore> = BTreeMap::new();
        let mut bytes_written = 0;
        for vault in vaults {
            if vault.is_truss() {
                debug!(vault = %vault.vault_name, "truss not stored, no log data");
                continue;
            }
            let store = match stores.entry(vault.vault_directory.clone()) {
                std::collections::btree_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::btree_map::Entry::Vacant(entry) => entry.insert(
                    VaultStore::open(&self.cache_dir, &vault.vault_directory, self.layout)?,
                ),
            };
            let payload = self.codec.encode(vault, self.format)?;
            bytes_written += store.create_if_absent(&vault.vault_name, &payload)?;
            self.front_cache.insert(vault.clone());
        }
        info!(bytes_written, vaults = vaults.len(), "stored vault batch");
        Ok(bytes_written)
    }

    /// Total size of the persisted scopes touched by `vaults`.
    pub fn cache_size_bytes(&self, scope_ids: &[String]) -> Result<u64> {
        let mut total = 0;
        for scope_id in scope_ids {
            if let Some(store) = self.open_scope(scope_id) {
                total += store.size_bytes()?;
            }
        }
        Ok(total)
    }

    fn open_scope(&self, scope_id: &str) -> Option<VaultStore> {
        match VaultStore::open(&self.cache_dir, scope_id, self.layout) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(scope = %scope_id, error = %e, "scope unreadable, treated as empty cache");
                None
            }
        }
    }

    /// Front cache first, then the persistent store. Decode failures are
    /// logged per entry and count as misses.
    fn resolve_one(&self, truss: &Vault, store: &VaultStore) -> Option<std::sync::Arc<Vault>> {
        let loaded = self.front_cache.get_or_load(&truss.vault_name, || {
            let payload = match store.lookup(&truss.vault_name) {
                Ok(Some(payload)) => payload,
                Ok(None) => return Ok(None),
                Err(e) => {
                    warn!(vault = %truss.vault_name, error = %e, "entry unreadable, treated as miss");
                    return Ok(None);
                }
            };
            match self.codec.decode(&payload, self.format) {
                Ok(vault) => Ok(Some(vault)),
                Err(e) => {
                    warn!(vault = %truss.vault_name, error = %e, "entry undecodable, treated as miss");
                    Ok(None)
                }
            }
        });
        match loaded {
            Ok(value) => value,
            Err(e) => {
                warn!(vault = %truss.vault_name, error = %e, "front cache load failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use histovault_core::{Compartment, DataKind, Environment, SourceIdentity, StatisticsSettings, TrailKind};
    use tempfile::tempdir;

    fn environment() -> Environment {
        Environment {
            version: "3.9.9".to_string(),
            device_key: histovault_core::sha1_hex("device definition"),
            channel_number: 1,
            settings: StatisticsSettings::default(),
            reader_settings: String::new(),
        }
    }

    fn identity(file: &str, ordinal: u32) -> SourceIdentity {
        SourceIdentity {
            file_path: format!("/logs/{file}").into(),
            file_last_modified_ms: 1_680_000_000_000,
            file_length: 65_536,
            file_version: 1,
            record_set_ordinal: ordinal,
            recordset_base_name: file.trim_end_matches(".bin").to_string(),
            device_name: "UniLog".to_string(),
            channel_number: 1,
            object_key: String::new(),
            start_timestamp_ms: 1_679_000_000_000 + ordinal as i64,
        }
    }

    fn truss(file: &str, ordinal: u32) -> Vault {
        Vault::truss(&environment(), &identity(file, ordinal))
    }

    fn populated(file: &str, ordinal: u32) -> Vault {
        let mut vault = truss(file, ordinal);
        let mut compartment = Compartment::new("voltage", DataKind::Voltage);
        compartment.put(TrailKind::Avg, 11_500);
        vault.measurements.insert(0, compartment);
        vault
    }

    fn batch() -> TrussJobs {
        let mut trusses = Vec::new();
        for file in ["a.bin", "b.bin", "c.bin"] {
            for ordinal in 0..2 {
                trusses.push(truss(file, ordinal));
            }
        }
        // Distinct start timestamps so nothing is discarded as duplicate.
        for (i, t) in trusses.iter_mut().enumerate() {
            t.log_start_timestamp_ms = 1_679_000_000_000 + i as i64 * 60_000;
        }
        TrussJobs::create(trusses)
    }

    #[test]
    fn test_partial_batch_resolution() {
        for layout in [StoreLayout::Archive, StoreLayout::Directory] {
            let dir = tempdir().unwrap();
            let reconciler = Reconciler::new(dir.path(), layout);

            // The store holds both recordsets of a.bin and b.bin but none
            // of c.bin: 4 of the 6 vault ids.
            let stored = vec![
                populated("a.bin", 0),
                populated("a.bin", 1),
                populated("b.bin", 0),
                populated("b.bin", 1),
            ];
            reconciler.store_back(&stored).unwrap();

            let mut jobs = batch();
            assert_eq!(jobs.truss_count(), 6);

            let resolved = reconciler.reconcile(&mut jobs).unwrap();
            assert_eq!(resolved.len(), 4);
            assert_eq!(jobs.len(), 1);
            assert_eq!(jobs.truss_count(), 2);
            assert!(jobs.get(Path::new("/logs/c.bin")).is_some());
            assert!(!resolved[0].vault.is_truss());
            assert_eq!(resolved[0].load_file_path, PathBuf::from("/logs/a.bin"));
        }
    }

    #[test]
    fn test_empty_map_signals_no_log_reading() {
        let dir = tempdir().unwrap();
        let reconciler = Reconciler::new(dir.path(), StoreLayout::Directory);
        reconciler
            .store_back(&[populated("a.bin", 0)])
            .unwrap();

        let mut jobs = TrussJobs::create(vec![truss("a.bin", 0)]);
        let resolved = reconciler.reconcile(&mut jobs).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_missing_scope_is_empty_cache() {
        let dir = tempdir().unwrap();
        let reconciler = Reconciler::new(dir.path(), StoreLayout::Directory);
        let mut jobs = TrussJobs::create(vec![truss("a.bin", 0)]);
        let resolved = reconciler.reconcile(&mut jobs).unwrap();
        assert!(resolved.is_empty());
        assert_eq!(jobs.truss_count(), 1);
    }

    #[test]
    fn test_store_back_idempotent() {
        let dir = tempdir().unwrap();
        let reconciler = Reconciler::new(dir.path(), StoreLayout::Archive);
        let vault = populated("a.bin", 0);
        let first = reconciler.store_back(std::slice::from_ref(&vault)).unwrap();
        assert!(first > 0);
        let second = reconciler.store_back(std::slice::from_ref(&vault)).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn test_trusses_are_not_stored() {
        let dir = tempdir().unwrap();
        let reconciler = Reconciler::new(dir.path(), StoreLayout::Directory);
        let bytes = reconciler.store_back(&[truss("a.bin", 0)]).unwrap();
        assert_eq!(bytes, 0);
    }

    #[test]
    fn test_corrupt_entry_degrades_to_miss() {
        let dir = tempdir().unwrap();
        let reconciler = Reconciler::new(dir.path(), StoreLayout::Directory);
        let good = populated("a.bin", 0);
        let bad = populated("b.bin", 0);
        reconciler.store_back(&[good.clone(), bad.clone()]).unwrap();

        // Corrupt the persisted entry of b.bin in place.
        let entry_path = dir
            .path()
            .join(&bad.vault_directory)
            .join(&bad.vault_name);
        let mut bytes = std::fs::read(&entry_path).unwrap();
        bytes.truncate(bytes.len() / 2);
        std::fs::write(&entry_path, &bytes).unwrap();

        let mut jobs = TrussJobs::create(vec![truss("a.bin", 0), truss("b.bin", 0)]);
        let resolved = reconciler.reconcile(&mut jobs).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].vault.vault_name, good.vault_name);
        // The corrupt entry stays pending for recomputation from source.
        assert_eq!(jobs.truss_count(), 1);
    }

    #[test]
    fn test_duplicate_truss_discarded() {
        let original = truss("a.bin", 0);
        let mut copy = identity("copy-of-a.bin", 0);
        copy.start_timestamp_ms = original.log_start_timestamp_ms;
        let jobs = TrussJobs::create(vec![original, Vault::truss(&environment(), &copy)]);
        assert_eq!(jobs.truss_count(), 1);
    }

    #[test]
    fn test_promote_store_reload_pipeline() {
        use histovault_stats::{
            MeasurementKind, Record, RecordSet, ReduceSettings, ScoreInputs, VaultCollector,
        };

        let dir = tempdir().unwrap();
        let reconciler = Reconciler::new(dir.path(), StoreLayout::Archive);

        let mut record = Record::new("voltage", (1..=10).map(|v| v as f64).collect());
        record.kind = MeasurementKind::Point;
        let record_set = RecordSet {
            start_timestamp_ms: 1_679_999_111_000,
            max_time_ms: 900.0,
            average_time_step_ms: 100.0,
            maximum_time_step_ms: 110.0,
            minimum_time_step_ms: 90.0,
            sigma_time_step_ms: 4.2,
            records: vec![record],
        };

        let mut vault = truss("a.bin", 0);
        let collector = VaultCollector::new(&[], ReduceSettings::default());
        collector
            .promote(&mut vault, &record_set, &[], &ScoreInputs::default())
            .unwrap();
        assert!(!vault.is_truss());
        reconciler.store_back(std::slice::from_ref(&vault)).unwrap();

        // A fresh reconciler reads through the persistent store only.
        let fresh = Reconciler::new(dir.path(), StoreLayout::Archive);
        let mut jobs = TrussJobs::create(vec![truss("a.bin", 0)]);
        let resolved = fresh.reconcile(&mut jobs).unwrap();
        assert!(jobs.is_empty());
        let reloaded = &resolved[0].vault;
        assert_eq!(reloaded, &vault);
        assert_eq!(
            reloaded.measurement_point(0, TrailKind::Avg),
            Some(5500)
        );
        assert_eq!(reloaded.measurement_point(0, TrailKind::Q2), Some(5500));
    }

    #[test]
    fn test_second_pass_hits_front_cache() {
        let dir = tempdir().unwrap();
        let reconciler = Reconciler::new(dir.path(), StoreLayout::Directory);
        reconciler.store_back(&[populated("a.bin", 0)]).unwrap();

        let mut first = TrussJobs::create(vec![truss("a.bin", 0)]);
        reconciler.reconcile(&mut first).unwrap();
        let hits_before = reconciler.front_cache().stats().hits;

        let mut second = TrussJobs::create(vec![truss("a.bin", 0)]);
        reconciler.reconcile(&mut second).unwrap();
        assert!(reconciler.front_cache().stats().hits > hits_before);
    }
}
