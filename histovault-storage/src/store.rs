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

//! Persistent vault store: one physical layout switch, one API.
//!
//! Under the scope directory a runtime setting selects either a single
//! archive file holding one entry per vault id, or one file per vault id.
//! Both layouts support existence checks, enumeration above a minimum entry
//! size, random lookup by vault id and create-if-absent writes.

use std::path::{Path, PathBuf};

use histovault_core::Result;

use crate::archive::ArchiveStore;
use crate::dir_store::DirectoryStore;

/// File name of the archive within the scope directory.
pub const ARCHIVE_FILE_NAME: &str = "vaults.arc";

/// Entries below this payload size are non-vault noise and skipped during
/// bulk scans.
pub const MIN_VAULT_LENGTH: u64 = 128;

/// Physical layout of a scope's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreLayout {
    /// Single random-access archive file under the scope directory.
    Archive,
    /// One file per vault id under the scope directory.
    #[default]
    Directory,
}

impl StoreLayout {
    /// Map the application's "zipped cache" boolean setting.
    pub fn from_archive_setting(is_archive: bool) -> Self {
        if is_archive {
            StoreLayout::Archive
        } else {
            StoreLayout::Directory
        }
    }
}

/// The persistent store of one cache scope.
#[derive(Debug)]
pub enum VaultStore {
    Archive(ArchiveStore),
    Directory(DirectoryStore),
}

impl VaultStore {
    /// Open the store for `scope_id` beneath the cache directory.
    pub fn open(cache_dir: &Path, scope_id: &str, layout: StoreLayout) -> Result<Self> {
        let scope_dir = cache_dir.join(scope_id);
        match layout {
            StoreLayout::Archive => {
                std::fs::create_dir_all(&scope_dir)?;
                Ok(VaultStore::Archive(ArchiveStore::open(
                    scope_dir.join(ARCHIVE_FILE_NAME),
                )?))
            }
            StoreLayout::Directory => Ok(VaultStore::Directory(DirectoryStore::open(scope_dir))),
        }
    }

    /// True when the scope has persisted entries on disk.
    pub fn exists(&self) -> bool {
        match self {
            VaultStore::Archive(store) => store.exists(),
            VaultStore::Directory(store) => store.exists(),
        }
    }

    pub fn path(&self) -> PathBuf {
        match self {
            VaultStore::Archive(store) => store.path().to_path_buf(),
            VaultStore::Directory(store) => store.path().to_path_buf(),
        }
    }

    pub fn lookup(&self, vault_id: &str) -> Result<Option<Vec<u8>>> {
        match self {
            VaultStore::Archive(store) => store.lookup(vault_id),
            VaultStore::Directory(store) => store.lookup(vault_id),
        }
    }

    /// Idempotent write; returns the number of bytes written (0 when the
    /// entry already existed).
    pub fn create_if_absent(&mut self, vault_id: &str, payload: &[u8]) -> Result<u64> {
        match self {
            VaultStore::Archive(store) => store.create_if_absent(vault_id, payload),
            VaultStore::Directory(store) => store.create_if_absent(vault_id, payload),
        }
    }

    /// Enumerate entries of at least [`MIN_VAULT_LENGTH`] bytes.
    pub fn entries(&self) -> Result<Vec<(String, Vec<u8>)>> {
        match self {
            VaultStore::Archive(store) => store.entries(MIN_VAULT_LENGTH),
            VaultStore::Directory(store) => store.entries(MIN_VAULT_LENGTH),
        }
    }

    /// Size of the persisted scope in bytes.
    pub fn size_bytes(&self) -> Result<u64> {
        match self {
            VaultStore::Archive(store) => Ok(store.size_bytes()),
            VaultStore::Directory(store) => store.size_bytes(),
        }
    }
}
