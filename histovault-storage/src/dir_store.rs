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

//! Directory-of-entries vault layout: one file per vault id under the
//! scope directory.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use histovault_core::Result;

/// One-file-per-vault store under a scope directory.
#[derive(Debug)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn contains(&self, vault_id: &str) -> bool {
        self.dir.join(vault_id).is_file()
    }

    /// Entry bytes for `vault_id`, or `None` on a miss.
    pub fn lookup(&self, vault_id: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.dir.join(vault_id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write an entry unless the id already exists; existing entries are
    /// never overwritten. Returns the number of bytes written.
    pub fn create_if_absent(&self, vault_id: &str, payload: &[u8]) -> Result<u64> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.dir.join(vault_id))
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        file.write_all(payload)?;
        file.flush()?;
        Ok(payload.len() as u64)
    }

    /// All entries of at least `min_length` bytes whose name looks like a
    /// vault id. Unreadable entries are skipped with a warning.
    pub fn entries(&self, min_length: u64) -> Result<Vec<(String, Vec<u8>)>> {
        let mut entries = Vec::new();
        for dir_entry in std::fs::read_dir(&self.dir)? {
            let dir_entry = match dir_entry {
                Ok(dir_entry) => dir_entry,
                Err(e) => {
                    warn!(dir = ?self.dir, error = %e, "unreadable directory entry skipped");
                    continue;
                }
            };
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if name.len() != 40 || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }
            match dir_entry.metadata() {
                Ok(metadata) if metadata.is_file() && metadata.len() >= min_length => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(entry = %name, error = %e, "entry metadata unreadable, skipped");
                    continue;
                }
            }
            match std::fs::read(dir_entry.path()) {
                Ok(bytes) => entries.push((name, bytes)),
                Err(e) => warn!(entry = %name, error = %e, "entry unreadable, skipped"),
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Total size of all entries in bytes.
    pub fn size_bytes(&self) -> Result<u64> {
        let mut total = 0;
        for dir_entry in std::fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            if let Ok(metadata) = dir_entry.metadata() {
                if metadata.is_file() {
                    total += metadata.len();
                }
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(seed: u8) -> String {
        histovault_core::sha1_hex(&seed.to_string())
    }

    #[test]
    fn test_create_lookup_miss() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::open(dir.path().join("scope"));
        assert!(!store.exists());

        store.create_if_absent(&id(1), b"payload").unwrap();
        assert!(store.exists());
        assert_eq!(store.lookup(&id(1)).unwrap().unwrap(), b"payload");
        assert_eq!(store.lookup(&id(2)).unwrap(), None);
    }

    #[test]
    fn test_idempotent_write() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::open(dir.path().join("scope"));
        assert!(store.create_if_absent(&id(1), b"first").unwrap() > 0);
        assert_eq!(store.create_if_absent(&id(1), b"second").unwrap(), 0);
        assert_eq!(store.lookup(&id(1)).unwrap().unwrap(), b"first");
    }

    #[test]
    fn test_entries_filter_noise() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::open(dir.path().join("scope"));
        store.create_if_absent(&id(1), b"a real vault payload").unwrap();
        store.create_if_absent(&id(2), b"x").unwrap();
        // Non-id noise in the scope directory.
        std::fs::write(store.path().join("README"), b"not a vault, but long enough").unwrap();

        let entries = store.entries(4).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, id(1));
    }
}
