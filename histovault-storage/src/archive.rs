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

//! Single-file vault archive.
//!
//! One archive per cache scope, optimized for write-once, read-many
//! workloads:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        File Header (64 bytes)       │  Magic, version, checksum
//! ├─────────────────────────────────────┤
//! │  Entry: magic, id, len, checksum,   │  Content-addressed by vault id,
//! │         payload                     │  never overwritten
//! ├─────────────────────────────────────┤
//! │  Entry ...                          │  Appended in arrival order
//! └─────────────────────────────────────┘
//! ```
//!
//! The entry index is rebuilt by a sequential scan on open; appends keep it
//! current. An entry with a failing payload checksum is skipped entry-wise,
//! a broken entry header ends the scan as a truncated tail; both are
//! logged, neither aborts the caller.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use histovault_core::{Result, VaultError};

/// Archive file magic: "HVARCH1\0".
pub const ARCHIVE_MAGIC: &[u8; 8] = b"HVARCH1\0";

/// Archive format version.
pub const ARCHIVE_VERSION: u32 = 1;

/// Entry magic: "HVE\0".
const ENTRY_MAGIC: &[u8; 4] = b"HVE\0";

/// Header size in bytes.
const HEADER_LEN: u64 = 64;

/// Entry header: magic + 40-byte hex id + payload length + payload checksum.
const ENTRY_HEADER_LEN: u64 = 4 + 40 + 4 + 8;

/// Location of one entry's payload within the archive file.
#[derive(Debug, Clone, Copy)]
struct EntryLocation {
    payload_offset: u64,
    payload_length: u32,
}

/// Append-only archive of vault entries, content-addressed by vault id.
#[derive(Debug)]
pub struct ArchiveStore {
    path: PathBuf,
    index: BTreeMap<String, EntryLocation>,
    /// Offset at which the next entry is appended.
    end_offset: u64,
}

impl ArchiveStore {
    /// Open an archive, rebuilding the entry index by a sequential scan.
    ///
    /// A missing file is an empty archive; the file is created on the
    /// first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self {
            path,
            index: BTreeMap::new(),
            end_offset: HEADER_LEN,
        };
        if store.path.is_file() {
            store.scan_index()?;
        }
        Ok(store)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of indexed entries.
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn size_bytes(&self) -> u64 {
        self.end_offset
    }

    pub fn contains(&self, vault_id: &str) -> bool {
        self.index.contains_key(vault_id)
    }

    /// Payload bytes for `vault_id`, or `None` on a miss.
    pub fn lookup(&self, vault_id: &str) -> Result<Option<Vec<u8>>> {
        let location = match self.index.get(vault_id) {
            Some(location) => *location,
            None => return Ok(None),
        };
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(location.payload_offset))?;
        let mut payload = vec![0u8; location.payload_length as usize];
        file.read_exact(&mut payload)?;
        Ok(Some(payload))
    }

    /// Append an entry unless the id already exists.
    ///
    /// Entries are never overwritten; a create that finds an existing entry
    /// is a no-op. Returns the number of bytes written.
    pub fn create_if_absent(&mut self, vault_id: &str, payload: &[u8]) -> Result<u64> {
        if self.index.contains_key(vault_id) {
            return Ok(0);
        }
        if vault_id.len() != 40 || !vault_id.is_ascii() {
            return Err(VaultError::InvalidArgument(format!(
                "vault id is not a 40-character digest: {vault_id}"
            )));
        }

        let created = !self.path.is_file();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)?;
        if created {
            file.write_all(&header_bytes())?;
        } else {
            // A damaged tail found during the index scan is dropped here;
            // everything up to end_offset is intact entries.
            file.set_len(self.end_offset)?;
            file.seek(SeekFrom::Start(self.end_offset))?;
        }

        let checksum = payload_checksum(payload);
        file.write_all(ENTRY_MAGIC)?;
        file.write_all(vault_id.as_bytes())?;
        file.write_all(&(payload.len() as u32).to_le_bytes())?;
        file.write_all(&checksum.to_le_bytes())?;
        file.write_all(payload)?;
        file.flush()?;

        self.index.insert(
            vault_id.to_string(),
            EntryLocation {
                payload_offset: self.end_offset + ENTRY_HEADER_LEN,
                payload_length: payload.len() as u32,
            },
        );
        let written = ENTRY_HEADER_LEN + payload.len() as u64;
        self.end_offset += written;
        Ok(written + if created { HEADER_LEN } else { 0 })
    }

    /// All entries with a payload of at least `min_length` bytes, skipping
    /// entries whose payload checksum does not verify.
    pub fn entries(&self, min_length: u64) -> Result<Vec<(String, Vec<u8>)>> {
        let mut file = File::open(&self.path)?;
        let mut entries = Vec::with_capacity(self.index.len());
        for (vault_id, location) in &self.index {
            if (location.payload_length as u64) < min_length {
                continue;
            }
            file.seek(SeekFrom::Start(location.payload_offset))?;
            let mut payload = vec![0u8; location.payload_length as usize];
            file.read_exact(&mut payload)?;
            entries.push((vault_id.clone(), payload));
        }
        Ok(entries)
    }

    /// Sequential scan rebuilding the index, tolerating damaged entries.
    fn scan_index(&mut self) -> Result<()> {
        let file = File::open(&self.path)?;
        let file_length = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER_LEN as usize];
        reader.read_exact(&mut header).map_err(|_| {
            VaultError::Corruption(format!("archive shorter than its header: {:?}", self.path))
        })?;
        if &header[0..8] != ARCHIVE_MAGIC {
            return Err(VaultError::Corruption(format!(
                "invalid archive magic in {:?}",
                self.path
            )));
        }
        let version = u32::from_le_bytes(header[8..12].try_into().unwrap());
        if version != ARCHIVE_VERSION {
            return Err(VaultError::Corruption(format!(
                "unsupported archive version {version} in {:?}",
                self.path
            )));
        }

        let mut offset = HEADER_LEN;
        while offset + ENTRY_HEADER_LEN <= file_length {
            let mut entry_header = [0u8; ENTRY_HEADER_LEN as usize];
            reader.seek(SeekFrom::Start(offset))?;
            reader.read_exact(&mut entry_header)?;

            if &entry_header[0..4] != ENTRY_MAGIC {
                warn!(path = ?self.path, offset, "broken entry header, treating as truncated tail");
                break;
            }
            let vault_id = match std::str::from_utf8(&entry_header[4..44]) {
                Ok(id) => id.to_string(),
                Err(_) => {
                    warn!(path = ?self.path, offset, "undecodable entry id, treating as truncated tail");
                    break;
                }
            };
            let payload_length =
                u32::from_le_bytes(entry_header[44..48].try_into().unwrap());
            let checksum = u64::from_le_bytes(entry_header[48..56].try_into().unwrap());

            let payload_offset = offset + ENTRY_HEADER_LEN;
            let next_offset = payload_offset + payload_length as u64;
            if next_offset > file_length {
                warn!(path = ?self.path, offset, "entry payload beyond end of file, treating as truncated tail");
                break;
            }

            let mut payload = vec![0u8; payload_length as usize];
            reader.read_exact(&mut payload)?;
            if payload_checksum(&payload) != checksum {
                warn!(path = ?self.path, vault_id = %vault_id, "entry checksum mismatch, skipping entry");
            } else {
                self.index.entry(vault_id).or_insert(EntryLocation {
                    payload_offset,
                    payload_length,
                });
            }
            offset = next_offset;
        }
        self.end_offset = offset;
        Ok(())
    }
}

fn header_bytes() -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[0..8].copy_from_slice(ARCHIVE_MAGIC);
    header[8..12].copy_from_slice(&ARCHIVE_VERSION.to_le_bytes());
    let checksum = blake3::hash(&header[0..56]);
    header[56..64].copy_from_slice(&checksum.as_bytes()[0..8]);
    header
}

fn payload_checksum(payload: &[u8]) -> u64 {
    let hash = blake3::hash(payload);
    u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(seed: u8) -> String {
        histovault_core::sha1_hex(&seed.to_string())
    }

    #[test]
    fn test_create_and_lookup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vaults.arc");
        let mut store = ArchiveStore::open(&path).unwrap();
        assert!(!store.exists());

        let written = store.create_if_absent(&id(1), b"payload one").unwrap();
        assert!(written > 0);
        assert!(store.exists());
        assert_eq!(store.lookup(&id(1)).unwrap().unwrap(), b"payload one");
        assert_eq!(store.lookup(&id(2)).unwrap(), None);
    }

    #[test]
    fn test_idempotent_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vaults.arc");
        let mut store = ArchiveStore::open(&path).unwrap();
        store.create_if_absent(&id(1), b"first").unwrap();
        let size = std::fs::metadata(&path).unwrap().len();

        assert_eq!(store.create_if_absent(&id(1), b"second").unwrap(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
        assert_eq!(store.lookup(&id(1)).unwrap().unwrap(), b"first");
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn test_reopen_rebuilds_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vaults.arc");
        {
            let mut store = ArchiveStore::open(&path).unwrap();
            store.create_if_absent(&id(1), b"one").unwrap();
            store.create_if_absent(&id(2), b"two").unwrap();
        }
        let store = ArchiveStore::open(&path).unwrap();
        assert_eq!(store.entry_count(), 2);
        assert_eq!(store.lookup(&id(2)).unwrap().unwrap(), b"two");
    }

    #[test]
    fn test_min_length_filter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vaults.arc");
        let mut store = ArchiveStore::open(&path).unwrap();
        store.create_if_absent(&id(1), b"x").unwrap();
        store.create_if_absent(&id(2), b"a longer payload").unwrap();

        let entries = store.entries(4).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, id(2));
    }

    #[test]
    fn test_corrupt_entry_skipped_on_scan() {
        use parking_lot::Mutex;
        use std::sync::Arc;

        #[derive(Clone)]
        struct SharedWriter(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for SharedWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("vaults.arc");
        {
            let mut store = ArchiveStore::open(&path).unwrap();
            store.create_if_absent(&id(1), b"payload one!").unwrap();
            store.create_if_absent(&id(2), b"payload two!").unwrap();
            store.create_if_absent(&id(3), b"payload three").unwrap();
        }

        // Flip a byte inside the second entry's payload.
        let mut bytes = std::fs::read(&path).unwrap();
        let second_payload = HEADER_LEN + 2 * ENTRY_HEADER_LEN + b"payload one!".len() as u64 + 2;
        bytes[second_payload as usize] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let writer = SharedWriter(Arc::clone(&log));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let store = tracing::subscriber::with_default(subscriber, || {
            ArchiveStore::open(&path).unwrap()
        });
        assert_eq!(store.entry_count(), 2);
        assert!(store.contains(&id(1)));
        assert!(!store.contains(&id(2)));
        assert!(store.contains(&id(3)));

        // The skip is logged, the scan is not aborted.
        let logged = String::from_utf8(log.lock().clone()).unwrap();
        assert!(logged.contains("checksum mismatch"));
    }

    #[test]
    fn test_truncated_tail_keeps_leading_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vaults.arc");
        {
            let mut store = ArchiveStore::open(&path).unwrap();
            store.create_if_absent(&id(1), b"payload one!").unwrap();
            store.create_if_absent(&id(2), b"payload two!").unwrap();
        }
        let full = std::fs::read(&path).unwrap();
        std::fs::write(&path, &full[..full.len() - 5]).unwrap();

        let store = ArchiveStore::open(&path).unwrap();
        assert!(store.contains(&id(1)));
        assert!(!store.contains(&id(2)));
    }

    #[test]
    fn test_invalid_magic_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vaults.arc");
        std::fs::write(&path, vec![0u8; 128]).unwrap();
        assert!(matches!(
            ArchiveStore::open(&path),
            Err(VaultError::Corruption(_))
        ));
    }
}
