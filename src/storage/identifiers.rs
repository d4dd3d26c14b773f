//! Identifier map: server-assigned ids to stored file names.
//!
//! The map is held in memory and written as a single snapshot. The
//! snapshot is bincode followed by a big-endian CRC32 of the encoded
//! bytes; anything that fails to decode is treated as absent.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::utils::crc::{crc32, verify_crc32};

const SNAPSHOT_VERSION: u16 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("snapshot checksum mismatch")]
    Checksum,
    #[error("snapshot too short: {0} bytes")]
    Truncated(usize),
    #[error("unsupported snapshot version {0}")]
    Version(u16),
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u16,
    entries: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdentifierStore {
    entries: HashMap<String, String>,
    /// Highest id handed out by this process.
    last_issued: u64,
}

impl IdentifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, file_name: impl Into<String>) {
        self.entries.insert(id.into(), file_name.into());
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    /// Linear scan; the first hit wins when several ids share a name.
    pub fn lookup_by_name(&self, file_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, name)| name.as_str() == file_name)
            .map(|(id, _)| id.as_str())
    }

    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.entries.remove(id)
    }

    /// Drops every id mapped to `file_name`, returning them sorted.
    pub fn remove_name(&mut self, file_name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|id, name| {
            if name.as_str() == file_name {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        removed.sort();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(id, name)| (id.as_str(), name.as_str()))
    }

    /// Millisecond timestamp as a decimal string, bumped past anything
    /// already issued or stored.
    pub fn allocate_id(&mut self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.allocate_id_at(now)
    }

    fn allocate_id_at(&mut self, now: u64) -> String {
        let mut candidate = now.max(self.last_issued.saturating_add(1));
        while self.entries.contains_key(&candidate.to_string()) {
            candidate += 1;
        }
        self.last_issued = candidate;
        candidate.to_string()
    }

    /// Missing or unreadable snapshots yield an empty store.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(store)) => {
                info!("Loaded {} identifiers from {:?}", store.len(), path);
                store
            }
            Ok(None) => {
                info!("No identifier map at {:?}, starting empty", path);
                Self::new()
            }
            Err(e) => {
                warn!("Identifier map at {:?} is unusable ({}), starting empty", path, e);
                Self::new()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Option<Self>, PersistenceError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() < 4 {
            return Err(PersistenceError::Truncated(bytes.len()));
        }
        let (body, tail) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
        if !verify_crc32(body, expected) {
            return Err(PersistenceError::Checksum);
        }

        let snapshot: Snapshot = bincode::deserialize(body)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::Version(snapshot.version));
        }

        Ok(Some(Self {
            entries: snapshot.entries,
            last_issued: 0,
        }))
    }

    /// Writes beside the target and renames over it.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: self.entries.clone(),
        };
        let mut bytes = bincode::serialize(&snapshot)?;
        let checksum = crc32(&bytes);
        bytes.extend_from_slice(&checksum.to_be_bytes());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = temp_path(path);
        let mut file = fs::File::create(&temp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, path)?;

        debug!("Saved {} identifiers to {:?}", self.len(), path);
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
