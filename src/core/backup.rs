//! Verified snapshots of target files in a flat backup directory.
//!
//! Each snapshot is one file named `<modification>__<file name>__<timestamp>.bak`.
//! That naming convention is the only durable state: there is no manifest.
//! Copies are staged in a temp file inside the backup directory and only get
//! their final name after a byte-for-byte comparison with the source.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

use crate::core::error::{PatchError, PatchResult};
use crate::infra::io::{digest, read_bytes, write_atomic};

/// Extension of every snapshot file
pub const SNAPSHOT_EXT: &str = "bak";

const NAME_SEP: &str = "__";
const TS_WRITE: &str = "%Y%m%dT%H%M%S%.6fZ";
const TS_READ: &str = "%Y%m%dT%H%M%S%.fZ";

/// Default location under the operator's home
const DEFAULT_DIR: &str = "~/.panelpatch/backups";

/// Logical identity of a snapshot series
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotKey {
    pub modification: String,
    pub original_name: String,
}

/// A verified copy of one target file at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    /// Path of the copied file; only the file name is known for indexed snapshots
    pub source: PathBuf,
    pub location: PathBuf,
    pub key: SnapshotKey,
    pub created: DateTime<Utc>,
    pub checksum: String, // blake3:<hex>
}

/// Format a snapshot file name.
pub fn snapshot_file_name(key: &SnapshotKey, created: DateTime<Utc>) -> String {
    format!(
        "{}{NAME_SEP}{}{NAME_SEP}{}.{SNAPSHOT_EXT}",
        key.modification,
        key.original_name,
        created.format(TS_WRITE)
    )
}

/// Parse a snapshot file name back into its key and timestamp.
///
/// The modification name ends at the first separator and the timestamp starts
/// after the last one, so original file names may contain `__` themselves.
pub fn parse_snapshot_name(file_name: &str) -> Option<(SnapshotKey, DateTime<Utc>)> {
    let stem = file_name.strip_suffix(&format!(".{SNAPSHOT_EXT}"))?;
    let (rest, ts) = stem.rsplit_once(NAME_SEP)?;
    let (modification, original_name) = rest.split_once(NAME_SEP)?;
    if modification.is_empty() || original_name.is_empty() {
        return None;
    }
    let created = NaiveDateTime::parse_from_str(ts, TS_READ).ok()?.and_utc();
    Some((
        SnapshotKey {
            modification: modification.to_string(),
            original_name: original_name.to_string(),
        },
        created,
    ))
}

/// Snapshots grouped by (modification, file name), newest first.
///
/// Order: embedded timestamp descending, then full file name descending for
/// sub-second collisions. Directory listing order never matters.
#[derive(Debug, Default)]
pub struct SnapshotIndex {
    entries: BTreeMap<SnapshotKey, Vec<(DateTime<Utc>, String)>>,
}

impl SnapshotIndex {
    /// Index every well-formed snapshot name in `dir`; other files are ignored.
    pub fn scan(dir: &Path) -> PatchResult<Self> {
        let mut index = Self::default();
        let listing = fs::read_dir(dir).map_err(|e| PatchError::io(dir, e))?;
        for entry in listing {
            let entry = entry.map_err(|e| PatchError::io(dir, e))?;
            let name = entry.file_name();
            if let Some(name) = name.to_str() {
                index.insert(name);
            }
        }
        Ok(index)
    }

    /// Add one file name; returns false if it is not a snapshot name.
    pub fn insert(&mut self, file_name: &str) -> bool {
        let Some((key, created)) = parse_snapshot_name(file_name) else {
            return false;
        };
        let series = self.entries.entry(key).or_default();
        series.push((created, file_name.to_string()));
        series.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        true
    }

    /// Most recent snapshot file name for a key.
    pub fn latest(&self, key: &SnapshotKey) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|series| series.first())
            .map(|(_, name)| name.as_str())
    }

    /// All file names for a key, newest first.
    pub fn series(&self, key: &SnapshotKey) -> impl Iterator<Item = &str> {
        self.entries
            .get(key)
            .into_iter()
            .flatten()
            .map(|(_, name)| name.as_str())
    }
}

/// Manager of the backup directory
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Configured directory (must exist) or the home-derived default.
    pub fn resolve_directory(configured: Option<&Path>) -> PatchResult<PathBuf> {
        match configured {
            Some(path) => {
                let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
                if !expanded.is_dir() {
                    return Err(PatchError::Config(format!(
                        "backup directory {} does not exist",
                        expanded.display()
                    )));
                }
                Ok(expanded)
            }
            None => Ok(PathBuf::from(shellexpand::tilde(DEFAULT_DIR).into_owned())),
        }
    }

    /// Create the directory and its parents if absent.
    pub fn ensure_directory(path: &Path) -> PatchResult<()> {
        fs::create_dir_all(path).map_err(|e| PatchError::io(path, e))
    }

    /// Resolve, create and canonicalize the backup directory.
    pub fn open(configured: Option<&Path>) -> PatchResult<Self> {
        let dir = Self::resolve_directory(configured)?;
        Self::ensure_directory(&dir)?;
        let dir = dunce::canonicalize(&dir).map_err(|e| PatchError::io(&dir, e))?;
        debug!(dir = %dir.display(), "backup directory ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `target` into the store and verify the copy.
    pub fn snapshot(&self, modification: &str, target: &Path) -> PatchResult<FileSnapshot> {
        self.snapshot_with(modification, target, |bytes, out| out.write_all(bytes))
    }

    /// Snapshot with an injectable copy step.
    #[instrument(skip(self, target, copy), fields(target = %target.display()))]
    pub(crate) fn snapshot_with<F>(
        &self,
        modification: &str,
        target: &Path,
        copy: F,
    ) -> PatchResult<FileSnapshot>
    where
        F: FnOnce(&[u8], &mut File) -> io::Result<()>,
    {
        let original = read_bytes(target)?;
        let original_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PatchError::io(
                    target,
                    io::Error::new(io::ErrorKind::InvalidInput, "target has no UTF-8 file name"),
                )
            })?
            .to_string();
        let key = SnapshotKey {
            modification: modification.to_string(),
            original_name,
        };

        // Stage next to the final location
        let mut staged = tempfile::Builder::new()
            .prefix(".snapshot-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| PatchError::io(&self.dir, e))?;
        // Copy or sync failures count as a failed backup
        if let Err(e) = copy(&original, staged.as_file_mut()).and_then(|_| staged.as_file().sync_all()) {
            debug!(error = %e, "snapshot copy failed");
            return Err(PatchError::BackupVerification {
                original: target.to_path_buf(),
                backup: staged.path().to_path_buf(),
            });
        }

        // Immediate post-copy comparison
        let copied = read_bytes(staged.path())?;
        if copied != original {
            return Err(PatchError::BackupVerification {
                original: target.to_path_buf(),
                backup: staged.path().to_path_buf(),
            });
        }

        let (created, location) = self.free_slot(&key);
        staged
            .persist_noclobber(&location)
            .map_err(|e| PatchError::io(&location, e.error))?;

        let snapshot = FileSnapshot {
            source: target.to_path_buf(),
            location,
            key,
            created,
            checksum: digest(&copied),
        };
        debug!(location = %snapshot.location.display(), checksum = %snapshot.checksum, "snapshot created");
        Ok(snapshot)
    }

    /// Current time, nudged forward until the file name is unused.
    fn free_slot(&self, key: &SnapshotKey) -> (DateTime<Utc>, PathBuf) {
        let mut created = Utc::now();
        loop {
            let location = self.dir.join(snapshot_file_name(key, created));
            if !location.exists() {
                return (created, location);
            }
            created += Duration::microseconds(1);
        }
    }

    /// Most recent snapshot of `original_name` taken for `modification`.
    ///
    /// No checksum is stored on disk, so `checksum` is the digest of the bytes
    /// read here. A later [`Self::restore`] only proves the file did not change
    /// between that read and its own.
    pub fn latest_snapshot(
        &self,
        modification: &str,
        original_name: &str,
    ) -> PatchResult<Option<FileSnapshot>> {
        let key = SnapshotKey {
            modification: modification.to_string(),
            original_name: original_name.to_string(),
        };
        let index = SnapshotIndex::scan(&self.dir)?;
        let Some(name) = index.latest(&key) else {
            return Ok(None);
        };

        let location = self.dir.join(name);
        let bytes = read_bytes(&location)?;
        let created = parse_snapshot_name(name).map(|(_, ts)| ts).unwrap_or_default();
        Ok(Some(FileSnapshot {
            source: PathBuf::from(original_name),
            location,
            key,
            created,
            checksum: digest(&bytes),
        }))
    }

    /// Latest snapshot for a live target path.
    pub fn latest_for(&self, modification: &str, target: &Path) -> PatchResult<Option<FileSnapshot>> {
        let Some(name) = target.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        Ok(self.latest_snapshot(modification, name)?.map(|mut s| {
            s.source = target.to_path_buf();
            s
        }))
    }

    /// Copy a snapshot back over `target` and verify the result.
    ///
    /// The snapshot bytes must still match `snapshot.checksum`. That catches
    /// tampering for snapshots taken in this run; for indexed snapshots it is a
    /// re-read consistency check.
    #[instrument(skip(self, snapshot), fields(snapshot = %snapshot.location.display()))]
    pub fn restore(&self, snapshot: &FileSnapshot, target: &Path) -> PatchResult<()> {
        let bytes = read_bytes(&snapshot.location)?;
        if digest(&bytes) != snapshot.checksum {
            return Err(PatchError::BackupVerification {
                original: target.to_path_buf(),
                backup: snapshot.location.clone(),
            });
        }

        write_atomic(target, &bytes)?;

        if read_bytes(target)? != bytes {
            return Err(PatchError::BackupVerification {
                original: target.to_path_buf(),
                backup: snapshot.location.clone(),
            });
        }
        debug!(target = %target.display(), "snapshot restored");
        Ok(())
    }
}
