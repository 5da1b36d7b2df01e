use std::fs;
use std::io::Write;
use std::path::Path;

use blake3::Hasher as Blake3;

use crate::core::error::{PatchError, PatchResult};

/// Read a whole target file as UTF-8 text.
pub fn read_text(path: &Path) -> PatchResult<String> {
    fs::read_to_string(path).map_err(|e| PatchError::io(path, e))
}

/// Read a whole file as raw bytes.
pub fn read_bytes(path: &Path) -> PatchResult<Vec<u8>> {
    fs::read(path).map_err(|e| PatchError::io(path, e))
}

/// Digest bytes as `blake3:<hex>`.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Blake3::new();
    hasher.update(bytes);
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Atomic write: same-dir tempfile, fsync, rename over the destination.
///
/// Permissions of an existing destination are carried over to the new file.
pub fn write_atomic(path: &Path, data: &[u8]) -> PatchResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Preserve original permissions
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    // Same directory so the final rename never crosses filesystems
    let mut tmp = tempfile::Builder::new()
        .prefix(".panelpatch-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| PatchError::io(dir, e))?;

    tmp.as_file_mut()
        .write_all(data)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PatchError::io(tmp.path(), e))?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms).map_err(|e| PatchError::io(tmp.path(), e))?;
    }

    tmp.persist(path).map_err(|e| PatchError::io(path, e.error))?;

    // fsync parent dir to ensure durability on Unix
    #[cfg(unix)]
    {
        if let Ok(parent_file) = fs::File::open(dir) {
            let _ = parent_file.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_replaces_content_and_leaves_no_temp() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("Nodes.pm");
        fs::write(&target, "old\n").unwrap();

        write_atomic(&target, b"new\n").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new\n");
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("pvemanagerlib.js");
        fs::write(&target, "a").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o640)).unwrap();

        write_atomic(&target, b"b").unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(digest(b"abc"), digest(b"abc"));
        assert_ne!(digest(b"abc"), digest(b"abd"));
        assert!(digest(b"").starts_with("blake3:"));
    }
}
