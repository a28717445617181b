//! Artifact storage layer
//!
//! Every live key owns exactly one file ("artifact") in the store
//! directory; the filename is a percent-escaped encoding of the key and the
//! contents are the codec's bytes, nothing else.
//!
//! Writes are atomic replaces: bytes land in a `.tmp` sibling first, get
//! synced, and are renamed over the final name. A crash mid-write leaves at
//! worst a stale temp file, which `open` sweeps; the artifact visible under
//! the final name is always either the old complete value or the new one.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{SatchelError, SatchelResult};
use crate::fsync::{sync_dir, sync_file};

/// Suffix for in-flight temp files. Escaped key names never contain `.`,
/// so a temp name can never collide with a live artifact.
const TMP_SUFFIX: &str = ".tmp";

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Escape a key into a filesystem-safe artifact name.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`. Deterministic and collision-free: `%` itself is always escaped,
/// so no two keys share a name.
fn escape_key(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(byte as char);
        } else {
            name.push('%');
            name.push(HEX_DIGITS[(byte >> 4) as usize] as char);
            name.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
        }
    }
    name
}

/// Reverse `escape_key`. Returns `None` for names this store never
/// produces (foreign files, lowercase hex, stray bytes), so enumeration
/// can skip them.
fn unescape_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            if i + 2 >= bytes.len() {
                return None;
            }
            let hi = hex_value(bytes[i + 1])?;
            let lo = hex_value(bytes[i + 2])?;
            out.push((hi << 4) | lo);
            i += 3;
        } else if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b);
            i += 1;
        } else {
            return None;
        }
    }

    String::from_utf8(out).ok()
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// One-file-per-key durable store.
///
/// Operations on different keys are independent; the engine serializes
/// operations on the same key through its I/O lock, so this layer never
/// sees two concurrent writes for one artifact.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open the store directory, creating it if needed and sweeping temp
    /// files left behind by an interrupted write.
    pub fn open<P: AsRef<Path>>(dir: P) -> SatchelResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| SatchelError::io(&dir, "failed to create store directory", e))?;

        let store = Self { dir };
        store.sweep_temps()?;
        Ok(store)
    }

    /// Path of the artifact for a key.
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        self.dir.join(escape_key(key))
    }

    /// Atomically replace the artifact for `key` with `bytes`.
    ///
    /// With `durable`, both the temp file and the directory entry are
    /// synced; without it the rename is still atomic but the OS page cache
    /// decides when bytes hit the media.
    pub fn write(&self, key: &str, bytes: &[u8], durable: bool) -> SatchelResult<()> {
        debug_assert!(!key.is_empty(), "engine validates keys before the store sees them");
        let name = escape_key(key);
        let final_path = self.dir.join(&name);
        let tmp_path = self.dir.join(format!("{}{}", name, TMP_SUFFIX));

        let mut tmp = File::create(&tmp_path)
            .map_err(|e| SatchelError::io(&tmp_path, "failed to create temp artifact", e))?;
        tmp.write_all(bytes)
            .map_err(|e| SatchelError::io(&tmp_path, "failed to write temp artifact", e))?;
        if durable {
            sync_file(&tmp)
                .map_err(|e| SatchelError::io(&tmp_path, "failed to sync temp artifact", e))?;
        }
        drop(tmp);

        fs::rename(&tmp_path, &final_path)
            .map_err(|e| SatchelError::io(&final_path, "failed to publish artifact", e))?;
        if durable {
            sync_dir(&self.dir)
                .map_err(|e| SatchelError::io(&self.dir, "failed to sync store directory", e))?;
        }
        Ok(())
    }

    /// Read the artifact for `key`. A missing artifact is `None`, not an
    /// error.
    pub fn read(&self, key: &str) -> SatchelResult<Option<Vec<u8>>> {
        debug_assert!(!key.is_empty(), "engine validates keys before the store sees them");
        let path = self.artifact_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SatchelError::io(&path, "failed to read artifact", e)),
        }
    }

    /// Whether an artifact exists for `key`.
    pub fn exists(&self, key: &str) -> bool {
        debug_assert!(!key.is_empty(), "engine validates keys before the store sees them");
        self.artifact_path(key).exists()
    }

    /// Delete the artifact for `key`. Idempotent: a missing artifact is
    /// success.
    pub fn delete(&self, key: &str) -> SatchelResult<()> {
        debug_assert!(!key.is_empty(), "engine validates keys before the store sees them");
        let path = self.artifact_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SatchelError::io(&path, "failed to delete artifact", e)),
        }
    }

    /// Enumerate every live key in the directory. Temp files and foreign
    /// names are skipped.
    pub fn list_keys(&self) -> SatchelResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| SatchelError::io(&self.dir, "failed to read store directory", e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| SatchelError::io(&self.dir, "failed to read directory entry", e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!("ignoring non-utf8 file in store directory");
                continue;
            };
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            match unescape_key(name) {
                Some(key) => keys.push(key),
                None => warn!("ignoring foreign file {:?} in store directory", name),
            }
        }
        Ok(keys)
    }

    /// Delete every artifact (and any temp files) in the directory.
    pub fn clear(&self) -> SatchelResult<()> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| SatchelError::io(&self.dir, "failed to read store directory", e))?;

        for entry in entries {
            let entry = entry
                .map_err(|e| SatchelError::io(&self.dir, "failed to read directory entry", e))?;
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {}
                // Lost a race with another delete; the artifact is gone either way
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SatchelError::io(&path, "failed to delete artifact", e)),
            }
        }
        Ok(())
    }

    /// Remove temp files left by a crash mid-write. The artifacts under
    /// their final names are intact; the temps are dead bytes.
    fn sweep_temps(&self) -> SatchelResult<()> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| SatchelError::io(&self.dir, "failed to read store directory", e))?;

        let mut swept = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TMP_SUFFIX));
            if is_temp && fs::remove_file(&path).is_ok() {
                swept += 1;
            }
        }
        if swept > 0 {
            warn!("swept {} stale temp file(s) from interrupted writes", swept);
        }
        Ok(())
    }
}
