//! Content fingerprinting.
//!
//! A file's identity is the BLAKE3 digest of its absolute path. Its
//! fingerprint is `(size, mtime, optional content hash)`. Size and mtime
//! come from one `stat`; the content hash is only computed on request.

use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::{Error, Result};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of the content hash step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashState {
    /// Hash was not requested.
    NotComputed,
    /// Hex digest of the content.
    Computed(String),
    /// Content could not be read; carries the reason.
    Unavailable(String),
}

impl HashState {
    /// The digest, if computed.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        match self {
            Self::Computed(digest) => Some(digest),
            Self::NotComputed | Self::Unavailable(_) => None,
        }
    }
}

/// Cheap identity-and-change summary of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub file_id: String,
    /// Absolute, lexically normalized path.
    pub path: PathBuf,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ns: i64,
    pub hash: HashState,
}

impl Fingerprint {
    /// Absolute path as stored in file records.
    #[must_use]
    pub fn path_string(&self) -> String {
        self.path.display().to_string()
    }

    /// Same file, same size and mtime.
    #[must_use]
    pub fn same_stat(&self, other: &Self) -> bool {
        self.file_id == other.file_id && self.size == other.size && self.mtime_ns == other.mtime_ns
    }
}

/// Resolve `path` against the current directory and normalize `.` and `..`
/// lexically. Symlinks are not followed.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Identifier for an absolute path: hex BLAKE3 of its UTF-8 bytes.
#[must_use]
pub fn file_id_for(absolute: &Path) -> String {
    blake3::hash(absolute.to_string_lossy().as_bytes())
        .to_hex()
        .to_string()
}

/// Resolve a path to `(absolute path, file_id)`.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined.
pub fn identify(path: &Path) -> Result<(PathBuf, String)> {
    let absolute = absolute_path(path)?;
    let file_id = file_id_for(&absolute);
    Ok((absolute, file_id))
}

/// Stream the file through BLAKE3.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

fn mtime_ns(metadata: &std::fs::Metadata) -> Result<i64> {
    let modified = metadata.modified()?;
    let nanos = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    };
    Ok(nanos)
}

/// Fingerprint a file.
///
/// A hash read failure is not an error: it yields
/// [`HashState::Unavailable`], which change detection treats as modified.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the path does not exist,
/// [`Error::NotAFile`] if it is not a regular file, and [`Error::Io`] if it
/// cannot be stat'ed.
pub fn fingerprint(path: &Path, include_hash: bool) -> Result<Fingerprint> {
    let (absolute, file_id) = identify(path)?;

    let metadata = match std::fs::metadata(&absolute) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(absolute.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    if !metadata.is_file() {
        return Err(Error::NotAFile(absolute.display().to_string()));
    }

    let hash = if include_hash {
        match hash_file(&absolute) {
            Ok(digest) => HashState::Computed(digest),
            Err(e) => {
                tracing::warn!(path = %absolute.display(), error = %e, "Failed to hash file");
                HashState::Unavailable(e.to_string())
            }
        }
    } else {
        HashState::NotComputed
    };

    Ok(Fingerprint {
        file_id,
        size: metadata.len(),
        mtime_ns: mtime_ns(&metadata)?,
        path: absolute,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_absolute_path_normalizes() {
        let p = absolute_path(Path::new("/docs/./a/../b.txt")).unwrap();
        assert_eq!(p, PathBuf::from("/docs/b.txt"));
    }

    #[test]
    fn test_relative_and_absolute_share_id() {
        let cwd = std::env::current_dir().unwrap();
        let (abs, id_rel) = identify(Path::new("some/file.txt")).unwrap();
        let (_, id_abs) = identify(&cwd.join("some").join("file.txt")).unwrap();

        assert!(abs.is_absolute());
        assert_eq!(id_rel, id_abs);
    }

    #[test]
    fn test_file_id_is_stable_hex() {
        let a = file_id_for(Path::new("/docs/a.txt"));
        let b = file_id_for(Path::new("/docs/a.txt"));
        let c = file_id_for(Path::new("/docs/b.txt"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_without_hash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "hello").unwrap();

        let fp = fingerprint(&path, false).unwrap();
        assert_eq!(fp.size, 5);
        assert!(fp.mtime_ns > 0);
        assert_eq!(fp.hash, HashState::NotComputed);
        assert_eq!(fp.file_id, file_id_for(&path));
    }

    #[test]
    fn test_fingerprint_with_hash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "hello").unwrap();

        let fp = fingerprint(&path, true).unwrap();
        let expected = blake3::hash(b"hello").to_hex().to_string();
        assert_eq!(fp.hash.digest(), Some(expected.as_str()));
    }

    #[test]
    fn test_hash_tracks_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");

        fs::write(&path, "abc").unwrap();
        let first = hash_file(&path).unwrap();
        fs::write(&path, "abd").unwrap();
        let second = hash_file(&path).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_fingerprint_missing() {
        let tmp = TempDir::new().unwrap();
        let err = fingerprint(&tmp.path().join("gone.txt"), true).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_fingerprint_directory() {
        let tmp = TempDir::new().unwrap();
        let err = fingerprint(tmp.path(), false).unwrap_err();
        assert!(matches!(err, Error::NotAFile(_)));
    }

    #[test]
    fn test_same_stat() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "hello").unwrap();

        let a = fingerprint(&path, false).unwrap();
        let b = fingerprint(&path, true).unwrap();
        assert!(a.same_stat(&b));
    }
}
