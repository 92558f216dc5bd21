use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncReadExt;

const READ_CHUNK: usize = 64 * 1024;

/// SHA-256 digest over a file's full content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Stream a file through SHA-256.
///
/// Returns `Ok(None)` for a zero-byte file, which is treated as not yet written.
pub async fn fingerprint_file(path: &Path) -> io::Result<Option<Fingerprint>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total: u64 = 0;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n as u64;
        hasher.update(&buf[..n]);
    }

    if total == 0 {
        return Ok(None);
    }
    Ok(Some(Fingerprint(hasher.finalize().into())))
}

/// Last known state of one watched file.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    pub fingerprint: Fingerprint,
    pub last_event: SystemTime,
}

/// Fingerprints of every file seen since startup, keyed by absolute path.
///
/// Entries are never evicted; the table is bounded by the size of the source tree.
#[derive(Debug, Default)]
pub struct FingerprintTable {
    files: HashMap<PathBuf, WatchedFile>,
}

impl FingerprintTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh fingerprint for `path`.
    ///
    /// Returns `true` when the path was unknown or its fingerprint differs from
    /// the immediately preceding one.
    pub fn record(&mut self, path: &Path, fingerprint: Fingerprint, at: SystemTime) -> bool {
        match self.files.get_mut(path) {
            Some(entry) if entry.fingerprint == fingerprint => false,
            Some(entry) => {
                entry.fingerprint = fingerprint;
                entry.last_event = at;
                true
            }
            None => {
                self.files.insert(
                    path.to_path_buf(),
                    WatchedFile {
                        fingerprint,
                        last_event: at,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<&WatchedFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
