use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Destination for encoded frames.
pub trait FrameStore: Send + Sync {
    /// Write `bytes` as `file_name`, replacing any existing file of that name.
    fn put_frame(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> impl Future<Output = io::Result<()>> + Send;

    /// Where frames end up, for status reporting.
    fn location(&self) -> &Path;
}

/// Frames written as plain files into one output directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the output directory if it does not exist.
    /// Returns `true` when it had to be created.
    pub async fn ensure_dir(&self) -> io::Result<bool> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => Ok(false),
            Ok(_) => Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", self.dir.display()),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.dir).await?;
                info!(path = %self.dir.display(), "created output directory");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// File names directly inside the output directory. Non-UTF-8 names are skipped.
    pub async fn list_names(&self) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        debug!(path = %self.dir.display(), entries = names.len(), "scanned output directory");
        Ok(names)
    }
}

impl FrameStore for DirStore {
    async fn put_frame(&self, file_name: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "wrote frame");
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.dir
    }
}
