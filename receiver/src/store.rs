use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "image";
const FILE_EXTENSION: &str = "jpg";

/// Name of the stored file for a given sequence index, e.g. `image0007.jpg`.
pub fn file_name_for(index: u32) -> String {
    format!("{FILE_PREFIX}{index:04}.{FILE_EXTENSION}")
}

/// Flat-folder image store that hands out `image0001.jpg`, `image0002.jpg`, ...
///
/// The next candidate index lives in memory, seeded once from the folder
/// contents. Allocation happens under a lock and claims the name with an
/// exclusive create, so an existing file is never overwritten even when
/// uploads race or something else writes into the folder.
pub struct ImageStore {
    folder: PathBuf,
    next: Mutex<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create folder {0}: {1}")]
    CreateFolder(String, std::io::Error),
    #[error("failed to scan folder {0}: {1}")]
    ScanFolder(String, std::io::Error),
    #[error("failed to create {0}: {1}")]
    Create(String, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(String, std::io::Error),
}

impl ImageStore {
    /// Create the folder if needed and find the first free index.
    pub async fn open(folder: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let folder = folder.into();
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|e| StoreError::CreateFolder(folder.display().to_string(), e))?;

        let next = first_free_index(&folder, 1).await?;
        info!(
            folder = folder.display().to_string(),
            next = file_name_for(next),
            "image store ready"
        );

        Ok(Self {
            folder,
            next: Mutex::new(next),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Persist `data` under the next free sequential name and return its path.
    pub async fn save(&self, data: &[u8]) -> Result<PathBuf, StoreError> {
        let (index, path, file) = self.claim_next().await?;
        self.fill(index, path, file, data).await
    }

    /// Write the payload into a claimed file. On failure the file is removed
    /// and its index handed back so the gap gets reused.
    async fn fill<W: AsyncWrite + Unpin>(
        &self,
        index: u32,
        path: PathBuf,
        mut file: W,
        data: &[u8],
    ) -> Result<PathBuf, StoreError> {
        let written = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                warn!(path = path.display().to_string(), error = %rm, "failed to remove partial file");
            }
            self.release(index).await;
            return Err(StoreError::Write(path.display().to_string(), e));
        }

        info!(path = path.display().to_string(), bytes = data.len(), "file saved");
        Ok(path)
    }

    async fn release(&self, index: u32) {
        let mut next = self.next.lock().await;
        if index < *next {
            *next = index;
        }
    }

    /// Reserve a name by creating it exclusively. Holds the counter lock only
    /// while searching for a free name, not for the payload write.
    async fn claim_next(&self) -> Result<(u32, PathBuf, tokio::fs::File), StoreError> {
        let mut next = self.next.lock().await;
        loop {
            let path = self.folder.join(file_name_for(*next));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    let index = *next;
                    *next += 1;
                    return Ok((index, path, file));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = path.display().to_string(), "name taken, trying next");
                    *next += 1;
                }
                Err(e) => return Err(StoreError::Create(path.display().to_string(), e)),
            }
        }
    }
}

/// Smallest index `>= start` whose file does not exist yet.
async fn first_free_index(folder: &Path, start: u32) -> Result<u32, StoreError> {
    let mut index = start;
    loop {
        let path = folder.join(file_name_for(index));
        match tokio::fs::try_exists(&path).await {
            Ok(false) => return Ok(index),
            Ok(true) => index += 1,
            Err(e) => return Err(StoreError::ScanFolder(folder.display().to_string(), e)),
        }
    }
}
