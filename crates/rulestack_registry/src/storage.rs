//! Content-addressed blob storage.
//!
//! Uploaded archives stream to disk through a SHA-256 tee, so the hash is
//! known the moment the upload completes without a second pass over the
//! file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

/// Filesystem-safe blob file stem: strip `@`, map `/` to `-`.
///
/// Scoped names are rejected before they reach the service, so this is
/// usually a no-op; it stays as a guard for the storage layer.
pub fn safe_name(name: &str) -> String {
    name.replace('@', "").replace('/', "-")
}

/// An upload being streamed to a temporary file.
pub struct IncomingBlob {
    temp_path: PathBuf,
    file: tokio::fs::File,
    hasher: Sha256,
    size: u64,
}

/// A fully received upload, not yet at its final path.
pub struct ReceivedBlob {
    pub temp_path: PathBuf,
    pub sha256: String,
    pub size: u64,
}

impl IncomingBlob {
    pub async fn create(dir: &Path) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("cannot create storage dir {}", dir.display()))?;
        let temp_path = dir.join(format!(".upload-{}", hex::encode(rand::random::<[u8; 8]>())));
        let file = tokio::fs::File::create(&temp_path)
            .await
            .with_context(|| format!("cannot create {}", temp_path.display()))?;
        Ok(Self {
            temp_path,
            file,
            hasher: Sha256::new(),
            size: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
        self.file.write_all(chunk).await?;
        Ok(())
    }

    pub async fn complete(mut self) -> anyhow::Result<ReceivedBlob> {
        self.file.flush().await?;
        drop(self.file);
        Ok(ReceivedBlob {
            temp_path: self.temp_path,
            sha256: hex::encode(self.hasher.finalize()),
            size: self.size,
        })
    }
}

impl ReceivedBlob {
    /// Move the upload to its final path.
    pub async fn persist(self, final_path: &Path) -> anyhow::Result<()> {
        tokio::fs::rename(&self.temp_path, final_path)
            .await
            .with_context(|| format!("cannot move upload to {}", final_path.display()))?;
        Ok(())
    }

    pub async fn discard(self) {
        let _ = tokio::fs::remove_file(&self.temp_path).await;
    }
}
