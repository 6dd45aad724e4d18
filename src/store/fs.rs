// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::StoreError;
use crate::http::ByteStream;

use super::ObjectStore;

/// Object store backed by a local directory, one subdirectory per bucket
///
/// Objects are streamed to `<path>.partial` and renamed into place once
/// complete, so a reader never sees a half-written object.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `bucket/path` below the root, rejecting escapes
    pub fn object_file(&self, bucket: &str, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(bucket).join(path);
        let is_contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if bucket.is_empty() || path.is_empty() || !is_contained {
            return Err(StoreError::Io {
                path: relative,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "object path must stay inside the bucket",
                ),
            });
        }

        Ok(self.root.join(relative))
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Removes a `.partial` file on drop unless it was renamed into place
///
/// Covers the put future being dropped mid-transfer, e.g. by a timeout.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, bucket: &str, path: &str, mut body: ByteStream) -> Result<u64, StoreError> {
        let final_path = self.object_file(bucket, path)?;
        let partial = partial_path(&final_path);

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }

        let mut guard = PartialFile::new(partial.clone());
        let mut file = File::create(&partial).await.map_err(io_error(&partial))?;

        let mut bytes_written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(StoreError::Body)?;
            file.write_all(&chunk).await.map_err(io_error(&partial))?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error(&partial))?;
        drop(file);

        tokio::fs::rename(&partial, &final_path)
            .await
            .map_err(io_error(&final_path))?;
        guard.committed = true;

        Ok(bytes_written)
    }

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StoreError> {
        let file = self.object_file(bucket, path)?;
        tokio::fs::try_exists(&file).await.map_err(io_error(&file))
    }
}
