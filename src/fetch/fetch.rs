// SPDX-License-Identifier: GPL-2.0-or-later

//! C1 FileSource: fetches a segment file's bytes from a remote URL or the
//! local filesystem, with an optional content-addressed on-disk cache and
//! bounded retries.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shared cancellation flag. Cloning shares the same underlying bool, so a
/// controller can flip one copy to interrupt every in-flight fetch.
#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub local_cache: bool,
    pub chunk_size: usize,
    pub retries: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            local_cache: true,
            chunk_size: 1 << 20,
            retries: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("exhausted {0} retries fetching {1}")]
    NetworkError(u32, String),

    #[error("cache write {0}: {1}")]
    IOError(PathBuf, std::io::Error),

    #[error("fetch of {0} cancelled")]
    Cancelled(String),
}

impl common::Classify for FetchError {
    fn kind(&self) -> common::ErrorKind {
        match self {
            FetchError::NetworkError(..) => common::ErrorKind::NetworkError,
            FetchError::IOError(..) => common::ErrorKind::IOError,
            FetchError::Cancelled(_) => common::ErrorKind::Cancelled,
        }
    }
}

/// Fetches byte blobs identified by a URL or local path, with an optional
/// content-addressed disk cache under `cache_dir`.
pub struct FileSource {
    cache_dir: Option<PathBuf>,
}

impl FileSource {
    #[must_use]
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }

    /// Fetches `url`'s bytes. Returns the full blob, or a `Cancelled` error
    /// if `abort` was observed set before completion. Local paths (anything
    /// that is not `http://` or `https://`) are read directly, never
    /// retried, never cached.
    pub async fn fetch(
        &self,
        url: &str,
        opts: &FetchOptions,
        abort: &AbortFlag,
    ) -> Result<Bytes, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return self.read_local(Path::new(url)).await;
        }

        if opts.local_cache {
            if let Some(cached) = self.read_cache(url).await {
                return Ok(cached);
            }
        }

        let data = self.fetch_remote(url, opts, abort).await?;

        if opts.local_cache {
            self.write_cache(url, &data).await?;
        }

        Ok(data)
    }

    async fn read_local(&self, path: &Path) -> Result<Bytes, FetchError> {
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| FetchError::IOError(path.to_path_buf(), e))
    }

    fn cache_path(&self, url: &str) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let key = hex::encode(hasher.finalize());
        Some(dir.join(key))
    }

    async fn read_cache(&self, url: &str) -> Option<Bytes> {
        let path = self.cache_path(url)?;
        tokio::fs::read(path).await.ok().map(Bytes::from)
    }

    async fn write_cache(&self, url: &str, data: &Bytes) -> Result<(), FetchError> {
        let Some(path) = self.cache_path(url) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::IOError(parent.to_path_buf(), e))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| FetchError::IOError(path, e))
    }

    async fn fetch_remote(
        &self,
        url: &str,
        opts: &FetchOptions,
        abort: &AbortFlag,
    ) -> Result<Bytes, FetchError> {
        let url = url.to_owned();
        let chunk_size = opts.chunk_size;
        let retries = opts.retries;
        let abort = abort.clone();

        tokio::task::spawn_blocking(move || fetch_blocking(&url, chunk_size, retries, &abort))
            .await
            .expect("blocking fetch task should not panic")
    }
}

fn fetch_blocking(
    url: &str,
    chunk_size: usize,
    retries: u32,
    abort: &AbortFlag,
) -> Result<Bytes, FetchError> {
    for attempt in 0..=retries {
        if abort.is_set() {
            return Err(FetchError::Cancelled(url.to_owned()));
        }

        match try_fetch_once(url, chunk_size, abort) {
            Ok(data) => return Ok(data),
            Err(TryFetchError::Cancelled) => return Err(FetchError::Cancelled(url.to_owned())),
            Err(TryFetchError::Transient) => {
                if attempt < retries {
                    std::thread::sleep(backoff(attempt));
                }
            }
        }
    }
    Err(FetchError::NetworkError(retries, url.to_owned()))
}

enum TryFetchError {
    Transient,
    Cancelled,
}

fn try_fetch_once(url: &str, chunk_size: usize, abort: &AbortFlag) -> Result<Bytes, TryFetchError> {
    let response = ureq::get(url)
        .call()
        .map_err(|_| TryFetchError::Transient)?;

    let mut buf = Vec::new();
    let mut reader = response.into_reader();
    let mut chunk = vec![0u8; chunk_size.max(4096)];
    loop {
        if abort.is_set() {
            return Err(TryFetchError::Cancelled);
        }
        let n = reader.read(&mut chunk).map_err(|_| TryFetchError::Transient)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(Bytes::from(buf))
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(100u64.saturating_mul(1 << attempt.min(5)))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let mut s = String::with_capacity(bytes.as_ref().len() * 2);
        for b in bytes.as_ref() {
            let _ = write!(s, "{b:02x}");
        }
        s
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn reads_local_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob.bin");
        tokio::fs::write(&path, b"hello").await.expect("write");

        let source = FileSource::new(None);
        let got = source
            .fetch(
                path.to_str().expect("utf8 path"),
                &FetchOptions::default(),
                &AbortFlag::new(),
            )
            .await
            .expect("fetch should succeed");

        assert_eq!(got.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn missing_local_file_is_io_error() {
        let source = FileSource::new(None);
        let err = source
            .fetch("/nonexistent/path", &FetchOptions::default(), &AbortFlag::new())
            .await
            .expect_err("should fail");
        assert!(matches!(err, FetchError::IOError(..)));
    }

    #[tokio::test]
    async fn cache_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = FileSource::new(Some(dir.path().to_path_buf()));

        source
            .write_cache("https://example.com/a", &Bytes::from_static(b"x"))
            .await
            .expect("write cache");

        let got = source
            .read_cache("https://example.com/a")
            .await
            .expect("cache hit");
        assert_eq!(got.as_ref(), b"x");

        assert!(source.read_cache("https://example.com/b").await.is_none());
    }

    #[tokio::test]
    async fn abort_flag_is_observed_before_any_attempt() {
        let flag = AbortFlag::new();
        flag.set();
        let err = fetch_blocking("https://example.com/unreachable", 4096, 3, &flag)
            .expect_err("should be cancelled");
        assert!(matches!(err, FetchError::Cancelled(_)));
    }
}
