//! Streamed file download
//!
//! Downloads share the engine's permit pool with `get`. The destination
//! file is opened before a permit is requested, so a download that can't
//! write never occupies a connection slot.

use crate::network::engine::{build_header_map, AttemptFailure, HttpEngine};
use crate::network::FetchError;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Maximum number of bytes written to disk per write call
pub const DOWNLOAD_BUFFER_SIZE: usize = 8196;

/// Everything needed to download one URL into one file
#[derive(Debug, Clone, Default)]
pub struct DownloadInfo {
    /// The URL to download
    pub url: String,

    /// Destination directory, created with parents when missing
    pub file_path: PathBuf,

    /// File name inside `file_path`
    pub file_name: String,

    /// Optional request headers
    pub headers: Option<HashMap<String, String>>,

    /// Overwrite an existing file instead of failing with `AlreadyExists`
    pub download_when_exists: bool,
}

impl DownloadInfo {
    /// Creates download info that refuses to overwrite existing files
    pub fn new(
        url: impl Into<String>,
        file_path: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            file_path: file_path.into(),
            file_name: file_name.into(),
            headers: None,
            download_when_exists: false,
        }
    }

    /// Sets whether an existing destination file is truncated and rewritten
    pub fn overwrite(mut self, download_when_exists: bool) -> Self {
        self.download_when_exists = download_when_exists;
        self
    }

    /// Adds a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Full path of the destination file
    pub fn full_path(&self) -> PathBuf {
        self.file_path.join(&self.file_name)
    }

    fn validate(&self) -> Result<(), FetchError> {
        if self.url.is_empty() {
            return Err(FetchError::Validation(
                "Url is empty. Nothing to Download".to_string(),
            ));
        }
        if self.file_name.is_empty() {
            return Err(FetchError::Validation(
                "FileName is empty. Nothing to Download".to_string(),
            ));
        }
        if self.file_path.as_os_str().is_empty() {
            return Err(FetchError::Validation(
                "FilePath is empty. Nothing to Download".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a download
///
/// Always carries the URL and destination; `file_size` counts the bytes
/// written by the last attempt, which may be non-zero on failure when the
/// body broke off mid-stream.
#[derive(Debug)]
pub struct DownloadResult {
    pub url: String,
    pub file_full_name: PathBuf,
    pub file_size: u64,
    pub error: Option<FetchError>,
}

impl DownloadResult {
    /// Returns true if the file was downloaded completely
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into a `Result` carrying the file size on success
    pub fn into_result(self) -> Result<u64, FetchError> {
        match self.error {
            None => Ok(self.file_size),
            Some(e) => Err(e),
        }
    }
}

impl HttpEngine {
    /// Downloads a URL into a local file
    ///
    /// # Request Flow
    ///
    /// 1. Validate url, directory and file name (no network on failure)
    /// 2. Create the destination directory if missing
    /// 3. Open the file (truncate, or fail if it exists and overwriting is off)
    /// 4. Acquire a permit and stream the body in chunks of at most
    ///    [`DOWNLOAD_BUFFER_SIZE`] bytes
    ///
    /// Transport errors, non-200 statuses and body read errors are retried
    /// after `download_retry_delay`; each retry restarts the request and
    /// rewrites the file from the beginning. A failed disk write is
    /// returned at once.
    pub async fn download(&self, info: &DownloadInfo) -> DownloadResult {
        let mut result = DownloadResult {
            url: info.url.clone(),
            file_full_name: info.full_path(),
            file_size: 0,
            error: None,
        };

        let header_map = match info
            .validate()
            .and_then(|_| build_header_map("Download", &info.url, info.headers.as_ref()))
        {
            Ok(map) => map,
            Err(e) => {
                result.error = Some(e);
                return result;
            }
        };

        if let Err(e) = ensure_directory(&info.file_path).await {
            result.error = Some(e);
            return result;
        }

        let mut file = match open_destination(&result.file_full_name, info.download_when_exists).await
        {
            Ok(file) => file,
            Err(e) => {
                result.error = Some(e);
                return result;
            }
        };

        let _permit = match self.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                result.error = Some(e);
                return result;
            }
        };

        let outcome = self
            .stream_with_retry(
                &info.url,
                &header_map,
                &result.file_full_name,
                &mut file,
                &mut result.file_size,
            )
            .await;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    "[Download] 200 -> {} FileSize: {}",
                    info.url,
                    format_file_size(result.file_size)
                );
            }
            Err(e) => result.error = Some(e),
        }

        result
    }

    async fn stream_with_retry(
        &self,
        url: &str,
        headers: &HeaderMap,
        path: &Path,
        file: &mut File,
        written: &mut u64,
    ) -> Result<(), FetchError> {
        let retries = self.config().retries;
        let delay = self.config().download_retry_delay;
        let mut last = AttemptFailure {
            status: None,
            cause: String::new(),
        };

        'attempts: for attempt in 0..retries {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            if *written > 0 {
                rewind(file, path).await?;
                *written = 0;
            }

            let mut response = match self.send(url, headers).await {
                Ok(response) => response,
                Err(failure) => {
                    tracing::warn!(
                        "[Download] Retries: {} -> Url: \"{}\" Error: {}",
                        attempt,
                        url,
                        failure.cause
                    );
                    last = failure;
                    continue;
                }
            };

            let status = response.status().as_u16();
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        for slice in chunk.chunks(DOWNLOAD_BUFFER_SIZE) {
                            file.write_all(slice).await.map_err(|source| FetchError::Write {
                                path: path.to_path_buf(),
                                written: *written,
                                source,
                            })?;
                            *written += slice.len() as u64;
                            tracing::trace!(
                                "[Download] Url:{} -> wrote {} bytes ({} total)",
                                url,
                                slice.len(),
                                written
                            );
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(
                            "[Download] Retries: {} -> Url: \"{}\" Read {} bytes Error: {}",
                            attempt,
                            url,
                            written,
                            e
                        );
                        last = AttemptFailure {
                            status: Some(status),
                            cause: format!("read error after {} bytes: {}", written, e),
                        };
                        continue 'attempts;
                    }
                }
            }

            file.flush().await.map_err(|source| FetchError::Write {
                path: path.to_path_buf(),
                written: *written,
                source,
            })?;
            return Ok(());
        }

        // Keep whatever the last attempt managed to write on disk
        if let Err(e) = file.flush().await {
            tracing::warn!("File: {} flush error: {}", path.display(), e);
        }

        Err(FetchError::RetriesExhausted {
            op: "Download",
            url: url.to_string(),
            retries,
            status: last.status,
            cause: last.cause,
        })
    }
}

/// Creates the destination directory (and parents) when it doesn't exist
async fn ensure_directory(dir: &Path) -> Result<(), FetchError> {
    if tokio::fs::metadata(dir).await.is_ok() {
        return Ok(());
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| FetchError::Filesystem {
            path: dir.to_path_buf(),
            source,
        })?;
    tracing::info!(
        "[Download] file Path: \"{}\" doesn't exist. Created it",
        dir.display()
    );
    Ok(())
}

/// Opens the destination file for writing
async fn open_destination(path: &Path, download_when_exists: bool) -> Result<File, FetchError> {
    let mut options = OpenOptions::new();
    options.write(true);
    if download_when_exists {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    options.open(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            FetchError::AlreadyExists(path.to_path_buf())
        } else {
            FetchError::Filesystem {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Discards bytes from a previous attempt
async fn rewind(file: &mut File, path: &Path) -> Result<(), FetchError> {
    let to_fs_error = |source: std::io::Error| FetchError::Filesystem {
        path: path.to_path_buf(),
        source,
    };
    file.flush().await.map_err(to_fs_error)?;
    file.set_len(0).await.map_err(to_fs_error)?;
    file.seek(SeekFrom::Start(0)).await.map_err(to_fs_error)?;
    Ok(())
}

/// Formats a byte count as a human readable size
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}
