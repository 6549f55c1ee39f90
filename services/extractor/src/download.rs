//! Streaming download of provider results.
//!
//! Bytes go to `<dest>.partial`, are checked against `Content-Length` and
//! renamed to `<dest>` only when complete. The partial file never outlives a
//! failed attempt.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use era5_common::{ExtractionError, ExtractionResult};
use futures::StreamExt;
use reqwest::{header, Client, Response};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Log progress every this many bytes.
const PROGRESS_INTERVAL: u64 = 8 * 1024 * 1024;

/// Path of the in-flight file for `dest`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Compare the received size with the announced one.
pub fn verify_length(expected: Option<u64>, actual: u64) -> ExtractionResult<()> {
    match expected {
        Some(expected) if expected != actual => {
            Err(ExtractionError::PartialDownload { expected, actual })
        }
        _ => Ok(()),
    }
}

/// Downloads result files over HTTP.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Download `url` into `dest`, returning the byte count.
    #[instrument(skip(self, url, dest), fields(url = %url, dest = %dest.display()))]
    pub async fn download(&self, url: &str, dest: &Path) -> ExtractionResult<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = partial_path(dest);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractionError::Network(format!("download request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(if status.is_server_error() {
                ExtractionError::Network(format!("download failed: HTTP {}", status))
            } else {
                ExtractionError::Provider(format!("download failed: HTTP {}", status))
            });
        }

        let expected = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let written = match stream_to_file(response, &temp_path, expected).await {
            Ok(written) => written,
            Err(e) => {
                fs::remove_file(&temp_path).await.ok();
                return Err(e);
            }
        };

        if let Err(e) = verify_length(expected, written) {
            fs::remove_file(&temp_path).await.ok();
            return Err(e);
        }

        fs::rename(&temp_path, dest).await?;
        info!(bytes = written, "Download completed");
        Ok(written)
    }
}

async fn stream_to_file(
    response: Response,
    path: &Path,
    expected: Option<u64>,
) -> ExtractionResult<u64> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    let mut next_report = PROGRESS_INTERVAL;

    while let Some(chunk) = stream.next().await {
        let chunk: Bytes =
            chunk.map_err(|e| ExtractionError::Network(format!("error reading body: {}", e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;

        if written >= next_report {
            debug!(downloaded = written, total = ?expected, "Download progress");
            next_report += PROGRESS_INTERVAL;
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}
