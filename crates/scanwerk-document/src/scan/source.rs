// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image acquisition boundary.
//
// The only asynchronous step of a scan: bytes are awaited here under a
// timeout and a cancellation token, and everything downstream is plain
// synchronous computation.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use scanwerk_core::error::{Result, ScanwerkError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Caller-supplied source of encoded image bytes (camera roll, object store,
/// HTTP, ...). `reference` is opaque to the scanner.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, reference: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Reads `reference` as a path on the local filesystem, optionally relative
/// to a root directory.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl ImageFetcher for FileFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let path = match &self.root {
            Some(root) => root.join(reference),
            None => PathBuf::from(reference),
        };
        tokio::fs::read(&path).await.map_err(|err| {
            ScanwerkError::SourceUnavailable(format!("failed to read {}: {}", path.display(), err))
        })
    }
}

/// Await `fetcher` for `reference`.
///
/// Cancellation wins over a fetch completing at the same time and yields
/// `Cancelled`; exceeding `timeout` or receiving zero bytes yields
/// `SourceUnavailable`.
#[instrument(skip(fetcher, cancel))]
pub async fn fetch_bytes<F: ImageFetcher>(
    fetcher: &F,
    reference: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    if cancel.is_cancelled() {
        return Err(ScanwerkError::Cancelled);
    }

    tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            debug!("Fetch cancelled");
            Err(ScanwerkError::Cancelled)
        }

        outcome = tokio::time::timeout(timeout, fetcher.fetch(reference)) => match outcome {
            Ok(Ok(bytes)) if bytes.is_empty() => Err(ScanwerkError::SourceUnavailable(format!(
                "{reference} returned no data"
            ))),
            Ok(Ok(bytes)) => {
                debug!(bytes = bytes.len(), "Fetch complete");
                Ok(bytes)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Fetch failed");
                Err(err)
            }
            Err(_) => {
                warn!(?timeout, "Fetch timed out");
                Err(ScanwerkError::SourceUnavailable(format!(
                    "{reference} timed out after {timeout:?}"
                )))
            }
        }
    }
}
