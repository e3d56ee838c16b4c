//! Single-attempt streaming fetch.
//!
//! One attempt copies the object's bytes into a staging path and nothing
//! else: no rename, no chmod, no contact with the final path. The copy loop
//! observes two cancellation sources independently: the per-attempt breaker
//! channel fed by the stall watchdog, and the run-wide cancel latch.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::warn;

use crate::fetcher::{FetchError, Fetcher, Job};
use crate::storage::StorageError;

impl Fetcher {
    /// Copy one object's bytes into `staging`, returning the byte count.
    ///
    /// A message on `breaker` aborts the copy with [`FetchError::Timeout`].
    /// The breaker is polled before the stream on every iteration, so a
    /// pre-fired breaker aborts before any byte is copied. When every sender
    /// for `breaker` has been dropped the watchdog is considered disarmed
    /// and the copy runs to completion or outer cancellation.
    pub async fn fetch_once(
        &self,
        job: &Job,
        staging: &Path,
        breaker: &mut mpsc::Receiver<()>,
    ) -> Result<u64, FetchError> {
        let address = job.address();

        let mut stream = self
            .store()
            .new_reader(&job.bucket, &job.object, job.generation)
            .await
            .map_err(|e| match e {
                StorageError::PermissionDenied(inner) => FetchError::Permission(inner),
                StorageError::Transport(msg) => {
                    FetchError::Transport(format!("opening {address}: {msg}"))
                }
            })?;

        let mut file = self.fs().create(staging).await.map_err(|e| {
            FetchError::Filesystem(format!("creating {}: {e}", staging.display()))
        })?;

        let mut written = 0u64;
        let mut armed = true;
        loop {
            let next = if armed {
                tokio::select! {
                    biased;
                    fired = breaker.recv() => match fired {
                        Some(()) => return Err(FetchError::Timeout),
                        None => {
                            armed = false;
                            continue;
                        }
                    },
                    () = self.wait_cancelled() => {
                        return Err(FetchError::Transport(format!(
                            "fetch of {address} cancelled"
                        )));
                    }
                    chunk = stream.next() => chunk,
                }
            } else {
                tokio::select! {
                    () = self.wait_cancelled() => {
                        return Err(FetchError::Transport(format!(
                            "fetch of {address} cancelled"
                        )));
                    }
                    chunk = stream.next() => chunk,
                }
            };

            match next {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await.map_err(|e| {
                        FetchError::Filesystem(format!("writing {}: {e}", staging.display()))
                    })?;
                    written += bytes.len() as u64;
                }
                Some(Err(StorageError::PermissionDenied(inner))) => {
                    return Err(FetchError::Permission(inner));
                }
                Some(Err(StorageError::Transport(msg))) => {
                    return Err(FetchError::Transport(format!("reading {address}: {msg}")));
                }
                None => break,
            }
        }

        // Close errors are recorded but do not mask a completed copy.
        if let Err(e) = file.flush().await {
            warn!(staging = %staging.display(), error = %e, "flushing staging file failed");
        }

        Ok(written)
    }

    /// Run [`Fetcher::fetch_once`] under a watchdog that fires after
    /// `deadline`.
    pub async fn fetch_once_with_deadline(
        &self,
        job: &Job,
        deadline: Duration,
        staging: &Path,
    ) -> Result<u64, FetchError> {
        let (breaker_tx, mut breaker) = mpsc::channel(1);
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = breaker_tx.send(()).await;
        });

        let result = self.fetch_once(job, staging, &mut breaker).await;
        watchdog.abort();
        result
    }
}
