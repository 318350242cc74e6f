//! Dual-sink streaming: one origin body, two destinations.
//!
//! Each chunk is written to the temp file first and then handed to the
//! client, so both sinks see the origin's byte order. The temp file is
//! renamed onto the cache path only after the last chunk is synced.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use reqwest::Response;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use url::Url;

use tileproxy_core::Error;

/// Channel feeding the client's response body.
///
/// An `Err` item aborts the response; closing the channel ends it.
pub type ClientSink = mpsc::Sender<Result<Bytes, io::Error>>;

/// Receiving half of a [`ClientSink`].
pub type ClientStream = mpsc::Receiver<Result<Bytes, io::Error>>;

/// Bounded channel between a download and the client's response body.
pub fn client_channel(depth: usize) -> (ClientSink, ClientStream) {
    mpsc::channel(depth)
}

/// An origin response that has passed the status check, paired with the temp
/// file it will be mirrored into.
#[derive(Debug)]
pub struct Download {
    url: String,
    dest: PathBuf,
    response: Response,
    file: File,
    temp: TempPath,
}

impl Download {
    pub(crate) async fn open(origin: &Url, dest: &Path, response: Response) -> Result<Self, Error> {
        let parent = dest.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let (file, temp) = unblock(move || {
            tempfile::Builder::new()
                .prefix(".")
                .suffix(".part")
                .tempfile_in(parent)
        })
        .await
        .map_err(|e| Error::storage(dest, e))?
        .into_parts();

        Ok(Self { url: origin.to_string(), dest: dest.to_path_buf(), response, file: File::from_std(file), temp })
    }

    /// Body length announced by the origin, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Forward the body to disk and to `client`.
    ///
    /// Returns the number of bytes mirrored. The client channel is closed only
    /// after the cache file is in place. On failure the temp file and any file
    /// at the destination are removed first, then the error is pushed to the
    /// client and returned.
    ///
    /// A client that goes away does not stop the download; the cache file is
    /// still completed.
    pub async fn stream_into(self, client: ClientSink) -> Result<u64, Error> {
        let Download { url, dest, mut response, mut file, temp } = self;
        let mut client = Some(client);

        let pumped = pump(&mut response, &mut file, &mut client, &url, &temp).await;
        drop(file);

        let outcome = match pumped {
            Ok(written) => {
                let target = dest.clone();
                match unblock(move || Ok(temp.persist(target))).await {
                    Ok(Ok(())) => Ok(written),
                    Ok(Err(e)) => {
                        let err = Error::storage(&dest, e.error);
                        cleanup(e.path, &dest).await;
                        Err(err)
                    }
                    Err(e) => {
                        discard(&dest).await;
                        Err(Error::storage(&dest, e))
                    }
                }
            }
            Err(err) => {
                cleanup(temp, &dest).await;
                Err(err)
            }
        };

        match outcome {
            Ok(written) => {
                tracing::debug!(url = %url, file = %dest.display(), bytes = written, "cached");
                Ok(written)
            }
            Err(err) => {
                if let Some(tx) = client.take() {
                    let _ = tx.send(Err(io::Error::other(err.to_string()))).await;
                }
                Err(err)
            }
        }
    }
}

async fn pump(
    response: &mut Response, file: &mut File, client: &mut Option<ClientSink>, url: &str, temp: &Path,
) -> Result<u64, Error> {
    let mut written = 0u64;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| Error::transport(url, format!("failed to read response: {e}")))?
    {
        file.write_all(&chunk).await.map_err(|e| Error::storage(temp, e))?;
        written += chunk.len() as u64;

        let delivered = match client.as_ref() {
            Some(tx) => tx.send(Ok(chunk)).await.is_ok(),
            None => true,
        };
        if !delivered {
            tracing::debug!(url, "client went away, finishing cache write");
            *client = None;
        }
    }

    file.flush().await.map_err(|e| Error::storage(temp, e))?;
    file.sync_all().await.map_err(|e| Error::storage(temp, e))?;

    Ok(written)
}

/// Remove the temp file and whatever sits at the destination, waiting for both.
async fn cleanup(temp: TempPath, dest: &Path) {
    let temp_path = temp.to_path_buf();
    if let Err(e) = unblock(move || temp.close()).await
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %temp_path.display(), error = %e, "failed to remove partial download");
    }
    discard(dest).await;
}

/// Run a blocking filesystem call on the blocking pool.
async fn unblock<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(io::Error::other)?
}

/// Remove a cache file if present.
pub(crate) async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed cache file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove cache file"),
    }
}
