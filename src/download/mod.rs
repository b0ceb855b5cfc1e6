//! Chunked transfer client.
//!
//! A transfer starts with a HEAD probe for the resource size and range
//! support. Servers that accept byte ranges are fetched as fixed-size chunks
//! with bounded parallelism; everything else is a single streamed GET.
//!
//! Chunks may complete in any order, but the destination only ever sees bytes
//! in increasing offset order: `buffered` keeps one slot per chunk and yields
//! them strictly by index, holding at most `concurrency` requests in flight.

pub mod error;
pub mod paths;

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use reqwest::header::{ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;

pub use self::error::TransferError;
use crate::auth::CredentialManager;
use crate::storage::{BlobWriter, Storage};

/// Result of the HEAD probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// `Content-Length`, or 0 when absent or unparseable.
    pub length: u64,
    pub accepts_ranges: bool,
}

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// `Range` header value; HTTP range ends are inclusive.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    /// One plain GET for the whole resource.
    Whole,
    Ranged(Vec<ChunkRange>),
}

/// Split the probed resource into chunks of `chunk_size` bytes.
///
/// Without range support (or without a known length) the chunk size is
/// irrelevant and the resource is fetched whole.
pub fn plan_transfer(probe: Probe, chunk_size: u64) -> TransferPlan {
    if !probe.accepts_ranges || probe.length == 0 || chunk_size == 0 {
        return TransferPlan::Whole;
    }
    let mut chunks = Vec::with_capacity(probe.length.div_ceil(chunk_size) as usize);
    let mut start = 0;
    while start < probe.length {
        let end = (start + chunk_size).min(probe.length);
        chunks.push(ChunkRange { start, end });
        start = end;
    }
    TransferPlan::Ranged(chunks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub chunk_size: u64,
    pub concurrency: usize,
}

pub struct TransferClient {
    http: Client,
    credentials: Arc<CredentialManager>,
}

impl TransferClient {
    pub fn new(http: Client, credentials: Arc<CredentialManager>) -> Self {
        Self { http, credentials }
    }

    pub async fn probe(&self, url: &str) -> Result<Probe, TransferError> {
        let token = self.credentials.token().await?;
        let response = self
            .http
            .head(url)
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await
            .map_err(|e| TransferError::http(url, e))?;

        if response.status() != StatusCode::OK {
            return Err(TransferError::ProbeStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let headers = response.headers();
        let length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let accepts_ranges = headers
            .get_all(ACCEPT_RANGES)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));

        Ok(Probe {
            length,
            accepts_ranges,
        })
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    ///
    /// `dest` is neither closed nor aborted here; see [`Self::download_to`].
    pub async fn fetch(
        &self,
        url: &str,
        dest: &mut dyn BlobWriter,
        options: TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let work = async {
            let probe = self.probe(url).await?;
            match plan_transfer(probe, options.chunk_size) {
                TransferPlan::Whole => {
                    tracing::debug!(url, length = probe.length, "Fetching without ranges");
                    self.fetch_whole(url, dest).await
                }
                TransferPlan::Ranged(chunks) => {
                    tracing::debug!(
                        url,
                        length = probe.length,
                        chunks = chunks.len(),
                        concurrency = options.concurrency,
                        "Fetching in ranges"
                    );
                    self.fetch_ranged(url, chunks, options.concurrency, dest)
                        .await
                }
            }
        };

        // Dropping `work` drops every in-flight request with it.
        tokio::select! {
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            result = work => result,
        }
    }

    async fn fetch_whole(&self, url: &str, dest: &mut dyn BlobWriter) -> Result<u64, TransferError> {
        let token = self.credentials.token().await?;
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await
            .map_err(|e| TransferError::http(url, e))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(TransferError::ChunkStatus {
                url: url.to_string(),
                range: "whole".into(),
                status: status.as_u16(),
            });
        }

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(piece) = body.next().await {
            let piece = piece.map_err(|e| TransferError::http(url, e))?;
            dest.write(&piece).await?;
            written += piece.len() as u64;
        }
        Ok(written)
    }

    async fn fetch_ranged(
        &self,
        url: &str,
        chunks: Vec<ChunkRange>,
        concurrency: usize,
        dest: &mut dyn BlobWriter,
    ) -> Result<u64, TransferError> {
        let mut ordered = stream::iter(chunks)
            .map(|range| self.fetch_chunk(url, range))
            .buffered(concurrency.max(1));

        let mut written = 0u64;
        while let Some(chunk) = ordered.next().await {
            let chunk = chunk?;
            dest.write(&chunk).await?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    async fn fetch_chunk(&self, url: &str, range: ChunkRange) -> Result<Bytes, TransferError> {
        let header = range.header_value();
        let token = self.credentials.token().await?;
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, token.bearer())
            .header(RANGE, &header)
            .send()
            .await
            .map_err(|e| TransferError::http(url, e))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(TransferError::ChunkStatus {
                url: url.to_string(),
                range: header,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransferError::http(url, e))?;
        if body.len() as u64 != range.len() {
            return Err(TransferError::ChunkLength {
                url: url.to_string(),
                range: header,
                expected: range.len(),
                actual: body.len() as u64,
            });
        }
        Ok(body)
    }

    /// Transfer `url` into `target` on `storage`.
    ///
    /// The writer is closed on success. On any failure, cancellation
    /// included, it is aborted so the partial blob is removed from every
    /// backend before the error is returned.
    pub async fn download_to(
        &self,
        storage: &dyn Storage,
        target: &str,
        url: &str,
        options: TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let mut writer = storage.writer(target).await?;
        match self.fetch(url, writer.as_mut(), options, cancel).await {
            Ok(written) => {
                writer.close().await?;
                Ok(written)
            }
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!(path = target, error = %abort_err, "Failed to remove partial download");
                }
                Err(e)
            }
        }
    }
}
