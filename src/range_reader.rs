//! Fetches a blob in successive `Range: bytes=start-end` requests.

use crate::auth::RegistryAuth;
use crate::{error, Result};
use bytes::Bytes;
use snafu::ResultExt;
use url::Url;

pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

/// Pulls a blob forward in fixed-size byte ranges, tracking a cursor and an
/// `exhausted` flag. Every request is routed through [`RegistryAuth`] and
/// inherits its 401-retry policy.
pub struct RangeBlobReader<'a> {
    auth: &'a mut RegistryAuth,
    url: Url,
    chunk_size: u64,
    cursor: u64,
    total_size: Option<u64>,
    exhausted: bool,
}

impl<'a> RangeBlobReader<'a> {
    pub fn new(auth: &'a mut RegistryAuth, url: Url) -> Self {
        Self::with_chunk_size(auth, url, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(auth: &'a mut RegistryAuth, url: Url, chunk_size: u64) -> Self {
        Self {
            auth,
            url,
            chunk_size,
            cursor: 0,
            total_size: None,
            exhausted: false,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn bytes_read(&self) -> u64 {
        self.cursor
    }

    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Fetch and return the next chunk. Returns `None` once the reader is
    /// exhausted (total size reached, a 416, a short read, or a transport
    /// failure).
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(total) = self.total_size {
            if self.cursor >= total {
                self.exhausted = true;
                return Ok(None);
            }
        }

        let start = self.cursor;
        let end = start + self.chunk_size - 1;

        let response = match self.auth.request_range(self.url.clone(), start, end).await {
            Ok(r) => r,
            Err(_) => {
                self.exhausted = true;
                return Ok(None);
            }
        };

        if response.status() == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            self.exhausted = true;
            return Ok(None);
        }
        if !response.status().is_success() {
            self.exhausted = true;
            return Ok(None);
        }

        if self.total_size.is_none() {
            if let Some(total) = parse_content_range_total(&response) {
                self.total_size = Some(total);
            }
        }

        let requested_len = end - start + 1;
        let bytes = response.bytes().await.context(error::RequestSnafu)?;
        self.cursor += bytes.len() as u64;

        if bytes.is_empty() || (bytes.len() as u64) < requested_len {
            // short read: either we hit the end of the blob, or the server
            // closed early. either way there is nothing more to fetch.
            self.exhausted = true;
        }

        Ok(Some(bytes))
    }
}

fn parse_content_range_total(response: &reqwest::Response) -> Option<u64> {
    let value = response.headers().get(reqwest::header::CONTENT_RANGE)?;
    let value = value.to_str().ok()?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}
