//! Composes the range reader, the gzip decoder and the tar header parser
//! into the ordered enumeration of a layer's filesystem entries.

use crate::auth::RegistryAuth;
use crate::error;
use crate::gzip::IncrementalGzipDecoder;
use crate::range_reader::{RangeBlobReader, DEFAULT_CHUNK_SIZE};
use crate::tar_header::{parse_tar_header, TarEntry};
use crate::Result;
use snafu::ResultExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// The outcome of enumerating one layer's tar entries.
#[derive(Debug, Clone)]
pub struct PeekResult {
    pub digest: String,
    pub partial: bool,
    pub bytes_downloaded: u64,
    pub bytes_decompressed: u64,
    pub entries_found: usize,
    pub entries: Vec<TarEntry>,
}

pub(crate) fn blob_url(
    auth: &RegistryAuth,
    namespace: &str,
    repo: &str,
    digest: &str,
) -> Result<Url> {
    Url::parse(&format!(
        "{}/v2/{namespace}/{repo}/blobs/{digest}",
        auth.registry_host()
    ))
    .context(error::UrlSnafu)
}

/// Enumerate every tar entry in the layer identified by `digest`, stopping
/// early once `max_compressed_bytes` compressed bytes have been downloaded
/// (if given), in which case [`PeekResult::partial`] is `true`.
pub async fn peek_layer(
    auth: &mut RegistryAuth,
    namespace: &str,
    repo: &str,
    digest: &str,
    max_compressed_bytes: Option<u64>,
    chunk_size: Option<u64>,
) -> Result<PeekResult> {
    peek_layer_with(
        auth,
        namespace,
        repo,
        digest,
        max_compressed_bytes,
        chunk_size,
        |_entry| {},
    )
    .await
}

/// Like [`peek_layer`] but invokes `on_entry` as soon as each entry is
/// parsed, for incremental rendering, while still returning the final
/// aggregate result once the stream closes.
pub async fn peek_layer_with(
    auth: &mut RegistryAuth,
    namespace: &str,
    repo: &str,
    digest: &str,
    max_compressed_bytes: Option<u64>,
    chunk_size: Option<u64>,
    mut on_entry: impl FnMut(&TarEntry),
) -> Result<PeekResult> {
    let url = blob_url(auth, namespace, repo, digest)?;
    let mut reader =
        RangeBlobReader::with_chunk_size(auth, url, chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE));
    let mut gz = IncrementalGzipDecoder::new();
    let mut parse_offset = 0usize;
    let mut entries = Vec::new();
    let mut partial = false;
    let mut first_chunk = true;

    loop {
        if let Some(max) = max_compressed_bytes {
            if reader.bytes_read() >= max {
                partial = true;
                break;
            }
        }

        let Some(chunk) = reader.next_chunk().await? else {
            break;
        };

        gz.feed(&chunk);
        if gz.is_errored() {
            if first_chunk {
                return Err(error::Error::NotGzip);
            }
            return Err(error::Error::DecompressError {
                reason: "gzip stream ended unexpectedly or was corrupted".to_string(),
            });
        }
        first_chunk = false;

        while let Some((entry, next_offset)) = parse_tar_header(gz.buffer(), parse_offset) {
            on_entry(&entry);
            entries.push(entry);
            parse_offset = next_offset;
        }
    }

    if !partial && gz.buffer().len() < 512 {
        return Err(error::Error::TruncatedStream);
    }

    Ok(PeekResult {
        digest: digest.to_string(),
        partial,
        bytes_downloaded: reader.bytes_read(),
        bytes_decompressed: gz.buffer().len() as u64,
        entries_found: entries.len(),
        entries,
    })
}

/// Spawns `peek_layer_with` on the tokio runtime, emitting each entry over
/// the returned channel as soon as it is parsed. The join handle resolves
/// to the final [`PeekResult`] once the layer has been fully consumed.
pub fn peek_layer_progressive(
    mut auth: RegistryAuth,
    namespace: String,
    repo: String,
    digest: String,
    max_compressed_bytes: Option<u64>,
    chunk_size: Option<u64>,
) -> (
    mpsc::UnboundedReceiver<TarEntry>,
    JoinHandle<Result<PeekResult>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let result = peek_layer_with(
            &mut auth,
            &namespace,
            &repo,
            &digest,
            max_compressed_bytes,
            chunk_size,
            |entry| {
                let _ = tx.send(entry.clone());
            },
        )
        .await;
        auth.invalidate();
        result
    });
    (rx, handle)
}
