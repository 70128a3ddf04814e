//! Extracts a single file's content bytes from a layer, fetching only
//! enough compressed data to cover its tar member.

use crate::auth::RegistryAuth;
use crate::error;
use crate::gzip::IncrementalGzipDecoder;
use crate::peek::blob_url;
use crate::range_reader::{RangeBlobReader, DEFAULT_CHUNK_SIZE};
use crate::tar_header::parse_tar_header;
use crate::Result;
use bytes::Bytes;

/// Strip a leading `/` and any number of leading `./` components so a
/// request path compares equal to a tar member's stored name.
pub fn normalize_path(path: &str) -> String {
    let mut p = path.trim_start_matches('/');
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    p.to_string()
}

/// A successful carve: the file's bytes and how much compressed data had to
/// be downloaded to obtain them.
#[derive(Debug, Clone)]
pub struct CarveHit {
    pub bytes: Bytes,
    pub bytes_downloaded: u64,
}

/// Scan one layer for `target_path` and, on a match, download just enough
/// of the layer to cover its content. Returns `Ok(None)` if the layer does
/// not contain the path (a normal outcome, not an error).
pub async fn carve_from_layer(
    auth: &mut RegistryAuth,
    namespace: &str,
    repo: &str,
    digest: &str,
    target_path: &str,
    chunk_size: Option<u64>,
) -> Result<Option<CarveHit>> {
    let target = normalize_path(target_path);
    let url = blob_url(auth, namespace, repo, digest)?;
    let mut reader =
        RangeBlobReader::with_chunk_size(auth, url, chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE));
    let mut gz = IncrementalGzipDecoder::new();
    let mut parse_offset = 0usize;
    let mut first_chunk = true;
    let mut content_range: Option<(usize, usize)> = None;

    loop {
        if let Some((start, size)) = content_range {
            if gz.buffer().len() >= start + size {
                let slice = gz.buffer()[start..start + size].to_vec();
                return Ok(Some(CarveHit {
                    bytes: Bytes::from(slice),
                    bytes_downloaded: reader.bytes_read(),
                }));
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

        if content_range.is_none() {
            while let Some((entry, next_offset)) = parse_tar_header(gz.buffer(), parse_offset) {
                if normalize_path(&entry.name) == target && !entry.is_dir {
                    content_range = Some((parse_offset + 512, entry.size as usize));
                }
                parse_offset = next_offset;
                if content_range.is_some() {
                    break;
                }
            }
        }
    }

    match content_range {
        Some(_) => Err(error::Error::TruncatedStream),
        None => Ok(None),
    }
}

/// Search order across layers: explicit `layer_index` restricts the search
/// to that one layer; otherwise layers are scanned in manifest order (base
/// layer first), stopping at the first match.
pub struct CarveResult {
    pub layer_index: usize,
    pub hit: CarveHit,
}

pub async fn carve(
    auth: &mut RegistryAuth,
    namespace: &str,
    repo: &str,
    layer_digests: &[String],
    target_path: &str,
    layer_index: Option<usize>,
    chunk_size: Option<u64>,
) -> Result<CarveResult> {
    let candidates: Vec<usize> = match layer_index {
        Some(i) => vec![i],
        None => (0..layer_digests.len()).collect(),
    };

    for idx in candidates {
        let digest = layer_digests
            .get(idx)
            .ok_or(error::Error::NotFound {
                path: target_path.to_string(),
            })?;
        if let Some(hit) =
            carve_from_layer(auth, namespace, repo, digest, target_path, chunk_size).await?
        {
            return Ok(CarveResult {
                layer_index: idx,
                hit,
            });
        }
    }

    Err(error::Error::NotFound {
        path: target_path.to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize_strips_leading_slash_and_dot_segments() {
        assert_eq!(normalize_path("/etc/os-release"), "etc/os-release");
        assert_eq!(normalize_path("./etc/os-release"), "etc/os-release");
        assert_eq!(normalize_path("././etc/os-release"), "etc/os-release");
        assert_eq!(normalize_path("etc/os-release"), "etc/os-release");
    }
}
