//! Manifest and manifest-index models, and the four-step resolution
//! procedure: fetch manifest (or index), pick a platform, fetch the config
//! blob, and hand back the config JSON plus the ordered layer descriptors.

use crate::auth::RegistryAuth;
use crate::{error, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{ensure, ResultExt};
use url::Url;

/// `{ digest, size, mediaType }`, as it appears in a manifest's `config`
/// field and each entry of its `layers` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobDescriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    digest: String,
    platform: Platform,
}

#[derive(Debug, Deserialize)]
struct ManifestIndexJson {
    manifests: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct PlatformManifestJson {
    config: BlobDescriptor,
    #[serde(default)]
    layers: Vec<BlobDescriptor>,
}

/// The outcome of resolving a reference down to a single-platform manifest
/// and its config blob.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub config_digest: String,
    pub config_json: Value,
    pub layer_digests: Vec<String>,
    pub layer_sizes: Vec<u64>,
}

fn manifest_url(auth: &RegistryAuth, namespace: &str, repo: &str, reference: &str) -> Result<Url> {
    Url::parse(&format!(
        "{}/v2/{namespace}/{repo}/manifests/{reference}",
        auth.registry_host()
    ))
    .context(error::UrlSnafu)
}

fn blob_url(auth: &RegistryAuth, namespace: &str, repo: &str, digest: &str) -> Result<Url> {
    Url::parse(&format!(
        "{}/v2/{namespace}/{repo}/blobs/{digest}",
        auth.registry_host()
    ))
    .context(error::UrlSnafu)
}

/// Select the manifest-index entry matching `arch`, falling back to the
/// first entry when no architecture is requested. Fails with
/// [`error::Error::PlatformNotFound`] when an explicit architecture has no
/// match.
fn select_platform<'a>(entries: &'a [IndexEntry], arch: Option<&str>) -> Result<&'a IndexEntry> {
    match arch {
        Some(arch) => entries
            .iter()
            .find(|e| e.platform.architecture == arch)
            .ok_or(error::Error::PlatformNotFound),
        None => entries.first().ok_or(error::Error::PlatformNotFound),
    }
}

async fn fetch_json(auth: &mut RegistryAuth, url: Url) -> Result<Value> {
    let response = auth.request(Method::GET, url).await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(error::Error::RegistryError {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = response.bytes().await.context(error::RequestSnafu)?;
    serde_json::from_slice(&bytes).context(error::JsonSnafu)
}

/// Resolve `(namespace, repo, tag)` to a platform manifest and its config
/// JSON, following the manifest-index indirection when present.
pub async fn resolve_manifest(
    auth: &mut RegistryAuth,
    namespace: &str,
    repo: &str,
    tag: &str,
    arch: Option<&str>,
) -> Result<ResolvedManifest> {
    let top_url = manifest_url(auth, namespace, repo, tag)?;
    let top = fetch_json(auth, top_url).await?;

    let platform_manifest_json = if top.get("manifests").is_some() {
        let index: ManifestIndexJson =
            serde_json::from_value(top).context(error::JsonSnafu)?;
        ensure!(!index.manifests.is_empty(), error::PlatformNotFoundSnafu);
        let entry = select_platform(&index.manifests, arch)?;
        let child_url = manifest_url(auth, namespace, repo, &entry.digest)?;
        fetch_json(auth, child_url).await?
    } else {
        top
    };

    let manifest: PlatformManifestJson =
        serde_json::from_value(platform_manifest_json).map_err(|e| {
            error::Error::MalformedManifest {
                reason: e.to_string(),
            }
        })?;

    let config_url = blob_url(auth, namespace, repo, &manifest.config.digest)?;
    let config_json = fetch_json(auth, config_url).await?;

    let (layer_digests, layer_sizes) = manifest
        .layers
        .iter()
        .map(|l| (l.digest.clone(), l.size))
        .unzip();

    Ok(ResolvedManifest {
        config_digest: manifest.config.digest,
        config_json,
        layer_digests,
        layer_sizes,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn select_platform_picks_matching_arch() {
        let entries = vec![
            IndexEntry {
                digest: "sha256:a".into(),
                platform: Platform {
                    architecture: "arm64".into(),
                    os: "linux".into(),
                },
            },
            IndexEntry {
                digest: "sha256:b".into(),
                platform: Platform {
                    architecture: "amd64".into(),
                    os: "linux".into(),
                },
            },
        ];
        let picked = select_platform(&entries, Some("amd64")).unwrap();
        assert_eq!(picked.digest, "sha256:b");
    }

    #[test]
    fn select_platform_defaults_to_first_without_arch() {
        let entries = vec![IndexEntry {
            digest: "sha256:a".into(),
            platform: Platform {
                architecture: "arm64".into(),
                os: "linux".into(),
            },
        }];
        let picked = select_platform(&entries, None).unwrap();
        assert_eq!(picked.digest, "sha256:a");
    }

    #[test]
    fn select_platform_fails_when_no_match() {
        let entries = vec![IndexEntry {
            digest: "sha256:a".into(),
            platform: Platform {
                architecture: "arm64".into(),
                os: "linux".into(),
            },
        }];
        assert!(matches!(
            select_platform(&entries, Some("amd64")),
            Err(error::Error::PlatformNotFound)
        ));
    }
}
