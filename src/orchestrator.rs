//! Thin glue: resolves manifests, consults the catalog, drives peek/carve,
//! and writes results back. Owns no HTTP or presentation concerns itself.

use crate::auth::RegistryAuth;
use crate::carve::{self, CarveResult};
use crate::catalog::{Catalog, HistoryRow, HistorySort, MergedEntry, OverwritePolicy, SearchHit};
use crate::catalog::{EntryRow, LayerStatus};
use crate::error;
use crate::manifest::resolve_manifest;
use crate::peek::{self, peek_layer};
use crate::{error::Error, Result};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use reqwest::Method;
use serde_json::Value;
use snafu::ResultExt;

/// Which layer(s) a peek request targets.
#[derive(Debug, Clone, Copy)]
pub enum PeekTarget {
    All,
    Layer(i64),
}

const UNSCOPED_ARCH: &str = "any";

fn arch_key(arch: Option<&str>) -> &str {
    arch.unwrap_or(UNSCOPED_ARCH)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Binds the catalog to the operations surface consumed by adaptors (HTTP
/// API, CLI, TUI). One `Orchestrator` can be shared across concurrent
/// requests; it holds no auth state between calls.
pub struct Orchestrator {
    catalog: Catalog,
}

impl Orchestrator {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Resolve a reference's config JSON, honouring the catalog as a cache
    /// unless `force_refresh` is set.
    pub async fn resolve_config(
        &self,
        namespace: &str,
        repo: &str,
        tag: &str,
        arch: Option<&str>,
        force_refresh: bool,
    ) -> Result<Value> {
        let key_arch = arch_key(arch);

        if !force_refresh {
            if let Some(cached) = self
                .catalog
                .get_cached_config(namespace, repo, tag, key_arch)?
            {
                debug!(target: "orchestrator", %namespace, %repo, %tag, "config cache hit");
                return serde_json::from_str(&cached.config_json).context(error::JsonSnafu);
            }
        }

        info!(target: "orchestrator", %namespace, %repo, %tag, arch = key_arch, "resolving manifest from registry");
        let mut auth = RegistryAuth::new(namespace, repo);
        let resolved = resolve_manifest(&mut auth, namespace, repo, tag, arch).await;
        auth.invalidate();
        let resolved = resolved?;

        let config_text = serde_json::to_string(&resolved.config_json).context(error::JsonSnafu)?;
        self.catalog.save_image_config(
            &resolved.config_digest,
            namespace,
            repo,
            tag,
            key_arch,
            &config_text,
            &resolved.layer_digests,
            &resolved.layer_sizes,
            &now_rfc3339(),
        )?;

        Ok(resolved.config_json)
    }

    pub fn layer_status(
        &self,
        namespace: &str,
        repo: &str,
        tag: &str,
        arch: Option<&str>,
    ) -> Result<Option<LayerStatus>> {
        self.catalog
            .get_layer_status(namespace, repo, tag, arch_key(arch))
    }

    /// Peek-all/peek-single policy: resolve config (via the cache), then
    /// peek every unpeeked layer (`PeekTarget::All`) or just one
    /// (`PeekTarget::Layer`), persisting each result and marking it peeked.
    pub async fn peek(
        &self,
        namespace: &str,
        repo: &str,
        tag: &str,
        arch: Option<&str>,
        target: PeekTarget,
    ) -> Result<()> {
        let status = self
            .layer_status(namespace, repo, tag, arch)?
            .ok_or_else(|| Error::NotFound {
                path: format!("{namespace}/{repo}:{tag}"),
            })?;

        let indices: Vec<i64> = match target {
            PeekTarget::All => status
                .layers
                .iter()
                .filter(|l| !l.peeked)
                .map(|l| l.layer_index)
                .collect(),
            PeekTarget::Layer(i) => vec![i],
        };

        let mut auth = RegistryAuth::new(namespace, repo);
        for idx in indices {
            let layer = status
                .layers
                .iter()
                .find(|l| l.layer_index == idx)
                .ok_or(Error::NotFound {
                    path: format!("layer {idx}"),
                });
            let layer = match layer {
                Ok(l) => l,
                Err(e) => {
                    auth.invalidate();
                    return Err(e);
                }
            };

            info!(target: "orchestrator", %namespace, %repo, layer_index = idx, digest = %layer.digest, "peeking layer");
            let peeked = peek_layer(&mut auth, namespace, repo, &layer.digest, None, None).await;
            let peeked = match peeked {
                Ok(p) => p,
                Err(e) => {
                    auth.invalidate();
                    return Err(e);
                }
            };

            let scraped_at = now_rfc3339();
            self.catalog.save_peek_result(
                namespace,
                repo,
                tag,
                idx,
                layer.size,
                &peeked,
                &scraped_at,
                OverwritePolicy::Overwrite,
            )?;
            self.catalog
                .mark_layer_peeked(&status.config_digest, idx, peeked.entries_found as i64, &scraped_at)?;
        }
        auth.invalidate();
        Ok(())
    }

    /// Carve policy: always requires an explicit layer index.
    pub async fn carve(
        &self,
        namespace: &str,
        repo: &str,
        tag: &str,
        arch: Option<&str>,
        path: &str,
        layer_index: i64,
    ) -> Result<CarveResult> {
        let status = self
            .layer_status(namespace, repo, tag, arch)?
            .ok_or_else(|| Error::NotFound {
                path: format!("{namespace}/{repo}:{tag}"),
            })?;
        let layer_digests: Vec<String> = status.layers.iter().map(|l| l.digest.clone()).collect();

        let mut auth = RegistryAuth::new(namespace, repo);
        let result = carve::carve(
            &mut auth,
            namespace,
            repo,
            &layer_digests,
            path,
            Some(layer_index as usize),
            None,
        )
        .await;
        auth.invalidate();
        result
    }

    /// An authenticated passthrough of the raw layer bytes, for the HTTP
    /// adaptor's download endpoint. No decompression, no parsing.
    pub async fn stream_layer(
        &self,
        namespace: &str,
        repo: &str,
        digest: &str,
    ) -> Result<impl Stream<Item = std::result::Result<Bytes, reqwest::Error>>> {
        let mut auth = RegistryAuth::new(namespace, repo);
        let url = peek::blob_url(&auth, namespace, repo, digest)?;
        let response = auth.request(Method::GET, url).await;
        auth.invalidate();
        let response = response?;
        if !response.status().is_success() {
            return Err(Error::RegistryError {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.bytes_stream())
    }

    /// Single-layer listing (when `layer` is given) or an overlay-merged
    /// view across every peeked layer.
    pub fn directory(
        &self,
        namespace: &str,
        repo: &str,
        tag: &str,
        path: &str,
        layer: Option<i64>,
        arch: Option<&str>,
    ) -> Result<DirectoryView> {
        match layer {
            Some(idx) => {
                let status = self
                    .layer_status(namespace, repo, tag, arch)?
                    .ok_or_else(|| Error::NotFound {
                        path: format!("{namespace}/{repo}:{tag}"),
                    })?;
                let digest = status
                    .layers
                    .iter()
                    .find(|l| l.layer_index == idx)
                    .map(|l| l.digest.clone())
                    .ok_or(Error::NotFound {
                        path: format!("layer {idx}"),
                    })?;
                Ok(DirectoryView::Single(
                    self.catalog.list_entries(&digest, Some(path))?,
                ))
            }
            None => Ok(DirectoryView::Merged(self.catalog.merged_directory(
                namespace, repo, tag, path,
            )?)),
        }
    }

    pub fn search(
        &self,
        pattern: &str,
        namespace: Option<&str>,
        repo: Option<&str>,
        tag: Option<&str>,
        layer: Option<i64>,
    ) -> Result<Vec<SearchHit>> {
        self.catalog
            .search_entries(pattern, namespace, repo, tag, layer)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn history(
        &self,
        query: Option<&str>,
        page: u32,
        page_size: u32,
        sort_by: HistorySort,
        order: crate::catalog::SortOrder,
    ) -> Result<Vec<HistoryRow>> {
        self.catalog.list_history(query, page, page_size, sort_by, order)
    }
}

pub enum DirectoryView {
    Single(Vec<EntryRow>),
    Merged(Vec<MergedEntry>),
}
