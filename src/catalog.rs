//! The durable store: image configs, per-layer peek state, and per-entry
//! filesystem records. Also the only component that knows SQL; every other
//! module deals in typed Rust values.

use crate::peek::PeekResult;
use crate::{error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use snafu::ResultExt;
use std::sync::Mutex;

/// What to do when a peek result would overwrite an already-cataloged
/// layer. Defaults to `Skip`; the source's interactive confirm-prompt has
/// no meaning in a server context, so this is an explicit parameter at
/// every write entry point instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    #[default]
    Skip,
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ImageLayerRow {
    pub layer_index: i64,
    pub digest: String,
    pub size: i64,
    pub peeked: bool,
    pub peeked_at: Option<String>,
    pub entries_count: i64,
}

#[derive(Debug, Clone)]
pub struct LayerStatus {
    pub config_digest: String,
    pub layer_count: i64,
    pub layers: Vec<ImageLayerRow>,
    pub peeked_count: i64,
    pub unpeeked_count: i64,
}

#[derive(Debug, Clone)]
pub struct CachedConfig {
    pub config_digest: String,
    pub config_json: String,
    pub layer_count: i64,
    pub fetched_at: String,
}

#[derive(Debug, Clone)]
pub struct EntryRow {
    pub layer_digest: String,
    pub name: String,
    pub size: i64,
    pub typeflag: String,
    pub is_dir: bool,
    pub mode: String,
    pub uid: i64,
    pub gid: i64,
    pub mtime: String,
    pub linkname: String,
    pub is_symlink: bool,
}

#[derive(Debug, Clone)]
pub struct MergedEntry {
    pub entry: EntryRow,
    pub layer_index: i64,
    pub overridden: bool,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: EntryRow,
    pub namespace: String,
    pub repo: String,
    pub tag: String,
    pub layer_index: i64,
}

#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub layer_digest: String,
    pub namespace: String,
    pub repo: String,
    pub tag: String,
    pub layer_index: i64,
    pub layer_size: i64,
    pub entries_count: i64,
    pub bytes_downloaded: i64,
    pub bytes_decompressed: i64,
    pub scraped_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySort {
    ScrapedAt,
    Namespace,
    Repo,
    Tag,
    LayerIndex,
    LayerSize,
}

impl HistorySort {
    fn column(self) -> &'static str {
        match self {
            HistorySort::ScrapedAt => "scraped_at",
            HistorySort::Namespace => "namespace",
            HistorySort::Repo => "repo",
            HistorySort::Tag => "tag",
            HistorySort::LayerIndex => "layer_index",
            HistorySort::LayerSize => "layer_size",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Handle to the sqlite-backed catalog. Held behind a mutex so concurrent
/// workers can share one instance; writers take the lock for one
/// transaction at a time, readers for one query.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        let conn = Connection::open(path).context(error::CatalogOpenSnafu {
            path: path.display().to_string(),
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context(error::CacheSnafu)?;
        let catalog = Self {
            conn: Mutex::new(conn),
        };
        catalog.init()?;
        Ok(catalog)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context(error::CatalogOpenSnafu {
            path: ":memory:".to_string(),
        })?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .context(error::CacheSnafu)?;
        let catalog = Self {
            conn: Mutex::new(conn),
        };
        catalog.init()?;
        Ok(catalog)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS image_configs (
                config_digest TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                repo TEXT NOT NULL,
                tag TEXT NOT NULL,
                arch TEXT NOT NULL,
                config_json TEXT NOT NULL,
                layer_count INTEGER NOT NULL,
                fetched_at TEXT NOT NULL,
                UNIQUE(namespace, repo, tag, arch)
            );

            CREATE TABLE IF NOT EXISTS image_layers (
                config_digest TEXT NOT NULL REFERENCES image_configs(config_digest) ON DELETE CASCADE,
                layer_index INTEGER NOT NULL,
                layer_digest TEXT NOT NULL,
                layer_size INTEGER NOT NULL,
                peeked INTEGER NOT NULL DEFAULT 0,
                peeked_at TEXT,
                entries_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (config_digest, layer_index)
            );

            CREATE TABLE IF NOT EXISTS layer_metadata (
                layer_digest TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                repo TEXT NOT NULL,
                tag TEXT NOT NULL,
                layer_index INTEGER NOT NULL,
                layer_size INTEGER NOT NULL,
                entries_count INTEGER NOT NULL,
                bytes_downloaded INTEGER NOT NULL,
                bytes_decompressed INTEGER NOT NULL,
                scraped_at TEXT NOT NULL,
                export_filename TEXT
            );

            CREATE TABLE IF NOT EXISTS layer_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                layer_digest TEXT NOT NULL,
                namespace TEXT NOT NULL,
                repo TEXT NOT NULL,
                tag TEXT NOT NULL,
                layer_index INTEGER NOT NULL,
                scraped_at TEXT NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                typeflag TEXT NOT NULL,
                is_dir INTEGER NOT NULL,
                mode TEXT NOT NULL,
                uid INTEGER NOT NULL,
                gid INTEGER NOT NULL,
                mtime TEXT NOT NULL,
                linkname TEXT NOT NULL,
                is_symlink INTEGER NOT NULL,
                UNIQUE(layer_digest, name)
            );

            CREATE INDEX IF NOT EXISTS idx_layer_entries_digest ON layer_entries(layer_digest);
            CREATE INDEX IF NOT EXISTS idx_layer_entries_name ON layer_entries(name);
            CREATE INDEX IF NOT EXISTS idx_layer_entries_scope ON layer_entries(namespace, repo, tag);
            "#,
        )
        .context(error::CacheSnafu)?;
        Ok(())
    }

    /// Upsert the config row and rewrite its child `image_layers` rows
    /// atomically. Every call replaces the full set of layer rows: a
    /// partial rewrite would leave stale layers from a previous manifest.
    #[allow(clippy::too_many_arguments)]
    pub fn save_image_config(
        &self,
        config_digest: &str,
        namespace: &str,
        repo: &str,
        tag: &str,
        arch: &str,
        config_json: &str,
        layer_digests: &[String],
        layer_sizes: &[u64],
        fetched_at: &str,
    ) -> Result<()> {
        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let tx = conn.transaction().context(error::CacheSnafu)?;

        // a plain upsert here would rewrite image_configs.config_digest (the
        // parent key) in place while child image_layers rows still pointed
        // at the old digest; with foreign_keys=ON and no ON UPDATE CASCADE,
        // sqlite rejects that. Delete the old row (cascading its children)
        // and insert the fresh one instead of updating in place.
        tx.execute(
            "DELETE FROM image_configs WHERE namespace = ?1 AND repo = ?2 AND tag = ?3 AND arch = ?4",
            params![namespace, repo, tag, arch],
        )
        .context(error::CacheSnafu)?;

        tx.execute(
            "INSERT INTO image_configs (config_digest, namespace, repo, tag, arch, config_json, layer_count, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                config_digest,
                namespace,
                repo,
                tag,
                arch,
                config_json,
                layer_digests.len() as i64,
                fetched_at
            ],
        )
        .context(error::CacheSnafu)?;

        for (idx, (digest, size)) in layer_digests.iter().zip(layer_sizes.iter()).enumerate() {
            tx.execute(
                "INSERT INTO image_layers (config_digest, layer_index, layer_digest, layer_size, peeked, entries_count)
                 VALUES (?1, ?2, ?3, ?4, 0, 0)",
                params![config_digest, idx as i64, digest, *size as i64],
            )
            .context(error::CacheSnafu)?;
        }

        tx.commit().context(error::CacheSnafu)?;
        Ok(())
    }

    pub fn get_cached_config(
        &self,
        namespace: &str,
        repo: &str,
        tag: &str,
        arch: &str,
    ) -> Result<Option<CachedConfig>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.query_row(
            "SELECT config_digest, config_json, layer_count, fetched_at
             FROM image_configs WHERE namespace = ?1 AND repo = ?2 AND tag = ?3 AND arch = ?4",
            params![namespace, repo, tag, arch],
            |row| {
                Ok(CachedConfig {
                    config_digest: row.get(0)?,
                    config_json: row.get(1)?,
                    layer_count: row.get(2)?,
                    fetched_at: row.get(3)?,
                })
            },
        )
        .optional()
        .context(error::CacheSnafu)
    }

    pub fn get_layer_status(
        &self,
        namespace: &str,
        repo: &str,
        tag: &str,
        arch: &str,
    ) -> Result<Option<LayerStatus>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let Some(config_digest) = conn
            .query_row(
                "SELECT config_digest FROM image_configs
                 WHERE namespace = ?1 AND repo = ?2 AND tag = ?3 AND arch = ?4",
                params![namespace, repo, tag, arch],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context(error::CacheSnafu)?
        else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT layer_index, layer_digest, layer_size, peeked, peeked_at, entries_count
                 FROM image_layers WHERE config_digest = ?1 ORDER BY layer_index ASC",
            )
            .context(error::CacheSnafu)?;
        let layers: Vec<ImageLayerRow> = stmt
            .query_map(params![config_digest], |row| {
                Ok(ImageLayerRow {
                    layer_index: row.get(0)?,
                    digest: row.get(1)?,
                    size: row.get(2)?,
                    peeked: row.get::<_, i64>(3)? != 0,
                    peeked_at: row.get(4)?,
                    entries_count: row.get(5)?,
                })
            })
            .context(error::CacheSnafu)?
            .collect::<rusqlite::Result<_>>()
            .context(error::CacheSnafu)?;

        let peeked_count = layers.iter().filter(|l| l.peeked).count() as i64;
        let unpeeked_count = layers.len() as i64 - peeked_count;

        Ok(Some(LayerStatus {
            config_digest,
            layer_count: layers.len() as i64,
            layers,
            peeked_count,
            unpeeked_count,
        }))
    }

    pub fn mark_layer_peeked(
        &self,
        config_digest: &str,
        layer_index: i64,
        entries_count: i64,
        peeked_at: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        conn.execute(
            "UPDATE image_layers SET peeked = 1, peeked_at = ?1, entries_count = ?2
             WHERE config_digest = ?3 AND layer_index = ?4",
            params![peeked_at, entries_count, config_digest, layer_index],
        )
        .context(error::CacheSnafu)?;
        Ok(())
    }

    /// Persist a peek result. If `layer_metadata` already has a row for
    /// this digest, `policy` decides whether to skip or overwrite (which
    /// deletes the prior `layer_entries` for the digest before inserting
    /// the fresh set). Runs as one transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn save_peek_result(
        &self,
        namespace: &str,
        repo: &str,
        tag: &str,
        layer_index: i64,
        layer_size: i64,
        result: &PeekResult,
        scraped_at: &str,
        policy: OverwritePolicy,
    ) -> Result<WriteOutcome> {
        let mut conn = self.conn.lock().expect("catalog mutex poisoned");
        let tx = conn.transaction().context(error::CacheSnafu)?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM layer_metadata WHERE layer_digest = ?1",
                params![result.digest],
                |_| Ok(()),
            )
            .optional()
            .context(error::CacheSnafu)?
            .is_some();

        if exists && policy == OverwritePolicy::Skip {
            return Ok(WriteOutcome::Skipped);
        }

        if exists {
            tx.execute(
                "DELETE FROM layer_entries WHERE layer_digest = ?1",
                params![result.digest],
            )
            .context(error::CacheSnafu)?;
        }

        tx.execute(
            "INSERT INTO layer_metadata (layer_digest, namespace, repo, tag, layer_index, layer_size, entries_count, bytes_downloaded, bytes_decompressed, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(layer_digest) DO UPDATE SET
                entries_count = excluded.entries_count,
                bytes_downloaded = excluded.bytes_downloaded,
                bytes_decompressed = excluded.bytes_decompressed,
                scraped_at = excluded.scraped_at",
            params![
                result.digest,
                namespace,
                repo,
                tag,
                layer_index,
                layer_size,
                result.entries_found as i64,
                result.bytes_downloaded as i64,
                result.bytes_decompressed as i64,
                scraped_at,
            ],
        )
        .context(error::CacheSnafu)?;

        for entry in &result.entries {
            tx.execute(
                "INSERT INTO layer_entries (layer_digest, namespace, repo, tag, layer_index, scraped_at, name, size, typeflag, is_dir, mode, uid, gid, mtime, linkname, is_symlink)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(layer_digest, name) DO UPDATE SET
                    size = excluded.size,
                    typeflag = excluded.typeflag,
                    is_dir = excluded.is_dir,
                    mode = excluded.mode,
                    uid = excluded.uid,
                    gid = excluded.gid,
                    mtime = excluded.mtime,
                    linkname = excluded.linkname,
                    is_symlink = excluded.is_symlink",
                params![
                    result.digest,
                    namespace,
                    repo,
                    tag,
                    layer_index,
                    scraped_at,
                    entry.name,
                    entry.size as i64,
                    entry.typeflag.to_string(),
                    entry.is_dir as i64,
                    entry.mode,
                    entry.uid as i64,
                    entry.gid as i64,
                    entry.mtime,
                    entry.linkname,
                    entry.is_symlink as i64,
                ],
            )
            .context(error::CacheSnafu)?;
        }

        tx.commit().context(error::CacheSnafu)?;
        Ok(WriteOutcome::Written)
    }

    /// Direct children of `parent_path` within one layer (no transitive
    /// descendants), directories first then name ascending.
    pub fn list_entries(
        &self,
        layer_digest: &str,
        parent_path: Option<&str>,
    ) -> Result<Vec<EntryRow>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT layer_digest, name, size, typeflag, is_dir, mode, uid, gid, mtime, linkname, is_symlink
                 FROM layer_entries WHERE layer_digest = ?1",
            )
            .context(error::CacheSnafu)?;
        let all: Vec<EntryRow> = stmt
            .query_map(params![layer_digest], row_to_entry)
            .context(error::CacheSnafu)?
            .collect::<rusqlite::Result<_>>()
            .context(error::CacheSnafu)?;

        let parent = parent_path.unwrap_or("/");
        let mut children: Vec<EntryRow> = all
            .into_iter()
            .filter(|e| direct_child_name(&e.name, parent).is_some())
            .collect();
        children.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        Ok(children)
    }

    /// Overlay-merged view across every peeked layer of one image: for each
    /// path, the highest-indexed layer's entry is active (`overridden =
    /// false`); lower layers defining the same path are listed after it,
    /// `overridden = true`, in descending layer order.
    pub fn merged_directory(
        &self,
        namespace: &str,
        repo: &str,
        tag: &str,
        path: &str,
    ) -> Result<Vec<MergedEntry>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT layer_digest, name, size, typeflag, is_dir, mode, uid, gid, mtime, linkname, is_symlink, layer_index
                 FROM layer_entries WHERE namespace = ?1 AND repo = ?2 AND tag = ?3",
            )
            .context(error::CacheSnafu)?;
        let rows: Vec<(EntryRow, i64)> = stmt
            .query_map(params![namespace, repo, tag], |row| {
                Ok((row_to_entry(row)?, row.get::<_, i64>(11)?))
            })
            .context(error::CacheSnafu)?
            .collect::<rusqlite::Result<_>>()
            .context(error::CacheSnafu)?;

        let mut by_path: std::collections::HashMap<String, Vec<(EntryRow, i64)>> =
            std::collections::HashMap::new();
        for (entry, layer_index) in rows {
            if direct_child_name(&entry.name, path).is_some() {
                by_path
                    .entry(entry.name.clone())
                    .or_default()
                    .push((entry, layer_index));
            }
        }

        let mut merged = Vec::new();
        let mut paths: Vec<String> = by_path.keys().cloned().collect();
        paths.sort();
        for p in paths {
            let mut group = by_path.remove(&p).unwrap();
            group.sort_by_key(|(_, layer_index)| std::cmp::Reverse(*layer_index));
            for (i, (entry, layer_index)) in group.into_iter().enumerate() {
                merged.push(MergedEntry {
                    entry,
                    layer_index,
                    overridden: i != 0,
                });
            }
        }
        Ok(merged)
    }

    /// Substring match on the normalised entry name, with optional scope
    /// filters; every hit carries full provenance.
    pub fn search_entries(
        &self,
        pattern: &str,
        namespace: Option<&str>,
        repo: Option<&str>,
        tag: Option<&str>,
        layer_index: Option<i64>,
    ) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let mut sql = String::from(
            "SELECT layer_digest, name, size, typeflag, is_dir, mode, uid, gid, mtime, linkname, is_symlink, namespace, repo, tag, layer_index
             FROM layer_entries WHERE name LIKE ?1",
        );
        let like_pattern = format!("%{pattern}%");
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(like_pattern)];

        if let Some(ns) = namespace {
            sql.push_str(" AND namespace = ?");
            sql.push_str(&(values.len() + 1).to_string());
            values.push(Box::new(ns.to_string()));
        }
        if let Some(r) = repo {
            sql.push_str(" AND repo = ?");
            sql.push_str(&(values.len() + 1).to_string());
            values.push(Box::new(r.to_string()));
        }
        if let Some(t) = tag {
            sql.push_str(" AND tag = ?");
            sql.push_str(&(values.len() + 1).to_string());
            values.push(Box::new(t.to_string()));
        }
        if let Some(idx) = layer_index {
            sql.push_str(" AND layer_index = ?");
            sql.push_str(&(values.len() + 1).to_string());
            values.push(Box::new(idx));
        }

        let mut stmt = conn.prepare(&sql).context(error::CacheSnafu)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|b| b.as_ref()).collect();
        let hits: Vec<SearchHit> = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok(SearchHit {
                    entry: row_to_entry(row)?,
                    namespace: row.get(11)?,
                    repo: row.get(12)?,
                    tag: row.get(13)?,
                    layer_index: row.get(14)?,
                })
            })
            .context(error::CacheSnafu)?
            .collect::<rusqlite::Result<_>>()
            .context(error::CacheSnafu)?;
        Ok(hits)
    }

    /// Paginated, optionally filtered, sorted view of `layer_metadata`.
    pub fn list_history(
        &self,
        query: Option<&str>,
        page: u32,
        page_size: u32,
        sort_by: HistorySort,
        order: SortOrder,
    ) -> Result<Vec<HistoryRow>> {
        let conn = self.conn.lock().expect("catalog mutex poisoned");
        let offset = (page.saturating_sub(1)) as i64 * page_size as i64;

        let sql = format!(
            "SELECT layer_digest, namespace, repo, tag, layer_index, layer_size, entries_count, bytes_downloaded, bytes_decompressed, scraped_at
             FROM layer_metadata
             WHERE (?1 IS NULL OR namespace LIKE ?1 OR repo LIKE ?1 OR tag LIKE ?1)
             ORDER BY {} {}
             LIMIT ?2 OFFSET ?3",
            sort_by.column(),
            order.sql()
        );
        let like_query = query.map(|q| format!("%{q}%"));

        let mut stmt = conn.prepare(&sql).context(error::CacheSnafu)?;
        let rows: Vec<HistoryRow> = stmt
            .query_map(
                params![like_query, page_size as i64, offset],
                |row| {
                    Ok(HistoryRow {
                        layer_digest: row.get(0)?,
                        namespace: row.get(1)?,
                        repo: row.get(2)?,
                        tag: row.get(3)?,
                        layer_index: row.get(4)?,
                        layer_size: row.get(5)?,
                        entries_count: row.get(6)?,
                        bytes_downloaded: row.get(7)?,
                        bytes_decompressed: row.get(8)?,
                        scraped_at: row.get(9)?,
                    })
                },
            )
            .context(error::CacheSnafu)?
            .collect::<rusqlite::Result<_>>()
            .context(error::CacheSnafu)?;
        Ok(rows)
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        layer_digest: row.get(0)?,
        name: row.get(1)?,
        size: row.get(2)?,
        typeflag: row.get(3)?,
        is_dir: row.get::<_, i64>(4)? != 0,
        mode: row.get(5)?,
        uid: row.get(6)?,
        gid: row.get(7)?,
        mtime: row.get(8)?,
        linkname: row.get(9)?,
        is_symlink: row.get::<_, i64>(10)? != 0,
    })
}

/// If `name` is a direct child of `parent`, return its basename.
fn direct_child_name(name: &str, parent: &str) -> Option<String> {
    let full = name.trim_start_matches('/').trim_end_matches('/');
    let parent_norm = parent.trim_start_matches('/').trim_end_matches('/');

    let rest = if parent_norm.is_empty() {
        full
    } else {
        full.strip_prefix(parent_norm)?.trim_start_matches('/')
    };

    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar_header::TarEntry;

    fn sample_entry(name: &str, is_dir: bool) -> TarEntry {
        TarEntry {
            name: name.to_string(),
            size: 10,
            typeflag: if is_dir { '5' } else { '0' },
            is_dir,
            is_symlink: false,
            mode: "-rw-r--r--".to_string(),
            uid: 0,
            gid: 0,
            mtime: "2024-01-01 00:00".to_string(),
            linkname: String::new(),
        }
    }

    #[test]
    fn save_image_config_creates_exact_layer_rows() {
        let catalog = Catalog::open_in_memory().unwrap();
        let digests = vec!["sha256:a".to_string(), "sha256:b".to_string()];
        let sizes = vec![100u64, 200u64];
        catalog
            .save_image_config(
                "sha256:cfg",
                "library",
                "alpine",
                "latest",
                "amd64",
                "{}",
                &digests,
                &sizes,
                "2024-01-01T00:00:00Z",
            )
            .unwrap();

        let status = catalog
            .get_layer_status("library", "alpine", "latest", "amd64")
            .unwrap()
            .unwrap();
        assert_eq!(status.layer_count, 2);
        assert_eq!(status.unpeeked_count, 2);
        assert_eq!(status.peeked_count, 0);
    }

    #[test]
    fn save_image_config_replaces_row_when_tag_moves_to_new_digest() {
        let catalog = Catalog::open_in_memory().unwrap();
        let digests = vec!["sha256:a".to_string()];
        let sizes = vec![100u64];
        catalog
            .save_image_config(
                "sha256:old",
                "library",
                "alpine",
                "latest",
                "amd64",
                "{}",
                &digests,
                &sizes,
                "2024-01-01T00:00:00Z",
            )
            .unwrap();

        // "latest" moved to a new config digest; this must replace the old
        // config_configs row (and its now-orphaned image_layers rows) rather
        // than update config_digest in place, which would violate the
        // image_layers -> image_configs foreign key.
        let new_digests = vec!["sha256:c".to_string(), "sha256:d".to_string()];
        let new_sizes = vec![300u64, 400u64];
        catalog
            .save_image_config(
                "sha256:new",
                "library",
                "alpine",
                "latest",
                "amd64",
                "{}",
                &new_digests,
                &new_sizes,
                "2024-01-02T00:00:00Z",
            )
            .unwrap();

        let cached = catalog
            .get_cached_config("library", "alpine", "latest", "amd64")
            .unwrap()
            .unwrap();
        assert_eq!(cached.config_digest, "sha256:new");
        assert_eq!(cached.layer_count, 2);

        let status = catalog
            .get_layer_status("library", "alpine", "latest", "amd64")
            .unwrap()
            .unwrap();
        assert_eq!(status.layer_count, 2);
        assert_eq!(status.layers[0].digest, "sha256:c");
        assert_eq!(status.layers[1].digest, "sha256:d");
    }

    #[test]
    fn mark_layer_peeked_updates_status() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .save_image_config(
                "sha256:cfg",
                "library",
                "alpine",
                "latest",
                "amd64",
                "{}",
                &["sha256:a".to_string()],
                &[100u64],
                "2024-01-01T00:00:00Z",
            )
            .unwrap();
        catalog
            .mark_layer_peeked("sha256:cfg", 0, 42, "2024-01-01T00:01:00Z")
            .unwrap();
        let status = catalog
            .get_layer_status("library", "alpine", "latest", "amd64")
            .unwrap()
            .unwrap();
        assert!(status.layers[0].peeked);
        assert_eq!(status.layers[0].entries_count, 42);
    }

    #[test]
    fn save_peek_result_then_list_entries_roundtrips() {
        let catalog = Catalog::open_in_memory().unwrap();
        let result = PeekResult {
            digest: "sha256:layer0".to_string(),
            partial: false,
            bytes_downloaded: 1000,
            bytes_decompressed: 2000,
            entries_found: 2,
            entries: vec![sample_entry("etc/", true), sample_entry("etc/hosts", false)],
        };
        let outcome = catalog
            .save_peek_result(
                "library",
                "alpine",
                "latest",
                0,
                100,
                &result,
                "2024-01-01T00:00:00Z",
                OverwritePolicy::Skip,
            )
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let entries = catalog.list_entries("sha256:layer0", Some("etc")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "etc/hosts");
    }

    #[test]
    fn overwrite_policy_skip_by_default() {
        let catalog = Catalog::open_in_memory().unwrap();
        let result = PeekResult {
            digest: "sha256:layer0".to_string(),
            partial: false,
            bytes_downloaded: 1,
            bytes_decompressed: 1,
            entries_found: 1,
            entries: vec![sample_entry("a", false)],
        };
        catalog
            .save_peek_result(
                "library",
                "alpine",
                "latest",
                0,
                100,
                &result,
                "2024-01-01T00:00:00Z",
                OverwritePolicy::Skip,
            )
            .unwrap();
        let second = catalog
            .save_peek_result(
                "library",
                "alpine",
                "latest",
                0,
                100,
                &result,
                "2024-01-02T00:00:00Z",
                OverwritePolicy::Skip,
            )
            .unwrap();
        assert_eq!(second, WriteOutcome::Skipped);
    }

    #[test]
    fn merged_directory_prefers_highest_layer_index() {
        let catalog = Catalog::open_in_memory().unwrap();
        let base = PeekResult {
            digest: "sha256:layer0".to_string(),
            partial: false,
            bytes_downloaded: 1,
            bytes_decompressed: 1,
            entries_found: 1,
            entries: vec![sample_entry("etc/hosts", false)],
        };
        let top = PeekResult {
            digest: "sha256:layer1".to_string(),
            partial: false,
            bytes_downloaded: 1,
            bytes_decompressed: 1,
            entries_found: 1,
            entries: vec![sample_entry("etc/hosts", false)],
        };
        catalog
            .save_peek_result(
                "library", "alpine", "latest", 0, 100, &base, "2024-01-01T00:00:00Z",
                OverwritePolicy::Skip,
            )
            .unwrap();
        catalog
            .save_peek_result(
                "library", "alpine", "latest", 1, 100, &top, "2024-01-01T00:00:01Z",
                OverwritePolicy::Skip,
            )
            .unwrap();

        let merged = catalog
            .merged_directory("library", "alpine", "latest", "etc")
            .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].layer_index, 1);
        assert!(!merged[0].overridden);
        assert_eq!(merged[1].layer_index, 0);
        assert!(merged[1].overridden);
    }

    #[test]
    fn search_entries_filters_by_scope() {
        let catalog = Catalog::open_in_memory().unwrap();
        let result = PeekResult {
            digest: "sha256:layer0".to_string(),
            partial: false,
            bytes_downloaded: 1,
            bytes_decompressed: 1,
            entries_found: 1,
            entries: vec![sample_entry("etc/shadow", false)],
        };
        catalog
            .save_peek_result(
                "alpine", "git", "v2.52.0", 0, 100, &result, "2024-01-01T00:00:00Z",
                OverwritePolicy::Skip,
            )
            .unwrap();
        let hits = catalog
            .search_entries("shadow", Some("alpine"), Some("git"), Some("v2.52.0"), Some(0))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.name, "etc/shadow");
    }
}
