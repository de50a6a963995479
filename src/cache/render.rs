// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Render cache: source hash -> finished artifact.
//!
//! Every entry also records the set of host document paths that reference it.
//! One rendered block may be embedded from several documents; storing a second
//! origin appends to the set instead of overwriting, so eviction and
//! invalidation can tell when a render is shared. Entries leave the cache only
//! through explicit invalidation or a full clear — there is no TTL.
//!
//! Persistence is plain files: artifacts live as `<hash>.pdf` next to a
//! `render-index.json` mapping hash to origin set. The index is loaded once at
//! startup and rewritten after every mutation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::errors::CacheError;

const INDEX_FILE: &str = "render-index.json";

#[derive(Debug, Clone)]
struct RenderEntry {
    artifact: Vec<u8>,
    origins: BTreeSet<String>,
}

pub struct RenderCache {
    dir: Option<PathBuf>,
    entries: HashMap<String, RenderEntry>,
}

impl RenderCache {
    /// Volatile cache with no backing directory.
    pub fn in_memory() -> Self {
        Self { dir: None, entries: HashMap::new() }
    }

    /// Open (or create) a persistent cache under `dir`.
    ///
    /// Index entries whose artifact file has gone missing are dropped with a
    /// warning rather than failing the whole load.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut entries = HashMap::new();
        let index_path = dir.join(INDEX_FILE);
        if index_path.exists() {
            let raw = fs::read_to_string(&index_path)?;
            let index: BTreeMap<String, BTreeSet<String>> = serde_json::from_str(&raw)?;
            for (hash, origins) in index {
                let artifact_path = Self::artifact_path(&dir, &hash);
                match fs::read(&artifact_path) {
                    Ok(artifact) => {
                        entries.insert(hash, RenderEntry { artifact, origins });
                    }
                    Err(e) => {
                        warn!(hash = %hash, error = %e, "dropping index entry with missing artifact");
                    }
                }
            }
        }

        Ok(Self { dir: Some(dir), entries })
    }

    fn artifact_path(dir: &Path, hash: &str) -> PathBuf {
        dir.join(format!("{hash}.pdf"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn lookup(&self, hash: &str) -> Option<Vec<u8>> {
        self.entries.get(hash).map(|entry| entry.artifact.clone())
    }

    /// Host document paths referencing this render.
    pub fn origins(&self, hash: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(hash).map(|entry| &entry.origins)
    }

    /// True when more than one document references this render.
    pub fn is_shared(&self, hash: &str) -> bool {
        self.origins(hash).map(|origins| origins.len() > 1).unwrap_or(false)
    }

    /// Store an artifact, or append another origin to an existing entry.
    pub fn store(
        &mut self,
        hash: &str,
        artifact: Vec<u8>,
        origin: &str,
    ) -> Result<(), CacheError> {
        match self.entries.get_mut(hash) {
            Some(entry) => {
                entry.origins.insert(origin.to_string());
            }
            None => {
                let mut origins = BTreeSet::new();
                origins.insert(origin.to_string());
                if let Some(dir) = &self.dir {
                    fs::write(Self::artifact_path(dir, hash), &artifact)?;
                }
                self.entries.insert(hash.to_string(), RenderEntry { artifact, origins });
            }
        }
        self.save_index()
    }

    /// Drop one entry (remove-and-rerender).
    pub fn invalidate(&mut self, hash: &str) -> Result<(), CacheError> {
        if self.entries.remove(hash).is_some() {
            if let Some(dir) = &self.dir {
                let path = Self::artifact_path(dir, hash);
                if path.exists() {
                    fs::remove_file(path)?;
                }
            }
            self.save_index()?;
        }
        Ok(())
    }

    /// Drop everything (manual cache clearing).
    pub fn clear(&mut self) -> Result<(), CacheError> {
        if let Some(dir) = &self.dir {
            for hash in self.entries.keys() {
                let path = Self::artifact_path(dir, hash);
                if path.exists() {
                    fs::remove_file(path)?;
                }
            }
        }
        self.entries.clear();
        self.save_index()
    }

    fn save_index(&self) -> Result<(), CacheError> {
        let Some(dir) = &self.dir else { return Ok(()) };
        let index: BTreeMap<&String, &BTreeSet<String>> =
            self.entries.iter().map(|(hash, entry)| (hash, &entry.origins)).collect();
        let raw = serde_json::to_string_pretty(&index)?;
        fs::write(dir.join(INDEX_FILE), raw)?;
        Ok(())
    }
}
