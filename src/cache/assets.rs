// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Remote asset cache: local copies of engine dependencies.
//!
//! While compiling, the engine resolves packages and fonts against its remote
//! endpoint and records each attempt in its cache manifest: a "found" map
//! (key -> path in engine storage) and a "missing" set per asset class. After
//! every successful compile the worker diffs that manifest against what this
//! cache already holds, copies each newly found asset into host storage, and
//! writes the lot back into the engine's persistent cache on the next startup
//! so a warm engine never re-downloads anything.
//!
//! The missing sets are negative cache: they stop the engine from re-asking
//! the remote for things it does not have. A negative answer is only valid
//! for the endpoint that gave it, so switching endpoints clears the missing
//! sets, and the persisted index keeps them tagged with the endpoint they
//! were observed under.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::CacheError;
use crate::protocol::CacheManifest;

const INDEX_FILE: &str = "assets-index.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Package,
    Font,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Package => "package",
            AssetClass::Font => "font",
        }
    }

    fn subdir(&self) -> &'static str {
        match self {
            AssetClass::Package => "packages",
            AssetClass::Font => "fonts",
        }
    }
}

/// An asset the engine resolved for the first time; the worker still has to
/// fetch its bytes out of engine storage and [`commit`](RemoteAssetCache::commit) it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    pub class: AssetClass,
    pub key: String,
    /// Where the engine put its copy, fed to `FetchFile`.
    pub engine_path: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ClassState {
    /// key -> file name under this class's host subdirectory (and in the
    /// engine's persistent cache).
    found: BTreeMap<String, String>,
    missing: BTreeSet<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AssetIndex {
    endpoint: String,
    packages: ClassState,
    fonts: ClassState,
}

pub struct RemoteAssetCache {
    dir: Option<PathBuf>,
    endpoint: String,
    packages: ClassState,
    fonts: ClassState,
}

impl RemoteAssetCache {
    pub fn in_memory(endpoint: impl Into<String>) -> Self {
        Self {
            dir: None,
            endpoint: endpoint.into(),
            packages: ClassState::default(),
            fonts: ClassState::default(),
        }
    }

    /// Open (or create) a persistent cache under `dir` for `endpoint`.
    ///
    /// A persisted index recorded under a different endpoint keeps its found
    /// assets (bytes are bytes) but loses its missing sets.
    pub fn open(dir: impl Into<PathBuf>, endpoint: impl Into<String>) -> Result<Self, CacheError> {
        let dir = dir.into();
        let endpoint = endpoint.into();
        fs::create_dir_all(dir.join(AssetClass::Package.subdir()))?;
        fs::create_dir_all(dir.join(AssetClass::Font.subdir()))?;

        let index_path = dir.join(INDEX_FILE);
        let mut cache = Self {
            dir: Some(dir),
            endpoint: endpoint.clone(),
            packages: ClassState::default(),
            fonts: ClassState::default(),
        };

        if index_path.exists() {
            let raw = fs::read_to_string(&index_path)?;
            let mut index: AssetIndex = serde_json::from_str(&raw)?;
            if index.endpoint != endpoint {
                index.packages.missing.clear();
                index.fonts.missing.clear();
            }
            cache.packages = index.packages;
            cache.fonts = index.fonts;
            cache.save()?;
        }

        Ok(cache)
    }

    fn class(&self, class: AssetClass) -> &ClassState {
        match class {
            AssetClass::Package => &self.packages,
            AssetClass::Font => &self.fonts,
        }
    }

    fn class_mut(&mut self, class: AssetClass) -> &mut ClassState {
        match class {
            AssetClass::Package => &mut self.packages,
            AssetClass::Font => &mut self.fonts,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Switch remote endpoints. Negative entries never apply across
    /// endpoints, so a change wipes both missing sets.
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) -> Result<(), CacheError> {
        let endpoint = endpoint.into();
        if endpoint != self.endpoint {
            self.endpoint = endpoint;
            self.packages.missing.clear();
            self.fonts.missing.clear();
            self.save()?;
        }
        Ok(())
    }

    pub fn is_known_missing(&self, class: AssetClass, key: &str) -> bool {
        self.class(class).missing.contains(key)
    }

    pub fn found_file(&self, class: AssetClass, key: &str) -> Option<&String> {
        self.class(class).found.get(key)
    }

    /// Diff the engine's manifest against this cache.
    ///
    /// Newly found keys come back as [`NewAsset`]s for the worker to fetch;
    /// newly missing keys merge straight into the negative sets.
    pub fn absorb(&mut self, manifest: &CacheManifest) -> Result<Vec<NewAsset>, CacheError> {
        let mut fresh = Vec::new();
        for (class, found, missing) in [
            (AssetClass::Package, &manifest.packages_found, &manifest.packages_missing),
            (AssetClass::Font, &manifest.fonts_found, &manifest.fonts_missing),
        ] {
            for (key, engine_path) in found {
                if !self.class(class).found.contains_key(key) {
                    fresh.push(NewAsset {
                        class,
                        key: key.clone(),
                        engine_path: engine_path.clone(),
                    });
                }
            }
            let state = self.class_mut(class);
            for key in missing {
                state.missing.insert(key.clone());
            }
        }
        self.save()?;
        Ok(fresh)
    }

    /// Record a fetched asset: write its bytes into host storage and mark the
    /// key found.
    pub fn commit(&mut self, asset: &NewAsset, bytes: &[u8]) -> Result<(), CacheError> {
        let file_name = asset
            .engine_path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(asset.key.as_str())
            .to_string();
        if let Some(dir) = &self.dir {
            fs::write(dir.join(asset.class.subdir()).join(&file_name), bytes)?;
        }
        self.class_mut(asset.class).found.insert(asset.key.clone(), file_name);
        self.save()
    }

    /// Everything needed to warm a fresh engine's persistent cache:
    /// `(file name, bytes)` pairs read back from host storage.
    pub fn preload_entries(&self) -> Result<Vec<(AssetClass, String, Vec<u8>)>, CacheError> {
        let Some(dir) = &self.dir else { return Ok(Vec::new()) };
        let mut entries = Vec::new();
        for class in [AssetClass::Package, AssetClass::Font] {
            for file_name in self.class(class).found.values() {
                let path = dir.join(class.subdir()).join(file_name);
                let bytes = fs::read(&path)?;
                entries.push((class, file_name.clone(), bytes));
            }
        }
        Ok(entries)
    }

    fn save(&self) -> Result<(), CacheError> {
        let Some(dir) = &self.dir else { return Ok(()) };
        let index = AssetIndex {
            endpoint: self.endpoint.clone(),
            packages: self.packages.clone(),
            fonts: self.fonts.clone(),
        };
        fs::write(dir.join(INDEX_FILE), serde_json::to_string_pretty(&index)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest_with(found: &[(&str, &str)], missing: &[&str]) -> CacheManifest {
        CacheManifest {
            packages_found: found
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            packages_missing: missing.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn absorb_reports_only_newly_found_assets() {
        let mut cache = RemoteAssetCache::in_memory("https://mirror.a");
        let manifest = manifest_with(&[("tikz.sty", "/tex/tikz.sty")], &[]);

        let fresh = cache.absorb(&manifest).unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].key, "tikz.sty");
        cache.commit(&fresh[0], b"% tikz").unwrap();

        // Same manifest again: nothing new.
        assert!(cache.absorb(&manifest).unwrap().is_empty());
        assert_eq!(cache.found_file(AssetClass::Package, "tikz.sty").unwrap(), "tikz.sty");
    }

    #[test]
    fn absorb_merges_missing_keys() {
        let mut cache = RemoteAssetCache::in_memory("https://mirror.a");
        cache.absorb(&manifest_with(&[], &["nonexistent.sty"])).unwrap();
        assert!(cache.is_known_missing(AssetClass::Package, "nonexistent.sty"));
        assert!(!cache.is_known_missing(AssetClass::Font, "nonexistent.sty"));
    }

    #[test]
    fn endpoint_change_clears_negative_entries_only() {
        let mut cache = RemoteAssetCache::in_memory("https://mirror.a");
        let fresh = cache
            .absorb(&manifest_with(&[("tikz.sty", "/tex/tikz.sty")], &["gone.sty"]))
            .unwrap();
        cache.commit(&fresh[0], b"% tikz").unwrap();

        cache.set_endpoint("https://mirror.b").unwrap();
        assert!(!cache.is_known_missing(AssetClass::Package, "gone.sty"));
        assert!(cache.found_file(AssetClass::Package, "tikz.sty").is_some());
    }

    #[test]
    fn setting_the_same_endpoint_keeps_negative_entries() {
        let mut cache = RemoteAssetCache::in_memory("https://mirror.a");
        cache.absorb(&manifest_with(&[], &["gone.sty"])).unwrap();
        cache.set_endpoint("https://mirror.a").unwrap();
        assert!(cache.is_known_missing(AssetClass::Package, "gone.sty"));
    }

    #[test]
    fn persisted_missing_entries_do_not_survive_an_endpoint_switch() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = RemoteAssetCache::open(dir.path(), "https://mirror.a").unwrap();
            let fresh = cache
                .absorb(&manifest_with(&[("tikz.sty", "/tex/tikz.sty")], &["gone.sty"]))
                .unwrap();
            cache.commit(&fresh[0], b"% tikz").unwrap();
        }

        // Same endpoint: both halves come back.
        {
            let cache = RemoteAssetCache::open(dir.path(), "https://mirror.a").unwrap();
            assert!(cache.is_known_missing(AssetClass::Package, "gone.sty"));
            assert!(cache.found_file(AssetClass::Package, "tikz.sty").is_some());
        }

        // Different endpoint: found survives, missing does not.
        let cache = RemoteAssetCache::open(dir.path(), "https://mirror.b").unwrap();
        assert!(!cache.is_known_missing(AssetClass::Package, "gone.sty"));
        assert!(cache.found_file(AssetClass::Package, "tikz.sty").is_some());
    }

    #[test]
    fn preload_round_trips_committed_bytes() {
        let dir = TempDir::new().unwrap();
        let mut cache = RemoteAssetCache::open(dir.path(), "https://mirror.a").unwrap();
        let fresh = cache
            .absorb(&CacheManifest {
                fonts_found: [("lm10".to_string(), "/fonts/lmroman10.otf".to_string())]
                    .into_iter()
                    .collect(),
                ..Default::default()
            })
            .unwrap();
        cache.commit(&fresh[0], b"OTTO fake font").unwrap();

        let entries = cache.preload_entries().unwrap();
        assert_eq!(entries.len(), 1);
        let (class, name, bytes) = &entries[0];
        assert_eq!(*class, AssetClass::Font);
        assert_eq!(name, "lmroman10.otf");
        assert_eq!(bytes, b"OTTO fake font");
    }
}
