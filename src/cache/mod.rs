// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Content-addressed caches.
//!
//! Two stores keep the engine from doing redundant work: the render cache
//! maps a hash of the normalized source text to a finished artifact, and the
//! remote asset cache keeps local copies of the packages and fonts the
//! engine's dependency resolution fetched from its remote endpoint —
//! including negative entries for assets known to be missing there.

mod assets;
mod render;

pub use assets::{AssetClass, NewAsset, RemoteAssetCache};
pub use render::RenderCache;

use sha2::{Digest, Sha256};

/// Collapse every run of whitespace to a single space and trim the ends.
///
/// Reformatting a block without changing its content must not invalidate its
/// render, so the cache key is computed over this normalized form.
pub fn normalize_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut in_whitespace = false;
    for ch in source.chars() {
        if ch.is_whitespace() {
            in_whitespace = true;
        } else {
            if in_whitespace && !out.is_empty() {
                out.push(' ');
            }
            in_whitespace = false;
            out.push(ch);
        }
    }
    out
}

/// Stable content key for a source block: SHA-256 over the normalized text.
pub fn source_key(source: &str) -> String {
    let normalized = normalize_source(source);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
