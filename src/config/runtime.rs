// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::backends::wasm::WasmEngineHost;
use crate::cache::{RemoteAssetCache, RenderCache};
use crate::config::Config;
use crate::engine::EngineAdapter;
use crate::observability::messages::engine::EngineLoaded;
use crate::observability::messages::StructuredLog;
use crate::overlay::{SharedOverlay, VirtualFileOverlay};
use crate::queue::{CompileQueue, QueueOptions};
use crate::traits::EngineTransport;

/// The assembled pipeline: the queue handle plus the overlay handle callers
/// use to stage auxiliary files.
pub struct Kiln {
    pub queue: CompileQueue,
    pub overlay: SharedOverlay,
}

/// Pipeline builder - wires transport, adapter, caches, overlay, and queue
/// from configuration.
pub struct KilnBuilder;

impl KilnBuilder {
    /// Build the complete pipeline from configuration, hosting the engine
    /// module configured at `engine.module`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Kiln> {
        let fuel = config.engine.fuel.validate_and_clamp(config.engine.fuel.get_default());
        let host = WasmEngineHost::new(&config.engine.module, fuel)?;
        EngineLoaded { backend: "wasm", fuel_per_command: fuel }.log();
        Self::assemble(Box::new(host), config).await
    }

    /// Wire an already-constructed transport into the full pipeline.
    ///
    /// Warm-up happens here, before the queue starts draining: the engine is
    /// pointed at the configured remote endpoint and every previously cached
    /// asset is written back into its persistent storage, so a fresh engine
    /// never re-downloads what the host already has.
    pub async fn assemble(
        transport: Box<dyn EngineTransport>,
        config: &Config,
    ) -> anyhow::Result<Kiln> {
        let mut adapter = EngineAdapter::new(transport);
        adapter.load_engine()?;

        let cache_dir = Path::new(&config.cache.dir);
        let render_cache = RenderCache::open(cache_dir.join("render"))?;
        let assets = RemoteAssetCache::open(cache_dir.join("assets"), &config.engine.endpoint)?;

        adapter.set_endpoint(config.engine.endpoint.clone()).await?;
        for (_class, name, bytes) in assets.preload_entries()? {
            adapter.write_cache_file(name, bytes).await?;
        }

        let overlay = SharedOverlay::new(VirtualFileOverlay::new(
            config.overlay.enabled,
            Duration::from_millis(config.overlay.config_timeout_ms),
        ));
        let queue = CompileQueue::spawn(
            adapter,
            overlay.clone(),
            Arc::new(Mutex::new(render_cache)),
            Arc::new(Mutex::new(assets)),
            QueueOptions { cooldown: Duration::from_millis(config.engine.cooldown_ms) },
        );

        Ok(Kiln { queue, overlay })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::StubEngine;
    use crate::config::{CacheConfig, EngineConfig, FuelConfig, OverlayConfig};
    use crate::protocol::{CacheManifest, CommandTag, EngineCommand};
    use crate::queue::CompileRequest;
    use tempfile::TempDir;

    fn test_config(cache_dir: &std::path::Path) -> Config {
        Config {
            engine: EngineConfig {
                module: "unused.wasm".to_string(),
                fuel: FuelConfig::default(),
                cooldown_ms: 0,
                endpoint: "https://mirror.a".to_string(),
            },
            cache: CacheConfig { dir: cache_dir.display().to_string() },
            overlay: OverlayConfig { enabled: false, config_timeout_ms: 100 },
        }
    }

    #[tokio::test]
    async fn assemble_points_the_engine_at_the_endpoint() {
        let dir = TempDir::new().unwrap();
        let (stub, journal) = StubEngine::new();
        let kiln = KilnBuilder::assemble(Box::new(stub), &test_config(dir.path())).await.unwrap();

        let commands = journal.commands();
        assert!(matches!(
            &commands[0],
            EngineCommand::SetEndpoint { url } if url == "https://mirror.a"
        ));

        kiln.queue.shutdown().await;
    }

    #[tokio::test]
    async fn cached_assets_are_preloaded_into_a_fresh_engine() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());

        // First run: the engine resolves one package; the worker harvests it.
        {
            let (mut stub, _journal) = StubEngine::new();
            let mut manifest = CacheManifest::default();
            manifest
                .packages_found
                .insert("tikz.sty".to_string(), "/texmf/tex/tikz.sty".to_string());
            stub.push_manifest(manifest);
            stub.provide_file("/texmf/tex/tikz.sty", b"% tikz".to_vec());

            let kiln = KilnBuilder::assemble(Box::new(stub), &config).await.unwrap();
            kiln.queue
                .submit(CompileRequest {
                    block_id: "b1".into(),
                    source: "\\frac{1}{2}".into(),
                    origin: "doc.md".into(),
                    auto_includes: vec![],
                })
                .await
                .await
                .unwrap()
                .unwrap();
            kiln.queue.shutdown().await;
        }

        // Second run: the harvested asset is written back before any compile.
        let (stub, journal) = StubEngine::new();
        let kiln = KilnBuilder::assemble(Box::new(stub), &config).await.unwrap();
        let commands = journal.commands();
        assert!(commands.iter().any(|command| matches!(
            command,
            EngineCommand::WriteCacheFile { name, .. } if name == "tikz.sty"
        )));
        assert_eq!(commands[0].tag(), CommandTag::SetEndpoint);

        kiln.queue.shutdown().await;
    }
}
