// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The queue's single worker: the only code that touches the engine.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::warn;

use crate::cache::{RemoteAssetCache, RenderCache};
use crate::engine::EngineAdapter;
use crate::errors::{EngineError, OverlayError, TaskError};
use crate::log::{classify, parse_log};
use crate::observability::messages::engine::EngineHandleLost;
use crate::observability::messages::queue::{AssetFetched, CompileFinished, RenderCacheHit};
use crate::observability::messages::StructuredLog;
use crate::overlay::SharedOverlay;
use crate::protocol::CompileResult;

use super::{CompileRequest, QueueOptions, QueueShared, Rendered, Task, MAIN_FILE};

pub(super) struct WorkerContext {
    pub(super) shared: Arc<QueueShared>,
    pub(super) adapter: EngineAdapter,
    pub(super) overlay: SharedOverlay,
    pub(super) render_cache: Arc<Mutex<RenderCache>>,
    pub(super) assets: Arc<Mutex<RemoteAssetCache>>,
    pub(super) options: QueueOptions,
}

enum DrainOutcome {
    /// Completed without the engine; no cooldown.
    CacheHit,
    /// A real compile ran (success or compiler failure); cooldown applies.
    Compiled,
    /// The task failed before reaching the engine; no cooldown.
    Failed,
    /// Protocol or transport fault: the engine handle is gone.
    EngineLost,
}

pub(super) async fn run(mut ctx: WorkerContext) {
    loop {
        if ctx.shared.cancel.is_cancelled() {
            break;
        }
        let task = ctx.shared.pending.lock().await.pop_front();
        match task {
            Some(task) => match drain_one(&mut ctx, task).await {
                DrainOutcome::Compiled => {
                    tokio::select! {
                        _ = ctx.shared.cancel.cancelled() => break,
                        _ = tokio::time::sleep(ctx.options.cooldown) => {}
                    }
                }
                DrainOutcome::CacheHit | DrainOutcome::Failed => {}
                DrainOutcome::EngineLost => break,
            },
            None => {
                tokio::select! {
                    _ = ctx.shared.cancel.cancelled() => break,
                    _ = ctx.shared.notify.notified() => {}
                }
            }
        }
    }

    // Whatever is still queued will never run.
    let mut pending = ctx.shared.pending.lock().await;
    while let Some(task) = pending.pop_front() {
        let _ = task.done.send(Err(TaskError::Aborted));
    }
    drop(pending);

    if ctx.adapter.is_ready() {
        let _ = ctx.adapter.shutdown().await;
    }
}

async fn drain_one(ctx: &mut WorkerContext, task: Task) -> DrainOutcome {
    // Cache short-circuit: skip the engine entirely.
    {
        let mut cache = ctx.render_cache.lock().await;
        if let Some(artifact) = cache.lookup(&task.source_hash) {
            RenderCacheHit { block_id: &task.request.block_id, source_hash: &task.source_hash }
                .log();
            if let Err(error) = cache.store(&task.source_hash, artifact.clone(), &task.request.origin)
            {
                warn!(error = %error, "failed to record cache origin");
            }
            let _ = task.done.send(Ok(Rendered { artifact, from_cache: true }));
            return DrainOutcome::CacheHit;
        }
    }

    if let Err(error) = ctx.overlay.sync(&mut ctx.adapter).await {
        let lost = matches!(&error, OverlayError::Engine(e) if e.is_fatal());
        if lost {
            EngineHandleLost { error: &error }.log();
        }
        let _ = task.done.send(Err(TaskError::Overlay(error)));
        return if lost { DrainOutcome::EngineLost } else { DrainOutcome::Failed };
    }

    let started = Instant::now();
    let result = match stage_and_compile(ctx, &task.request).await {
        Ok(result) => result,
        Err(error) => {
            let lost = error.is_fatal();
            if lost {
                EngineHandleLost { error: &error }.log();
            }
            let _ = task.done.send(Err(TaskError::Engine(error)));
            return if lost { DrainOutcome::EngineLost } else { DrainOutcome::Failed };
        }
    };
    CompileFinished {
        block_id: &task.request.block_id,
        status: result.status,
        duration_ms: started.elapsed().as_millis(),
    }
    .log();

    let mut parsed = parse_log(&result.log);
    parsed.dedup();

    match (result.status, result.artifact) {
        (0, Some(artifact)) => {
            {
                let mut cache = ctx.render_cache.lock().await;
                if let Err(error) =
                    cache.store(&task.source_hash, artifact.clone(), &task.request.origin)
                {
                    let _ = task.done.send(Err(TaskError::Cache(error)));
                    return DrainOutcome::Compiled;
                }
            }
            let _ = task.done.send(Ok(Rendered { artifact, from_cache: false }));

            if let Err(error) = harvest_assets(ctx).await {
                if error.is_fatal() {
                    EngineHandleLost { error: &error }.log();
                    return DrainOutcome::EngineLost;
                }
                warn!(error = %error, "asset harvest failed after compile");
            }

            coalesce_cached_tasks(ctx).await;
            DrainOutcome::Compiled
        }
        (status, _) => {
            let diagnostics = classify(&parsed);
            let _ = task.done.send(Err(TaskError::Compile { status, diagnostics }));
            DrainOutcome::Compiled
        }
    }
}

/// Write the composed entry file, select it, and run the compiler.
async fn stage_and_compile(
    ctx: &mut WorkerContext,
    request: &CompileRequest,
) -> Result<CompileResult, EngineError> {
    let auto_use = ctx.overlay.auto_use_names().await;
    let main = compose_main_file(&auto_use, request);
    ctx.adapter.write_file(MAIN_FILE, main).await?;
    ctx.adapter.set_main_file(MAIN_FILE).await?;
    ctx.adapter.compile().await
}

/// The staged entry file: auto-use overlay inputs, then the task's own
/// includes, then the block source.
fn compose_main_file(auto_use: &[String], request: &CompileRequest) -> String {
    let mut includes: Vec<&String> = auto_use.iter().collect();
    for name in &request.auto_includes {
        if !includes.contains(&name) {
            includes.push(name);
        }
    }
    let mut main = String::new();
    for name in includes {
        main.push_str("\\input{");
        main.push_str(name);
        main.push_str("}\n");
    }
    main.push_str(&request.source);
    main.push('\n');
    main
}

/// Pull newly resolved remote assets out of engine storage into the host
/// cache. Host-side cache errors are logged and skipped; engine errors
/// propagate so the caller can distinguish fatal ones.
async fn harvest_assets(ctx: &mut WorkerContext) -> Result<(), EngineError> {
    let manifest = ctx.adapter.fetch_cache_manifest().await?;
    let fresh = {
        let mut assets = ctx.assets.lock().await;
        match assets.absorb(&manifest) {
            Ok(fresh) => fresh,
            Err(error) => {
                warn!(error = %error, "failed to absorb engine cache manifest");
                return Ok(());
            }
        }
    };
    for asset in fresh {
        let bytes = ctx.adapter.fetch_file(asset.engine_path.clone()).await?;
        let mut assets = ctx.assets.lock().await;
        match assets.commit(&asset, &bytes) {
            Ok(()) => AssetFetched { class: asset.class.as_str(), key: &asset.key }.log(),
            Err(error) => warn!(error = %error, key = %asset.key, "failed to store fetched asset"),
        }
    }
    Ok(())
}

/// Complete any queued task whose content is now cached — duplicate work
/// submitted while the render for the same content was in flight.
async fn coalesce_cached_tasks(ctx: &mut WorkerContext) {
    let mut pending = ctx.shared.pending.lock().await;
    let mut cache = ctx.render_cache.lock().await;
    let mut index = 0;
    while index < pending.len() {
        let hit = cache.lookup(&pending[index].source_hash);
        match hit {
            Some(artifact) => {
                if let Some(task) = pending.remove(index) {
                    RenderCacheHit {
                        block_id: &task.request.block_id,
                        source_hash: &task.source_hash,
                    }
                    .log();
                    if let Err(error) =
                        cache.store(&task.source_hash, artifact.clone(), &task.request.origin)
                    {
                        warn!(error = %error, "failed to record cache origin");
                    }
                    let _ = task.done.send(Ok(Rendered { artifact, from_cache: true }));
                }
            }
            None => index += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source: &str, includes: &[&str]) -> CompileRequest {
        CompileRequest {
            block_id: "b".into(),
            source: source.into(),
            origin: "doc.md".into(),
            auto_includes: includes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn main_file_prepends_inputs_in_order() {
        let auto = vec!["preamble.tex".to_string()];
        let main = compose_main_file(&auto, &request("x^2", &["extra.tex"]));
        assert_eq!(main, "\\input{preamble.tex}\n\\input{extra.tex}\nx^2\n");
    }

    #[test]
    fn duplicate_includes_are_dropped() {
        let auto = vec!["preamble.tex".to_string()];
        let main = compose_main_file(&auto, &request("x", &["preamble.tex"]));
        assert_eq!(main, "\\input{preamble.tex}\nx\n");
    }

    #[test]
    fn bare_source_gets_no_includes() {
        let main = compose_main_file(&[], &request("\\frac{1}{2}", &[]));
        assert_eq!(main, "\\frac{1}{2}\n");
    }
}
