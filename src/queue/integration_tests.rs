// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end queue tests against the scripted stub engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::backends::stub::{StubEngine, StubJournal};
use crate::cache::{source_key, AssetClass, RemoteAssetCache, RenderCache};
use crate::engine::{EngineAdapter, EngineState};
use crate::errors::TaskError;
use crate::log::DiagnosticCategory;
use crate::overlay::{SharedOverlay, VirtualFile, VirtualFileOverlay};
use crate::protocol::{CacheManifest, CompileResult, EngineCommand, FileData};
use crate::queue::{CompileQueue, CompileRequest, QueueOptions, MAIN_FILE};

fn disabled_overlay() -> SharedOverlay {
    SharedOverlay::new(VirtualFileOverlay::new(false, Duration::from_millis(100)))
}

fn options(cooldown_ms: u64) -> QueueOptions {
    QueueOptions { cooldown: Duration::from_millis(cooldown_ms) }
}

fn spawn_queue(stub: StubEngine, overlay: SharedOverlay, options: QueueOptions) -> CompileQueue {
    let mut adapter = EngineAdapter::new(Box::new(stub));
    adapter.load_engine().expect("load engine");
    CompileQueue::spawn(
        adapter,
        overlay,
        Arc::new(Mutex::new(RenderCache::in_memory())),
        Arc::new(Mutex::new(RemoteAssetCache::in_memory("https://mirror.a"))),
        options,
    )
}

fn request(block_id: &str, source: &str) -> CompileRequest {
    CompileRequest {
        block_id: block_id.to_string(),
        source: source.to_string(),
        origin: "notes/doc.md".to_string(),
        auto_includes: Vec::new(),
    }
}

fn staged_main_files(journal: &StubJournal) -> Vec<String> {
    journal
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            EngineCommand::WriteFile { name, data: FileData::Text(text) } if name == MAIN_FILE => {
                Some(text)
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn first_render_compiles_then_the_cache_answers() {
    let (stub, journal) = StubEngine::new();
    let queue = spawn_queue(stub, disabled_overlay(), options(0));

    let first = queue.submit(request("b1", "\\frac{1}{2}")).await.await.unwrap().unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.artifact, b"%PDF-1.5 stub".to_vec());
    assert_eq!(journal.compile_count(), 1);

    // Same normalized source again: cache hit, engine untouched.
    let second = queue.submit(request("b1", "\\frac{1}{2}")).await.await.unwrap().unwrap();
    assert!(second.from_cache);
    assert_eq!(second.artifact, first.artifact);
    assert_eq!(journal.compile_count(), 1);

    // Whitespace-only reformatting also hits.
    let third = queue.submit(request("b9", "  \\frac{1}{2}\n")).await.await.unwrap().unwrap();
    assert!(third.from_cache);
    assert_eq!(journal.compile_count(), 1);

    queue.shutdown().await;
}

#[tokio::test]
async fn newest_submission_for_a_block_wins() {
    let (mut stub, journal) = StubEngine::new();
    stub.set_roundtrip_delay(Duration::from_millis(25));
    let queue = spawn_queue(stub, disabled_overlay(), options(0));

    // Occupy the engine so the b2 submissions stay queued.
    let warm = queue.submit(request("warm", "warmup")).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let stale = queue.submit(request("b2", "version one")).await;
    let fresh = queue.submit(request("b2", "version two")).await;
    assert_eq!(queue.len().await, 1);

    warm.await.unwrap().unwrap();
    match stale.await.unwrap() {
        Err(TaskError::Superseded) => {}
        other => panic!("expected Superseded, got {other:?}"),
    }
    let rendered = fresh.await.unwrap().unwrap();
    assert!(!rendered.from_cache);

    // Exactly two compiles ran, and only the second b2 content was staged.
    assert_eq!(journal.compile_count(), 2);
    let mains = staged_main_files(&journal);
    assert!(mains.iter().any(|main| main.contains("version two")));
    assert!(!mains.iter().any(|main| main.contains("version one")));

    queue.shutdown().await;
}

#[tokio::test]
async fn concurrent_submissions_never_overlap_engine_commands() {
    let (mut stub, journal) = StubEngine::new();
    stub.set_roundtrip_delay(Duration::from_millis(2));
    let queue = spawn_queue(stub, disabled_overlay(), options(0));

    let mut receivers = Vec::new();
    for n in 0..8 {
        receivers.push(queue.submit(request(&format!("block-{n}"), &format!("source {n}"))).await);
    }
    for receiver in receivers {
        receiver.await.unwrap().unwrap();
    }

    assert!(!journal.overlapped(), "two engine commands were in flight at once");
    assert_eq!(journal.compile_count(), 8);

    queue.shutdown().await;
}

#[tokio::test]
async fn abort_discards_pending_work_and_rearms_the_queue() {
    let (mut stub, journal) = StubEngine::new();
    stub.set_roundtrip_delay(Duration::from_millis(25));
    let queue = spawn_queue(stub, disabled_overlay(), options(0));

    let running = queue.submit(request("running", "busy")).await;
    let queued_a = queue.submit(request("qa", "aa")).await;
    let queued_b = queue.submit(request("qb", "bb")).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    queue.abort().await;

    // The executing task cannot be interrupted; queued ones are dropped.
    running.await.unwrap().unwrap();
    assert!(matches!(queued_a.await.unwrap(), Err(TaskError::Aborted)));
    assert!(matches!(queued_b.await.unwrap(), Err(TaskError::Aborted)));
    let compiles_after_abort = journal.compile_count();
    assert_eq!(compiles_after_abort, 1);

    // Immediately re-armed.
    let next = queue.submit(request("next", "fresh work")).await.await.unwrap().unwrap();
    assert!(!next.from_cache);

    queue.shutdown().await;
}

#[tokio::test]
async fn compiler_failure_returns_classified_diagnostics() {
    let (mut stub, journal) = StubEngine::new();
    stub.push_compile(CompileResult {
        artifact: None,
        status: 1,
        log: "! Undefined control sequence.\nl.12 \\foo\n".to_string(),
    });
    let queue = spawn_queue(stub, disabled_overlay(), options(0));

    match queue.submit(request("bad", "\\foo")).await.await.unwrap() {
        Err(TaskError::Compile { status, diagnostics }) => {
            assert_eq!(status, 1);
            let visible: Vec<_> = diagnostics.visible().collect();
            assert_eq!(visible.len(), 1);
            assert_eq!(visible[0].category, DiagnosticCategory::UndefinedControlSequence);
            assert_eq!(visible[0].line, Some(12));
            assert_eq!(visible[0].detail.as_deref(), Some("\\foo"));
        }
        other => panic!("expected Compile error, got {other:?}"),
    }

    // Recoverable: the same queue keeps serving.
    queue.submit(request("good", "x")).await.await.unwrap().unwrap();
    assert_eq!(journal.compile_count(), 2);

    queue.shutdown().await;
}

#[tokio::test]
async fn transport_fault_kills_the_queue() {
    let (mut stub, _journal) = StubEngine::new();
    stub.push_fault("engine trapped");
    let queue = spawn_queue(stub, disabled_overlay(), options(0));
    let gate = queue.engine_gate();

    match queue.submit(request("doomed", "x")).await.await.unwrap() {
        Err(TaskError::Engine(_)) => {}
        other => panic!("expected Engine error, got {other:?}"),
    }

    assert!(!gate.wait_ready(Duration::from_millis(50)).await);
    assert_eq!(gate.state(), EngineState::Error);

    // Submissions after the handle is lost fail fast instead of hanging.
    match queue.submit(request("late", "y")).await.await.unwrap() {
        Err(TaskError::Aborted) => {}
        other => panic!("expected Aborted, got {other:?}"),
    }
}

#[tokio::test]
async fn overlay_files_are_synced_and_auto_included() {
    let (stub, journal) = StubEngine::new();
    let overlay = SharedOverlay::new(VirtualFileOverlay::new(true, Duration::from_millis(500)));
    overlay
        .set_files(vec![
            VirtualFile::new("preamble.tex", "\\usetikzlibrary{arrows}").auto_use(),
            VirtualFile::new("extra.tex", "\\newcommand{\\x}{1}"),
        ])
        .await;
    let queue = spawn_queue(stub, overlay, options(0));

    let mut request = request("b1", "\\frac{1}{2}");
    request.auto_includes = vec!["extra.tex".to_string()];
    queue.submit(request).await.await.unwrap().unwrap();

    let mains = staged_main_files(&journal);
    assert_eq!(mains.len(), 1);
    assert_eq!(mains[0], "\\input{preamble.tex}\n\\input{extra.tex}\n\\frac{1}{2}\n");

    // Overlay write-through happened before staging: flush + both files.
    let commands = journal.commands();
    assert!(matches!(commands[0], EngineCommand::FlushWorkCache));

    queue.shutdown().await;
}

#[tokio::test]
async fn overlay_failure_aborts_only_the_affected_task() {
    let (mut stub, journal) = StubEngine::new();
    stub.push_response(crate::protocol::EngineResponse::failed(
        crate::protocol::CommandTag::FlushWorkCache,
        "storage wedged",
    ));
    let overlay = SharedOverlay::new(VirtualFileOverlay::new(true, Duration::from_millis(500)));
    overlay.set_files(vec![VirtualFile::new("preamble.tex", "P")]).await;
    let queue = spawn_queue(stub, overlay, options(0));

    match queue.submit(request("first", "x")).await.await.unwrap() {
        Err(TaskError::Overlay(_)) => {}
        other => panic!("expected Overlay error, got {other:?}"),
    }

    // The engine handle survived; the next task syncs and compiles.
    let rendered = queue.submit(request("second", "y")).await.await.unwrap().unwrap();
    assert!(!rendered.from_cache);
    assert_eq!(journal.compile_count(), 1);

    queue.shutdown().await;
}

#[tokio::test]
async fn newly_resolved_assets_are_harvested_into_the_host_cache() {
    let (mut stub, journal) = StubEngine::new();
    let mut manifest = CacheManifest::default();
    manifest.packages_found.insert("tikz.sty".to_string(), "/texmf/tex/tikz.sty".to_string());
    manifest.packages_missing.insert("absent.sty".to_string());
    stub.push_manifest(manifest);
    stub.provide_file("/texmf/tex/tikz.sty", b"% tikz source".to_vec());

    let mut adapter = EngineAdapter::new(Box::new(stub));
    adapter.load_engine().unwrap();
    let assets = Arc::new(Mutex::new(RemoteAssetCache::in_memory("https://mirror.a")));
    let queue = CompileQueue::spawn(
        adapter,
        disabled_overlay(),
        Arc::new(Mutex::new(RenderCache::in_memory())),
        Arc::clone(&assets),
        options(0),
    );

    queue.submit(request("b1", "\\frac{1}{2}")).await.await.unwrap().unwrap();
    queue.shutdown().await;

    let assets = assets.lock().await;
    assert_eq!(assets.found_file(AssetClass::Package, "tikz.sty").unwrap(), "tikz.sty");
    assert!(assets.is_known_missing(AssetClass::Package, "absent.sty"));
    let fetched = journal
        .commands()
        .iter()
        .any(|c| matches!(c, EngineCommand::FetchFile { name } if name == "/texmf/tex/tikz.sty"));
    assert!(fetched, "the new asset was never fetched from engine storage");
}

#[tokio::test]
async fn duplicate_content_queued_during_a_compile_coalesces() {
    let (mut stub, journal) = StubEngine::new();
    stub.set_roundtrip_delay(Duration::from_millis(25));
    let queue = spawn_queue(stub, disabled_overlay(), options(0));

    // Three blocks, identical content, all queued before the first drains.
    let a = queue.submit(request("a", "\\sqrt{2}")).await;
    let b = queue.submit(request("b", "\\sqrt{2}")).await;
    let c = queue.submit(request("c", " \\sqrt{2} ")).await;

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    let c = c.await.unwrap().unwrap();

    assert!(!a.from_cache);
    assert!(b.from_cache && c.from_cache);
    assert_eq!(journal.compile_count(), 1);

    queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cooldown_separates_compiles_but_not_cache_hits() {
    let (stub, journal) = StubEngine::new();
    let queue = spawn_queue(stub, disabled_overlay(), options(1_000));
    let started = tokio::time::Instant::now();

    queue.submit(request("b1", "first")).await.await.unwrap().unwrap();
    queue.submit(request("b2", "second")).await.await.unwrap().unwrap();
    // Two cache hits after the compiles.
    queue.submit(request("b3", "first")).await.await.unwrap().unwrap();
    queue.submit(request("b4", "second")).await.await.unwrap().unwrap();

    assert_eq!(journal.compile_count(), 2);
    let elapsed = started.elapsed();
    // Each real compile is followed by one cooldown (the second gates the
    // first cache hit); the hits themselves add none.
    assert!(elapsed >= Duration::from_millis(2_000), "cooldown never applied: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3_000), "cooldown applied after cache hits: {elapsed:?}");

    queue.shutdown().await;
}

#[tokio::test]
async fn invalidation_forces_a_rerender() {
    let (stub, journal) = StubEngine::new();
    let queue = spawn_queue(stub, disabled_overlay(), options(0));

    queue.submit(request("b1", "\\frac{1}{2}")).await.await.unwrap().unwrap();
    assert_eq!(journal.compile_count(), 1);

    let hash = source_key("\\frac{1}{2}");
    queue.render_cache().lock().await.invalidate(&hash).unwrap();

    let again = queue.submit(request("b1", "\\frac{1}{2}")).await.await.unwrap().unwrap();
    assert!(!again.from_cache);
    assert_eq!(journal.compile_count(), 2);

    queue.shutdown().await;
}

#[tokio::test]
async fn shared_renders_accumulate_origins() {
    let (stub, _journal) = StubEngine::new();
    let queue = spawn_queue(stub, disabled_overlay(), options(0));

    let mut from_a = request("b1", "e^{i\\pi}");
    from_a.origin = "a.md".to_string();
    queue.submit(from_a).await.await.unwrap().unwrap();

    let mut from_b = request("b2", "e^{i\\pi}");
    from_b.origin = "b.md".to_string();
    queue.submit(from_b).await.await.unwrap().unwrap();

    let hash = source_key("e^{i\\pi}");
    let cache = queue.render_cache();
    let cache = cache.lock().await;
    assert!(cache.is_shared(&hash));

    queue.shutdown().await;
}
