//! Persistent index server.
//!
//! One server per project root on a unix-domain socket. The listener binds
//! immediately; until the initial scan completes, queries fail with
//! `NotReady` and a retry-after hint. Graceful shutdown stops accepting,
//! drains in-flight requests within a deadline, and removes the socket and
//! pid files; SIGINT/SIGTERM map to the same path.

pub mod client;
pub mod paths;
pub mod proto;

use crate::config::Config;
use crate::coordinator::CancelToken;
use crate::error::{IndexError, Result};
use crate::ids;
use crate::incremental::IncrementalIndexer;
use crate::search::{QueryMode, SearchOrchestrator};
use crate::state::{Engine, SharedEngine, create_engine};
use crate::types::{FileId, SymbolId, SymbolKind};
use crate::watcher;
use anyhow::Context;
use proto::{
    ComplexityView, DefinitionHit, DefinitionParams, DuplicateGroup, GitAnalyzeResult, Method,
    ReferenceHit, ReferencesParams, ReferencesResult, Request, Response, SearchParams,
    StatusResult, TreeNode, TreeParams,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Client-side wait for a spawned server to become ready.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
/// Drain deadline for graceful shutdown.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);
/// Retry hint handed out while the initial scan runs.
pub const NOT_READY_RETRY_MS: u64 = 500;

/// Run the server for a project root until shutdown.
pub async fn run(root: PathBuf) -> anyhow::Result<()> {
    let root = root.canonicalize().unwrap_or(root);
    let config = Config::load(&root).context("loading configuration")?;
    let engine = create_engine(config);

    let socket = paths::socket_path(&root);
    reclaim_socket(&socket).await?;
    let listener = UnixListener::bind(&socket)
        .with_context(|| format!("binding {}", socket.display()))?;
    paths::PidFile::current()
        .write(&root)
        .context("writing pid file")?;
    tracing::info!(socket = %socket.display(), root = %root.display(), "server listening");

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();

    spawn_initial_scan(engine.clone(), shutdown.clone());
    spawn_watcher(engine.clone(), &root, shutdown.clone());
    spawn_signal_handler(shutdown.clone());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let engine = engine.clone();
                        let shutdown = shutdown.clone();
                        let tracker_inner = tracker.clone();
                        tracker.spawn(async move {
                            if let Err(e) = handle_conn(stream, engine, shutdown, tracker_inner).await {
                                tracing::debug!(error = %e, "connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    // Stop accepting, drain in-flight work within the deadline
    drop(listener);
    tracker.close();
    if tokio::time::timeout(SHUTDOWN_DRAIN, tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!("drain deadline exceeded, exiting with requests in flight");
    }
    let _ = std::fs::remove_file(&socket);
    paths::PidFile::remove(&root);
    tracing::info!("server stopped");
    Ok(())
}

/// A leftover socket from a dead server is removed; a live one is an error.
async fn reclaim_socket(socket: &Path) -> anyhow::Result<()> {
    if !socket.exists() {
        return Ok(());
    }
    if UnixStream::connect(socket).await.is_ok() {
        anyhow::bail!("server already running on {}", socket.display());
    }
    std::fs::remove_file(socket)
        .with_context(|| format!("removing stale socket {}", socket.display()))?;
    Ok(())
}

fn spawn_initial_scan(engine: SharedEngine, shutdown: CancellationToken) {
    tokio::task::spawn_blocking(move || {
        let cancel = CancelToken::new();
        let indexer = IncrementalIndexer::new();
        match indexer.full_index(&engine, &cancel) {
            Ok(report) => {
                tracing::info!(
                    indexed = report.indexed,
                    failed = report.failed,
                    oversized = report.oversized,
                    "initial scan complete"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "initial scan failed");
                engine
                    .coordinator
                    .set_all(crate::coordinator::IndexState::Error, &e.to_string());
                if e.is_fatal() {
                    shutdown.cancel();
                }
            }
        }
    });
}

fn spawn_watcher(engine: SharedEngine, root: &Path, shutdown: CancellationToken) {
    let debounce_ms = engine.config.debounce_ms;
    let root = root.to_path_buf();
    tokio::spawn(async move {
        let (_handle, mut rx) = match watcher::watch(&root, debounce_ms) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "filesystem watching disabled");
                return;
            }
        };
        loop {
            tokio::select! {
                batch = rx.recv() => {
                    let Some(batch) = batch else { break };
                    if !engine.is_ready() {
                        continue; // initial scan will pick these up
                    }
                    let paths: Vec<PathBuf> = batch
                        .into_iter()
                        .filter(|p| watcher::indexable(&root, p))
                        .collect();
                    if paths.is_empty() {
                        continue;
                    }
                    let engine = engine.clone();
                    let _ = tokio::task::spawn_blocking(move || {
                        let report = IncrementalIndexer::new().index_batch(&engine, &paths);
                        tracing::debug!(
                            indexed = report.indexed,
                            deleted = report.deleted,
                            failed = report.failed,
                            "watch batch committed"
                        );
                    })
                    .await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = interrupt.recv() => tracing::info!("SIGINT, shutting down"),
            _ = terminate.recv() => tracing::info!("SIGTERM, shutting down"),
        }
        shutdown.cancel();
    });
}

/// Serve one connection. Requests on a connection run concurrently; the
/// write half is shared behind a lock so frames interleave cleanly.
async fn handle_conn(
    stream: UnixStream,
    engine: SharedEngine,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) -> Result<()> {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));

    loop {
        let request = tokio::select! {
            read = proto::read_frame::<_, Request>(&mut reader) => read?,
            _ = shutdown.cancelled() => break,
        };
        let Some(request) = request else { break };
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        let writer = writer.clone();
        tracker.spawn(async move {
            let id = request.id.clone();
            let cancel = CancelToken::new();
            let is_shutdown = request.method == Method::Shutdown;
            let result = tokio::task::spawn_blocking(move || {
                dispatch(&engine, request.method, request.params, &cancel)
            })
            .await
            .unwrap_or_else(|_| Err(IndexError::Internal("request task panicked".into())));

            let response = match &result {
                Ok(value) => Response::ok(id, value.clone()),
                Err(e) => Response::err(id, e),
            };
            let mut w = writer.lock().await;
            let _ = proto::write_frame(&mut *w, &response).await;
            drop(w);

            if is_shutdown && result.is_ok() {
                shutdown.cancel();
            }
            // Poisoned locks are unrecoverable; other request-path errors
            // (including malformed params) only fail the one request.
            if let Err(e @ IndexError::LockPoisoned(_)) = &result {
                tracing::error!(error = %e, "fatal error, shutting down");
                shutdown.cancel();
            }
        });
    }
    Ok(())
}

/// Method dispatch. `Status` and `Shutdown` work before readiness; every
/// index-backed method fails with `NotReady` until the initial scan
/// completes.
fn dispatch(engine: &Engine, method: Method, params: Value, cancel: &CancelToken) -> Result<Value> {
    match method {
        Method::Status => return status(engine),
        Method::Shutdown => return Ok(serde_json::json!({"ok": true})),
        _ => {}
    }
    if !engine.is_ready() {
        return Err(IndexError::NotReady {
            retry_after_ms: NOT_READY_RETRY_MS,
        });
    }

    match method {
        Method::Search => {
            let p: SearchParams = parse_params(params)?;
            let response = SearchOrchestrator::new().query(
                engine,
                &p.query,
                &p.options,
                p.mode,
                cancel,
            )?;
            Ok(serde_json::to_value(response)?)
        }
        Method::Definition => {
            let p: DefinitionParams = parse_params(params)?;
            Ok(serde_json::to_value(definitions(engine, &p.name))?)
        }
        Method::References => {
            let p: ReferencesParams = parse_params(params)?;
            Ok(serde_json::to_value(references(engine, &p)?)?)
        }
        Method::Tree => {
            let p: TreeParams = parse_params(params)?;
            let symbols = engine.symbols.read();
            let tree = symbols
                .call_tree(&p.name, p.max_depth)
                .ok_or_else(|| IndexError::SymbolNotFound(p.name.clone()))?;
            let node = TreeNode::from_graph(
                &tree,
                &|file| rel_path(engine, file),
                &|id| symbols.symbol(id).map(|s| s.rec.metrics),
            );
            Ok(serde_json::to_value(node)?)
        }
        Method::Stats => Ok(serde_json::to_value(engine.stats())?),
        Method::GitAnalyze => Ok(serde_json::to_value(git_analyze(engine))?),
        Method::Status | Method::Shutdown => unreachable!("handled above"),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| IndexError::Internal(format!("invalid params: {e}")))
}

fn rel_path(engine: &Engine, file: FileId) -> Option<String> {
    engine.store.path_of(file).map(|p| {
        p.strip_prefix(&engine.config.root)
            .unwrap_or(&p)
            .to_string_lossy()
            .to_string()
    })
}

fn status(engine: &Engine) -> Result<Value> {
    let ready = engine.is_ready();
    let result = StatusResult {
        ready,
        version: crate::SERVER_VERSION.to_string(),
        fingerprint: paths::build_fingerprint(),
        pid: std::process::id(),
        root: engine.config.root.to_string_lossy().to_string(),
        indexes: engine.coordinator.snapshot(8),
        stats: ready.then(|| engine.stats()),
    };
    Ok(serde_json::to_value(result)?)
}

fn definitions(engine: &Engine, name: &str) -> Vec<DefinitionHit> {
    let symbols = engine.symbols.read();
    symbols
        .definition(name)
        .into_iter()
        .filter_map(|def| {
            let sym = symbols.symbol(def.id)?;
            Some(DefinitionHit {
                id: def.id.encoded(),
                name: sym.rec.name.clone(),
                kind: sym.rec.kind,
                file: rel_path(engine, def.file)?,
                line: def.line,
                signature: def.signature,
                breadcrumbs: sym.rec.scope.clone(),
            })
        })
        .collect()
}

fn references(engine: &Engine, params: &ReferencesParams) -> Result<ReferencesResult> {
    let symbols = engine.symbols.read();
    let id = match (&params.symbol, &params.name) {
        (Some(encoded), _) => SymbolId(ids::decode(encoded)?),
        (None, Some(name)) => {
            symbols
                .definition(name)
                .first()
                .map(|d| d.id)
                .ok_or_else(|| IndexError::SymbolNotFound(name.clone()))?
        }
        (None, None) => {
            return Err(IndexError::SymbolNotFound(
                "neither symbol nor name given".to_string(),
            ));
        }
    };
    let name = symbols
        .symbol(id)
        .map(|s| s.rec.name.clone())
        .ok_or_else(|| IndexError::SymbolNotFound(id.encoded()))?;
    let sites = symbols
        .references(id)
        .into_iter()
        .filter_map(|(file, line, column)| {
            Some(ReferenceHit {
                file: rel_path(engine, file)?,
                line,
                column,
            })
        })
        .collect();
    Ok(ReferencesResult {
        symbol: id.encoded(),
        name,
        sites,
    })
}

/// Duplicate-name report over the resident graph: identically-named
/// symbols of the same kind spread across multiple files.
fn git_analyze(engine: &Engine) -> GitAnalyzeResult {
    let symbols = engine.symbols.read();
    let mut groups: HashMap<(String, SymbolKind), Vec<(FileId, u32)>> = HashMap::new();
    for sym in symbols.all_symbols() {
        if matches!(sym.rec.kind, SymbolKind::Parameter | SymbolKind::Variable) {
            continue;
        }
        groups
            .entry((sym.rec.name.clone(), sym.rec.kind))
            .or_default()
            .push((sym.id.file(), sym.rec.line));
    }

    let mut duplicate_names: Vec<DuplicateGroup> = groups
        .into_iter()
        .filter(|(_, sites)| {
            let mut files: Vec<FileId> = sites.iter().map(|(f, _)| *f).collect();
            files.sort_unstable();
            files.dedup();
            files.len() > 1
        })
        .map(|((name, kind), mut sites)| {
            sites.sort_unstable();
            DuplicateGroup {
                name,
                kind,
                sites: sites
                    .into_iter()
                    .filter_map(|(file, line)| {
                        Some(ReferenceHit {
                            file: rel_path(engine, file)?,
                            line,
                            column: 1,
                        })
                    })
                    .collect(),
            }
        })
        .collect();
    duplicate_names.sort_by(|a, b| {
        b.sites
            .len()
            .cmp(&a.sites.len())
            .then_with(|| a.name.cmp(&b.name))
    });
    duplicate_names.truncate(100);

    let report = engine.deps.read().analyze_complexity();
    let complexity = ComplexityView {
        total_edges: report.total_edges,
        max_depth: report.max_depth,
        max_fan_in: report.max_fan_in,
        max_fan_out: report.max_fan_out,
        avg_fan_out: report.avg_fan_out,
        cycles: report
            .cycles
            .iter()
            .map(|scc| scc.iter().filter_map(|f| rel_path(engine, *f)).collect())
            .collect(),
    };

    GitAnalyzeResult {
        duplicate_names,
        complexity,
    }
}
