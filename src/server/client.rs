//! Stateless RPC client with auto-spawn.
//!
//! A client that cannot connect launches the server binary detached,
//! waits for readiness (30 s default) and retries. A fingerprint mismatch
//! against the running server triggers shutdown and respawn so stale
//! binaries never serve.

use super::paths::{self, PidFile};
use super::proto::{self, Method, Request, Response, StatusResult};
use super::{NOT_READY_RETRY_MS, STARTUP_TIMEOUT};
use crate::error::{IndexError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::UnixStream;

/// RPC client for one project root.
pub struct Client {
    stream: UnixStream,
    root: PathBuf,
    next_id: u64,
}

impl Client {
    /// Connect without spawning.
    pub async fn connect(root: &Path) -> Result<Self> {
        let socket = paths::socket_path(root);
        let stream = UnixStream::connect(&socket).await.map_err(|e| {
            IndexError::ServerUnavailable(format!("{}: {e}", socket.display()))
        })?;
        Ok(Self {
            stream,
            root: root.to_path_buf(),
            next_id: 0,
        })
    }

    /// Connect, spawning and waiting for a server when none is running,
    /// and replacing it when its build fingerprint differs.
    pub async fn connect_or_spawn(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .unwrap_or_else(|_| root.to_path_buf());

        if let Ok(mut client) = Self::connect(&root).await {
            // The pid file makes staleness an O(1) check; only a fresh
            // looking server is worth the status round-trip.
            let matches = if recorded_server_is_stale(&root) {
                Ok(false)
            } else {
                client.fingerprint_matches().await
            };
            match matches {
                Ok(true) => return Ok(client),
                Ok(false) => {
                    tracing::info!("server fingerprint differs, replacing it");
                    let _ = client.request(Method::Shutdown, Value::Null).await;
                    wait_for_exit(&root).await;
                }
                Err(_) => {}
            }
        }

        spawn_server(&root)?;
        let deadline = Instant::now() + STARTUP_TIMEOUT;
        loop {
            if let Ok(mut client) = Self::connect(&root).await {
                match client.status().await {
                    Ok(status) if status.ready => return Ok(client),
                    Ok(_) => {} // scanning, keep polling
                    Err(_) => {}
                }
            }
            if Instant::now() >= deadline {
                return Err(IndexError::Timeout(STARTUP_TIMEOUT.as_millis() as u64));
            }
            tokio::time::sleep(Duration::from_millis(NOT_READY_RETRY_MS / 2)).await;
        }
    }

    /// One request/response exchange.
    pub async fn request(&mut self, method: Method, params: Value) -> Result<Value> {
        self.next_id += 1;
        let id = format!("c{}", self.next_id);
        let request = Request {
            id: id.clone(),
            method,
            params,
        };
        proto::write_frame(&mut self.stream, &request).await?;
        let response: Response = proto::read_frame(&mut self.stream)
            .await?
            .ok_or_else(|| IndexError::ServerUnavailable("connection closed".to_string()))?;
        if response.id != id {
            return Err(IndexError::Internal(format!(
                "response id mismatch: sent {id}, got {}",
                response.id
            )));
        }
        match (response.result, response.error) {
            (Some(result), None) => Ok(result),
            (_, Some(error)) => Err(error.into_error()),
            (None, None) => Err(IndexError::Internal("empty response".to_string())),
        }
    }

    /// Request with retries on retriable errors, bounded by the startup
    /// timeout. `NotReady` responses carry their own retry delay.
    pub async fn request_ready(&mut self, method: Method, params: Value) -> Result<Value> {
        let deadline = Instant::now() + STARTUP_TIMEOUT;
        loop {
            match self.request(method, params.clone()).await {
                Err(e) if e.is_retriable() && Instant::now() < deadline => {
                    let delay = match e {
                        IndexError::NotReady { retry_after_ms } => retry_after_ms,
                        _ => NOT_READY_RETRY_MS,
                    };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                other => return other,
            }
        }
    }

    pub async fn status(&mut self) -> Result<StatusResult> {
        let value = self.request(Method::Status, Value::Null).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fingerprint_matches(&mut self) -> Result<bool> {
        let status = self.status().await?;
        Ok(status.fingerprint == paths::build_fingerprint())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Launch the server binary detached. The binary lives next to the CLI.
fn spawn_server(root: &Path) -> Result<()> {
    let exe = std::env::current_exe()
        .map_err(|e| IndexError::ServerUnavailable(format!("current_exe: {e}")))?;
    let server_bin = exe
        .parent()
        .map(|dir| dir.join("lci-server"))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from("lci-server"));

    std::process::Command::new(&server_bin)
        .arg(root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            IndexError::ServerUnavailable(format!("spawning {}: {e}", server_bin.display()))
        })?;
    tracing::debug!(server = %server_bin.display(), "spawned index server");
    Ok(())
}

/// Wait for a shutting-down server to release its socket.
async fn wait_for_exit(root: &Path) {
    let socket = paths::socket_path(root);
    let deadline = Instant::now() + super::SHUTDOWN_DRAIN;
    while Instant::now() < deadline {
        if UnixStream::connect(&socket).await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// O(1) staleness check from the pid file: a recorded server whose
/// fingerprint differs from this build needs replacing.
pub fn recorded_server_is_stale(root: &Path) -> bool {
    PidFile::read(root)
        .map(|pid_file| pid_file.fingerprint != paths::build_fingerprint())
        .unwrap_or(false)
}
