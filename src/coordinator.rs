//! Per-index coordination: states, status history, and observability
//! counters.
//!
//! The data locks themselves live on the engine (one `RwLock` per index);
//! the coordinator records every state transition with a timestamp and
//! reason, and tracks reader/writer/queue counts so `Status` can report
//! them. Writers always take the indexes in fixed order (trigram → symbols
//! → deps), which is the deadlock-prevention story; there is no lock
//! timeout.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

/// Cooperative cancellation token carried by every request. Long
/// operations check it at bounded intervals (per file for scans, per
/// candidate for search).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(tokio_util::sync::CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Child token: cancelling the parent cancels the child.
    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }
}

/// The three coordinated indexes, in lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Trigram,
    Symbols,
    Deps,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [IndexKind::Trigram, IndexKind::Symbols, IndexKind::Deps];

    fn idx(self) -> usize {
        match self {
            Self::Trigram => 0,
            Self::Symbols => 1,
            Self::Deps => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trigram => "trigram",
            Self::Symbols => "symbols",
            Self::Deps => "deps",
        }
    }
}

/// Lifecycle state of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Ready,
    Indexing,
    /// Work queued but not currently progressing.
    Blocked,
    Error,
    Recovering,
    Disabled,
}

/// One status-history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub state: IndexState,
    pub at: SystemTime,
    pub reason: String,
}

/// Serializable status view for one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatusView {
    pub kind: IndexKind,
    pub state: IndexState,
    pub readers: usize,
    pub writers: usize,
    pub queue_depth: usize,
    pub history: Vec<StatusEntry>,
}

struct Cell {
    status: parking_lot::Mutex<CellStatus>,
    readers: AtomicUsize,
    writers: AtomicUsize,
    queue_depth: AtomicUsize,
}

struct CellStatus {
    state: IndexState,
    history: Vec<StatusEntry>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            status: parking_lot::Mutex::new(CellStatus {
                state: IndexState::Indexing,
                history: vec![StatusEntry {
                    state: IndexState::Indexing,
                    at: SystemTime::now(),
                    reason: "initial scan pending".to_string(),
                }],
            }),
            readers: AtomicUsize::new(0),
            writers: AtomicUsize::new(0),
            queue_depth: AtomicUsize::new(0),
        }
    }
}

/// History retained per index.
const HISTORY_CAP: usize = 64;

#[derive(Default)]
pub struct IndexCoordinator {
    cells: [Cell; 3],
}

impl IndexCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, kind: IndexKind) -> &Cell {
        &self.cells[kind.idx()]
    }

    /// Record a state transition. Every transition is appended to the
    /// history with a timestamp and reason.
    pub fn set_state(&self, kind: IndexKind, state: IndexState, reason: &str) {
        let mut status = self.cell(kind).status.lock();
        if status.state == state {
            return;
        }
        status.state = state;
        status.history.push(StatusEntry {
            state,
            at: SystemTime::now(),
            reason: reason.to_string(),
        });
        let overflow = status.history.len().saturating_sub(HISTORY_CAP);
        if overflow > 0 {
            status.history.drain(..overflow);
        }
        tracing::debug!(index = kind.as_str(), ?state, reason, "index state change");
    }

    pub fn set_all(&self, state: IndexState, reason: &str) {
        for kind in IndexKind::ALL {
            self.set_state(kind, state, reason);
        }
    }

    pub fn state(&self, kind: IndexKind) -> IndexState {
        self.cell(kind).status.lock().state
    }

    /// All indexes ready.
    pub fn all_ready(&self) -> bool {
        IndexKind::ALL
            .into_iter()
            .all(|k| self.state(k) == IndexState::Ready)
    }

    pub fn begin_read(&self, kind: IndexKind) {
        self.cell(kind).readers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_read(&self, kind: IndexKind) {
        self.cell(kind).readers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn begin_write(&self, kind: IndexKind) {
        self.cell(kind).writers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_write(&self, kind: IndexKind) {
        self.cell(kind).writers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn enqueue(&self, kind: IndexKind) {
        self.cell(kind).queue_depth.fetch_add(1, Ordering::SeqCst);
    }

    pub fn dequeue(&self, kind: IndexKind) {
        self.cell(kind).queue_depth.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn queue_depth(&self, kind: IndexKind) -> usize {
        self.cell(kind).queue_depth.load(Ordering::SeqCst)
    }

    /// Status snapshot with the last `tail` history entries per index.
    pub fn snapshot(&self, tail: usize) -> Vec<IndexStatusView> {
        IndexKind::ALL
            .into_iter()
            .map(|kind| {
                let cell = self.cell(kind);
                let status = cell.status.lock();
                let skip = status.history.len().saturating_sub(tail);
                IndexStatusView {
                    kind,
                    state: status.state,
                    readers: cell.readers.load(Ordering::SeqCst),
                    writers: cell.writers.load(Ordering::SeqCst),
                    queue_depth: cell.queue_depth.load(Ordering::SeqCst),
                    history: status.history[skip..].to_vec(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_append_history() {
        let coordinator = IndexCoordinator::new();
        coordinator.set_state(IndexKind::Trigram, IndexState::Ready, "scan complete");
        coordinator.set_state(IndexKind::Trigram, IndexState::Indexing, "file changed");
        coordinator.set_state(IndexKind::Trigram, IndexState::Ready, "commit");

        let snap = coordinator.snapshot(10);
        let trigram = snap
            .iter()
            .find(|v| v.kind == IndexKind::Trigram)
            .unwrap();
        assert_eq!(trigram.state, IndexState::Ready);
        // initial + 3 transitions
        assert_eq!(trigram.history.len(), 4);
        assert_eq!(trigram.history.last().unwrap().reason, "commit");
    }

    #[test]
    fn same_state_is_not_duplicated() {
        let coordinator = IndexCoordinator::new();
        coordinator.set_state(IndexKind::Deps, IndexState::Ready, "a");
        coordinator.set_state(IndexKind::Deps, IndexState::Ready, "b");
        let snap = coordinator.snapshot(10);
        let deps = snap.iter().find(|v| v.kind == IndexKind::Deps).unwrap();
        assert_eq!(deps.history.len(), 2);
    }

    #[test]
    fn counters_track_holds() {
        let coordinator = IndexCoordinator::new();
        coordinator.begin_read(IndexKind::Symbols);
        coordinator.begin_read(IndexKind::Symbols);
        coordinator.begin_write(IndexKind::Trigram);
        coordinator.enqueue(IndexKind::Trigram);

        let snap = coordinator.snapshot(1);
        assert_eq!(snap[1].readers, 2);
        assert_eq!(snap[0].writers, 1);
        assert_eq!(snap[0].queue_depth, 1);

        coordinator.end_read(IndexKind::Symbols);
        coordinator.end_write(IndexKind::Trigram);
        coordinator.dequeue(IndexKind::Trigram);
        assert_eq!(coordinator.queue_depth(IndexKind::Trigram), 0);
    }

    #[test]
    fn cancel_token_propagates_to_children() {
        let parent = CancelToken::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn ready_requires_all_indexes() {
        let coordinator = IndexCoordinator::new();
        assert!(!coordinator.all_ready());
        coordinator.set_all(IndexState::Ready, "scan complete");
        assert!(coordinator.all_ready());
    }
}
