#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]

//! Local Code Intelligence (LCI)
//!
//! A local, persistent code-intelligence index for multi-language source
//! trees (Go, JavaScript/TypeScript, Python, plus text-only search for
//! everything else).
//!
//! # Architecture
//!
//! The index is three coordinated layers kept resident by a per-project
//! server process:
//!
//! 1. **Trigram postings**: every 3-byte substring of file content maps to
//!    `(FileId, offset)` postings, giving grep-exact literal and regex
//!    search with line/column precision.
//!
//! 2. **Symbol graph**: definitions, references, imports and calls extracted
//!    per language, linked in a second pass so references resolve through
//!    in-file scope, then imports, then project-wide name buckets.
//!
//! 3. **Phrase matching**: identifiers split on case/underscore/digit
//!    boundaries and stemmed, so multi-word natural-language queries rank
//!    symbols without exact spelling.
//!
//! # Key Features
//!
//! - **Incremental updates**: a file change patches postings, symbols and
//!   dependency edges under per-index writer locks, then re-resolves
//!   dependent files.
//! - **Persistent server**: one server per project root on a unix socket;
//!   CLI commands are stateless clients that auto-spawn it.
//! - **Grep parity**: literal search returns exactly the `(file, line,
//!   column)` tuples `grep -n` would.
//!
//! # Usage
//!
//! ```ignore
//! use lci::{Config, Engine, IncrementalIndexer, SearchOrchestrator};
//! use lci::coordinator::CancelToken;
//! use lci::search::QueryMode;
//!
//! let engine = Engine::new(Config::for_root("/path/to/repo".into()));
//! IncrementalIndexer::new().full_index(&engine, &CancelToken::new())?;
//!
//! let hits = SearchOrchestrator::new().query(
//!     &engine,
//!     "invalid credentials",
//!     &Default::default(),
//!     QueryMode::Literal,
//!     &CancelToken::new(),
//! )?;
//! ```

pub mod config;
pub mod coordinator;
pub mod deps;
pub mod discovery;
pub mod error;
pub mod ids;
pub mod incremental;
pub mod parsing;
pub mod phrase;
pub mod search;
pub mod server;
pub mod state;
pub mod store;
pub mod symbols;
pub mod trigram;
pub mod types;
pub mod watcher;

// Re-exports
pub use config::{Config, PriorityMode};
pub use coordinator::{CancelToken, IndexCoordinator, IndexKind, IndexState};
pub use error::{IndexError, Result};
pub use incremental::{IncrementalIndexer, ScanReport};
pub use search::SearchOrchestrator;
pub use state::{Engine, EngineStats, SharedEngine};
pub use types::*;

/// Server name used in handshakes and log lines.
pub const SERVER_NAME: &str = "lci";
/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
