//! lci: CLI client for the persistent code-intelligence index.
//!
//! Commands are stateless: they connect to the per-root server (spawning
//! it when absent) and render the response. Designed for both humans and
//! tools:
//! - `--json` switches to stable machine-readable output
//! - results go to stdout, logs to stderr
//! - exit codes: 0 = success with matches, 1 = success with zero matches
//!   (grep compatibility), 2 = invalid pattern, >2 = internal

use clap::{Args, Parser, Subcommand};
use lci::config::Config;
use lci::error::IndexError;
use lci::search::{QueryMode, SearchResponse};
use lci::server::client::Client;
use lci::server::proto::{
    DefinitionHit, GitAnalyzeResult, Method, ReferencesResult, StatusResult, TreeNode,
};
use lci::state::EngineStats;
use lci::types::SearchOptions;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "lci")]
#[command(version)]
#[command(about = "Local code intelligence: grep-exact text search plus symbol queries")]
#[command(long_about = r#"
lci keeps a per-project index server resident so queries are instant.

It provides:
  - literal and regex search with grep-exact line/column output
  - symbol definitions, references, and call trees
  - multi-word phrase search over identifiers

The server is spawned on first use and watches the tree for changes.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (defaults to the current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Args, Debug, Default)]
struct SearchFlags {
    /// Case-insensitive matching
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Maximum results across all files (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_results: u32,

    /// Maximum matching lines per file (0 = unlimited)
    #[arg(short = 'm', long, default_value = "0")]
    max_count: u32,

    /// Skip files whose path matches this regex
    #[arg(long, value_name = "REGEX")]
    exclude: Option<String>,

    /// Only files whose path matches this regex
    #[arg(long, value_name = "REGEX")]
    include: Option<String>,

    /// Skip test files
    #[arg(long)]
    exclude_tests: bool,

    /// Skip matches inside comments
    #[arg(long)]
    exclude_comments: bool,

    /// Only matches in code (not comments or strings)
    #[arg(long)]
    code_only: bool,

    /// Only matches inside string literals
    #[arg(long)]
    strings_only: bool,

    /// Only matches inside comments
    #[arg(long)]
    comments_only: bool,

    /// Match whole words only
    #[arg(short = 'w', long)]
    word_boundary: bool,

    /// Select non-matching lines
    #[arg(short = 'v', long)]
    invert_match: bool,

    /// Lines of context around each match
    #[arg(short = 'C', long, default_value = "0")]
    context: u32,

    /// One result per file with a match count
    #[arg(long)]
    merge_files: bool,
}

impl SearchFlags {
    fn to_options(&self) -> SearchOptions {
        SearchOptions {
            case_insensitive: self.ignore_case,
            max_results: self.max_results,
            max_count_per_file: self.max_count,
            exclude_regex: self.exclude.clone(),
            include_regex: self.include.clone(),
            exclude_tests: self.exclude_tests,
            exclude_comments: self.exclude_comments,
            code_only: self.code_only,
            strings_only: self.strings_only,
            comments_only: self.comments_only,
            word_boundary: self.word_boundary,
            invert_match: self.invert_match,
            context_lines: self.context,
            merge_file_results: self.merge_files,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search the index (auto: literal, regex-like and phrase)
    Search {
        pattern: String,
        /// Treat the pattern as a regular expression
        #[arg(short = 'e', long)]
        regex: bool,
        #[command(flatten)]
        flags: SearchFlags,
    },

    /// Literal search with grep-exact output
    Grep {
        pattern: String,
        #[command(flatten)]
        flags: SearchFlags,
    },

    /// Find symbol definitions
    Def { symbol: String },

    /// Find references to a symbol (name or id)
    Refs { symbol: String },

    /// Print the call tree of a function
    Tree {
        function: String,
        /// Maximum expansion depth
        #[arg(long, default_value = "8")]
        max_depth: u32,
        /// Show line numbers
        #[arg(long)]
        show_lines: bool,
        /// One line per call
        #[arg(long)]
        compact: bool,
        /// Include per-node metrics
        #[arg(long)]
        metrics: bool,
        /// Structured output for tools (implies --json)
        #[arg(long)]
        agent: bool,
    },

    /// Summarize the indexed corpus
    List,

    /// Server status and index health
    Status,

    /// Run the index server in the foreground
    Server,

    /// Stop the server for this root
    Shutdown,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Report duplicate symbol names across files
    GitAnalyze,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default lci.json
    Init,
    /// Print the effective configuration
    Show,
    /// Check lci.json for errors
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let root = cli.root.canonicalize().unwrap_or_else(|_| cli.root.clone());

    match run(&cli, &root).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            match e {
                IndexError::EmptyPattern | IndexError::InvalidPattern(_) => ExitCode::from(2),
                _ => ExitCode::from(3),
            }
        }
    }
}

async fn run(cli: &Cli, root: &PathBuf) -> Result<ExitCode, IndexError> {
    match &cli.command {
        Commands::Search {
            pattern,
            regex,
            flags,
        } => {
            let mode = if *regex {
                QueryMode::Regex
            } else {
                QueryMode::Auto
            };
            search(cli, root, pattern, mode, &flags.to_options()).await
        }
        Commands::Grep { pattern, flags } => {
            search(cli, root, pattern, QueryMode::Literal, &flags.to_options()).await
        }
        Commands::Def { symbol } => {
            let mut client = Client::connect_or_spawn(root).await?;
            let value = client
                .request_ready(Method::Definition, json!({"name": symbol}))
                .await?;
            let hits: Vec<DefinitionHit> = serde_json::from_value(value.clone())?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                for hit in &hits {
                    println!(
                        "{}:{}: {} {} [{}]",
                        hit.file,
                        hit.line,
                        hit.kind.as_str(),
                        hit.signature,
                        hit.id
                    );
                }
            }
            Ok(exit_for_count(hits.len()))
        }
        Commands::Refs { symbol } => {
            let mut client = Client::connect_or_spawn(root).await?;
            let params = if looks_like_id(symbol) {
                json!({"symbol": symbol})
            } else {
                json!({"name": symbol})
            };
            let value = client.request_ready(Method::References, params).await?;
            let result: ReferencesResult = serde_json::from_value(value.clone())?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                for site in &result.sites {
                    println!("{}:{}:{}", site.file, site.line, site.column);
                }
            }
            Ok(exit_for_count(result.sites.len()))
        }
        Commands::Tree {
            function,
            max_depth,
            show_lines,
            compact,
            metrics,
            agent,
        } => {
            let mut client = Client::connect_or_spawn(root).await?;
            let value = client
                .request_ready(
                    Method::Tree,
                    json!({"name": function, "max_depth": max_depth}),
                )
                .await?;
            if cli.json || *agent {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let tree: TreeNode = serde_json::from_value(value)?;
                print_tree(&tree, 0, *show_lines, *compact, *metrics);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            let mut client = Client::connect_or_spawn(root).await?;
            let value = client.request_ready(Method::Stats, Value::Null).await?;
            let stats: EngineStats = serde_json::from_value(value.clone())?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!(
                    "{} files, {} symbols, {} references ({} unresolved)",
                    stats.files, stats.symbols, stats.references, stats.unresolved_references
                );
                let mut languages: Vec<_> = stats.by_language.iter().collect();
                languages.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
                for (language, count) in languages {
                    println!("  {language}: {count}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let mut client = Client::connect(root).await?;
            let status = client.status().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Server => {
            lci::server::run(root.clone())
                .await
                .map_err(|e| IndexError::Internal(e.to_string()))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Shutdown => {
            let mut client = Client::connect(root).await?;
            client.request(Method::Shutdown, Value::Null).await?;
            if !cli.json {
                println!("server stopped");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { action } => config_command(cli, root, action),
        Commands::GitAnalyze => {
            let mut client = Client::connect_or_spawn(root).await?;
            let value = client.request_ready(Method::GitAnalyze, Value::Null).await?;
            let result: GitAnalyzeResult = serde_json::from_value(value.clone())?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let c = &result.complexity;
                println!(
                    "dependency graph: {} edges, depth {}, fan-in {}, fan-out {} (avg {:.1}), {} cycles",
                    c.total_edges,
                    c.max_depth,
                    c.max_fan_in,
                    c.max_fan_out,
                    c.avg_fan_out,
                    c.cycles.len()
                );
                for cycle in &c.cycles {
                    println!("  cycle: {}", cycle.join(" -> "));
                }
                for group in &result.duplicate_names {
                    println!(
                        "{} {} defined in {} places:",
                        group.kind.as_str(),
                        group.name,
                        group.sites.len()
                    );
                    for site in &group.sites {
                        println!("  {}:{}", site.file, site.line);
                    }
                }
            }
            Ok(exit_for_count(result.duplicate_names.len()))
        }
    }
}

async fn search(
    cli: &Cli,
    root: &PathBuf,
    pattern: &str,
    mode: QueryMode,
    options: &SearchOptions,
) -> Result<ExitCode, IndexError> {
    let mut client = Client::connect_or_spawn(root).await?;
    let value = client
        .request_ready(
            Method::Search,
            json!({"query": pattern, "mode": mode, "options": options}),
        )
        .await?;
    let response: SearchResponse = serde_json::from_value(value.clone())?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        for m in &response.matches {
            for (line, text) in m.context.iter().filter(|(l, _)| *l < m.line) {
                println!("{}-{}- {}", m.file, line, text);
            }
            if m.match_count > 1 {
                println!(
                    "{}:{}:{}: {} ({} matches)",
                    m.file, m.line, m.column, m.line_text, m.match_count
                );
            } else {
                println!("{}:{}:{}: {}", m.file, m.line, m.column, m.line_text);
            }
            for (line, text) in m.context.iter().filter(|(l, _)| *l > m.line) {
                println!("{}-{}- {}", m.file, line, text);
            }
        }
        for s in &response.symbols {
            println!(
                "{}:{}: {} {} (score {:.0}) [{}]",
                s.file,
                s.line,
                s.kind.as_str(),
                s.name,
                s.score,
                s.id
            );
        }
    }
    Ok(exit_for_count(
        response.matches.len() + response.symbols.len(),
    ))
}

fn config_command(cli: &Cli, root: &PathBuf, action: &ConfigAction) -> Result<ExitCode, IndexError> {
    let path = Config::path_for(root);
    match action {
        ConfigAction::Init => {
            if path.exists() {
                return Err(IndexError::InvalidConfig(format!(
                    "{} already exists",
                    path.display()
                )));
            }
            let config = Config::for_root(root.clone());
            std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
            if !cli.json {
                println!("wrote {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        ConfigAction::Show => {
            let config = Config::load(root)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        ConfigAction::Validate => {
            let config = Config::load(root)?;
            config.validate()?;
            if !cli.json {
                println!("{} is valid", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_for_count(n: usize) -> ExitCode {
    if n > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

/// Short base-63 ids are indistinguishable from names in general; treat as
/// an id only what cannot be an identifier in the indexed languages.
fn looks_like_id(s: &str) -> bool {
    s.len() <= 11
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && s.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && s.chars().any(|c| c.is_ascii_digit())
}

fn print_tree(node: &TreeNode, depth: usize, show_lines: bool, compact: bool, metrics: bool) {
    let indent = if compact {
        String::new()
    } else {
        "  ".repeat(depth)
    };
    let mut line = format!("{indent}{}", node.name);
    if show_lines && node.line > 0 {
        line.push_str(&format!(":{}", node.line));
    }
    if let Some(file) = &node.file {
        line.push_str(&format!(" ({file})"));
    }
    if metrics {
        if let Some(m) = &node.metrics {
            line.push_str(&format!(" [loc {}, cx {}]", m.loc, m.complexity));
        }
    }
    if node.recursive {
        line.push_str(" [recursive]");
    }
    println!("{line}");
    for child in &node.children {
        print_tree(child, depth + 1, show_lines, compact, metrics);
    }
}

fn print_status(status: &StatusResult) {
    println!(
        "lci {} (fingerprint {}) pid {} root {}",
        status.version, status.fingerprint, status.pid, status.root
    );
    println!("ready: {}", status.ready);
    for index in &status.indexes {
        println!(
            "  {}: {:?} (readers {}, writers {}, queued {})",
            index.kind.as_str(),
            index.state,
            index.readers,
            index.writers,
            index.queue_depth
        );
    }
    if let Some(stats) = &status.stats {
        println!(
            "  {} files, {} symbols, {} trigrams, {} postings",
            stats.files, stats.symbols, stats.trigrams, stats.postings
        );
    }
}

fn init_logging() {
    let mcp_mode = std::env::var("LCI_MCP_MODE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let default_level = if mcp_mode { "error" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}
