//! RPC wire format.
//!
//! Length-prefixed framed messages: a 4-byte big-endian payload length,
//! then a JSON envelope, `{id, method, params}` for requests and `{id,
//! result}` or `{id, error}` for responses. Errors carry a machine
//! readable `kind` plus a human message. Ids crossing this boundary are
//! base-63 strings; everything behind it uses raw integers.

use crate::coordinator::IndexStatusView;
use crate::error::IndexError;
use crate::search::QueryMode;
use crate::state::EngineStats;
use crate::symbols::CallTreeNode;
use crate::types::{SearchOptions, SymbolKind, SymbolMetrics};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Frames above this are rejected.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// RPC methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Search,
    Definition,
    References,
    Tree,
    Stats,
    Status,
    GitAnalyze,
    Shutdown,
}

/// Request envelope. The id is opaque to the server and echoed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: Method,
    #[serde(default)]
    pub params: Value,
}

/// Response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    pub fn ok(id: String, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: String, e: &IndexError) -> Self {
        let retry_after_ms = match e {
            IndexError::NotReady { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        };
        Self {
            id,
            result: None,
            error: Some(WireError {
                kind: e.kind().to_string(),
                message: e.to_string(),
                retry_after_ms,
            }),
        }
    }
}

/// Machine-readable error on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl WireError {
    pub fn into_error(self) -> IndexError {
        IndexError::from_wire(&self.kind, self.message)
    }
}

// ============================================================================
// Method payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub options: SearchOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionParams {
    pub name: String,
}

/// References accepts either a wire-encoded symbol id or a name (resolved
/// to its first definition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencesParams {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    pub name: String,
    #[serde(default = "default_tree_depth")]
    pub max_depth: u32,
}

fn default_tree_depth() -> u32 {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionHit {
    /// Wire-encoded symbol id.
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub line: u32,
    pub signature: String,
    /// Enclosing scope chain, outermost first.
    pub breadcrumbs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceHit {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencesResult {
    /// Wire-encoded id of the symbol the sites point at.
    pub symbol: String,
    pub name: String,
    pub sites: Vec<ReferenceHit>,
}

/// Serializable call tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub line: u32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub recursive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SymbolMetrics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn from_graph(
        node: &CallTreeNode,
        path_of: &impl Fn(crate::types::FileId) -> Option<String>,
        metrics_of: &impl Fn(crate::types::SymbolId) -> Option<SymbolMetrics>,
    ) -> Self {
        Self {
            name: node.name.clone(),
            id: node.symbol.map(|s| s.encoded()),
            file: node.file.and_then(path_of),
            line: node.line,
            recursive: node.recursive,
            metrics: node.symbol.and_then(metrics_of),
            children: node
                .children
                .iter()
                .map(|c| Self::from_graph(c, path_of, metrics_of))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub ready: bool,
    pub version: String,
    pub fingerprint: String,
    pub pid: u32,
    pub root: String,
    pub indexes: Vec<IndexStatusView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<EngineStats>,
}

/// Identically-named symbols of one kind spread across files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub name: String,
    pub kind: SymbolKind,
    pub sites: Vec<ReferenceHit>,
}

/// Dependency-graph shape, with cycle members as relative paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityView {
    pub total_edges: usize,
    pub max_depth: usize,
    pub max_fan_in: usize,
    pub max_fan_out: usize,
    pub avg_fan_out: f64,
    pub cycles: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitAnalyzeResult {
    pub duplicate_names: Vec<DuplicateGroup>,
    pub complexity: ComplexityView,
}

// ============================================================================
// Framing
// ============================================================================

/// Write one length-prefixed JSON frame.
pub async fn write_frame<W, T>(writer: &mut W, payload: &T) -> Result<(), IndexError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let data = serde_json::to_vec(payload)?;
    if data.len() as u32 > MAX_FRAME_BYTES {
        return Err(IndexError::Internal("frame too large".to_string()));
    }
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON frame. `Ok(None)` on clean EOF at a frame
/// boundary.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, IndexError>
where
    R: AsyncReadExt + Unpin,
    T: serde::de::DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(IndexError::Internal("frame too large".to_string()));
    }
    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data).await?;
    Ok(Some(serde_json::from_slice(&data)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip() {
        let request = Request {
            id: "req-1".to_string(),
            method: Method::Search,
            params: serde_json::json!({"query": "foo"}),
        };
        let mut writer = std::io::Cursor::new(Vec::new());
        write_frame(&mut writer, &request).await.unwrap();
        let buf = writer.into_inner();
        // 4-byte BE length prefix
        let len = u32::from_be_bytes(buf[..4].try_into().unwrap());
        assert_eq!(len as usize, buf.len() - 4);

        let mut cursor = std::io::Cursor::new(buf);
        let back: Request = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(back.id, "req-1");
        assert_eq!(back.method, Method::Search);
    }

    #[tokio::test]
    async fn eof_between_frames_is_clean() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let got: Option<Request> = read_frame(&mut cursor).await.unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn error_response_carries_kind_and_retry() {
        let response = Response::err(
            "x".to_string(),
            &IndexError::NotReady {
                retry_after_ms: 250,
            },
        );
        let error = response.error.unwrap();
        assert_eq!(error.kind, "NotReady");
        assert_eq!(error.retry_after_ms, Some(250));
        assert!(matches!(
            error.into_error(),
            IndexError::NotReady { .. }
        ));
    }

    #[test]
    fn method_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&Method::GitAnalyze).unwrap(),
            "\"git_analyze\""
        );
    }
}
