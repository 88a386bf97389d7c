//! Socket and pid-file locations.
//!
//! One server per project root, keyed by a hash of the absolute root path
//! so clients derive the socket location without configuration. The pid
//! file alongside records owner pid and build fingerprint, making
//! stale-server detection O(1).

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Short hex hash of the canonical root path.
pub fn root_hash(root: &Path) -> String {
    let canonical = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex_prefix(&digest, 12)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

/// `/tmp/lci-<hash>.sock` (platform temp dir).
pub fn socket_path(root: &Path) -> PathBuf {
    std::env::temp_dir().join(format!("lci-{}.sock", root_hash(root)))
}

/// Pid file alongside the socket.
pub fn pid_path(root: &Path) -> PathBuf {
    std::env::temp_dir().join(format!("lci-{}.pid", root_hash(root)))
}

/// Build fingerprint advertised by the server and checked by clients.
/// Derived from build metadata; a differing client triggers shutdown and
/// respawn so stale binaries never serve.
pub fn build_fingerprint() -> String {
    let meta = format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        option_env!("PROFILE").unwrap_or("unknown"),
    );
    let digest = Sha256::digest(meta.as_bytes());
    hex_prefix(&digest, 16)
}

/// Contents of a pid file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    pub pid: u32,
    pub fingerprint: String,
}

impl PidFile {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            fingerprint: build_fingerprint(),
        }
    }

    pub fn write(&self, root: &Path) -> std::io::Result<()> {
        std::fs::write(pid_path(root), format!("{} {}\n", self.pid, self.fingerprint))
    }

    pub fn read(root: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(pid_path(root)).ok()?;
        let mut parts = data.split_whitespace();
        let pid = parts.next()?.parse().ok()?;
        let fingerprint = parts.next()?.to_string();
        Some(Self { pid, fingerprint })
    }

    pub fn remove(root: &Path) {
        let _ = std::fs::remove_file(pid_path(root));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_is_stable_per_root() {
        let dir = tempfile::tempdir().unwrap();
        let a = socket_path(dir.path());
        let b = socket_path(dir.path());
        assert_eq!(a, b);
        assert!(a.to_string_lossy().contains("lci-"));
        assert!(a.to_string_lossy().ends_with(".sock"));

        let other = tempfile::tempdir().unwrap();
        assert_ne!(a, socket_path(other.path()));
    }

    #[test]
    fn pid_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::current();
        pid_file.write(dir.path()).unwrap();
        let back = PidFile::read(dir.path()).unwrap();
        assert_eq!(back, pid_file);
        PidFile::remove(dir.path());
        assert!(PidFile::read(dir.path()).is_none());
    }

    #[test]
    fn fingerprint_is_stable_within_build() {
        assert_eq!(build_fingerprint(), build_fingerprint());
        assert_eq!(build_fingerprint().len(), 16);
    }
}
