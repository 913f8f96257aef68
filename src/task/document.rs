//! Verified document reads and writes.
//!
//! Every mutator reads a document fresh inside the task lock, remembers its
//! SHA-256 digest, and hands that digest back to [`write_verified`]. The
//! writer refuses garbled new content, then re-reads the file before
//! touching it; garbled content on disk or a digest
//! that moved since the read aborts with `DOCUMENT_CORRUPTED` and nothing is
//! written. After the temp-file-plus-rename write the file is read back and
//! compared; on mismatch the previous bytes are restored.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Result, TaskboardError};

const TMP_SUFFIX: &str = ".tmp";

/// A document as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub digest: String,
}

impl Document {
    /// Read and sanity-check a document; `None` when it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let Some(bytes) = read_bytes(path)? else {
            return Ok(None);
        };
        let text = decode(path, &bytes)?;
        Ok(Some(Self {
            digest: digest(&bytes),
            text,
        }))
    }
}

/// Hex SHA-256 of raw bytes.
#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Describe why `bytes` is not a sane text document, if it is not.
#[must_use]
pub fn garbled_reason(bytes: &[u8]) -> Option<String> {
    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(e) => return Some(format!("invalid UTF-8 at byte {}", e.valid_up_to())),
    };
    if text.contains('\0') {
        return Some("contains NUL bytes".to_string());
    }
    if text.contains('\u{FFFD}') {
        return Some("contains replacement characters".to_string());
    }
    let noise = text
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\u{0C}'))
        .count();
    if noise > 0 {
        return Some(format!("contains {noise} stray control character(s)"));
    }
    None
}

/// Atomically replace `path` with `content`.
///
/// `expected_digest` is the digest observed when the caller read the
/// document (`None` when the caller expects it to be absent or does not
/// care, e.g. sidecars). The write is refused if `content` itself is
/// garbled, or if the current content is garbled or differs from what the
/// caller read.
pub fn write_verified(path: &Path, expected_digest: Option<&str>, content: &str) -> Result<()> {
    if let Some(reason) = garbled_reason(content.as_bytes()) {
        return Err(TaskboardError::corrupted(
            path,
            format!("refusing to write content that {reason}"),
        ));
    }

    let previous = read_bytes(path)?;

    if let Some(bytes) = &previous {
        if let Some(reason) = garbled_reason(bytes) {
            return Err(TaskboardError::corrupted(path, reason));
        }
    }
    if let Some(expected) = expected_digest {
        match &previous {
            Some(bytes) if digest(bytes) == expected => {}
            Some(_) => {
                return Err(TaskboardError::corrupted(
                    path,
                    "content changed between read and write",
                ))
            }
            None => {
                return Err(TaskboardError::corrupted(
                    path,
                    "document disappeared between read and write",
                ))
            }
        }
    }

    write_atomic(path, content.as_bytes())?;

    let written = read_bytes(path)?;
    if written.as_deref() != Some(content.as_bytes()) {
        warn!(path = %path.display(), "Read-back mismatch, restoring previous content");
        restore(path, previous.as_deref())?;
        return Err(TaskboardError::corrupted(
            path,
            "read-back after write did not match; previous content restored",
        ));
    }

    debug!(path = %path.display(), bytes = content.len(), "Document written");
    Ok(())
}

fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<String> {
    if let Some(reason) = garbled_reason(bytes) {
        return Err(TaskboardError::corrupted(path, reason));
    }
    String::from_utf8(bytes.to_vec()).map_err(|e| TaskboardError::corrupted(path, e.to_string()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}{TMP_SUFFIX}"));

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    written.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        TaskboardError::Io(e)
    })
}

fn restore(path: &Path, previous: Option<&[u8]>) -> Result<()> {
    match previous {
        Some(bytes) => write_atomic(path, bytes),
        None => match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        },
    }
}
