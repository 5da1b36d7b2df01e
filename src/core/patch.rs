//! Anchored text insertion and marker detection
//!
//! The splice and strip operations are pure functions over file content; the
//! `AnchoredPatcher` wrappers only add the read and the atomic write-back.
//! Insertion is line-anchored: a payload always lands on a line boundary so
//! the text around the anchor is never split.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::core::error::{PatchError, PatchResult};
use crate::infra::io::{read_text, write_atomic};

/// Where the payload goes relative to the anchor match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// At the start of the line holding the first byte of the match
    Before,
    /// After the end of the line holding the last byte of the match
    After,
}

/// A compiled insertion point
#[derive(Debug, Clone)]
pub struct AnchorSpec {
    pattern: Regex,
    placement: Placement,
}

impl AnchorSpec {
    /// Compile an anchor; an invalid regex is a configuration error.
    pub fn new(pattern: &str, placement: Placement) -> PatchResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| PatchError::Config(format!("invalid anchor `{pattern}`: {e}")))?;
        Ok(Self { pattern, placement })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }
}

/// Match-count failures of a splice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    NotFound,
    Ambiguous { count: usize, lines: Vec<usize> },
}

/// Line-level markers bounding an injected block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBounds {
    pub begin: String,
    pub end: String,
}

impl BlockBounds {
    pub fn for_marker(marker: &str) -> Self {
        Self {
            begin: format!("BEGIN {marker}"),
            end: format!("END {marker}"),
        }
    }
}

/// Bytes that may continue a marker token
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':')
}

/// True when `bytes[start..end]` is not glued to neighbouring token bytes.
pub(crate) fn is_whole_token(bytes: &[u8], start: usize, end: usize) -> bool {
    let before_ok = start == 0 || !is_token_byte(bytes[start - 1]);
    let after_ok = end >= bytes.len() || !is_token_byte(bytes[end]);
    before_ok && after_ok
}

/// Find the first whole-token occurrence of `token` in `content`.
pub fn find_token(content: &str, token: &str) -> Option<usize> {
    if token.is_empty() {
        return None;
    }
    let bytes = content.as_bytes();
    memchr::memmem::find_iter(bytes, token.as_bytes())
        .find(|&at| is_whole_token(bytes, at, at + token.len()))
}

pub fn contains_token(content: &str, token: &str) -> bool {
    find_token(content, token).is_some()
}

/// 1-based line number of a byte offset
fn line_of(bytes: &[u8], at: usize) -> usize {
    memchr::memchr_iter(b'\n', &bytes[..at]).count() + 1
}

/// Splice `payload` into `content` at the single match of `anchor`.
///
/// The payload is normalized to end with exactly one newline. Zero or more
/// than one match is an error; content is never touched in that case.
pub fn splice(content: &str, anchor: &AnchorSpec, payload: &str) -> Result<String, AnchorError> {
    let bytes = content.as_bytes();
    let matches: Vec<(usize, usize)> = anchor
        .pattern
        .find_iter(content)
        .map(|m| (m.start(), m.end()))
        .collect();

    debug!(pattern = anchor.pattern(), count = matches.len(), "anchor matches");

    let (start, end) = match matches.as_slice() {
        [] => return Err(AnchorError::NotFound),
        [only] => *only,
        many => {
            return Err(AnchorError::Ambiguous {
                count: many.len(),
                lines: many.iter().map(|&(s, _)| line_of(bytes, s)).collect(),
            });
        }
    };

    let insert_at = match anchor.placement {
        Placement::Before => memchr::memrchr(b'\n', &bytes[..start]).map_or(0, |nl| nl + 1),
        Placement::After => {
            // Last byte of the match; an empty match stands on its own position
            let last = if end > start { end - 1 } else { end };
            match memchr::memchr(b'\n', &bytes[last.min(bytes.len())..]) {
                Some(off) => last + off + 1,
                None => bytes.len(),
            }
        }
    };

    let body = payload.trim_end_matches('\n');
    let mut out = String::with_capacity(content.len() + body.len() + 2);
    out.push_str(&content[..insert_at]);
    // Anchor on the final line without a newline: the file keeps ending without one
    if insert_at == content.len() && !content.is_empty() && !content.ends_with('\n') {
        out.push('\n');
        out.push_str(body);
        return Ok(out);
    }
    out.push_str(body);
    out.push('\n');
    out.push_str(&content[insert_at..]);
    Ok(out)
}

/// Remove the lines from the begin marker through the end marker.
///
/// Returns `None` unless exactly one begin line precedes exactly one end line.
/// A block closing the file without a final newline also takes the newline
/// that ends the line before it.
pub fn strip_block(content: &str, bounds: &BlockBounds) -> Option<String> {
    let mut begin = Vec::new();
    let mut end = Vec::new();
    let mut offset = 0usize;
    let mut spans = Vec::new();

    for (idx, line) in content.split_inclusive('\n').enumerate() {
        if contains_token(line, &bounds.begin) {
            begin.push(idx);
        }
        if contains_token(line, &bounds.end) {
            end.push(idx);
        }
        spans.push((offset, offset + line.len()));
        offset += line.len();
    }

    let (&[b], &[e]) = (begin.as_slice(), end.as_slice()) else {
        return None;
    };
    if b >= e {
        return None;
    }

    let mut head = spans[b].0;
    if spans[e].1 == content.len() && !content.ends_with('\n') && head > 0 {
        head -= 1;
    }

    let mut out = String::with_capacity(content.len());
    out.push_str(&content[..head]);
    out.push_str(&content[spans[e].1..]);
    Some(out)
}

/// File-level wrappers around the pure splice/strip functions
pub struct AnchoredPatcher;

impl AnchoredPatcher {
    /// Whether the marker token occurs anywhere in the file.
    pub fn is_present(target: &Path, marker: &str) -> PatchResult<bool> {
        Ok(contains_token(&read_text(target)?, marker))
    }

    /// Insert `payload` at the anchor and atomically replace the file.
    pub fn insert(target: &Path, anchor: &AnchorSpec, payload: &str) -> PatchResult<()> {
        let content = read_text(target)?;
        let patched = splice(&content, anchor, payload).map_err(|e| match e {
            AnchorError::NotFound => PatchError::AnchorNotFound {
                path: target.to_path_buf(),
                pattern: anchor.pattern().to_string(),
            },
            AnchorError::Ambiguous { count, lines } => PatchError::AnchorAmbiguous {
                path: target.to_path_buf(),
                pattern: anchor.pattern().to_string(),
                count,
                lines,
            },
        })?;
        write_atomic(target, patched.as_bytes())?;
        debug!(target = %target.display(), bytes = patched.len(), "payload inserted");
        Ok(())
    }

    /// Delete the bounded block; fallback when no snapshot exists.
    pub fn remove(target: &Path, marker: &str, bounds: &BlockBounds) -> PatchResult<()> {
        let content = read_text(target)?;
        let stripped = strip_block(&content, bounds).ok_or_else(|| PatchError::BlockNotFound {
            path: target.to_path_buf(),
            marker: marker.to_string(),
        })?;
        write_atomic(target, stripped.as_bytes())?;
        debug!(target = %target.display(), "marker block removed");
        Ok(())
    }
}
