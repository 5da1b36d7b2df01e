//! Install state of this modification and of others sharing its files
//!
//! State is never tracked outside the target files: every query re-reads the
//! file and searches for marker tokens.

use aho_corasick::AhoCorasick;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::error::{PatchError, PatchResult};
use crate::core::patch::{AnchoredPatcher, BlockBounds, is_whole_token};
use crate::infra::io::read_text;

/// Namespace prefix of every marker written by this tool
pub const MARKER_NAMESPACE: &str = "panelpatch";

/// Identity of one named modification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationMarker {
    name: String,
    marker: String,
    targets: Vec<PathBuf>,
}

impl ModificationMarker {
    /// Marker in the tool's own namespace: `panelpatch:<name>`.
    pub fn new(name: &str, targets: Vec<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            marker: format!("{MARKER_NAMESPACE}:{name}"),
            targets,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    pub fn bounds(&self) -> BlockBounds {
        BlockBounds::for_marker(&self.marker)
    }
}

/// A third-party modification recognised by its marker string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownModification {
    pub name: String,
    pub marker: String,
}

/// Per-file presence of a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Installed,
    NotInstalled,
}

pub struct ModificationRegistry {
    this: ModificationMarker,
    known: Vec<KnownModification>,
    known_matcher: Option<AhoCorasick>,
    namespace: Regex,
}

impl ModificationRegistry {
    pub fn new(this: ModificationMarker, known: Vec<KnownModification>) -> PatchResult<Self> {
        // Own marker never counts as a coexisting modification
        let known: Vec<KnownModification> = known
            .into_iter()
            .filter(|k| !k.marker.is_empty() && k.marker != this.marker)
            .collect();

        let known_matcher = if known.is_empty() {
            None
        } else {
            let m = AhoCorasick::new(known.iter().map(|k| k.marker.as_str()))
                .map_err(|e| PatchError::Config(format!("known modification markers: {e}")))?;
            Some(m)
        };

        let namespace = Regex::new(&format!(r"{}:([A-Za-z0-9_-]+)", regex::escape(MARKER_NAMESPACE)))
            .map_err(|e| PatchError::Config(e.to_string()))?;

        Ok(Self {
            this,
            known,
            known_matcher,
            namespace,
        })
    }

    pub fn modification(&self) -> &ModificationMarker {
        &self.this
    }

    /// State of this modification in each target file, in target order.
    pub fn current_state(&self) -> PatchResult<IndexMap<PathBuf, InstallState>> {
        let mut out = IndexMap::with_capacity(self.this.targets.len());
        for target in &self.this.targets {
            let state = if AnchoredPatcher::is_present(target, &self.this.marker)? {
                InstallState::Installed
            } else {
                InstallState::NotInstalled
            };
            debug!(target = %target.display(), ?state, "marker state");
            out.insert(target.clone(), state);
        }
        Ok(out)
    }

    /// Installed as soon as any target carries the marker.
    pub fn overall_state(&self) -> PatchResult<InstallState> {
        let any = self
            .current_state()?
            .values()
            .any(|s| *s == InstallState::Installed);
        Ok(if any { InstallState::Installed } else { InstallState::NotInstalled })
    }

    /// Names of other modifications present in `target`.
    pub fn coexisting_modifications(&self, target: &Path) -> PatchResult<BTreeSet<String>> {
        Ok(self.coexisting_in(&read_text(target)?))
    }

    /// Content-level variant of [`Self::coexisting_modifications`].
    pub fn coexisting_in(&self, content: &str) -> BTreeSet<String> {
        let bytes = content.as_bytes();
        let mut found = BTreeSet::new();

        for caps in self.namespace.captures_iter(content) {
            let whole = caps.get(0).map(|m| (m.start(), m.end()));
            let (Some((start, end)), Some(name)) = (whole, caps.get(1)) else {
                continue;
            };
            if is_whole_token(bytes, start, end) && name.as_str() != self.this.name {
                found.insert(name.as_str().to_string());
            }
        }

        if let Some(matcher) = &self.known_matcher {
            for m in matcher.find_iter(content) {
                if is_whole_token(bytes, m.start(), m.end()) {
                    found.insert(self.known[m.pattern().as_usize()].name.clone());
                }
            }
        }

        found
    }
}
