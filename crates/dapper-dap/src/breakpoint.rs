//! Client-side breakpoints that outlive any single session.
//!
//! Breakpoints belong to the debugger interface, not the session: a
//! relaunch replays them into the new adapter during its handshake.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::protocol::{BreakpointResponse, SourceBreakpoint};

/// A client-side breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    /// Source file path.
    pub path: PathBuf,
    /// Line number (1-based).
    pub line: i64,
    /// Optional condition expression.
    pub condition: Option<String>,
    /// Whether the current adapter has bound this breakpoint.
    pub verified: bool,
    /// Adapter-assigned ID from the last acknowledgement.
    pub adapter_id: Option<i64>,
}

impl Breakpoint {
    /// Create a new unverified breakpoint at the given path and line.
    pub fn new(path: impl Into<PathBuf>, line: i64) -> Self {
        Self {
            path: path.into(),
            line,
            condition: None,
            verified: false,
            adapter_id: None,
        }
    }

    /// Attach a condition expression.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    fn to_source(&self) -> SourceBreakpoint {
        SourceBreakpoint {
            line: self.line,
            condition: self.condition.clone(),
        }
    }
}

/// Breakpoints grouped by file, in stable path order.
#[derive(Debug, Clone, Default)]
pub struct BreakpointManager {
    breakpoints: BTreeMap<PathBuf, Vec<Breakpoint>>,
}

impl BreakpointManager {
    /// Create a new empty breakpoint manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint, replacing any existing one on the same line.
    /// Returns `true` if the line had no breakpoint before.
    pub fn add(&mut self, bp: Breakpoint) -> bool {
        let list = self.breakpoints.entry(bp.path.clone()).or_default();
        match list.iter_mut().find(|existing| existing.line == bp.line) {
            Some(existing) => {
                *existing = bp;
                false
            }
            None => {
                list.push(bp);
                list.sort_by_key(|b| b.line);
                true
            }
        }
    }

    /// Remove the breakpoint at `path:line`. Returns `true` if one was removed.
    pub fn remove(&mut self, path: &Path, line: i64) -> bool {
        let Some(list) = self.breakpoints.get_mut(path) else {
            return false;
        };
        let before = list.len();
        list.retain(|bp| bp.line != line);
        let removed = list.len() != before;
        if list.is_empty() {
            self.breakpoints.remove(path);
        }
        removed
    }

    /// All breakpoints for a file, ordered by line.
    pub fn get_for_file(&self, path: &Path) -> &[Breakpoint] {
        self.breakpoints.get(path).map_or(&[], |v| v.as_slice())
    }

    /// The wire form of a file's breakpoints, for `setBreakpoints`.
    pub fn source_breakpoints(&self, path: &Path) -> Vec<SourceBreakpoint> {
        self.get_for_file(path).iter().map(Breakpoint::to_source).collect()
    }

    /// Files that currently hold at least one breakpoint.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.breakpoints.keys().map(PathBuf::as_path)
    }

    /// Record the adapter's acknowledgement for a file. `responses` are in
    /// request order, as returned by `setBreakpoints`.
    pub fn apply_response(&mut self, path: &Path, responses: &[BreakpointResponse]) {
        if let Some(list) = self.breakpoints.get_mut(path) {
            for (bp, ack) in list.iter_mut().zip(responses) {
                bp.verified = ack.verified;
                bp.adapter_id = ack.id;
            }
        }
    }

    /// Forget adapter acknowledgements; used when the adapter is replaced.
    pub fn reset_verification(&mut self) {
        for bp in self.breakpoints.values_mut().flatten() {
            bp.verified = false;
            bp.adapter_id = None;
        }
    }

    /// Remove all breakpoints for a specific file.
    pub fn clear_file(&mut self, path: &Path) -> usize {
        self.breakpoints.remove(path).map_or(0, |l| l.len())
    }

    /// Iterate over all breakpoints across all files.
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values().flatten()
    }

    /// Total breakpoint count.
    pub fn len(&self) -> usize {
        self.breakpoints.values().map(Vec::len).sum()
    }

    /// Whether no breakpoints are set.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
