//! Diagnostics - once-per-key warnings for recoverable problems.
//!
//! Runtime evaluation errors fire on every reactive tick while the bad data
//! persists. Each distinct (kind, node, message) triple is logged and
//! recorded the first time only.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A `$fns` call named a function the scope does not provide.
    UnknownFunction,
    /// An expression failed while evaluating against live data.
    Runtime,
    /// Two loop items produced the same explicit key.
    DuplicateKey,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::UnknownFunction => "unknown-function",
            DiagnosticKind::Runtime => "runtime",
            DiagnosticKind::DuplicateKey => "duplicate-key",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Where it happened, e.g. `label.attrs.class`.
    pub node: String,
    pub message: String,
}

#[derive(Default)]
struct DiagnosticsState {
    seen: HashSet<Diagnostic>,
    entries: Vec<Diagnostic>,
    /// Report every occurrence instead of the first only.
    repeat: bool,
}

/// Shared sink for diagnostics of one mounted tree.
#[derive(Clone, Default)]
pub struct Diagnostics {
    state: Rc<RefCell<DiagnosticsState>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that logs every occurrence.
    pub fn repeating() -> Self {
        let diagnostics = Self::default();
        diagnostics.state.borrow_mut().repeat = true;
        diagnostics
    }

    /// Record a diagnostic. Returns `true` if it was new (and therefore logged).
    pub fn report(&self, kind: DiagnosticKind, node: &str, message: &str) -> bool {
        let diagnostic = Diagnostic {
            kind,
            node: node.to_string(),
            message: message.to_string(),
        };

        {
            let mut state = self.state.borrow_mut();
            let fresh = state.seen.insert(diagnostic.clone());
            if !fresh && !state.repeat {
                return false;
            }
            if fresh {
                state.entries.push(diagnostic);
            }
        }

        tracing::warn!(%kind, node, "{message}");
        true
    }

    /// Every distinct diagnostic reported so far, in order.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.state.borrow().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.seen.clear();
        state.entries.clear();
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.state.borrow().entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_once_per_key() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.report(DiagnosticKind::Runtime, "help", "boom"));
        assert!(!diagnostics.report(DiagnosticKind::Runtime, "help", "boom"));
        assert!(diagnostics.report(DiagnosticKind::Runtime, "label", "boom"));
        assert_eq!(diagnostics.len(), 2);

        diagnostics.clear();
        assert!(diagnostics.report(DiagnosticKind::Runtime, "help", "boom"));
    }

    #[test]
    fn test_repeating_logs_every_time_but_records_once() {
        let diagnostics = Diagnostics::repeating();
        assert!(diagnostics.report(DiagnosticKind::Runtime, "help", "boom"));
        assert!(diagnostics.report(DiagnosticKind::Runtime, "help", "boom"));
        assert_eq!(diagnostics.len(), 1);
    }
}
