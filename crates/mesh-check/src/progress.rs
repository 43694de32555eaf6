//! Cooperative cancellation and per-check context.
//!
//! A [`CheckContext`] travels with one mesh check. It carries the tracing span
//! that every analysis task enters, so log lines from worker threads are tagged
//! with the mesh they belong to, and a [`CancelFlag`] that is polled at task
//! boundaries.
//!
//! ```ignore
//! use mesh_check::progress::{CancelFlag, CheckContext};
//!
//! let cancel = CancelFlag::new();
//! let ctx = CheckContext::new("shirt.obj").with_cancel(cancel.clone());
//!
//! // From another thread: stop before the next analysis starts.
//! cancel.cancel();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Span;

use crate::error::{MeshError, MeshResult};

/// Shared cancellation request.
///
/// Clones observe the same flag. Cancellation is one-way.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Return `Err(Cancelled)` if cancellation was requested.
    pub fn check(&self) -> MeshResult<()> {
        if self.is_cancelled() {
            Err(MeshError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Context for one mesh check.
#[derive(Debug, Clone)]
pub struct CheckContext {
    span: Span,
    cancel: CancelFlag,
}

impl CheckContext {
    /// Create a context labelled with the mesh name.
    pub fn new(mesh: &str) -> Self {
        Self {
            span: tracing::info_span!("mesh_check", mesh = mesh),
            cancel: CancelFlag::new(),
        }
    }

    /// Use an existing span as the parent of all analysis logs.
    pub fn with_span(span: Span) -> Self {
        Self {
            span,
            cancel: CancelFlag::new(),
        }
    }

    /// Attach a cancellation flag shared with the caller.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `f` inside this context's span.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }
}

impl Default for CheckContext {
    fn default() -> Self {
        Self::with_span(Span::none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        assert!(flag.check().is_ok());

        flag.cancel();
        assert!(other.is_cancelled());
        assert!(matches!(other.check(), Err(MeshError::Cancelled)));
    }

    #[test]
    fn test_context_uses_given_flag() {
        let flag = CancelFlag::new();
        let ctx = CheckContext::new("cube").with_cancel(flag.clone());
        assert!(!ctx.is_cancelled());
        flag.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.in_scope(|| 42), 42);
    }
}
