// crates/image-gate-core/src/runtime/cancel.rs
// ============================================================================
// Module: Image Gate Cancellation
// Description: Shared cancellation signal for in-flight evaluations.
// Purpose: Let callers abort gate processes and skip cache population.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`CancellationToken`] is a cloneable flag. The engine checks it between
//! tags and gates, and the process gate runner polls it while waiting on a
//! child so a cancelled run kills the gate instead of blocking.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Shared cancellation token checked at evaluation checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    /// Cancellation flag shared by all clones.
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new non-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
