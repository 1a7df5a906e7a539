//! Request serialization.
//!
//! A resource set must never have two arbitration requests outstanding at
//! the manager: an Update reply racing a later Release leaves the grant
//! state ambiguous. [`RequestQueue`] holds requests in arrival order; its
//! head is the request currently awaited (or about to be dispatched).

use std::collections::VecDeque;

use respol_proto::RequestKind;

/// Ordered pending requests of one resource set.
///
/// Not synchronized on its own. The owning set serializes access behind its
/// lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQueue {
    pending: VecDeque<RequestKind>,
}

impl RequestQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request.
    ///
    /// Returns `true` if the request became the head, i.e. the caller must
    /// dispatch it now.
    pub fn enqueue(&mut self, kind: RequestKind) -> bool {
        self.pending.push_back(kind);
        self.pending.len() == 1
    }

    /// Remove the head after its reply was processed.
    ///
    /// Returns the new head, if any, so the owner can dispatch it.
    pub fn advance(&mut self) -> Option<RequestKind> {
        self.pending.pop_front();
        self.pending.front().copied()
    }

    /// Remove the most recently enqueued request.
    ///
    /// Used when the call that enqueued it failed before anything was sent.
    pub fn pop_tail(&mut self) -> Option<RequestKind> {
        self.pending.pop_back()
    }

    /// Request currently awaited or next to dispatch.
    pub fn head(&self) -> Option<RequestKind> {
        self.pending.front().copied()
    }

    /// Number of pending requests, head included.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the set is idle.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending requests, head first.
    pub fn iter(&self) -> impl Iterator<Item = RequestKind> + '_ {
        self.pending.iter().copied()
    }
}
