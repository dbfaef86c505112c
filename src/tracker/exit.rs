// src/tracker/exit.rs — Reconciles competing termination signals
//
// Route changes, pagehide, beforeunload and unload can all fire for the same
// page view, in any order and more than once. The coordinator claims the page
// view id before anything is sent, so only the first signal produces `end`.

use crate::tracker::event::{Event, ExitType};
use crate::tracker::lifecycle::PageViewSession;

/// Runtime signals that can close a page view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    RouteChange,
    PageHide,
    BeforeUnload,
    Unload,
    Teardown,
}

impl ExitSignal {
    pub fn exit_type(&self) -> ExitType {
        match self {
            Self::RouteChange => ExitType::Navigate,
            Self::PageHide => ExitType::Pagehide,
            Self::BeforeUnload | Self::Unload => ExitType::Unload,
            Self::Teardown => ExitType::End,
        }
    }
}

#[derive(Debug, Default)]
pub struct ExitCoordinator {
    finalized: Option<String>,
}

impl ExitCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finalized(&self, page_view_id: &str) -> bool {
        self.finalized.as_deref() == Some(page_view_id)
    }

    /// One-shot claim on a page view. Returns `false` if it was already taken.
    pub fn claim(&mut self, page_view_id: &str) -> bool {
        if self.is_finalized(page_view_id) {
            return false;
        }
        self.finalized = Some(page_view_id.to_string());
        true
    }

    /// Claim, then terminate. `None` when the page view was already closed.
    pub fn finalize(
        &mut self,
        session: &mut PageViewSession,
        signal: ExitSignal,
        now_ms: u64,
    ) -> Option<Event> {
        if !self.claim(session.id()) {
            tracing::trace!(
                page_view = session.id(),
                signal = ?signal,
                "Ignoring exit signal for finalized page view"
            );
            return None;
        }
        session.terminate(signal.exit_type(), now_ms)
    }
}
