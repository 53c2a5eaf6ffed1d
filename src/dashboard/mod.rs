//! Dashboard state: an explicit container over a pure reducer.
//!
//! One [`DashboardStore`] is built per session and handed to whatever needs
//! it. Every change goes through [`reduce`], which returns a fresh
//! [`DashboardState`] and never mutates its input.

mod lifecycle;
mod pipeline;
mod state;

pub use lifecycle::ProjectLifecycle;
pub use pipeline::{AgentStep, Pipeline, StepState, Transition};
pub use state::{
    reduce, Action, ActivityEntry, ChatMessage, ChatRole, DashboardState, View,
};

use std::sync::Arc;
use tokio::sync::watch;

pub struct DashboardStore {
    state: watch::Sender<Arc<DashboardState>>,
}

impl DashboardStore {
    pub fn new(initial: DashboardState) -> Self {
        let (state, _) = watch::channel(Arc::new(initial));
        Self { state }
    }

    pub fn snapshot(&self) -> Arc<DashboardState> {
        self.state.borrow().clone()
    }

    /// Applies `action` and returns the resulting snapshot.
    pub fn dispatch(&self, action: Action) -> Arc<DashboardState> {
        tracing::trace!("dashboard action {:?}", action);
        let mut next = None;
        self.state.send_modify(|current| {
            let reduced = Arc::new(reduce(current.as_ref(), action));
            next = Some(Arc::clone(&reduced));
            *current = reduced;
        });
        next.unwrap_or_else(|| self.snapshot())
    }

    /// Receiver notified after every dispatch.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DashboardState>> {
        self.state.subscribe()
    }
}

impl Default for DashboardStore {
    fn default() -> Self {
        Self::new(DashboardState::new())
    }
}
