//! App lifecycle tracking.
//!
//! `Unconfigured -> CatalogBuilt -> (Persisted) -> HandlersAttached -> Serving -> Stopped`, with
//! `Failed` reachable from anywhere. A config-only run stops right after `Persisted`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unconfigured,
    CatalogBuilt,
    Persisted,
    HandlersAttached,
    Serving,
    Stopped,
    Failed,
}

impl LifecycleState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Unconfigured => "unconfigured",
            LifecycleState::CatalogBuilt => "catalog_built",
            LifecycleState::Persisted => "persisted",
            LifecycleState::HandlersAttached => "handlers_attached",
            LifecycleState::Serving => "serving",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        }
    }

    fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::{
            CatalogBuilt, Failed, HandlersAttached, Persisted, Serving, Stopped, Unconfigured,
        };
        matches!(
            (self, next),
            (_, Failed)
                | (Unconfigured, CatalogBuilt)
                | (CatalogBuilt, Persisted | HandlersAttached)
                | (Persisted, HandlersAttached | Stopped)
                | (HandlersAttached, Serving)
                | (Serving, Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one app's lifecycle and logs each transition.
#[derive(Debug)]
pub struct Lifecycle {
    app: String,
    state: LifecycleState,
}

impl Lifecycle {
    #[must_use]
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            state: LifecycleState::Unconfigured,
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Rename once the app name is known (it comes from the document or config).
    pub fn set_app(&mut self, app: impl Into<String>) {
        self.app = app.into();
    }

    /// Move to `next`. Returns `false` (and leaves the state unchanged) for an illegal transition.
    pub fn advance(&mut self, next: LifecycleState) -> bool {
        if !self.state.can_advance_to(next) {
            tracing::warn!(
                app = %self.app,
                from = %self.state,
                to = %next,
                "Ignoring illegal lifecycle transition"
            );
            return false;
        }
        tracing::debug!(app = %self.app, from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
        true
    }

    /// Record an unrecoverable error.
    pub fn fail(&mut self, error: &dyn fmt::Display) {
        tracing::error!(app = %self.app, from = %self.state, error = %error, "App failed");
        self.state = LifecycleState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_persist_serve_path() {
        let mut lc = Lifecycle::new("demo");
        for next in [
            LifecycleState::CatalogBuilt,
            LifecycleState::Persisted,
            LifecycleState::HandlersAttached,
            LifecycleState::Serving,
            LifecycleState::Stopped,
        ] {
            assert!(lc.advance(next), "{next}");
        }
        assert_eq!(lc.state(), LifecycleState::Stopped);
    }

    #[test]
    fn config_only_stops_after_persist() {
        let mut lc = Lifecycle::new("demo");
        assert!(lc.advance(LifecycleState::CatalogBuilt));
        assert!(lc.advance(LifecycleState::Persisted));
        assert!(lc.advance(LifecycleState::Stopped));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut lc = Lifecycle::new("demo");
        assert!(!lc.advance(LifecycleState::Serving));
        assert_eq!(lc.state(), LifecycleState::Unconfigured);
    }

    #[test]
    fn failure_is_reachable_from_any_state() {
        let mut lc = Lifecycle::new("demo");
        lc.advance(LifecycleState::CatalogBuilt);
        lc.fail(&"boom");
        assert_eq!(lc.state(), LifecycleState::Failed);
    }
}
