// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

/// Lifecycle state of a component instance.
///
/// The contract is identical across every component variant. Instances are
/// created `Loaded` and may only be destroyed from `Loaded`. Used internally
/// by the worker loops and surfaced to applications through `get_state` and
/// `CmdComplete` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    /// Terminal error state; only reachable, never left.
    Invalid,
    /// Constructed, heavyweight resources not yet allocated.
    Loaded,
    /// Resources allocated, ready to process but not active.
    Idle,
    /// Actively processing data.
    Executing,
    /// Temporarily halted; resources stay allocated, media time stands still.
    Pause,
}

impl Default for ComponentState {
    fn default() -> Self {
        Self::Loaded
    }
}

impl ComponentState {
    /// Legal predecessor check for a requested transition.
    ///
    /// Same-state requests are not transitions; callers detect them first and
    /// report `SameState`. `Invalid` is reachable from anywhere and terminal.
    pub fn can_transition_to(self, target: ComponentState) -> bool {
        use ComponentState::*;
        match target {
            Invalid => true,
            Loaded => matches!(self, Idle | Executing | Pause),
            Idle => matches!(self, Loaded | Executing | Pause),
            Executing => matches!(self, Idle | Pause),
            Pause => matches!(self, Idle | Executing),
        }
    }
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid => write!(f, "Invalid"),
            Self::Loaded => write!(f, "Loaded"),
            Self::Idle => write!(f, "Idle"),
            Self::Executing => write!(f, "Executing"),
            Self::Pause => write!(f, "Pause"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executing_not_reachable_from_loaded() {
        assert!(!ComponentState::Loaded.can_transition_to(ComponentState::Executing));
        assert!(ComponentState::Idle.can_transition_to(ComponentState::Executing));
        assert!(ComponentState::Pause.can_transition_to(ComponentState::Executing));
    }

    #[test]
    fn pause_not_reachable_from_loaded() {
        assert!(!ComponentState::Loaded.can_transition_to(ComponentState::Pause));
        assert!(ComponentState::Executing.can_transition_to(ComponentState::Pause));
        assert!(ComponentState::Idle.can_transition_to(ComponentState::Pause));
    }

    #[test]
    fn loaded_reachable_from_every_active_state() {
        for from in [
            ComponentState::Idle,
            ComponentState::Executing,
            ComponentState::Pause,
        ] {
            assert!(from.can_transition_to(ComponentState::Loaded));
        }
    }

    #[test]
    fn invalid_is_terminal() {
        assert!(ComponentState::Executing.can_transition_to(ComponentState::Invalid));
        assert!(!ComponentState::Invalid.can_transition_to(ComponentState::Loaded));
        assert!(!ComponentState::Invalid.can_transition_to(ComponentState::Idle));
        assert!(!ComponentState::Invalid.can_transition_to(ComponentState::Executing));
    }
}
