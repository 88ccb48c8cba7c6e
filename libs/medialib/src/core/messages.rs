// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::core::state::ComponentState;

/// Asynchronous control request delivered through a component's message
/// queue (or handled synchronously by components without a worker thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request a lifecycle transition. Acknowledged only through a
    /// `CmdComplete` event, never a return value.
    SetState(ComponentState),
    /// Discard queued work and reset the engine; processing resumes after.
    Flush,
    /// Exit the worker loop after the current unit of work.
    Stop,
    /// No-op; wakes a sleeping worker without any other effect.
    Nops,
    /// Edge-triggered flow-control release. Dropped unless the receiver has
    /// announced it is parked waiting for input or output.
    WakeUp,
    /// Upstream signalled end-of-stream; bounded waits from here on.
    Eos,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SetState(_) => CommandKind::StateSet,
            Command::Flush => CommandKind::Flush,
            Command::Stop => CommandKind::Stop,
            Command::Nops => CommandKind::Nops,
            Command::WakeUp => CommandKind::WakeUp,
            Command::Eos => CommandKind::Eos,
        }
    }
}

/// Payload-free discriminant of [`Command`], used in `CmdComplete` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    StateSet,
    Flush,
    Stop,
    Nops,
    WakeUp,
    Eos,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateSet => write!(f, "StateSet"),
            Self::Flush => write!(f, "Flush"),
            Self::Stop => write!(f, "Stop"),
            Self::Nops => write!(f, "Nops"),
            Self::WakeUp => write!(f, "WakeUp"),
            Self::Eos => write!(f, "Eos"),
        }
    }
}
