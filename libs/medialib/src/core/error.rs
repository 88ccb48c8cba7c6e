// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

/// Operation result codes shared by every component variant.
///
/// These are codes rather than rich errors because they cross the callback
/// boundary inside [`Event::Error`](crate::core::events::Event) notifications
/// and worker threads; anything with a cause chain (engine faults, IO) is
/// logged at the seam and mapped onto one of these.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaError {
    /// Caller misuse: invalid handle, port index, or argument combination.
    #[error("bad parameter")]
    BadParameter,

    /// Operation issued outside its allowed lifecycle state.
    #[error("invalid state")]
    InvalidState,

    /// The requested state is not reachable from the current one.
    #[error("incorrect state transition")]
    IncorrectStateTransition,

    /// The requested state is the state the component is already in.
    #[error("same state")]
    SameState,

    /// The component variant does not implement this operation or index.
    #[error("operation not supported")]
    Unsupported,

    /// Registry lookup miss.
    #[error("component not found")]
    ComponentNotFound,

    /// Binding two ports facing the same direction.
    #[error("ports not compatible")]
    PortNotCompatible,

    /// Resource allocation failed during a state transition.
    #[error("insufficient resources")]
    InsufficientResources,

    /// Unrecoverable decode fault; processing halts until flush/stop.
    #[error("macroblock errors in frame")]
    ErrorsInFrame,

    /// The demuxer could not probe the source format.
    #[error("format not detected")]
    FormatNotDetected,

    /// No current media time yet (clock not running).
    #[error("undefined")]
    Undefined,
}

pub type Result<T> = std::result::Result<T, MediaError>;
