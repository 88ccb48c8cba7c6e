// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::core::buffer::{BufferFlags, MediaBuffer};
use crate::core::error::MediaError;
use crate::core::format::StreamInfo;
use crate::core::messages::CommandKind;
use crate::core::state::ComponentState;

/// Notifications delivered through the installed [`ComponentObserver`].
///
/// `CmdComplete` is the only acknowledgment channel for state changes;
/// background worker faults surface exclusively as `Error` events, never as
/// return codes.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CmdComplete {
        command: CommandKind,
        state: ComponentState,
    },
    Error {
        error: MediaError,
        state: ComponentState,
    },
    /// End-of-stream reached on the given port.
    BufferFlag { port: u32, flags: BufferFlags },
    PortFormatDetected { info: StreamInfo },
    VideoRenderPts { pts: i64 },
    AudioRenderPts { pts: i64 },
    VideoRenderFirstFrame,
    AudioRenderFirstFrame,
    /// The muxer hit its rotation threshold and opened the next segment.
    MuxerNeedNextFile,
    /// All bound inputs reached end-of-stream; the segment is finalized.
    MuxerFileDone,
}

/// Event/error notification sink, installed before any command that can
/// emit events. Implementations must be cheap and non-blocking; they run on
/// component worker threads.
pub trait ComponentObserver: Send + Sync {
    fn on_event(&self, component_id: &str, event: Event);

    /// A consumed buffer coming back to an unbound input side, i.e. the
    /// application itself was the producer.
    fn on_buffer_returned(&self, component_id: &str, buffer: MediaBuffer) {
        let _ = (component_id, buffer);
    }
}

/// Observer that ignores everything.
pub struct NullObserver;

impl ComponentObserver for NullObserver {
    fn on_event(&self, _component_id: &str, _event: Event) {}
}
