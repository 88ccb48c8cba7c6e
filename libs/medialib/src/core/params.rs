// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::component::ComponentHandle;
use crate::core::engine::{AudioSink, CodecEngine, ContainerWriter, StreamSource, VideoSink};
use crate::core::format::{StreamInfo, StreamKind};
use crate::core::ports::PortDefinition;
use crate::core::time::MediaTimeSource;

/// Selector for `get_parameter`. Static configuration, `Loaded` only for
/// setters; getters are valid in any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    PortDefinition(u32),
    Bind(u32),
    StreamInfo,
    ActiveStream(StreamKind),
}

/// Static configuration payloads. Engine variants inject the external
/// collaborators a component variant needs; they replace the raw engine
/// handle parameters of a hardware build.
pub enum Param {
    PortDefinition(PortDefinition),
    Bind {
        port: u32,
        peer: Option<(ComponentHandle, u32)>,
    },
    StreamInfo(StreamInfo),
    ActiveStream {
        kind: StreamKind,
        stream_index: u32,
    },
    StreamSource(Box<dyn StreamSource>),
    CodecEngine(Box<dyn CodecEngine>),
    AudioSink(Box<dyn AudioSink>),
    VideoSink(Box<dyn VideoSink>),
    ContainerWriter(Box<dyn ContainerWriter>),
    TimeSource(Arc<dyn MediaTimeSource>),
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortDefinition(def) => f.debug_tuple("PortDefinition").field(def).finish(),
            Self::Bind { port, peer } => f
                .debug_struct("Bind")
                .field("port", port)
                .field("bound", &peer.is_some())
                .finish(),
            Self::StreamInfo(info) => f.debug_tuple("StreamInfo").field(info).finish(),
            Self::ActiveStream { kind, stream_index } => f
                .debug_struct("ActiveStream")
                .field("kind", kind)
                .field("stream_index", stream_index)
                .finish(),
            Self::StreamSource(_) => f.write_str("StreamSource(..)"),
            Self::CodecEngine(_) => f.write_str("CodecEngine(..)"),
            Self::AudioSink(_) => f.write_str("AudioSink(..)"),
            Self::VideoSink(_) => f.write_str("VideoSink(..)"),
            Self::ContainerWriter(_) => f.write_str("ContainerWriter(..)"),
            Self::TimeSource(_) => f.write_str("TimeSource(..)"),
        }
    }
}

/// A port-tagged timestamp, the payload of every time-related config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampInfo {
    pub port_index: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClockRunState {
    Stopped,
    WaitingForStartTime,
    Running,
}

/// The media clock's published state, pushed to every bound peer the moment
/// the clock starts running so they all observe the same timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    pub run_state: ClockRunState,
    pub start_time: i64,
    pub wait_mask: u32,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            run_state: ClockRunState::Stopped,
            start_time: -1,
            wait_mask: 0,
        }
    }
}

/// Read-only diagnostic snapshot of a worker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStats {
    pub queue_depth: usize,
    pub wakeups_accepted: u64,
    pub wakeups_dropped: u64,
    pub units_done: u64,
    pub buffers_dropped: u64,
}

/// Selector for `get_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    CurMediaTime,
    ClockState,
    RotationDuration,
    WorkerStats,
}

/// Dynamic configuration, valid in any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Config {
    /// Seek to a media-time position.
    TimePosition(TimestampInfo),
    /// A bound port reports the timestamp it starts/resumes at.
    ClientStartTime(TimestampInfo),
    /// Audio renderer's current playback position, for drift correction.
    CurAudioReference(TimestampInfo),
    /// Current media time (get on the clock; pushed nowhere).
    CurMediaTime(TimestampInfo),
    ClockState(ClockState),
    /// Drop queued output without a state change.
    ClearBuffers,
    /// Muxer segment rotation threshold in microseconds; 0 disables.
    RotationDuration(i64),
    WorkerStats(WorkerStats),
}
