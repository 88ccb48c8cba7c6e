// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

#![allow(clippy::type_complexity)]

// Re-export for downstream crates that register their own components.
pub use inventory;

pub mod core;

pub use core::{
    buffer::{BufferFlags, BufferPool, MediaBuffer},
    component::{ComponentHandle, MediaComponent},
    components,
    engine,
    error::{MediaError, Result},
    events::{ComponentObserver, Event, NullObserver},
    format::{AudioCoding, MediaFormat, StreamDescriptor, StreamInfo, StreamKind, VideoCoding},
    messages::{Command, CommandKind},
    params::{ClockRunState, ClockState, Config, ConfigKind, Param, ParamKind, TimestampInfo, WorkerStats},
    ports::{PortDefinition, PortDirection},
    queue::{MessageQueue, WaitReason},
    registry::{ComponentRegistration, ComponentRegistry},
    state::ComponentState,
    time::{ManualTimeSource, MediaTimeSource, SystemTimeSource},
};
