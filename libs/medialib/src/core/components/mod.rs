// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The built-in component variants and their shared plumbing.

pub mod base;

mod audio_renderer;
mod clock;
mod demuxer;
mod muxer;
mod transform;
mod video_renderer;

pub use audio_renderer::{
    AudioRenderComponent, AUDIO_RENDER_PORT_IN_AUDIO, AUDIO_RENDER_PORT_IN_CLOCK,
};
pub use clock::{
    ClockComponent, CLOCK_PORT0, CLOCK_PORT1, CLOCK_PORT_OUT_AUDIO, CLOCK_PORT_OUT_VIDEO,
};
pub use demuxer::{DemuxerComponent, DEMUXER_PORT_OUT_AUDIO, DEMUXER_PORT_OUT_VIDEO};
pub use muxer::{MuxerComponent, MUXER_PORT_IN_AUDIO, MUXER_PORT_IN_VIDEO};
pub use transform::{TransformComponent, TransformKind, TRANSFORM_PORT_IN, TRANSFORM_PORT_OUT};
pub use video_renderer::{
    VideoRenderComponent, VIDEO_RENDER_PORT_IN_CLOCK, VIDEO_RENDER_PORT_IN_VIDEO,
};
