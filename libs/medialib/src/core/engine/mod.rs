// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! External-collaborator seams.
//!
//! The framework specifies its codec, container and rendering collaborators
//! at the interface boundary only; everything here is a trait taking and
//! returning owned data, with fallibility expressed as `anyhow::Result` so
//! implementations keep their own error types. Worker loops map failures
//! onto the component error taxonomy at the seam.
//!
//! The [`synthetic`] module provides in-repo implementations that make the
//! whole pipeline runnable (and testable) without hardware.

mod synthetic;

pub use synthetic::{
    CountingAudioSink, CountingContainerWriter, CountingVideoSink, FaultyCodec, PassthroughCodec,
    SyntheticSource,
};

use bytes::Bytes;

use crate::core::format::{StreamInfo, StreamKind};

/// One demultiplexed unit of an elementary stream.
#[derive(Debug, Clone)]
pub struct Packet {
    pub stream_index: u32,
    pub kind: StreamKind,
    pub payload: Bytes,
    pub pts: i64,
    /// Set on the final packet of this elementary stream.
    pub end_of_stream: bool,
}

/// Container source consumed by the demuxer: probe, pull packets, seek.
pub trait StreamSource: Send {
    fn probe(&mut self) -> anyhow::Result<StreamInfo>;

    /// Next packet in presentation order; `Ok(None)` is the source end.
    fn read_packet(&mut self) -> anyhow::Result<Option<Packet>>;

    fn seek(&mut self, position_us: i64) -> anyhow::Result<()>;
}

/// Decoder/encoder engine. `init` performs the heavyweight allocation at the
/// `Loaded`→`Idle` transition; `reset` drops in-flight state on flush/seek.
pub trait CodecEngine: Send {
    fn init(&mut self) -> anyhow::Result<()>;

    /// One unit of work: consume a packet payload, produce a frame payload
    /// (or the reverse, for an encoder).
    fn process(&mut self, payload: &Bytes) -> anyhow::Result<Bytes>;

    fn reset(&mut self) -> anyhow::Result<()>;
}

/// Audio output device behind the audio renderer.
pub trait AudioSink: Send {
    fn configure(&mut self, channels: u32, sample_rate: u32) -> anyhow::Result<()>;

    fn play(&mut self, payload: &Bytes, pts: i64) -> anyhow::Result<()>;

    /// Microseconds of audio accepted but not yet audible; subtracted from
    /// the reported playback position.
    fn cached_duration_us(&self) -> i64;

    fn pause(&mut self, paused: bool);
}

/// Display device behind the video renderer.
pub trait VideoSink: Send {
    fn show(&mut self, payload: &Bytes, pts: i64) -> anyhow::Result<()>;
}

/// Container writer behind the muxer: segments begin, receive samples, end.
pub trait ContainerWriter: Send {
    fn begin_segment(&mut self, index: u32) -> anyhow::Result<()>;

    fn write_sample(&mut self, kind: StreamKind, payload: &Bytes, pts: i64) -> anyhow::Result<()>;

    fn end_segment(&mut self) -> anyhow::Result<()>;
}
