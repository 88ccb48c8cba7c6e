// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Synthetic engines: a scripted A/V source, passthrough codec, counting
//! sinks and a counting container writer. They stand in for the hardware
//! collaborators so the full pipeline runs in-process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::bail;
use bytes::Bytes;

use super::{AudioSink, CodecEngine, ContainerWriter, Packet, StreamSource, VideoSink};
use crate::core::format::{
    AudioCoding, MediaFormat, StreamDescriptor, StreamInfo, StreamKind, VideoCoding,
};

/// Scripted source producing interleaved audio/video packets in pts order.
pub struct SyntheticSource {
    info: StreamInfo,
    packets: Vec<Packet>,
    cursor: usize,
}

impl SyntheticSource {
    /// Audio + video source: packets every `audio_interval_us` /
    /// `video_interval_us` up to `duration_us`, last packet of each stream
    /// flagged end-of-stream.
    pub fn av(duration_us: i64, video_interval_us: i64, audio_interval_us: i64) -> Self {
        Self::build(duration_us, Some(video_interval_us), Some(audio_interval_us))
    }

    pub fn video_only(duration_us: i64, video_interval_us: i64) -> Self {
        Self::build(duration_us, Some(video_interval_us), None)
    }

    pub fn audio_only(duration_us: i64, audio_interval_us: i64) -> Self {
        Self::build(duration_us, None, Some(audio_interval_us))
    }

    fn build(duration_us: i64, video_interval_us: Option<i64>, audio_interval_us: Option<i64>) -> Self {
        let mut streams = Vec::new();
        let mut packets: Vec<Packet> = Vec::new();
        let mut stream_index = 0u32;

        if let Some(interval) = video_interval_us {
            streams.push(StreamDescriptor {
                index: stream_index,
                kind: StreamKind::Video,
                format: MediaFormat::Video {
                    coding: VideoCoding::H264,
                    width: 320,
                    height: 240,
                    frame_rate: (1_000_000 / interval.max(1)) as u32,
                },
            });
            Self::emit(&mut packets, stream_index, StreamKind::Video, duration_us, interval);
            stream_index += 1;
        }

        if let Some(interval) = audio_interval_us {
            streams.push(StreamDescriptor {
                index: stream_index,
                kind: StreamKind::Audio,
                format: MediaFormat::Audio {
                    coding: AudioCoding::Pcm,
                    channels: 2,
                    sample_rate: 48_000,
                },
            });
            Self::emit(&mut packets, stream_index, StreamKind::Audio, duration_us, interval);
        }

        packets.sort_by_key(|p| p.pts);

        Self {
            info: StreamInfo {
                duration_us,
                streams,
            },
            packets,
            cursor: 0,
        }
    }

    fn emit(packets: &mut Vec<Packet>, index: u32, kind: StreamKind, duration_us: i64, interval: i64) {
        let interval = interval.max(1);
        let count = (duration_us / interval).max(1);
        for n in 0..count {
            packets.push(Packet {
                stream_index: index,
                kind,
                payload: Bytes::from(vec![index as u8; 16]),
                pts: n * interval,
                end_of_stream: n == count - 1,
            });
        }
    }
}

impl StreamSource for SyntheticSource {
    fn probe(&mut self) -> anyhow::Result<StreamInfo> {
        if self.info.streams.is_empty() {
            bail!("no elementary streams");
        }
        Ok(self.info.clone())
    }

    fn read_packet(&mut self) -> anyhow::Result<Option<Packet>> {
        let packet = self.packets.get(self.cursor).cloned();
        if packet.is_some() {
            self.cursor += 1;
        }
        Ok(packet)
    }

    fn seek(&mut self, position_us: i64) -> anyhow::Result<()> {
        self.cursor = self
            .packets
            .iter()
            .position(|p| p.pts >= position_us)
            .unwrap_or(self.packets.len());
        Ok(())
    }
}

/// Codec that hands every payload straight through.
#[derive(Default)]
pub struct PassthroughCodec {
    initialized: bool,
}

impl PassthroughCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CodecEngine for PassthroughCodec {
    fn init(&mut self) -> anyhow::Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn process(&mut self, payload: &Bytes) -> anyhow::Result<Bytes> {
        if !self.initialized {
            bail!("codec used before init");
        }
        Ok(payload.clone())
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Codec scripted to fail, for exercising the fault paths.
pub struct FaultyCodec {
    fail_init: bool,
    fail_after: u64,
    processed: u64,
}

impl FaultyCodec {
    /// `init` fails immediately.
    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            fail_after: 0,
            processed: 0,
        }
    }

    /// `process` fails after `n` successful units.
    pub fn failing_after(n: u64) -> Self {
        Self {
            fail_init: false,
            fail_after: n,
            processed: 0,
        }
    }
}

impl CodecEngine for FaultyCodec {
    fn init(&mut self) -> anyhow::Result<()> {
        if self.fail_init {
            bail!("scripted init failure");
        }
        Ok(())
    }

    fn process(&mut self, payload: &Bytes) -> anyhow::Result<Bytes> {
        if self.processed >= self.fail_after {
            bail!("scripted decode fault");
        }
        self.processed += 1;
        Ok(payload.clone())
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        self.processed = 0;
        Ok(())
    }
}

/// Audio sink that counts played payloads and reports a fixed cache depth.
pub struct CountingAudioSink {
    played: Arc<AtomicU64>,
    cached_us: i64,
    paused: bool,
}

impl CountingAudioSink {
    pub fn new() -> Self {
        Self::with_cached_duration(0)
    }

    pub fn with_cached_duration(cached_us: i64) -> Self {
        Self {
            played: Arc::new(AtomicU64::new(0)),
            cached_us,
            paused: false,
        }
    }

    /// Shared counter of played payloads, for assertions.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.played)
    }
}

impl Default for CountingAudioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CountingAudioSink {
    fn configure(&mut self, _channels: u32, _sample_rate: u32) -> anyhow::Result<()> {
        Ok(())
    }

    fn play(&mut self, _payload: &Bytes, _pts: i64) -> anyhow::Result<()> {
        self.played.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cached_duration_us(&self) -> i64 {
        self.cached_us
    }

    fn pause(&mut self, paused: bool) {
        self.paused = paused;
    }
}

/// Video sink that counts shown frames.
pub struct CountingVideoSink {
    shown: Arc<AtomicU64>,
}

impl CountingVideoSink {
    pub fn new() -> Self {
        Self {
            shown: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.shown)
    }
}

impl Default for CountingVideoSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSink for CountingVideoSink {
    fn show(&mut self, _payload: &Bytes, _pts: i64) -> anyhow::Result<()> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Container writer that counts segments and samples.
pub struct CountingContainerWriter {
    segments_begun: Arc<AtomicU64>,
    segments_ended: Arc<AtomicU64>,
    samples: Arc<AtomicU64>,
    open: bool,
}

impl CountingContainerWriter {
    pub fn new() -> Self {
        Self {
            segments_begun: Arc::new(AtomicU64::new(0)),
            segments_ended: Arc::new(AtomicU64::new(0)),
            samples: Arc::new(AtomicU64::new(0)),
            open: false,
        }
    }

    pub fn segments_begun(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.segments_begun)
    }

    pub fn segments_ended(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.segments_ended)
    }

    pub fn samples(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.samples)
    }
}

impl Default for CountingContainerWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerWriter for CountingContainerWriter {
    fn begin_segment(&mut self, _index: u32) -> anyhow::Result<()> {
        if self.open {
            bail!("segment already open");
        }
        self.open = true;
        self.segments_begun.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_sample(&mut self, _kind: StreamKind, _payload: &Bytes, _pts: i64) -> anyhow::Result<()> {
        if !self.open {
            bail!("write outside a segment");
        }
        self.samples.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn end_segment(&mut self) -> anyhow::Result<()> {
        if !self.open {
            bail!("no open segment");
        }
        self.open = false;
        self.segments_ended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
