// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Playback facade: owns the component handles, wires the pipeline per the
//! probed stream info, and sequences states in the canonical order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use thiserror::Error;

use medialib::components::{
    AUDIO_RENDER_PORT_IN_AUDIO, AUDIO_RENDER_PORT_IN_CLOCK, CLOCK_PORT_OUT_AUDIO,
    CLOCK_PORT_OUT_VIDEO, DEMUXER_PORT_OUT_AUDIO, DEMUXER_PORT_OUT_VIDEO, TRANSFORM_PORT_IN,
    TRANSFORM_PORT_OUT, VIDEO_RENDER_PORT_IN_CLOCK, VIDEO_RENDER_PORT_IN_VIDEO,
};
use medialib::engine::StreamSource;
use medialib::{
    Command, ComponentHandle, ComponentObserver, ComponentRegistry, ComponentState, Config, Event,
    MediaError, Param, ParamKind, StreamInfo, TimestampInfo,
};

const MEDIA_VIDEO: u32 = 0x1;
const MEDIA_AUDIO: u32 = 0x2;

const STATE_POLL: Duration = Duration::from_millis(1);
const STATE_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("timed out waiting for a state change")]
    Timeout,

    #[error("no source installed")]
    NoSource,

    #[error("player is not prepared")]
    NotPrepared,
}

/// Notifications delivered to the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Current playback position, driven by the rendering timeline.
    PlayTime { media_time_us: i64 },
    /// Both renderers produced their first frame after a seek.
    SeekDone,
    /// Every active media branch reached end-of-stream.
    PlayEnd,
    /// A component faulted; playback will not progress.
    Fault(MediaError),
}

struct ObserverInner {
    /// Renderer instance id → media bit.
    renderer_bits: HashMap<String, u32>,
    end_mask: u32,
    seek_mask: u32,
    has_audio: bool,
}

/// The player's component observer: folds per-component events into the
/// application-facing [`PlayerEvent`] stream.
struct PlayerObserver {
    tx: Sender<PlayerEvent>,
    inner: Mutex<ObserverInner>,
}

impl PlayerObserver {
    fn new(tx: Sender<PlayerEvent>) -> Self {
        Self {
            tx,
            inner: Mutex::new(ObserverInner {
                renderer_bits: HashMap::new(),
                end_mask: 0,
                seek_mask: 0,
                has_audio: false,
            }),
        }
    }

    fn register_renderer(&self, instance_id: &str, bit: u32) {
        let mut inner = self.inner.lock();
        inner.renderer_bits.insert(instance_id.to_owned(), bit);
        if bit == MEDIA_AUDIO {
            inner.has_audio = true;
        }
    }

    fn arm_end_mask(&self, mask: u32) {
        self.inner.lock().end_mask = mask;
    }

    fn arm_seek_mask(&self, mask: u32) {
        self.inner.lock().seek_mask = mask;
    }

    fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.renderer_bits.clear();
        inner.end_mask = 0;
        inner.seek_mask = 0;
        inner.has_audio = false;
    }
}

impl ComponentObserver for PlayerObserver {
    fn on_event(&self, component_id: &str, event: Event) {
        match event {
            Event::BufferFlag { .. } => {
                let mut inner = self.inner.lock();
                if let Some(bit) = inner.renderer_bits.get(component_id).copied() {
                    if inner.end_mask & bit != 0 {
                        inner.end_mask &= !bit;
                        if inner.end_mask == 0 {
                            let _ = self.tx.send(PlayerEvent::PlayEnd);
                        }
                    }
                }
            }
            Event::AudioRenderPts { pts } => {
                let _ = self.tx.send(PlayerEvent::PlayTime { media_time_us: pts });
            }
            Event::VideoRenderPts { pts } => {
                // Audio owns the reported timeline when present.
                if !self.inner.lock().has_audio {
                    let _ = self.tx.send(PlayerEvent::PlayTime { media_time_us: pts });
                }
            }
            Event::VideoRenderFirstFrame => self.first_frame(MEDIA_VIDEO),
            Event::AudioRenderFirstFrame => self.first_frame(MEDIA_AUDIO),
            Event::Error { error, .. } => {
                if matches!(
                    error,
                    MediaError::ErrorsInFrame | MediaError::InsufficientResources
                ) {
                    let _ = self.tx.send(PlayerEvent::Fault(error));
                }
            }
            _ => {}
        }
    }
}

impl PlayerObserver {
    fn first_frame(&self, bit: u32) {
        let mut inner = self.inner.lock();
        if inner.seek_mask & bit != 0 {
            inner.seek_mask &= !bit;
            if inner.seek_mask == 0 {
                let _ = self.tx.send(PlayerEvent::SeekDone);
            }
        }
    }
}

pub struct Player {
    registry: Arc<ComponentRegistry>,
    observer: Arc<PlayerObserver>,
    events: Receiver<PlayerEvent>,
    source: Option<Box<dyn StreamSource>>,
    stream_info: Option<StreamInfo>,
    demuxer: Option<ComponentHandle>,
    vdec: Option<ComponentHandle>,
    adec: Option<ComponentHandle>,
    video_render: Option<ComponentHandle>,
    audio_render: Option<ComponentHandle>,
    clock: Option<ComponentHandle>,
    playing: bool,
}

impl Player {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            registry,
            observer: Arc::new(PlayerObserver::new(tx)),
            events: rx,
            source: None,
            stream_info: None,
            demuxer: None,
            vdec: None,
            adec: None,
            video_render: None,
            audio_render: None,
            clock: None,
            playing: false,
        }
    }

    /// Application-facing event stream. Clone freely; delivery is fan-out
    /// safe only through one receiver at a time.
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events.clone()
    }

    pub fn set_source(&mut self, source: Box<dyn StreamSource>) {
        self.source = Some(source);
    }

    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Create the demuxer and probe the source. The probed [`StreamInfo`]
    /// decides which branches [`start`](Self::start) builds.
    pub fn prepare(&mut self) -> Result<StreamInfo, PlayerError> {
        let source = self.source.take().ok_or(PlayerError::NoSource)?;
        let observer: Arc<dyn ComponentObserver> = self.observer.clone();
        let demuxer = self.registry.get_handle("DEMUXER", observer)?;
        demuxer.set_parameter(Param::StreamSource(source))?;
        let info = match demuxer.get_parameter(ParamKind::StreamInfo)? {
            Param::StreamInfo(info) => info,
            _ => return Err(MediaError::FormatNotDetected.into()),
        };
        tracing::info!(
            "prepared: {} streams, duration {}us",
            info.streams.len(),
            info.duration_us
        );
        self.demuxer = Some(demuxer);
        self.stream_info = Some(info.clone());
        Ok(info)
    }

    /// Build the branches the source calls for, bind them, and drive every
    /// component to `Idle`.
    pub fn start(&mut self) -> Result<(), PlayerError> {
        let info = self.stream_info.clone().ok_or(PlayerError::NotPrepared)?;
        let demuxer = self.demuxer.clone().ok_or(PlayerError::NotPrepared)?;
        let observer: Arc<dyn ComponentObserver> = self.observer.clone();

        let mut mask = 0u32;

        if info.has_video() {
            let vdec = self.registry.get_handle("VDEC", observer.clone())?;
            let render = self.registry.get_handle("VIDEO_RENDER", observer.clone())?;
            self.observer.register_renderer(render.instance_id(), MEDIA_VIDEO);
            self.registry.set_bind(
                Some((&demuxer, DEMUXER_PORT_OUT_VIDEO)),
                Some((&vdec, TRANSFORM_PORT_IN)),
            )?;
            self.registry.set_bind(
                Some((&vdec, TRANSFORM_PORT_OUT)),
                Some((&render, VIDEO_RENDER_PORT_IN_VIDEO)),
            )?;
            self.vdec = Some(vdec);
            self.video_render = Some(render);
            mask |= MEDIA_VIDEO;
        }

        if info.has_audio() {
            let adec = self.registry.get_handle("ADEC", observer.clone())?;
            let render = self.registry.get_handle("AUDIO_RENDER", observer.clone())?;
            self.observer.register_renderer(render.instance_id(), MEDIA_AUDIO);
            self.registry.set_bind(
                Some((&demuxer, DEMUXER_PORT_OUT_AUDIO)),
                Some((&adec, TRANSFORM_PORT_IN)),
            )?;
            self.registry.set_bind(
                Some((&adec, TRANSFORM_PORT_OUT)),
                Some((&render, AUDIO_RENDER_PORT_IN_AUDIO)),
            )?;
            self.adec = Some(adec);
            self.audio_render = Some(render);
            mask |= MEDIA_AUDIO;
        }

        // The shared clock only makes sense when there are two timelines to
        // keep together.
        if info.has_audio() && info.has_video() {
            let clock = self.registry.get_handle("CLOCK", observer)?;
            if let Some(render) = &self.video_render {
                self.registry.set_bind(
                    Some((&clock, CLOCK_PORT_OUT_VIDEO)),
                    Some((render, VIDEO_RENDER_PORT_IN_CLOCK)),
                )?;
            }
            if let Some(render) = &self.audio_render {
                self.registry.set_bind(
                    Some((&clock, CLOCK_PORT_OUT_AUDIO)),
                    Some((render, AUDIO_RENDER_PORT_IN_CLOCK)),
                )?;
            }
            self.clock = Some(clock);
        }

        self.observer.arm_end_mask(mask);

        for handle in self.handles() {
            drive_state(&handle, ComponentState::Idle)?;
        }
        Ok(())
    }

    /// Set everything `Executing`, sinks first and the demuxer last so no
    /// data flows into a component that is not yet running.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        if self.demuxer.is_none() {
            return Err(PlayerError::NotPrepared);
        }
        if let Some(clock) = &self.clock {
            // Arm the start-time wait so the renderers' first frames align
            // the shared timeline.
            clock.set_config(Config::TimePosition(TimestampInfo {
                port_index: 0,
                timestamp: 0,
            }))?;
        }
        for handle in self.execution_order() {
            drive_state(&handle, ComponentState::Executing)?;
        }
        self.playing = true;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlayerError> {
        for handle in self.execution_order().into_iter().rev() {
            drive_state(&handle, ComponentState::Pause)?;
        }
        self.playing = false;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), PlayerError> {
        for handle in self.execution_order() {
            drive_state(&handle, ComponentState::Executing)?;
        }
        self.playing = true;
        Ok(())
    }

    /// Seek to `position_us`: pause, flush the pipeline, point the demuxer
    /// at the new position, re-arm the clock, resume.
    pub fn seek(&mut self, position_us: i64) -> Result<(), PlayerError> {
        let demuxer = self.demuxer.clone().ok_or(PlayerError::NotPrepared)?;
        let was_playing = self.playing;
        if was_playing {
            self.pause()?;
        }

        let mut mask = 0u32;
        if self.video_render.is_some() {
            mask |= MEDIA_VIDEO;
        }
        if self.audio_render.is_some() {
            mask |= MEDIA_AUDIO;
        }
        self.observer.arm_seek_mask(mask);
        self.observer.arm_end_mask(mask);

        let position = TimestampInfo {
            port_index: 0,
            timestamp: position_us,
        };
        for handle in [&self.video_render, &self.audio_render, &self.vdec, &self.adec]
            .into_iter()
            .flatten()
        {
            handle.set_config(Config::TimePosition(position))?;
        }
        demuxer.set_config(Config::TimePosition(position))?;
        demuxer.set_config(Config::ClearBuffers)?;
        if let Some(clock) = &self.clock {
            clock.set_config(Config::TimePosition(position))?;
        }

        if was_playing {
            self.resume()?;
        }
        Ok(())
    }

    /// Tear the pipeline down: states back to `Loaded` renderer-first, then
    /// the unbind choreography, then every handle freed.
    pub fn stop(&mut self) -> Result<(), PlayerError> {
        let handles = self.teardown_order();
        for handle in &handles {
            if matches!(
                handle.get_state(),
                ComponentState::Executing | ComponentState::Pause
            ) {
                drive_state(handle, ComponentState::Idle)?;
            }
        }
        for handle in &handles {
            if handle.get_state() == ComponentState::Idle {
                drive_state(handle, ComponentState::Loaded)?;
            }
        }

        // Unbind output sides one by one; each call clears both records.
        if let Some(demuxer) = &self.demuxer {
            let _ = self
                .registry
                .set_bind(Some((demuxer, DEMUXER_PORT_OUT_VIDEO)), None);
            let _ = self
                .registry
                .set_bind(Some((demuxer, DEMUXER_PORT_OUT_AUDIO)), None);
        }
        for dec in [&self.vdec, &self.adec].into_iter().flatten() {
            let _ = self.registry.set_bind(Some((dec, TRANSFORM_PORT_OUT)), None);
        }
        if let Some(clock) = &self.clock {
            let _ = self
                .registry
                .set_bind(Some((clock, CLOCK_PORT_OUT_VIDEO)), None);
            let _ = self
                .registry
                .set_bind(Some((clock, CLOCK_PORT_OUT_AUDIO)), None);
        }

        for handle in &handles {
            self.registry.free_handle(handle)?;
        }

        self.demuxer = None;
        self.vdec = None;
        self.adec = None;
        self.video_render = None;
        self.audio_render = None;
        self.clock = None;
        self.stream_info = None;
        self.observer.reset();
        self.playing = false;
        Ok(())
    }

    fn handles(&self) -> Vec<ComponentHandle> {
        [
            &self.demuxer,
            &self.vdec,
            &self.adec,
            &self.video_render,
            &self.audio_render,
            &self.clock,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }

    /// The canonical `Executing` order: clock, renderers, decoders, demuxer.
    fn execution_order(&self) -> Vec<ComponentHandle> {
        [
            &self.clock,
            &self.video_render,
            &self.audio_render,
            &self.vdec,
            &self.adec,
            &self.demuxer,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }

    /// Teardown order: renderers first so nothing downstream still wants the
    /// buffers the decoders hold.
    fn teardown_order(&self) -> Vec<ComponentHandle> {
        [
            &self.video_render,
            &self.audio_render,
            &self.vdec,
            &self.adec,
            &self.demuxer,
            &self.clock,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

/// Request a transition and poll until it lands. A same-state request is
/// already satisfied.
pub(crate) fn drive_state(
    handle: &ComponentHandle,
    target: ComponentState,
) -> Result<(), PlayerError> {
    match handle.send_command(Command::SetState(target)) {
        Ok(()) | Err(MediaError::SameState) => {}
        Err(err) => return Err(err.into()),
    }
    wait_for_state(handle, target)
}

fn wait_for_state(handle: &ComponentHandle, target: ComponentState) -> Result<(), PlayerError> {
    let deadline = Instant::now() + STATE_DEADLINE;
    while handle.get_state() != target {
        if Instant::now() >= deadline {
            tracing::warn!(
                "[{}] stuck in {} waiting for {}",
                handle.instance_id(),
                handle.get_state(),
                target
            );
            return Err(PlayerError::Timeout);
        }
        std::thread::sleep(STATE_POLL);
    }
    Ok(())
}
