// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Audio renderer: plays every buffer as fast as the sink accepts it and
//! feeds its playback position back to the clock as the drift reference.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::buffer::{BufferFlags, MediaBuffer};
use crate::core::component::{ComponentHandle, MediaComponent};
use crate::core::components::base::{self, ComponentCore};
use crate::core::engine::{AudioSink, CountingAudioSink};
use crate::core::error::{MediaError, Result};
use crate::core::events::{ComponentObserver, Event};
use crate::core::format::MediaFormat;
use crate::core::messages::Command;
use crate::core::params::{ClockState, ClockRunState, Config, ConfigKind, Param, ParamKind, TimestampInfo};
use crate::core::ports::PortDefinition;
use crate::core::queue::WaitReason;
use crate::core::registry::ComponentRegistration;
use crate::core::state::ComponentState;

pub const AUDIO_RENDER_PORT_IN_AUDIO: u32 = 0;
pub const AUDIO_RENDER_PORT_IN_CLOCK: u32 = 1;

/// Hold interval while the clock is not yet running.
const CLOCK_HOLD_WAIT: Duration = Duration::from_millis(10);

/// Playback position reports to the clock are throttled to this interval.
const REFERENCE_INTERVAL: Duration = Duration::from_secs(1);
const REFERENCE_INTERVAL_US: i64 = 1_000_000;

const STREAM_END_WAIT: Duration = Duration::from_millis(5);

struct AudioRenderShared {
    sink: Mutex<Option<Box<dyn AudioSink>>>,
    input: Mutex<VecDeque<MediaBuffer>>,
    clock_state: Mutex<ClockState>,
}

pub struct AudioRenderComponent {
    core: Arc<ComponentCore>,
    shared: Arc<AudioRenderShared>,
}

impl AudioRenderComponent {
    pub fn create() -> Result<ComponentHandle> {
        let ports = vec![
            PortDefinition::input(AUDIO_RENDER_PORT_IN_AUDIO),
            PortDefinition::input(AUDIO_RENDER_PORT_IN_CLOCK),
        ];
        let core = Arc::new(ComponentCore::new("AUDIO_RENDER", ports));
        let shared = Arc::new(AudioRenderShared {
            sink: Mutex::new(None),
            input: Mutex::new(VecDeque::new()),
            clock_state: Mutex::new(ClockState::default()),
        });

        let worker_core = Arc::clone(&core);
        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(format!("audio-render-{}", core.id()))
            .spawn(move || audio_render_thread(worker_core, worker_shared))
            .map_err(|_| MediaError::InsufficientResources)?;
        core.attach_worker(thread);

        Ok(Arc::new(Self { core, shared }))
    }
}

impl MediaComponent for AudioRenderComponent {
    fn component_name(&self) -> &'static str {
        self.core.name()
    }

    fn instance_id(&self) -> &str {
        self.core.id()
    }

    fn send_command(&self, command: Command) -> Result<()> {
        base::dispatch_command(&self.core, command)
    }

    fn get_parameter(&self, kind: ParamKind) -> Result<Param> {
        match kind {
            ParamKind::PortDefinition(port) => {
                Ok(Param::PortDefinition(self.core.port_definition(port)?))
            }
            ParamKind::Bind(port) => self.core.bind_record(port),
            _ => Err(MediaError::Unsupported),
        }
    }

    fn set_parameter(&self, param: Param) -> Result<()> {
        if self.core.state() != ComponentState::Loaded {
            return Err(MediaError::InvalidState);
        }
        match param {
            Param::AudioSink(sink) => {
                *self.shared.sink.lock() = Some(sink);
                Ok(())
            }
            Param::PortDefinition(def) => self.core.set_port_format(def.port_index, def.format),
            _ => Err(MediaError::Unsupported),
        }
    }

    fn get_config(&self, kind: ConfigKind) -> Result<Config> {
        match kind {
            ConfigKind::WorkerStats => Ok(Config::WorkerStats(self.core.stats())),
            ConfigKind::ClockState => Ok(Config::ClockState(*self.shared.clock_state.lock())),
            _ => Err(MediaError::Unsupported),
        }
    }

    fn set_config(&self, config: Config) -> Result<()> {
        match config {
            Config::ClockState(state) => {
                *self.shared.clock_state.lock() = state;
                self.core.queue.send(Command::Nops);
                Ok(())
            }
            Config::TimePosition(_) | Config::ClearBuffers => {
                self.core.queue.send(Command::Flush);
                Ok(())
            }
            _ => Err(MediaError::Unsupported),
        }
    }

    fn get_state(&self) -> ComponentState {
        self.core.state()
    }

    fn bind_request(&self, port: u32, peer: Option<(ComponentHandle, u32)>) -> Result<()> {
        self.core.bind_request(port, peer)
    }

    fn set_callbacks(&self, observer: Arc<dyn ComponentObserver>) {
        self.core.set_observer(observer);
    }

    fn send_buffer(&self, buffer: MediaBuffer) -> std::result::Result<(), MediaBuffer> {
        if buffer.input_port != AUDIO_RENDER_PORT_IN_AUDIO {
            return Err(buffer);
        }
        self.shared.input.lock().push_back(buffer);
        Ok(())
    }

    fn deinit(&self) -> Result<()> {
        self.core.ensure_deinit_allowed()?;
        self.core.stop_and_join_worker();
        Ok(())
    }
}

fn audio_render_thread(core: Arc<ComponentCore>, shared: Arc<AudioRenderShared>) {
    tracing::debug!("[{}] worker started", core.id());

    let mut first_frame_sent = false;
    let mut stream_end = false;
    let mut end_notified = false;
    let mut last_reference: Option<Instant> = None;
    let mut last_position: Option<i64> = None;

    loop {
        while let Some(command) = core.queue.try_recv() {
            match command {
                Command::SetState(target) => {
                    let _ = core.apply_state_change(target, &mut |from, to| {
                        match (from, to) {
                            (ComponentState::Loaded, ComponentState::Idle) => {
                                let mut sink = shared.sink.lock();
                                if sink.is_none() {
                                    *sink = Some(Box::new(CountingAudioSink::new()));
                                }
                            }
                            (ComponentState::Executing, ComponentState::Pause) => {
                                if let Some(sink) = shared.sink.lock().as_mut() {
                                    sink.pause(true);
                                }
                            }
                            (ComponentState::Pause, ComponentState::Executing) => {
                                if let Some(sink) = shared.sink.lock().as_mut() {
                                    sink.pause(false);
                                }
                            }
                            _ => {}
                        }
                        Ok(())
                    });
                }
                Command::Flush => {
                    let queued: Vec<MediaBuffer> = shared.input.lock().drain(..).collect();
                    for frame in queued {
                        base::return_upstream(&core, AUDIO_RENDER_PORT_IN_AUDIO, frame);
                    }
                    first_frame_sent = false;
                    stream_end = false;
                    end_notified = false;
                    last_reference = None;
                    last_position = None;
                }
                Command::Stop => {
                    tracing::debug!(
                        "[{}] worker exiting, {} buffers played",
                        core.id(),
                        core.stats().units_done
                    );
                    return;
                }
                Command::Eos => stream_end = true,
                Command::WakeUp | Command::Nops => {}
            }
        }

        if core.state() != ComponentState::Executing {
            core.queue.wait(None);
            continue;
        }

        let Some(frame) = shared.input.lock().pop_front() else {
            core.queue.announce(WaitReason::AwaitingInput);
            base::wake_peer(&core, AUDIO_RENDER_PORT_IN_AUDIO);
            if !shared.input.lock().is_empty() {
                continue;
            }
            if stream_end {
                if !end_notified {
                    core.notify(Event::BufferFlag {
                        port: AUDIO_RENDER_PORT_IN_AUDIO,
                        flags: BufferFlags::EOS,
                    });
                    end_notified = true;
                }
                core.queue.wait(Some(STREAM_END_WAIT));
            } else {
                core.queue.wait(None);
            }
            continue;
        };

        if frame.flags.contains(BufferFlags::EOS) {
            stream_end = true;
        }
        if frame.payload.is_empty() {
            base::return_upstream(&core, AUDIO_RENDER_PORT_IN_AUDIO, frame);
            continue;
        }

        if !first_frame_sent {
            {
                let (channels, sample_rate) = match core
                    .port_definition(AUDIO_RENDER_PORT_IN_AUDIO)
                    .map(|def| def.format)
                {
                    Ok(MediaFormat::Audio {
                        channels,
                        sample_rate,
                        ..
                    }) => (channels, sample_rate),
                    _ => (2, 48_000),
                };
                let mut sink = shared.sink.lock();
                if let Some(sink) = sink.as_mut() {
                    if let Err(err) = sink.configure(channels, sample_rate) {
                        tracing::warn!("[{}] sink configure failed: {:#}", core.id(), err);
                    }
                }
            }
            if let Some((clock, clock_port)) = core.bound_peer(AUDIO_RENDER_PORT_IN_CLOCK) {
                let _ = clock.set_config(Config::ClientStartTime(TimestampInfo {
                    port_index: clock_port,
                    timestamp: frame.pts,
                }));
            }
            core.notify(Event::AudioRenderFirstFrame);
            first_frame_sent = true;
        }

        // The sink paces playback; the renderer only gates on the shared
        // clock actually running. Until it does, the frame goes back so the
        // decoder pool never starves while the video side catches up.
        if let Some((clock, _)) = core.bound_peer(AUDIO_RENDER_PORT_IN_CLOCK) {
            let running = matches!(
                clock.get_config(ConfigKind::ClockState),
                Ok(Config::ClockState(ClockState {
                    run_state: ClockRunState::Running,
                    ..
                }))
            );
            if !running {
                base::return_upstream(&core, AUDIO_RENDER_PORT_IN_AUDIO, frame);
                core.queue.wait(Some(CLOCK_HOLD_WAIT));
                continue;
            }
        }

        let cached = {
            let mut sink = shared.sink.lock();
            match sink.as_mut() {
                Some(sink) => {
                    if let Err(err) = sink.play(&frame.payload, frame.pts) {
                        tracing::warn!("[{}] play failed: {:#}", core.id(), err);
                    }
                    sink.cached_duration_us()
                }
                None => 0,
            }
        };

        // Position = presented pts minus what the device has buffered but
        // not yet made audible.
        let position = frame.pts - cached;
        core.notify(Event::AudioRenderPts { pts: position });
        core.count_unit();

        // Throttled to the interval, except when the position itself jumped
        // by more than the interval's worth of media time.
        let due = last_reference.is_none_or(|t| t.elapsed() >= REFERENCE_INTERVAL)
            || last_position.is_some_and(|p| (position - p).abs() >= REFERENCE_INTERVAL_US);
        if due {
            if let Some((clock, clock_port)) = core.bound_peer(AUDIO_RENDER_PORT_IN_CLOCK) {
                let _ = clock.set_config(Config::CurAudioReference(TimestampInfo {
                    port_index: clock_port,
                    timestamp: position,
                }));
            }
            last_reference = Some(Instant::now());
            last_position = Some(position);
        }

        base::return_upstream(&core, AUDIO_RENDER_PORT_IN_AUDIO, frame);
    }
}

inventory::submit! {
    ComponentRegistration {
        name: "AUDIO_RENDER",
        factory: AudioRenderComponent::create,
    }
}
