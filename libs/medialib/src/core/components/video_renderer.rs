// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Video renderer: double-buffered display with A/V-sync pacing against the
//! bound clock (or a self-owned timeline when no clock is bound).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::buffer::{BufferFlags, MediaBuffer};
use crate::core::component::{ComponentHandle, MediaComponent};
use crate::core::components::base::{self, ComponentCore};
use crate::core::engine::{CountingVideoSink, VideoSink};
use crate::core::error::{MediaError, Result};
use crate::core::events::{ComponentObserver, Event};
use crate::core::messages::Command;
use crate::core::params::{ClockState, Config, ConfigKind, Param, ParamKind, TimestampInfo};
use crate::core::ports::PortDefinition;
use crate::core::queue::WaitReason;
use crate::core::registry::ComponentRegistration;
use crate::core::state::ComponentState;
use crate::core::time::{MediaTimeSource, SystemTimeSource};

pub const VIDEO_RENDER_PORT_IN_VIDEO: u32 = 0;
pub const VIDEO_RENDER_PORT_IN_CLOCK: u32 = 1;

/// Frames earlier than this wait; later than this are dropped.
const SYNC_BAND_US: i64 = 20_000;

/// Hold interval while the clock is not yet running.
const CLOCK_HOLD_WAIT: Duration = Duration::from_millis(10);

/// A pts discontinuity beyond this rebases the self-owned timeline.
const SELF_TIMELINE_JUMP_US: i64 = 10_000_000;

/// Bounded no-frame wait once the stream has started; starvation past this
/// is treated as stream end.
const STARVATION_WAIT: Duration = Duration::from_secs(2);

const STREAM_END_WAIT: Duration = Duration::from_millis(5);

struct VideoRenderShared {
    sink: Mutex<Option<Box<dyn VideoSink>>>,
    input: Mutex<VecDeque<MediaBuffer>>,
    clock_state: Mutex<ClockState>,
    time_source: Mutex<Arc<dyn MediaTimeSource>>,
}

pub struct VideoRenderComponent {
    core: Arc<ComponentCore>,
    shared: Arc<VideoRenderShared>,
}

impl VideoRenderComponent {
    pub fn create() -> Result<ComponentHandle> {
        let ports = vec![
            PortDefinition::input(VIDEO_RENDER_PORT_IN_VIDEO),
            PortDefinition::input(VIDEO_RENDER_PORT_IN_CLOCK),
        ];
        let core = Arc::new(ComponentCore::new("VIDEO_RENDER", ports));
        let shared = Arc::new(VideoRenderShared {
            sink: Mutex::new(None),
            input: Mutex::new(VecDeque::new()),
            clock_state: Mutex::new(ClockState::default()),
            time_source: Mutex::new(Arc::new(SystemTimeSource::new())),
        });

        let worker_core = Arc::clone(&core);
        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(format!("video-render-{}", core.id()))
            .spawn(move || video_render_thread(worker_core, worker_shared))
            .map_err(|_| MediaError::InsufficientResources)?;
        core.attach_worker(thread);

        Ok(Arc::new(Self { core, shared }))
    }
}

impl MediaComponent for VideoRenderComponent {
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
            Param::VideoSink(sink) => {
                *self.shared.sink.lock() = Some(sink);
                Ok(())
            }
            Param::TimeSource(source) => {
                *self.shared.time_source.lock() = source;
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
                // Pushed by the clock the moment the shared timeline starts.
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
        if buffer.input_port != VIDEO_RENDER_PORT_IN_VIDEO {
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

fn video_render_thread(core: Arc<ComponentCore>, shared: Arc<VideoRenderShared>) {
    tracing::debug!("[{}] worker started", core.id());

    // Double buffer: the shown frame is held until the next one replaces it.
    let mut previous: Option<MediaBuffer> = None;
    // Frame held across clock-hold and pacing waits.
    let mut held: Option<MediaBuffer> = None;
    let mut first_frame_sent = false;
    let mut self_base: Option<i64> = None;
    let mut stream_end = false;
    let mut end_notified = false;

    loop {
        while let Some(command) = core.queue.try_recv() {
            match command {
                Command::SetState(target) => {
                    let _ = core.apply_state_change(target, &mut |from, to| {
                        if from == ComponentState::Loaded && to == ComponentState::Idle {
                            let mut sink = shared.sink.lock();
                            if sink.is_none() {
                                *sink = Some(Box::new(CountingVideoSink::new()));
                            }
                        }
                        Ok(())
                    });
                }
                Command::Flush => {
                    for frame in held.take().into_iter().chain(previous.take()) {
                        base::return_upstream(&core, VIDEO_RENDER_PORT_IN_VIDEO, frame);
                    }
                    let queued: Vec<MediaBuffer> = shared.input.lock().drain(..).collect();
                    for frame in queued {
                        base::return_upstream(&core, VIDEO_RENDER_PORT_IN_VIDEO, frame);
                    }
                    first_frame_sent = false;
                    self_base = None;
                    stream_end = false;
                    end_notified = false;
                }
                Command::Stop => {
                    for frame in held.take().into_iter().chain(previous.take()) {
                        base::return_upstream(&core, VIDEO_RENDER_PORT_IN_VIDEO, frame);
                    }
                    tracing::debug!(
                        "[{}] worker exiting, {} frames shown, {} dropped",
                        core.id(),
                        core.stats().units_done,
                        core.stats().buffers_dropped
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

        let popped = match held.take() {
            Some(frame) => Some(frame),
            None => shared.input.lock().pop_front(),
        };
        let frame = match popped {
            Some(frame) => frame,
            None => {
                core.queue.announce(WaitReason::AwaitingInput);
                base::wake_peer(&core, VIDEO_RENDER_PORT_IN_VIDEO);
                if !shared.input.lock().is_empty() {
                    continue;
                }
                if stream_end {
                    if !end_notified {
                        core.notify(Event::BufferFlag {
                            port: VIDEO_RENDER_PORT_IN_VIDEO,
                            flags: BufferFlags::EOS,
                        });
                        end_notified = true;
                        if let Some(frame) = previous.take() {
                            base::return_upstream(&core, VIDEO_RENDER_PORT_IN_VIDEO, frame);
                        }
                    }
                    core.queue.wait(Some(STREAM_END_WAIT));
                } else if first_frame_sent {
                    // Bounded starvation wait: a stalled upstream is
                    // eventually treated as stream end.
                    core.queue.wait(Some(STARVATION_WAIT));
                    if shared.input.lock().is_empty() && core.queue.depth() == 0 {
                        stream_end = true;
                    }
                } else {
                    core.queue.wait(None);
                }
                continue;
            }
        };

        if frame.flags.contains(BufferFlags::EOS) {
            stream_end = true;
        }
        if frame.payload.is_empty() {
            // Bare end marker.
            base::return_upstream(&core, VIDEO_RENDER_PORT_IN_VIDEO, frame);
            continue;
        }

        if !first_frame_sent {
            if let Some((clock, clock_port)) = core.bound_peer(VIDEO_RENDER_PORT_IN_CLOCK) {
                let _ = clock.set_config(Config::ClientStartTime(TimestampInfo {
                    port_index: clock_port,
                    timestamp: frame.pts,
                }));
            }
            core.notify(Event::VideoRenderFirstFrame);
            first_frame_sent = true;
        }

        // Current media time: the bound clock's timeline, or a self-owned one.
        let media_time = if let Some((clock, _)) = core.bound_peer(VIDEO_RENDER_PORT_IN_CLOCK) {
            match clock.get_config(ConfigKind::CurMediaTime) {
                Ok(Config::CurMediaTime(ts)) => ts.timestamp,
                _ => {
                    // Clock not running yet: hold the frame in short waits.
                    held = Some(frame);
                    core.queue.wait(Some(CLOCK_HOLD_WAIT));
                    continue;
                }
            }
        } else {
            let now = shared.time_source.lock().now_us();
            match self_base {
                None => {
                    self_base = Some(now - frame.pts);
                    frame.pts
                }
                Some(base_us) => {
                    let media = now - base_us;
                    if (frame.pts - media).abs() > SELF_TIMELINE_JUMP_US {
                        // Large discontinuity: restart the timeline at this pts.
                        self_base = Some(now - frame.pts);
                        frame.pts
                    } else {
                        media
                    }
                }
            }
        };

        let delay = frame.pts - media_time;
        if delay > SYNC_BAND_US {
            // Early: pacing sleep on the queue, re-checked, not announced so
            // stray wake-ups are dropped.
            held = Some(frame);
            let wait = Duration::from_micros(delay.min(100_000) as u64);
            core.queue.wait(Some(wait));
            continue;
        }
        if delay < -SYNC_BAND_US {
            core.count_dropped();
            base::return_upstream(&core, VIDEO_RENDER_PORT_IN_VIDEO, frame);
            continue;
        }

        {
            let mut sink = shared.sink.lock();
            if let Some(sink) = sink.as_mut() {
                if let Err(err) = sink.show(&frame.payload, frame.pts) {
                    tracing::warn!("[{}] show failed: {:#}", core.id(), err);
                }
            }
        }
        core.notify(Event::VideoRenderPts { pts: frame.pts });
        core.count_unit();

        // Swap the double buffer: the previously shown frame goes back.
        if let Some(shown) = previous.take() {
            base::return_upstream(&core, VIDEO_RENDER_PORT_IN_VIDEO, shown);
        }
        previous = Some(frame);
    }
}

inventory::submit! {
    ComponentRegistration {
        name: "VIDEO_RENDER",
        factory: VideoRenderComponent::create,
    }
}
