// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The media clock: maps monotonic wall time onto the shared media timeline.
//!
//! No worker thread; every operation is O(1) and non-blocking, so commands
//! are processed synchronously on the caller's thread under the component
//! lock.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::component::{ComponentHandle, MediaComponent};
use crate::core::components::base::ComponentCore;
use crate::core::error::{MediaError, Result};
use crate::core::events::ComponentObserver;
use crate::core::messages::Command;
use crate::core::params::{
    ClockRunState, ClockState, Config, ConfigKind, Param, ParamKind, TimestampInfo,
};
use crate::core::ports::PortDefinition;
use crate::core::registry::ComponentRegistration;
use crate::core::state::ComponentState;
use crate::core::time::{MediaTimeSource, SystemTimeSource};

pub const CLOCK_PORT_OUT_VIDEO: u32 = 0;
pub const CLOCK_PORT_OUT_AUDIO: u32 = 1;

/// Wait-mask bit for the video-side port.
pub const CLOCK_PORT0: u32 = 0x1;
/// Wait-mask bit for the audio-side port.
pub const CLOCK_PORT1: u32 = 0x2;

const CLOCK_PORT_COUNT: usize = 2;

/// Drift beyond this rebases the mapping outright; no slewing.
const REBASE_THRESHOLD_US: i64 = 10_000;

struct ClockInner {
    clock_state: ClockState,
    port_start_time: [i64; CLOCK_PORT_COUNT],
    reference_clock_time_base: i64,
    wall_time_base: i64,
    pause_time_point: i64,
    pause_duration: i64,
    time_source: Arc<dyn MediaTimeSource>,
}

impl ClockInner {
    fn media_time(&self, now: i64) -> i64 {
        (now - self.wall_time_base - self.pause_duration) + self.reference_clock_time_base
    }
}

pub struct ClockComponent {
    core: ComponentCore,
    inner: Mutex<ClockInner>,
}

impl ClockComponent {
    pub fn create() -> Result<ComponentHandle> {
        let ports = vec![
            PortDefinition::output(CLOCK_PORT_OUT_VIDEO),
            PortDefinition::output(CLOCK_PORT_OUT_AUDIO),
        ];
        Ok(Arc::new(Self {
            core: ComponentCore::new("CLOCK", ports),
            inner: Mutex::new(ClockInner {
                clock_state: ClockState::default(),
                port_start_time: [-1; CLOCK_PORT_COUNT],
                reference_clock_time_base: 0,
                wall_time_base: 0,
                pause_time_point: 0,
                pause_duration: 0,
                time_source: Arc::new(SystemTimeSource::new()),
            }),
        }))
    }

    /// Seek: forget the current alignment and await fresh start times from
    /// both ports.
    fn config_time_position(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.clock_state.run_state = ClockRunState::WaitingForStartTime;
        inner.clock_state.wait_mask |= CLOCK_PORT0 | CLOCK_PORT1;
        tracing::debug!("[{}] awaiting start times, mask 0x{:x}", self.core.id(), inner.clock_state.wait_mask);
        Ok(())
    }

    /// A bound port reports the timestamp it starts at. When the last
    /// awaited port reports, the audio port's timestamp becomes the
    /// reference base (deliberately not the minimum of all ports: audio is
    /// less tolerant of rate drift) and the clock starts running.
    fn config_client_start_time(&self, ts: TimestampInfo) -> Result<()> {
        let (push, clock_state) = {
            let mut inner = self.inner.lock();
            if inner.clock_state.run_state != ClockRunState::WaitingForStartTime {
                tracing::warn!(
                    "[{}] start time for port {} while not waiting",
                    self.core.id(),
                    ts.port_index
                );
                return Err(MediaError::Undefined);
            }
            if inner.clock_state.wait_mask != 0 {
                let bit = match ts.port_index {
                    CLOCK_PORT_OUT_VIDEO => CLOCK_PORT0,
                    CLOCK_PORT_OUT_AUDIO => CLOCK_PORT1,
                    _ => return Err(MediaError::BadParameter),
                };
                inner.clock_state.wait_mask &= !bit;
                inner.port_start_time[ts.port_index as usize] = ts.timestamp;
                tracing::debug!(
                    "[{}] port {} start {}us, mask now 0x{:x}",
                    self.core.id(),
                    ts.port_index,
                    ts.timestamp,
                    inner.clock_state.wait_mask
                );
            }
            if inner.clock_state.wait_mask == 0 {
                // All awaited ports have reported: audio wins the base.
                let base = inner.port_start_time[CLOCK_PORT_OUT_AUDIO as usize];
                inner.clock_state.start_time = base;
                inner.reference_clock_time_base = base;
                inner.wall_time_base = inner.time_source.now_us();
                inner.pause_duration = 0;
                inner.clock_state.run_state = ClockRunState::Running;
                tracing::debug!(
                    "[{}] running: reference base {}us, wall base {}us",
                    self.core.id(),
                    inner.reference_clock_time_base,
                    inner.wall_time_base
                );
                (true, inner.clock_state)
            } else {
                (false, inner.clock_state)
            }
        };
        if push {
            // Push the shared timeline to every bound peer, outside the lock.
            for port in [CLOCK_PORT_OUT_VIDEO, CLOCK_PORT_OUT_AUDIO] {
                if let Some((peer, _)) = self.core.bound_peer(port) {
                    let _ = peer.set_config(Config::ClockState(clock_state));
                }
            }
        }
        Ok(())
    }

    /// Audio-reference drift correction: rebase if the reported position
    /// diverges from the computed media time by more than the threshold.
    fn config_cur_audio_reference(&self, ts: TimestampInfo) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.clock_state.run_state != ClockRunState::Running {
            return Err(MediaError::Undefined);
        }
        let now = inner.time_source.now_us();
        let diff = inner.media_time(now) - ts.timestamp;
        if diff.abs() > REBASE_THRESHOLD_US {
            tracing::debug!(
                "[{}] rebasing on audio reference {}us (drift {}us)",
                self.core.id(),
                ts.timestamp,
                diff
            );
            inner.reference_clock_time_base = ts.timestamp;
            inner.wall_time_base = now;
            inner.pause_duration = 0;
        }
        Ok(())
    }

    fn config_clock_state(&self, state: ClockState) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.clock_state.run_state != ClockRunState::Stopped {
            tracing::warn!("[{}] clock state set while not stopped", self.core.id());
            return Err(MediaError::Undefined);
        }
        inner.clock_state = state;
        Ok(())
    }
}

impl MediaComponent for ClockComponent {
    fn component_name(&self) -> &'static str {
        self.core.name()
    }

    fn instance_id(&self) -> &str {
        self.core.id()
    }

    fn send_command(&self, command: Command) -> Result<()> {
        match command {
            Command::SetState(target) => {
                self.core.apply_state_change(target, &mut |from, to| {
                    let mut inner = self.inner.lock();
                    match (from, to) {
                        (ComponentState::Executing, ComponentState::Pause) => {
                            inner.pause_time_point = inner.time_source.now_us();
                        }
                        (ComponentState::Pause, ComponentState::Executing) => {
                            // Elapsed pause time is subtracted out of every
                            // later media-time computation.
                            let now = inner.time_source.now_us();
                            inner.pause_duration += now - inner.pause_time_point;
                        }
                        _ => {}
                    }
                    Ok(())
                })?;
                Ok(())
            }
            // No worker thread, nothing to wake or drain.
            _ => Ok(()),
        }
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
            Param::TimeSource(source) => {
                self.inner.lock().time_source = source;
                Ok(())
            }
            _ => Err(MediaError::Unsupported),
        }
    }

    fn get_config(&self, kind: ConfigKind) -> Result<Config> {
        match kind {
            ConfigKind::CurMediaTime => {
                let inner = self.inner.lock();
                if inner.clock_state.run_state != ClockRunState::Running {
                    return Err(MediaError::Undefined);
                }
                let now = inner.time_source.now_us();
                Ok(Config::CurMediaTime(TimestampInfo {
                    port_index: 0,
                    timestamp: inner.media_time(now),
                }))
            }
            ConfigKind::ClockState => Ok(Config::ClockState(self.inner.lock().clock_state)),
            _ => Err(MediaError::Unsupported),
        }
    }

    fn set_config(&self, config: Config) -> Result<()> {
        match config {
            Config::TimePosition(_) => self.config_time_position(),
            Config::ClientStartTime(ts) => self.config_client_start_time(ts),
            Config::CurAudioReference(ts) => self.config_cur_audio_reference(ts),
            Config::ClockState(state) => self.config_clock_state(state),
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

    fn deinit(&self) -> Result<()> {
        self.core.ensure_deinit_allowed()
    }
}

inventory::submit! {
    ComponentRegistration {
        name: "CLOCK",
        factory: ClockComponent::create,
    }
}
