// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Muxer: interleaves the samples arriving on its input ports into container
//! segments, rotating on a configurable duration threshold.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::buffer::{BufferFlags, MediaBuffer};
use crate::core::component::{ComponentHandle, MediaComponent};
use crate::core::components::base::{self, ComponentCore};
use crate::core::engine::{ContainerWriter, CountingContainerWriter};
use crate::core::error::{MediaError, Result};
use crate::core::events::{ComponentObserver, Event};
use crate::core::format::StreamKind;
use crate::core::messages::Command;
use crate::core::params::{Config, ConfigKind, Param, ParamKind};
use crate::core::ports::PortDefinition;
use crate::core::queue::WaitReason;
use crate::core::registry::ComponentRegistration;
use crate::core::state::ComponentState;

pub const MUXER_PORT_IN_VIDEO: u32 = 0;
pub const MUXER_PORT_IN_AUDIO: u32 = 1;

const MUXER_PORT_COUNT: usize = 2;

const STREAM_END_WAIT: Duration = Duration::from_millis(5);

struct MuxerShared {
    writer: Mutex<Option<Box<dyn ContainerWriter>>>,
    input: Mutex<VecDeque<MediaBuffer>>,
    /// Segment rotation threshold in microseconds; 0 disables rotation.
    rotation_us: Mutex<i64>,
}

pub struct MuxerComponent {
    core: Arc<ComponentCore>,
    shared: Arc<MuxerShared>,
}

impl MuxerComponent {
    pub fn create() -> Result<ComponentHandle> {
        let ports = vec![
            PortDefinition::input(MUXER_PORT_IN_VIDEO),
            PortDefinition::input(MUXER_PORT_IN_AUDIO),
        ];
        let core = Arc::new(ComponentCore::new("MUXER", ports));
        let shared = Arc::new(MuxerShared {
            writer: Mutex::new(None),
            input: Mutex::new(VecDeque::new()),
            rotation_us: Mutex::new(0),
        });

        let worker_core = Arc::clone(&core);
        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(format!("muxer-{}", core.id()))
            .spawn(move || muxer_thread(worker_core, worker_shared))
            .map_err(|_| MediaError::InsufficientResources)?;
        core.attach_worker(thread);

        Ok(Arc::new(Self { core, shared }))
    }
}

impl MediaComponent for MuxerComponent {
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
            Param::ContainerWriter(writer) => {
                *self.shared.writer.lock() = Some(writer);
                Ok(())
            }
            Param::PortDefinition(def) => self.core.set_port_format(def.port_index, def.format),
            _ => Err(MediaError::Unsupported),
        }
    }

    fn get_config(&self, kind: ConfigKind) -> Result<Config> {
        match kind {
            ConfigKind::RotationDuration => {
                Ok(Config::RotationDuration(*self.shared.rotation_us.lock()))
            }
            ConfigKind::WorkerStats => Ok(Config::WorkerStats(self.core.stats())),
            _ => Err(MediaError::Unsupported),
        }
    }

    fn set_config(&self, config: Config) -> Result<()> {
        match config {
            Config::RotationDuration(us) => {
                if us < 0 {
                    return Err(MediaError::BadParameter);
                }
                *self.shared.rotation_us.lock() = us;
                Ok(())
            }
            Config::ClearBuffers => {
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
        if buffer.input_port as usize >= MUXER_PORT_COUNT {
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

fn kind_for_port(port: u32) -> StreamKind {
    match port {
        MUXER_PORT_IN_AUDIO => StreamKind::Audio,
        _ => StreamKind::Video,
    }
}

fn muxer_thread(core: Arc<ComponentCore>, shared: Arc<MuxerShared>) {
    tracing::debug!("[{}] worker started", core.id());

    let mut segment_index = 0u32;
    let mut segment_open = false;
    let mut segment_start_pts = 0i64;
    let mut port_eos = [false; MUXER_PORT_COUNT];
    let mut halted = false;
    let mut file_done = false;

    loop {
        while let Some(command) = core.queue.try_recv() {
            match command {
                Command::SetState(target) => {
                    let _ = core.apply_state_change(target, &mut |from, to| {
                        match (from, to) {
                            (ComponentState::Loaded, ComponentState::Idle) => {
                                let mut writer = shared.writer.lock();
                                if writer.is_none() {
                                    *writer = Some(Box::new(CountingContainerWriter::new()));
                                }
                            }
                            (_, ComponentState::Loaded) => {
                                if segment_open {
                                    if let Some(writer) = shared.writer.lock().as_mut() {
                                        let _ = writer.end_segment();
                                    }
                                    segment_open = false;
                                }
                                segment_index = 0;
                                port_eos = [false; MUXER_PORT_COUNT];
                                halted = false;
                                file_done = false;
                            }
                            _ => {}
                        }
                        Ok(())
                    });
                }
                Command::Flush => {
                    let queued: Vec<MediaBuffer> = shared.input.lock().drain(..).collect();
                    for sample in queued {
                        let port = sample.input_port;
                        base::return_upstream(&core, port, sample);
                    }
                    port_eos = [false; MUXER_PORT_COUNT];
                    halted = false;
                    file_done = false;
                }
                Command::Stop => {
                    if segment_open {
                        if let Some(writer) = shared.writer.lock().as_mut() {
                            let _ = writer.end_segment();
                        }
                    }
                    tracing::debug!(
                        "[{}] worker exiting, {} samples written",
                        core.id(),
                        core.stats().units_done
                    );
                    return;
                }
                Command::Eos | Command::WakeUp | Command::Nops => {}
            }
        }

        if core.state() != ComponentState::Executing {
            core.queue.wait(None);
            continue;
        }

        if halted {
            // A writer fault drains inputs without writing until flush/stop.
            let queued: Vec<MediaBuffer> = shared.input.lock().drain(..).collect();
            for sample in queued {
                core.count_dropped();
                let port = sample.input_port;
                base::return_upstream(&core, port, sample);
            }
            core.queue.announce(WaitReason::AwaitingInput);
            if shared.input.lock().is_empty() {
                core.queue.wait(None);
            }
            continue;
        }

        let Some(sample) = shared.input.lock().pop_front() else {
            // End-of-file check runs only once every bound input reached EOS.
            // A session that never wrote a sample still completes; there is
            // just no open segment to close.
            let all_eos = (0..MUXER_PORT_COUNT as u32)
                .all(|p| core.bound_peer(p).is_none() || port_eos[p as usize]);
            if all_eos && !file_done {
                if segment_open {
                    if let Some(writer) = shared.writer.lock().as_mut() {
                        if let Err(err) = writer.end_segment() {
                            tracing::warn!("[{}] end segment failed: {:#}", core.id(), err);
                        }
                    }
                    segment_open = false;
                }
                file_done = true;
                core.notify(Event::MuxerFileDone);
            }
            core.queue.announce(WaitReason::AwaitingInput);
            base::wake_peer(&core, MUXER_PORT_IN_VIDEO);
            base::wake_peer(&core, MUXER_PORT_IN_AUDIO);
            if !shared.input.lock().is_empty() {
                continue;
            }
            if all_eos {
                core.queue.wait(Some(STREAM_END_WAIT));
            } else {
                core.queue.wait(None);
            }
            continue;
        };

        let port = sample.input_port;
        if sample.flags.contains(BufferFlags::EOS) {
            port_eos[port as usize] = true;
            core.notify(Event::BufferFlag {
                port,
                flags: BufferFlags::EOS,
            });
        }
        if sample.payload.is_empty() {
            base::return_upstream(&core, port, sample);
            continue;
        }

        let rotation_us = *shared.rotation_us.lock();
        let mut rotated = false;
        let write_result = {
            let mut writer = shared.writer.lock();
            let Some(writer) = writer.as_mut() else {
                core.count_dropped();
                base::return_upstream(&core, port, sample);
                continue;
            };
            if segment_open && rotation_us > 0 && sample.pts - segment_start_pts >= rotation_us {
                if let Err(err) = writer.end_segment() {
                    tracing::warn!("[{}] end segment failed: {:#}", core.id(), err);
                }
                segment_open = false;
                segment_index += 1;
                rotated = true;
            }
            let opened = if segment_open {
                Ok(())
            } else {
                writer.begin_segment(segment_index).inspect(|()| {
                    segment_open = true;
                    segment_start_pts = sample.pts;
                })
            };
            opened.and_then(|()| {
                writer.write_sample(kind_for_port(port), &sample.payload, sample.pts)
            })
        };
        if rotated {
            core.notify(Event::MuxerNeedNextFile);
        }

        match write_result {
            Ok(()) => core.count_unit(),
            Err(err) => {
                tracing::warn!("[{}] write failed: {:#}", core.id(), err);
                halted = true;
                core.notify(Event::Error {
                    error: MediaError::InsufficientResources,
                    state: core.state(),
                });
            }
        }
        base::return_upstream(&core, port, sample);
    }
}

inventory::submit! {
    ComponentRegistration {
        name: "MUXER",
        factory: MuxerComponent::create,
    }
}
