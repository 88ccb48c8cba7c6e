// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Demuxer: pulls packets from a [`StreamSource`] and pushes them to the
//! decoders bound on its output ports, one `WakeUp` per shipped packet.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::buffer::{BufferFlags, BufferPool};
use crate::core::component::{ComponentHandle, MediaComponent};
use crate::core::components::base::{self, ComponentCore};
use crate::core::engine::{Packet, StreamSource};
use crate::core::error::{MediaError, Result};
use crate::core::events::{ComponentObserver, Event};
use crate::core::format::{StreamInfo, StreamKind};
use crate::core::messages::Command;
use crate::core::params::{Config, ConfigKind, Param, ParamKind};
use crate::core::ports::PortDefinition;
use crate::core::queue::WaitReason;
use crate::core::registry::ComponentRegistration;
use crate::core::state::ComponentState;

pub const DEMUXER_PORT_OUT_AUDIO: u32 = 0;
pub const DEMUXER_PORT_OUT_VIDEO: u32 = 1;

const PACKET_POOL_CAPACITY: usize = 8;

struct DemuxerShared {
    source: Mutex<Option<Box<dyn StreamSource>>>,
    stream_info: Mutex<Option<StreamInfo>>,
    /// Selected elementary stream per kind; `None` until probed.
    active: Mutex<[Option<u32>; 2]>,
    /// Shell pools per output port: audio = 0, video = 1.
    pools: [BufferPool; 2],
    /// Packet pulled from the source but not yet shipped (pool was empty).
    pending: Mutex<Option<Packet>>,
}

impl DemuxerShared {
    fn pool_for(&self, port: u32) -> &BufferPool {
        &self.pools[port as usize]
    }
}

pub struct DemuxerComponent {
    core: Arc<ComponentCore>,
    shared: Arc<DemuxerShared>,
}

impl DemuxerComponent {
    pub fn create() -> Result<ComponentHandle> {
        let ports = vec![
            PortDefinition::output(DEMUXER_PORT_OUT_AUDIO),
            PortDefinition::output(DEMUXER_PORT_OUT_VIDEO),
        ];
        let core = Arc::new(ComponentCore::new("DEMUXER", ports));
        let shared = Arc::new(DemuxerShared {
            source: Mutex::new(None),
            stream_info: Mutex::new(None),
            active: Mutex::new([None, None]),
            pools: [
                BufferPool::new(PACKET_POOL_CAPACITY),
                BufferPool::new(PACKET_POOL_CAPACITY),
            ],
            pending: Mutex::new(None),
        });

        let worker_core = Arc::clone(&core);
        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(format!("demuxer-{}", core.id()))
            .spawn(move || demuxer_thread(worker_core, worker_shared))
            .map_err(|_| MediaError::InsufficientResources)?;
        core.attach_worker(thread);

        Ok(Arc::new(Self { core, shared }))
    }

    fn port_for_kind(kind: StreamKind) -> u32 {
        match kind {
            StreamKind::Audio => DEMUXER_PORT_OUT_AUDIO,
            StreamKind::Video => DEMUXER_PORT_OUT_VIDEO,
        }
    }

    /// Inject and probe the source. Probing is synchronous so callers can
    /// read `StreamInfo` before building the downstream branches.
    fn install_source(&self, mut source: Box<dyn StreamSource>) -> Result<()> {
        if self.core.state() != ComponentState::Loaded {
            return Err(MediaError::InvalidState);
        }
        let info = match source.probe() {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!("[{}] probe failed: {:#}", self.core.id(), err);
                self.core.notify(Event::Error {
                    error: MediaError::FormatNotDetected,
                    state: self.core.state(),
                });
                return Err(MediaError::FormatNotDetected);
            }
        };

        let mut active = self.shared.active.lock();
        active[0] = info.first_of(StreamKind::Audio).map(|s| s.index);
        active[1] = info.first_of(StreamKind::Video).map(|s| s.index);
        drop(active);

        for stream in &info.streams {
            let _ = self
                .core
                .set_port_format(Self::port_for_kind(stream.kind), stream.format.clone());
        }

        *self.shared.source.lock() = Some(source);
        *self.shared.stream_info.lock() = Some(info.clone());
        self.core.notify(Event::PortFormatDetected { info });
        Ok(())
    }

    fn select_stream(&self, kind: StreamKind, stream_index: u32) -> Result<()> {
        let info = self.shared.stream_info.lock();
        let info = info.as_ref().ok_or(MediaError::FormatNotDetected)?;
        if !info
            .streams
            .iter()
            .any(|s| s.kind == kind && s.index == stream_index)
        {
            return Err(MediaError::BadParameter);
        }
        let slot = match kind {
            StreamKind::Audio => 0,
            StreamKind::Video => 1,
        };
        self.shared.active.lock()[slot] = Some(stream_index);
        Ok(())
    }
}

impl MediaComponent for DemuxerComponent {
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
            ParamKind::StreamInfo => self
                .shared
                .stream_info
                .lock()
                .clone()
                .map(Param::StreamInfo)
                .ok_or(MediaError::FormatNotDetected),
            ParamKind::ActiveStream(kind) => {
                let slot = match kind {
                    StreamKind::Audio => 0,
                    StreamKind::Video => 1,
                };
                self.shared.active.lock()[slot]
                    .map(|stream_index| Param::ActiveStream { kind, stream_index })
                    .ok_or(MediaError::BadParameter)
            }
        }
    }

    fn set_parameter(&self, param: Param) -> Result<()> {
        match param {
            Param::StreamSource(source) => self.install_source(source),
            Param::ActiveStream { kind, stream_index } => {
                if self.core.state() != ComponentState::Loaded {
                    return Err(MediaError::InvalidState);
                }
                self.select_stream(kind, stream_index)
            }
            Param::PortDefinition(def) => self.core.set_port_format(def.port_index, def.format),
            _ => Err(MediaError::Unsupported),
        }
    }

    fn get_config(&self, kind: ConfigKind) -> Result<Config> {
        match kind {
            ConfigKind::WorkerStats => Ok(Config::WorkerStats(self.core.stats())),
            _ => Err(MediaError::Unsupported),
        }
    }

    fn set_config(&self, config: Config) -> Result<()> {
        match config {
            Config::TimePosition(ts) => {
                let mut source = self.shared.source.lock();
                let source = source.as_mut().ok_or(MediaError::FormatNotDetected)?;
                if let Err(err) = source.seek(ts.timestamp) {
                    tracing::warn!("[{}] seek failed: {:#}", self.core.id(), err);
                    return Err(MediaError::BadParameter);
                }
                self.shared.pending.lock().take();
                // The worker may be parked at source end; re-arm it.
                self.core.queue.send(Command::Flush);
                Ok(())
            }
            Config::ClearBuffers => {
                self.shared.pending.lock().take();
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

    fn giveback_buffer(
        &self,
        buffer: crate::core::buffer::MediaBuffer,
    ) -> std::result::Result<(), crate::core::buffer::MediaBuffer> {
        let port = buffer.output_port;
        if port as usize >= self.shared.pools.len() {
            return Err(buffer);
        }
        self.shared.pool_for(port).release(buffer);
        Ok(())
    }

    fn deinit(&self) -> Result<()> {
        self.core.ensure_deinit_allowed()?;
        self.core.stop_and_join_worker();
        Ok(())
    }
}

fn demuxer_thread(core: Arc<ComponentCore>, shared: Arc<DemuxerShared>) {
    tracing::debug!("[{}] worker started", core.id());
    let mut source_end = false;

    loop {
        while let Some(command) = core.queue.try_recv() {
            match command {
                Command::SetState(target) => {
                    let _ = core.apply_state_change(target, &mut |_, _| Ok(()));
                }
                Command::Flush => {
                    shared.pending.lock().take();
                    source_end = false;
                }
                Command::Stop => {
                    tracing::debug!(
                        "[{}] worker exiting, {} packets shipped",
                        core.id(),
                        core.stats().units_done
                    );
                    return;
                }
                Command::Eos | Command::WakeUp | Command::Nops => {}
            }
        }

        if core.state() != ComponentState::Executing || source_end {
            core.queue.wait(None);
            continue;
        }

        // One unit of work: ship one packet.
        let packet = match shared.pending.lock().take() {
            Some(packet) => Some(packet),
            None => {
                let mut source = shared.source.lock();
                match source.as_mut().map(|s| s.read_packet()) {
                    Some(Ok(packet)) => packet,
                    Some(Err(err)) => {
                        tracing::warn!("[{}] read failed: {:#}", core.id(), err);
                        None
                    }
                    None => None,
                }
            }
        };

        let Some(packet) = packet else {
            // Source end: tell both bound consumers and park.
            tracing::debug!("[{}] source end", core.id());
            base::command_peer(&core, DEMUXER_PORT_OUT_AUDIO, Command::Eos);
            base::command_peer(&core, DEMUXER_PORT_OUT_VIDEO, Command::Eos);
            source_end = true;
            continue;
        };

        let slot = match packet.kind {
            StreamKind::Audio => 0,
            StreamKind::Video => 1,
        };
        if shared.active.lock()[slot] != Some(packet.stream_index) {
            core.count_dropped();
            continue;
        }

        let port = DemuxerComponent::port_for_kind(packet.kind);
        if core.bound_peer(port).is_none() {
            core.count_dropped();
            continue;
        }

        let Some(mut shell) = shared.pool_for(port).acquire() else {
            // No empty output: hold the packet, announce, wake on give-back.
            *shared.pending.lock() = Some(packet);
            core.queue.announce(WaitReason::AwaitingOutput);
            if shared.pool_for(port).available() == 0 {
                core.queue.wait(None);
            }
            continue;
        };

        shell.payload = packet.payload;
        shell.pts = packet.pts;
        if packet.end_of_stream {
            shell.flags |= BufferFlags::EOS;
        }
        if let Err(shell) = base::ship_downstream(&core, port, shell) {
            // Peer vanished or refused; the shell comes back to its pool.
            shared.pool_for(port).release(shell);
            core.count_dropped();
            continue;
        }
        core.count_unit();
    }
}

inventory::submit! {
    ComponentRegistration {
        name: "DEMUXER",
        factory: DemuxerComponent::create,
    }
}
