// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Decoder/encoder components, sharing the canonical worker loop: drain
//! commands, one unit of work, exactly one `WakeUp` per unit of mutual
//! progress with each neighbour.
//!
//! The engine behind the in→out transformation is a [`CodecEngine`]
//! materialized at the `Loaded`→`Idle` transition; an unrecoverable engine
//! fault halts processing (flush-all) without tearing the component down.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::buffer::{BufferFlags, BufferPool, MediaBuffer};
use crate::core::component::{ComponentHandle, MediaComponent};
use crate::core::components::base::{self, ComponentCore};
use crate::core::engine::{CodecEngine, PassthroughCodec};
use crate::core::error::{MediaError, Result};
use crate::core::events::{ComponentObserver, Event};
use crate::core::messages::Command;
use crate::core::params::{Config, ConfigKind, Param, ParamKind};
use crate::core::ports::PortDefinition;
use crate::core::queue::WaitReason;
use crate::core::registry::ComponentRegistration;
use crate::core::state::ComponentState;

pub const TRANSFORM_PORT_IN: u32 = 0;
pub const TRANSFORM_PORT_OUT: u32 = 1;

const FRAME_POOL_CAPACITY: usize = 4;

/// Bounded re-check interval once end-of-stream has been signalled, so the
/// worker never blocks forever on a stream that will produce nothing more.
const STREAM_END_WAIT: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    VideoDecoder,
    AudioDecoder,
    VideoEncoder,
}

impl TransformKind {
    fn component_name(self) -> &'static str {
        match self {
            Self::VideoDecoder => "VDEC",
            Self::AudioDecoder => "ADEC",
            Self::VideoEncoder => "VENC",
        }
    }
}

struct TransformShared {
    engine: Mutex<Option<Box<dyn CodecEngine>>>,
    input: Mutex<VecDeque<MediaBuffer>>,
    pool: BufferPool,
}

pub struct TransformComponent {
    core: Arc<ComponentCore>,
    shared: Arc<TransformShared>,
}

impl TransformComponent {
    pub fn create(kind: TransformKind) -> Result<ComponentHandle> {
        let ports = vec![
            PortDefinition::input(TRANSFORM_PORT_IN),
            PortDefinition::output(TRANSFORM_PORT_OUT),
        ];
        let core = Arc::new(ComponentCore::new(kind.component_name(), ports));
        let shared = Arc::new(TransformShared {
            engine: Mutex::new(None),
            input: Mutex::new(VecDeque::new()),
            pool: BufferPool::new(FRAME_POOL_CAPACITY),
        });

        let worker_core = Arc::clone(&core);
        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(format!("{}-{}", kind.component_name().to_lowercase(), core.id()))
            .spawn(move || transform_thread(worker_core, worker_shared))
            .map_err(|_| MediaError::InsufficientResources)?;
        core.attach_worker(thread);

        Ok(Arc::new(Self { core, shared }))
    }

    fn create_vdec() -> Result<ComponentHandle> {
        Self::create(TransformKind::VideoDecoder)
    }

    fn create_adec() -> Result<ComponentHandle> {
        Self::create(TransformKind::AudioDecoder)
    }

    fn create_venc() -> Result<ComponentHandle> {
        Self::create(TransformKind::VideoEncoder)
    }
}

impl MediaComponent for TransformComponent {
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
            Param::CodecEngine(engine) => {
                *self.shared.engine.lock() = Some(engine);
                Ok(())
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
            // Seek behaves as a flush: reset the engine, recycle queued work.
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
        if buffer.input_port != TRANSFORM_PORT_IN {
            return Err(buffer);
        }
        self.shared.input.lock().push_back(buffer);
        Ok(())
    }

    fn giveback_buffer(&self, buffer: MediaBuffer) -> std::result::Result<(), MediaBuffer> {
        if buffer.output_port != TRANSFORM_PORT_OUT {
            return Err(buffer);
        }
        self.shared.pool.release(buffer);
        Ok(())
    }

    fn deinit(&self) -> Result<()> {
        self.core.ensure_deinit_allowed()?;
        self.core.stop_and_join_worker();
        Ok(())
    }
}

enum StepOutcome {
    Progress,
    NeedInput,
    NeedOutput,
    Fault(MediaError),
}

fn transform_thread(core: Arc<ComponentCore>, shared: Arc<TransformShared>) {
    tracing::debug!("[{}] worker started", core.id());
    let mut stream_end = false;
    let mut halted = false;
    let mut eos_forwarded = false;
    let mut end_notified = false;

    loop {
        // State and stop commands are drained before any further data
        // processing; they never interleave with a unit of work.
        while let Some(command) = core.queue.try_recv() {
            match command {
                Command::SetState(target) => {
                    let _ = core.apply_state_change(target, &mut |from, to| {
                        prepare_transition(&shared, from, to)
                    });
                }
                Command::Flush => {
                    flush(&core, &shared);
                    stream_end = false;
                    halted = false;
                    eos_forwarded = false;
                    end_notified = false;
                }
                Command::Stop => {
                    tracing::debug!(
                        "[{}] worker exiting, {} units done",
                        core.id(),
                        core.stats().units_done
                    );
                    return;
                }
                Command::Eos => stream_end = true,
                Command::WakeUp | Command::Nops => {}
            }
        }

        if core.state() != ComponentState::Executing || halted {
            core.queue.wait(None);
            continue;
        }

        match step(&core, &shared, &mut stream_end) {
            StepOutcome::Progress => {
                core.count_unit();
            }
            StepOutcome::NeedInput => {
                core.queue.announce(WaitReason::AwaitingInput);
                base::wake_peer(&core, TRANSFORM_PORT_IN);
                // Input that slipped in before the announcement had its wake
                // dropped; re-check once before parking.
                if !shared.input.lock().is_empty() {
                    continue;
                }
                if stream_end {
                    if !eos_forwarded {
                        forward_eos(&core, &shared);
                        eos_forwarded = true;
                    }
                    if !end_notified {
                        core.notify(Event::BufferFlag {
                            port: TRANSFORM_PORT_OUT,
                            flags: BufferFlags::EOS,
                        });
                        end_notified = true;
                    }
                    core.queue.wait(Some(STREAM_END_WAIT));
                } else {
                    core.queue.wait(None);
                }
            }
            StepOutcome::NeedOutput => {
                core.queue.announce(WaitReason::AwaitingOutput);
                if shared.pool.available() == 0 {
                    core.queue.wait(None);
                }
            }
            StepOutcome::Fault(error) => {
                core.notify(Event::Error {
                    error,
                    state: core.state(),
                });
                // Flush-all: keep draining commands only until an explicit
                // flush or stop arrives.
                halted = true;
            }
        }
    }
}

fn prepare_transition(
    shared: &TransformShared,
    from: ComponentState,
    to: ComponentState,
) -> Result<()> {
    if from == ComponentState::Loaded && to == ComponentState::Idle {
        // Heavyweight allocation; failure aborts the transition.
        let mut engine = shared.engine.lock();
        let slot = engine.get_or_insert_with(|| Box::new(PassthroughCodec::new()));
        if let Err(err) = slot.init() {
            tracing::warn!("engine init failed: {:#}", err);
            return Err(MediaError::InsufficientResources);
        }
    }
    if to == ComponentState::Loaded {
        let mut engine = shared.engine.lock();
        if let Some(engine) = engine.as_mut() {
            let _ = engine.reset();
        }
    }
    Ok(())
}

fn flush(core: &ComponentCore, shared: &TransformShared) {
    let mut engine = shared.engine.lock();
    if let Some(engine) = engine.as_mut() {
        let _ = engine.reset();
    }
    drop(engine);
    // Recycle queued work back to its producer.
    let queued: Vec<MediaBuffer> = shared.input.lock().drain(..).collect();
    for buffer in queued {
        base::return_upstream(core, TRANSFORM_PORT_IN, buffer);
    }
}

/// One unit of work: consume one input buffer, produce one output buffer.
fn step(core: &ComponentCore, shared: &TransformShared, stream_end: &mut bool) -> StepOutcome {
    let Some(packet) = shared.input.lock().pop_front() else {
        return StepOutcome::NeedInput;
    };

    let packet_eos = packet.flags.contains(BufferFlags::EOS);

    if packet.payload.is_empty() {
        // Bare end-of-stream marker, nothing to transform.
        base::return_upstream(core, TRANSFORM_PORT_IN, packet);
        if packet_eos {
            *stream_end = true;
        }
        return StepOutcome::Progress;
    }

    let Some(mut shell) = shared.pool.acquire() else {
        shared.input.lock().push_front(packet);
        return StepOutcome::NeedOutput;
    };

    let produced = {
        let mut engine = shared.engine.lock();
        match engine.as_mut() {
            Some(engine) => engine.process(&packet.payload),
            None => {
                shared.pool.release(shell);
                shared.input.lock().push_front(packet);
                return StepOutcome::Fault(MediaError::InvalidState);
            }
        }
    };

    match produced {
        Ok(payload) => {
            shell.payload = payload;
            shell.pts = packet.pts;
            if packet_eos {
                shell.flags |= BufferFlags::EOS;
                *stream_end = true;
            }
            if let Err(shell) = base::ship_downstream(core, TRANSFORM_PORT_OUT, shell) {
                // Unbound or refused: the shell comes back and is recycled.
                shared.pool.release(shell);
                core.count_dropped();
            }
            base::return_upstream(core, TRANSFORM_PORT_IN, packet);
            StepOutcome::Progress
        }
        Err(err) => {
            tracing::error!("[{}] engine fault: {:#}", core.id(), err);
            shared.pool.release(shell);
            base::return_upstream(core, TRANSFORM_PORT_IN, packet);
            StepOutcome::Fault(MediaError::ErrorsInFrame)
        }
    }
}

/// Propagate end-of-stream downstream: an empty EOS-flagged shell for
/// consumers that track flags per port, plus the explicit command.
fn forward_eos(core: &ComponentCore, shared: &TransformShared) {
    if let Some(mut shell) = shared.pool.acquire() {
        shell.flags |= BufferFlags::EOS;
        if let Err(shell) = base::ship_downstream(core, TRANSFORM_PORT_OUT, shell) {
            shared.pool.release(shell);
        }
    }
    base::command_peer(core, TRANSFORM_PORT_OUT, Command::Eos);
}

inventory::submit! {
    ComponentRegistration {
        name: "VDEC",
        factory: TransformComponent::create_vdec,
    }
}

inventory::submit! {
    ComponentRegistration {
        name: "ADEC",
        factory: TransformComponent::create_adec,
    }
}

inventory::submit! {
    ComponentRegistration {
        name: "VENC",
        factory: TransformComponent::create_venc,
    }
}
