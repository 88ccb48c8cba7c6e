// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared component plumbing: the private block every variant owns (state
//! cell, message queue, ports, bind records, observer slot, counters) plus
//! the transition engine and the hand-off helpers the worker loops share.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::core::buffer::MediaBuffer;
use crate::core::component::ComponentHandle;
use crate::core::error::{MediaError, Result};
use crate::core::events::{ComponentObserver, Event};
use crate::core::format::MediaFormat;
use crate::core::messages::{Command, CommandKind};
use crate::core::params::{Param, ParamKind, WorkerStats};
use crate::core::ports::{BindRecord, PortDefinition};
use crate::core::queue::MessageQueue;
use crate::core::state::ComponentState;

pub struct ComponentCore {
    name: &'static str,
    id: String,
    state: Mutex<ComponentState>,
    pub queue: MessageQueue,
    observer: Mutex<Option<Arc<dyn ComponentObserver>>>,
    ports: Mutex<Vec<PortDefinition>>,
    binds: Mutex<Vec<BindRecord>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    units_done: AtomicU64,
    buffers_dropped: AtomicU64,
}

impl ComponentCore {
    pub fn new(name: &'static str, ports: Vec<PortDefinition>) -> Self {
        let binds = ports.iter().map(|p| BindRecord::new(p.port_index)).collect();
        Self {
            name,
            id: cuid2::create_id(),
            state: Mutex::new(ComponentState::Loaded),
            queue: MessageQueue::new(),
            observer: Mutex::new(None),
            ports: Mutex::new(ports),
            binds: Mutex::new(binds),
            worker: Mutex::new(None),
            units_done: AtomicU64::new(0),
            buffers_dropped: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ComponentState {
        *self.state.lock()
    }

    pub fn set_observer(&self, observer: Arc<dyn ComponentObserver>) {
        *self.observer.lock() = Some(observer);
    }

    pub fn attach_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock() = Some(handle);
    }

    pub fn notify(&self, event: Event) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer.on_event(&self.id, event);
        }
    }

    fn notify_buffer_returned(&self, buffer: MediaBuffer) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer.on_buffer_returned(&self.id, buffer);
        }
    }

    pub fn count_unit(&self) {
        self.units_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_dropped(&self) {
        self.buffers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            queue_depth: self.queue.depth(),
            wakeups_accepted: self.queue.wakeups_accepted(),
            wakeups_dropped: self.queue.wakeups_dropped(),
            units_done: self.units_done.load(Ordering::Relaxed),
            buffers_dropped: self.buffers_dropped.load(Ordering::Relaxed),
        }
    }

    // ---- ports and binds -------------------------------------------------

    pub fn port_definition(&self, port: u32) -> Result<PortDefinition> {
        self.ports
            .lock()
            .iter()
            .find(|p| p.port_index == port)
            .cloned()
            .ok_or(MediaError::BadParameter)
    }

    /// Port formats are static configuration: `Loaded` only.
    pub fn set_port_format(&self, port: u32, format: MediaFormat) -> Result<()> {
        if self.state() != ComponentState::Loaded {
            return Err(MediaError::InvalidState);
        }
        let mut ports = self.ports.lock();
        let def = ports
            .iter_mut()
            .find(|p| p.port_index == port)
            .ok_or(MediaError::BadParameter)?;
        def.format = format;
        Ok(())
    }

    pub fn bind_record(&self, port: u32) -> Result<Param> {
        let binds = self.binds.lock();
        let record = binds
            .iter()
            .find(|b| b.port_index == port)
            .ok_or(MediaError::BadParameter)?;
        Ok(Param::Bind {
            port,
            peer: record.peer(),
        })
    }

    /// The per-component half of the binding protocol. Only while
    /// `Loaded`; the peer's port definition is queried and direction
    /// compatibility enforced.
    pub fn bind_request(&self, port: u32, peer: Option<(ComponentHandle, u32)>) -> Result<()> {
        if self.state() != ComponentState::Loaded {
            tracing::warn!(
                "[{}] bind request on {} outside Loaded (state {})",
                self.id,
                port,
                self.state()
            );
            return Err(MediaError::InvalidState);
        }
        let own = self.port_definition(port)?;
        match peer {
            None => {
                let mut binds = self.binds.lock();
                let record = binds
                    .iter_mut()
                    .find(|b| b.port_index == port)
                    .ok_or(MediaError::BadParameter)?;
                record.clear();
                Ok(())
            }
            Some((handle, peer_port)) => {
                let peer_def = match handle.get_parameter(ParamKind::PortDefinition(peer_port))? {
                    Param::PortDefinition(def) => def,
                    _ => return Err(MediaError::BadParameter),
                };
                if peer_def.direction == own.direction {
                    tracing::warn!(
                        "[{}] port {} and peer port {} face the same direction",
                        self.id,
                        port,
                        peer_port
                    );
                    return Err(MediaError::PortNotCompatible);
                }
                let mut binds = self.binds.lock();
                let record = binds
                    .iter_mut()
                    .find(|b| b.port_index == port)
                    .ok_or(MediaError::BadParameter)?;
                record.bind(&handle, peer_port);
                Ok(())
            }
        }
    }

    /// Upgrade the bound peer of `port`; a dead or absent peer is `None`.
    pub fn bound_peer(&self, port: u32) -> Option<(ComponentHandle, u32)> {
        self.binds
            .lock()
            .iter()
            .find(|b| b.port_index == port)
            .and_then(|b| b.peer())
    }

    // ---- state machine ---------------------------------------------------

    /// Caller-side half of a `SetState`: the same-state check happens here,
    /// synchronously, before anything is enqueued.
    pub fn request_state(&self, target: ComponentState) -> Result<()> {
        if *self.state.lock() == target {
            self.notify(Event::Error {
                error: MediaError::SameState,
                state: target,
            });
            return Err(MediaError::SameState);
        }
        self.queue.send(Command::SetState(target));
        Ok(())
    }

    /// Worker-side half of a `SetState` (synchronous on the clock).
    ///
    /// `prepare` runs under the state lock before the transition commits;
    /// its failure aborts the transition, leaving the state unchanged, and
    /// is reported as `Error` followed by `CmdComplete` with the unchanged
    /// state. Every successful transition emits `CmdComplete` with the new
    /// state, the only acknowledgment channel.
    pub fn apply_state_change(
        &self,
        target: ComponentState,
        prepare: &mut dyn FnMut(ComponentState, ComponentState) -> Result<()>,
    ) -> Result<ComponentState> {
        let mut events = Vec::with_capacity(2);
        let result = {
            let mut state = self.state.lock();
            let current = *state;
            if current == target {
                events.push(Event::Error {
                    error: MediaError::SameState,
                    state: current,
                });
                Err(MediaError::SameState)
            } else if !current.can_transition_to(target) {
                events.push(Event::Error {
                    error: MediaError::IncorrectStateTransition,
                    state: current,
                });
                Err(MediaError::IncorrectStateTransition)
            } else if let Err(err) = prepare(current, target) {
                events.push(Event::Error {
                    error: err,
                    state: current,
                });
                events.push(Event::CmdComplete {
                    command: CommandKind::StateSet,
                    state: current,
                });
                Err(err)
            } else {
                *state = target;
                if target == ComponentState::Invalid {
                    events.push(Event::Error {
                        error: MediaError::InvalidState,
                        state: target,
                    });
                }
                events.push(Event::CmdComplete {
                    command: CommandKind::StateSet,
                    state: target,
                });
                Ok(target)
            }
        };
        if let Ok(new_state) = result {
            tracing::debug!("[{}] state -> {}", self.id, new_state);
        }
        for event in events {
            self.notify(event);
        }
        result
    }

    // ---- deinit ----------------------------------------------------------

    /// Gate for `deinit`: refused unless `Loaded`, leaving the instance
    /// intact.
    pub fn ensure_deinit_allowed(&self) -> Result<()> {
        let state = self.state();
        if state != ComponentState::Loaded {
            tracing::warn!("[{}] deinit refused in state {}", self.id, state);
            return Err(MediaError::Unsupported);
        }
        Ok(())
    }

    /// Signal the worker to exit and join it.
    pub fn stop_and_join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            self.queue.send(Command::Stop);
            let _ = handle.join();
            tracing::debug!("[{}] worker joined", self.id);
        }
    }
}

/// Shared `send_command` dispatch for components with a worker thread:
/// `SetState` gets the synchronous same-state check, `WakeUp` goes through
/// the drop-if-not-waiting path, everything else enqueues.
pub fn dispatch_command(core: &ComponentCore, command: Command) -> Result<()> {
    match command {
        Command::SetState(target) => core.request_state(target),
        Command::WakeUp => {
            core.queue.try_wake();
            Ok(())
        }
        other => {
            core.queue.send(other);
            Ok(())
        }
    }
}

/// Hand a filled buffer to the peer bound on `port` and release backpressure
/// with exactly one `WakeUp`. Returns the buffer when the port is unbound or
/// the peer refused it; a refusal is a mis-bound port and is raised as an
/// `Error` event so the condition is visible instead of silently degrading.
pub fn ship_downstream(
    core: &ComponentCore,
    port: u32,
    mut buffer: MediaBuffer,
) -> std::result::Result<(), MediaBuffer> {
    let Some((peer, peer_port)) = core.bound_peer(port) else {
        return Err(buffer);
    };
    buffer.output_port = port;
    buffer.input_port = peer_port;
    match peer.send_buffer(buffer) {
        Ok(()) => {
            let _ = peer.send_command(Command::WakeUp);
            Ok(())
        }
        Err(buffer) => {
            tracing::warn!(
                "[{}] peer [{}] refused the hand-off on its port {}",
                core.id,
                peer.instance_id(),
                peer_port
            );
            core.notify(Event::Error {
                error: MediaError::PortNotCompatible,
                state: core.state(),
            });
            Err(buffer)
        }
    }
}

/// Return a consumed buffer to its producer and wake it. An unbound input
/// side means the application produced the buffer; it goes back through the
/// observer instead, as does a buffer the producer refuses to take back.
pub fn return_upstream(core: &ComponentCore, port: u32, buffer: MediaBuffer) {
    match core.bound_peer(port) {
        Some((peer, _)) => {
            if let Err(buffer) = peer.giveback_buffer(buffer) {
                core.notify_buffer_returned(buffer);
                return;
            }
            let _ = peer.send_command(Command::WakeUp);
        }
        None => core.notify_buffer_returned(buffer),
    }
}

/// Send an edge-triggered wake to the peer bound on `port`, if any.
pub fn wake_peer(core: &ComponentCore, port: u32) {
    if let Some((peer, _)) = core.bound_peer(port) {
        let _ = peer.send_command(Command::WakeUp);
    }
}

/// Send a command to the peer bound on `port`, if any.
pub fn command_peer(core: &ComponentCore, port: u32, command: Command) {
    if let Some((peer, _)) = core.bound_peer(port) {
        let _ = peer.send_command(command);
    }
}
