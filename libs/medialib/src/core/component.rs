// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use crate::core::buffer::MediaBuffer;
use crate::core::error::Result;
use crate::core::events::ComponentObserver;
use crate::core::messages::Command;
use crate::core::params::{Config, ConfigKind, Param, ParamKind};
use crate::core::state::ComponentState;

/// Owned handle to a live component instance.
pub type ComponentHandle = Arc<dyn MediaComponent>;

/// The uniform operation set every component variant implements.
///
/// Object-safe by design: the registry hands out `Arc<dyn MediaComponent>`
/// and the port-binding protocol stores peers behind the same trait.
///
/// Failure model across all operations: `BadParameter` for invalid
/// indices/handles, `InvalidState` for operations issued outside their
/// allowed state, `Unsupported` for operations the variant does not
/// implement.
pub trait MediaComponent: Send + Sync {
    /// The registry name this instance was created under, e.g. `"VDEC"`.
    fn component_name(&self) -> &'static str;

    /// Unique instance id, used in log prefixes and diagnostics.
    fn instance_id(&self) -> &str;

    /// Asynchronous control request. For components with a worker thread
    /// this enqueues and returns immediately; the clock processes state
    /// changes synchronously under its lock. A `SetState` naming the current
    /// state returns `SameState` without enqueuing.
    fn send_command(&self, command: Command) -> Result<()>;

    fn get_parameter(&self, kind: ParamKind) -> Result<Param>;

    /// Static configuration, valid only while `Loaded`.
    fn set_parameter(&self, param: Param) -> Result<()>;

    fn get_config(&self, kind: ConfigKind) -> Result<Config>;

    /// Dynamic configuration, valid in any state.
    fn set_config(&self, config: Config) -> Result<()>;

    fn get_state(&self) -> ComponentState;

    /// Establish (`Some`) or tear down (`None`) this port's binding.
    /// Permitted only while `Loaded`; direction compatibility is validated
    /// against the peer's port definition.
    fn bind_request(&self, port: u32, peer: Option<(ComponentHandle, u32)>) -> Result<()>;

    /// Install the event/error notification sink. Must happen before any
    /// command that can emit events.
    fn set_callbacks(&self, observer: Arc<dyn ComponentObserver>);

    /// Producer-to-consumer hand-off. On acceptance ownership of the buffer
    /// moves to this component; a refusal (wrong port, no data input) hands
    /// the buffer straight back so it is never lost in transit.
    fn send_buffer(&self, buffer: MediaBuffer) -> std::result::Result<(), MediaBuffer> {
        Err(buffer)
    }

    /// Consumer-to-producer return: an emptied buffer goes back to the pool
    /// it was drawn from. A refusal hands the buffer back to the caller.
    fn giveback_buffer(&self, buffer: MediaBuffer) -> std::result::Result<(), MediaBuffer> {
        Err(buffer)
    }

    /// Destructor. Fails with `Unsupported` unless the component is
    /// currently `Loaded`; on success any worker thread is stopped and
    /// joined before the call returns.
    fn deinit(&self) -> Result<()>;
}

impl std::fmt::Debug for dyn MediaComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaComponent")
            .field("name", &self.component_name())
            .field("instance_id", &self.instance_id())
            .finish()
    }
}
