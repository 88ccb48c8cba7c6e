// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::component::ComponentHandle;
use crate::core::error::{MediaError, Result};
use crate::core::events::ComponentObserver;
use crate::core::params::{Param, ParamKind};

/// Link-time registration of a component factory.
///
/// Component modules submit one of these through `inventory`;
/// [`ComponentRegistry::with_builtins`] collects them into the immutable
/// name→factory table.
pub struct ComponentRegistration {
    pub name: &'static str,
    pub factory: fn() -> Result<ComponentHandle>,
}

inventory::collect!(ComponentRegistration);

/// Immutable name→factory table, built once and passed by reference.
///
/// There is deliberately no global accessor; embedders construct one
/// registry and inject it wherever handles are created.
pub struct ComponentRegistry {
    table: HashMap<&'static str, fn() -> Result<ComponentHandle>>,
}

impl ComponentRegistry {
    /// An empty registry. Tests use this with [`register`](Self::register)
    /// to install stand-in factories.
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Collect every linked-in component factory.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<ComponentRegistration> {
            registry.table.insert(registration.name, registration.factory);
        }
        registry
    }

    /// Install a factory before the registry is put into use.
    pub fn register(
        &mut self,
        name: &'static str,
        factory: fn() -> Result<ComponentHandle>,
    ) -> Result<()> {
        if self.table.contains_key(name) {
            return Err(MediaError::BadParameter);
        }
        self.table.insert(name, factory);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.keys().copied()
    }

    /// Resolve `name`, construct the component (spawning its worker thread
    /// where the variant has one) and install the observer.
    pub fn get_handle(
        &self,
        name: &str,
        observer: Arc<dyn ComponentObserver>,
    ) -> Result<ComponentHandle> {
        let factory = self.table.get(name).ok_or(MediaError::ComponentNotFound)?;
        let handle = factory()?;
        handle.set_callbacks(observer);
        tracing::debug!(
            "[{}] created component {}",
            handle.instance_id(),
            handle.component_name()
        );
        Ok(handle)
    }

    /// Destroy a handle. Delegates to `deinit`, which refuses with
    /// `Unsupported` unless the component is `Loaded`; on refusal the
    /// instance is left fully intact.
    pub fn free_handle(&self, handle: &ComponentHandle) -> Result<()> {
        handle.deinit()?;
        tracing::debug!(
            "[{}] freed component {}",
            handle.instance_id(),
            handle.component_name()
        );
        Ok(())
    }

    /// Connect an output port to an input port, or tear a binding down.
    ///
    /// With both sides present the protocol is transactional over the pair:
    /// the output side records the input as its peer first, then the input
    /// side records the output; if the second call fails the first binding
    /// is rolled back. A one-sided `None` cancels the named side and, if its
    /// record still references a live peer, clears the mirrored record too,
    /// so an unbind always leaves both sides null. Both sides `None` is
    /// caller misuse.
    pub fn set_bind(
        &self,
        output: Option<(&ComponentHandle, u32)>,
        input: Option<(&ComponentHandle, u32)>,
    ) -> Result<()> {
        match (output, input) {
            (Some((out, out_port)), Some((inp, in_port))) => {
                out.bind_request(out_port, Some((Arc::clone(inp), in_port)))?;
                if let Err(err) = inp.bind_request(in_port, Some((Arc::clone(out), out_port))) {
                    let _ = out.bind_request(out_port, None);
                    return Err(err);
                }
                Ok(())
            }
            (Some((out, out_port)), None) => Self::unbind_side(out, out_port),
            (None, Some((inp, in_port))) => Self::unbind_side(inp, in_port),
            (None, None) => Err(MediaError::BadParameter),
        }
    }

    fn unbind_side(handle: &ComponentHandle, port: u32) -> Result<()> {
        let peer = match handle.get_parameter(ParamKind::Bind(port)) {
            Ok(Param::Bind { peer, .. }) => peer,
            _ => None,
        };
        handle.bind_request(port, None)?;
        if let Some((peer_handle, peer_port)) = peer {
            let _ = peer_handle.bind_request(peer_port, None);
        }
        Ok(())
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::NullObserver;

    #[test]
    fn unknown_name_is_a_lookup_miss() {
        let registry = ComponentRegistry::with_builtins();
        let err = registry
            .get_handle("NO_SUCH_COMPONENT", Arc::new(NullObserver))
            .unwrap_err();
        assert_eq!(err, MediaError::ComponentNotFound);
    }

    #[test]
    fn builtins_cover_the_wire_contract() {
        let registry = ComponentRegistry::with_builtins();
        for name in [
            "DEMUXER",
            "VDEC",
            "ADEC",
            "VIDEO_RENDER",
            "AUDIO_RENDER",
            "CLOCK",
            "VENC",
            "MUXER",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ComponentRegistry::with_builtins();
        let err = registry
            .register("CLOCK", || Err(MediaError::InsufficientResources))
            .unwrap_err();
        assert_eq!(err, MediaError::BadParameter);
    }
}
