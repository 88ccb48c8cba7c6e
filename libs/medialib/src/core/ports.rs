// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Weak;

use crate::core::component::{ComponentHandle, MediaComponent};
use crate::core::format::MediaFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// A component's attachment point for buffers. Created at construction,
/// format mutable only through parameter calls while the component is
/// `Loaded`.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDefinition {
    pub port_index: u32,
    pub direction: PortDirection,
    pub enabled: bool,
    pub format: MediaFormat,
}

impl PortDefinition {
    pub fn input(port_index: u32) -> Self {
        Self {
            port_index,
            direction: PortDirection::Input,
            enabled: true,
            format: MediaFormat::Unspecified,
        }
    }

    pub fn output(port_index: u32) -> Self {
        Self {
            port_index,
            direction: PortDirection::Output,
            enabled: true,
            format: MediaFormat::Unspecified,
        }
    }
}

/// One bind record per port. The peer reference is weak so a bound pair
/// never forms a strong `Arc` cycle; a dead peer reads as unbound.
pub struct BindRecord {
    pub port_index: u32,
    peer: Option<Weak<dyn MediaComponent>>,
    peer_port: u32,
}

impl BindRecord {
    pub fn new(port_index: u32) -> Self {
        Self {
            port_index,
            peer: None,
            peer_port: 0,
        }
    }

    pub fn bind(&mut self, peer: &ComponentHandle, peer_port: u32) {
        self.peer = Some(std::sync::Arc::downgrade(peer));
        self.peer_port = peer_port;
    }

    pub fn clear(&mut self) {
        self.peer = None;
        self.peer_port = 0;
    }

    pub fn is_bound(&self) -> bool {
        self.peer
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Upgrade the peer reference. `None` when unbound or the peer is gone.
    pub fn peer(&self) -> Option<(ComponentHandle, u32)> {
        let handle = self.peer.as_ref()?.upgrade()?;
        Some((handle, self.peer_port))
    }
}
