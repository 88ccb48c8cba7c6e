// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod buffer;
pub mod component;
pub mod components;
pub mod engine;
pub mod error;
pub mod events;
pub mod format;
pub mod messages;
pub mod params;
pub mod ports;
pub mod queue;
pub mod registry;
pub mod state;
pub mod time;

pub use buffer::*;
pub use component::*;
pub use error::*;
pub use events::*;
pub use format::*;
pub use messages::*;
pub use params::*;
pub use ports::*;
pub use queue::*;
pub use registry::*;
pub use state::*;
pub use time::*;
