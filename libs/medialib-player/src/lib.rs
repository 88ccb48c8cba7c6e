// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Playback and recording facades over the component pipeline, plus a
//! declarative JSON pipeline description.

pub mod graph;
pub mod player;
pub mod recorder;

pub use graph::{GraphBind, GraphError, GraphFile, GraphNode};
pub use player::{Player, PlayerError, PlayerEvent};
pub use recorder::{Recorder, RecorderConfig, RecorderError, RecorderEvent};
