// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Declarative pipeline description: a JSON file naming components and the
//! binds between them, validated before anything is instantiated.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use medialib::{ComponentHandle, ComponentObserver, ComponentRegistry, MediaError};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read graph file")]
    Io(#[from] std::io::Error),

    #[error("failed to parse graph file")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate component name {0:?}")]
    DuplicateName(String),

    #[error("unknown component kind {0:?}")]
    UnknownKind(String),

    #[error("bind references unknown component {0:?}")]
    UnknownNode(String),

    #[error("port {port} of {name:?} bound more than once")]
    DuplicatePort { name: String, port: u32 },

    #[error("pipeline graph contains a cycle")]
    Cycle,

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// One component instance to create: a unique label and a registry kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub name: String,
    pub kind: String,
}

/// One binding: `from`'s output port to `to`'s input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphBind {
    pub from: String,
    pub from_port: u32,
    pub to: String,
    pub to_port: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphFile {
    pub components: Vec<GraphNode>,
    pub binds: Vec<GraphBind>,
}

impl GraphFile {
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, GraphError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the description against the registry: names unique, kinds
    /// known, no port bound twice, no cycles.
    pub fn validate(&self, registry: &ComponentRegistry) -> Result<(), GraphError> {
        let mut names = HashSet::new();
        for node in &self.components {
            if !names.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateName(node.name.clone()));
            }
            if !registry.contains(&node.kind) {
                return Err(GraphError::UnknownKind(node.kind.clone()));
            }
        }

        let mut out_ports = HashSet::new();
        let mut in_ports = HashSet::new();
        for bind in &self.binds {
            for name in [&bind.from, &bind.to] {
                if !names.contains(name.as_str()) {
                    return Err(GraphError::UnknownNode(name.clone()));
                }
            }
            if !out_ports.insert((bind.from.as_str(), bind.from_port)) {
                return Err(GraphError::DuplicatePort {
                    name: bind.from.clone(),
                    port: bind.from_port,
                });
            }
            if !in_ports.insert((bind.to.as_str(), bind.to_port)) {
                return Err(GraphError::DuplicatePort {
                    name: bind.to.clone(),
                    port: bind.to_port,
                });
            }
        }

        self.sorted_indices().map(|_| ())
    }

    /// Component labels in sinks-first order, the order they should be set
    /// `Executing` so no data flows into a component that is not running.
    pub fn start_order(&self) -> Result<Vec<&str>, GraphError> {
        let (graph, indices) = self.build_graph();
        let mut order = toposort(&graph, None).map_err(|_| GraphError::Cycle)?;
        order.reverse();
        let by_index: HashMap<NodeIndex, &str> =
            indices.iter().map(|(name, idx)| (*idx, *name)).collect();
        Ok(order.into_iter().filter_map(|idx| by_index.get(&idx).copied()).collect())
    }

    /// Validate, create every component against the registry, and apply the
    /// binds. Returns the handles by label.
    pub fn instantiate(
        &self,
        registry: &ComponentRegistry,
        observer: Arc<dyn ComponentObserver>,
    ) -> Result<HashMap<String, ComponentHandle>, GraphError> {
        self.validate(registry)?;
        let mut handles = HashMap::new();
        for node in &self.components {
            let handle = registry.get_handle(&node.kind, observer.clone())?;
            handles.insert(node.name.clone(), handle);
        }
        for bind in &self.binds {
            let from = &handles[&bind.from];
            let to = &handles[&bind.to];
            registry.set_bind(Some((from, bind.from_port)), Some((to, bind.to_port)))?;
        }
        Ok(handles)
    }

    fn build_graph(&self) -> (DiGraph<(), ()>, HashMap<&str, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for node in &self.components {
            indices.insert(node.name.as_str(), graph.add_node(()));
        }
        for bind in &self.binds {
            if let (Some(&from), Some(&to)) = (
                indices.get(bind.from.as_str()),
                indices.get(bind.to.as_str()),
            ) {
                graph.add_edge(from, to, ());
            }
        }
        (graph, indices)
    }

    fn sorted_indices(&self) -> Result<Vec<NodeIndex>, GraphError> {
        let (graph, _) = self.build_graph();
        toposort(&graph, None).map_err(|_| GraphError::Cycle)
    }
}
