//! The plugin's list of configured nodes.
//!
//! Indices are positions in the list, as shown by [`NodeRegistry::list`];
//! they shift when a node is removed.

use tracing::info;

use crate::error::RegistryError;
use crate::node::ManagedNode;
use crate::poll::SchedulerState;

#[derive(Default)]
pub struct NodeRegistry {
    nodes: Vec<Box<dyn ManagedNode>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&dyn ManagedNode, RegistryError> {
        self.nodes
            .get(index)
            .map(|node| node.as_ref())
            .ok_or(RegistryError::NoSuchNode(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ManagedNode> {
        self.nodes.iter().map(|node| node.as_ref())
    }

    /// Register a node and reconcile its timer.  Returns its index.
    pub fn add(&mut self, node: Box<dyn ManagedNode>) -> usize {
        node.update();
        info!(node = %node.id(), "node added: {}", node.short_description());
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Stop a node's timer and take it out of the list.
    pub fn remove(&mut self, index: usize) -> Result<Box<dyn ManagedNode>, RegistryError> {
        if index >= self.nodes.len() {
            return Err(RegistryError::NoSuchNode(index));
        }
        let node = self.nodes.remove(index);
        node.stop();
        info!(node = %node.id(), "node removed: {}", node.short_description());
        Ok(node)
    }

    pub fn enable(&self, index: usize) -> Result<SchedulerState, RegistryError> {
        self.switch(index, true)
    }

    pub fn disable(&self, index: usize) -> Result<SchedulerState, RegistryError> {
        self.switch(index, false)
    }

    fn switch(&self, index: usize, enabled: bool) -> Result<SchedulerState, RegistryError> {
        let node = self.get(index)?;
        node.set_enabled(enabled);
        Ok(node.update())
    }

    /// Run a node's cycle now, outside its schedule.
    pub fn force(&self, index: usize) -> Result<(), RegistryError> {
        self.get(index)?.force();
        Ok(())
    }

    /// Replay a node's backlog: reset, then force.
    pub fn test(&self, index: usize) -> Result<(), RegistryError> {
        let node = self.get(index)?;
        node.reset();
        node.force();
        Ok(())
    }

    pub fn swap(&mut self, a: usize, b: usize) -> Result<(), RegistryError> {
        for index in [a, b] {
            if index >= self.nodes.len() {
                return Err(RegistryError::NoSuchNode(index));
            }
        }
        self.nodes.swap(a, b);
        Ok(())
    }

    /// One line per node: `0: [*] Feed - http://example.com/rss (3600)`.
    pub fn list(&self) -> Vec<String> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| format!("{i}: {}", node.long_description()))
            .collect()
    }

    /// Disarm every timer, for plugin unload.
    pub fn stop_all(&self) {
        for node in &self.nodes {
            node.stop();
        }
    }
}

impl Drop for NodeRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
