//! Repository access to flows, paths and switches.

use std::collections::HashMap;
use std::sync::RwLock;

use flowhs_types::{FlowId, PathId, SwitchId};
use log::debug;
use thiserror::Error;

use crate::model::{Flow, FlowPath, Switch};

/// Error type for repository operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("Flow not found: {0}")]
    FlowNotFound(FlowId),

    #[error("Flow path not found: {0}")]
    PathNotFound(PathId),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Load and store access used by the flow operation saga.
///
/// `find_*` return `Ok(None)` for a missing entity; errors are reserved for
/// the repository itself failing.
pub trait FlowRepository: Send + Sync {
    fn find_flow(&self, flow_id: &FlowId) -> Result<Option<Flow>>;

    fn save_flow(&self, flow: Flow) -> Result<()>;

    fn remove_flow(&self, flow_id: &FlowId) -> Result<()>;

    fn find_path(&self, path_id: &PathId) -> Result<Option<FlowPath>>;

    fn save_path(&self, path: FlowPath) -> Result<()>;

    fn remove_path(&self, path_id: &PathId) -> Result<()>;

    fn find_switch(&self, switch_id: &SwitchId) -> Result<Option<Switch>>;

    fn save_switch(&self, switch: Switch) -> Result<()>;
}

#[derive(Debug, Default)]
struct Tables {
    flows: HashMap<FlowId, Flow>,
    paths: HashMap<PathId, FlowPath>,
    switches: HashMap<SwitchId, Switch>,
}

/// Repository backed by in-process hash maps.
#[derive(Debug, Default)]
pub struct InMemoryFlowRepository {
    tables: RwLock<Tables>,
}

impl InMemoryFlowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        self.tables
            .read()
            .map(|tables| f(&tables))
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T> {
        self.tables
            .write()
            .map(|mut tables| f(&mut tables))
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))
    }

    /// Returns every stored path belonging to a flow.
    pub fn paths_of(&self, flow_id: &FlowId) -> Result<Vec<FlowPath>> {
        self.read(|t| {
            t.paths
                .values()
                .filter(|p| &p.flow_id == flow_id)
                .cloned()
                .collect()
        })
    }
}

impl FlowRepository for InMemoryFlowRepository {
    fn find_flow(&self, flow_id: &FlowId) -> Result<Option<Flow>> {
        self.read(|t| t.flows.get(flow_id).cloned())
    }

    fn save_flow(&self, flow: Flow) -> Result<()> {
        debug!("Saving flow {} with status {:?}", flow.flow_id, flow.status);
        self.write(|t| {
            t.flows.insert(flow.flow_id.clone(), flow);
        })
    }

    fn remove_flow(&self, flow_id: &FlowId) -> Result<()> {
        self.write(|t| t.flows.remove(flow_id))?
            .map(|_| ())
            .ok_or_else(|| PersistenceError::FlowNotFound(flow_id.clone()))
    }

    fn find_path(&self, path_id: &PathId) -> Result<Option<FlowPath>> {
        self.read(|t| t.paths.get(path_id).cloned())
    }

    fn save_path(&self, path: FlowPath) -> Result<()> {
        debug!("Saving path {} with status {:?}", path.path_id, path.status);
        self.write(|t| {
            t.paths.insert(path.path_id.clone(), path);
        })
    }

    fn remove_path(&self, path_id: &PathId) -> Result<()> {
        self.write(|t| t.paths.remove(path_id))?
            .map(|_| ())
            .ok_or_else(|| PersistenceError::PathNotFound(path_id.clone()))
    }

    fn find_switch(&self, switch_id: &SwitchId) -> Result<Option<Switch>> {
        self.read(|t| t.switches.get(switch_id).cloned())
    }

    fn save_switch(&self, switch: Switch) -> Result<()> {
        self.write(|t| {
            t.switches.insert(switch.switch_id, switch);
        })
    }
}
