//! Path computation collaborator.
//!
//! Route selection lives outside the orchestrator. [`StaticPathComputer`]
//! serves routes configured up front and allocates the per-path resources
//! (cookie, meter, transit VLAN) the rules need.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use flowhs_types::{Cookie, MeterId, PathId, SwitchId, VlanId};
use log::debug;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Flow, FlowPath, PathSegment};

/// Error type for path computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathComputationError {
    #[error("No route from {src} to {dst}")]
    NoRoute { src: SwitchId, dst: SwitchId },

    #[error("Resource pool exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("Path computer unavailable: {0}")]
    Unavailable(String),
}

/// Result type for path computation.
pub type Result<T> = std::result::Result<T, PathComputationError>;

/// Produces a new path realizing a flow.
///
/// The returned path is in the `InProgress` status and carries freshly
/// allocated resources, distinct from any path currently installed.
pub trait PathComputer: Send + Sync {
    fn compute(&self, flow: &Flow) -> Result<FlowPath>;
}

/// Hands out cookies, meters and transit VLANs.
#[derive(Debug)]
struct ResourcePool {
    next_cookie: u64,
    next_meter: u32,
    next_transit_vlan: u16,
}

impl ResourcePool {
    const FIRST_TRANSIT_VLAN: u16 = 1000;
    const MAX_COOKIE_ID: u64 = 0x0000_0000_000F_FFFF;

    fn new() -> Self {
        Self {
            next_cookie: 1,
            next_meter: MeterId::MIN_FLOW_METER_ID,
            next_transit_vlan: Self::FIRST_TRANSIT_VLAN,
        }
    }

    fn cookie(&mut self) -> Result<Cookie> {
        if self.next_cookie > Self::MAX_COOKIE_ID {
            return Err(PathComputationError::ResourceExhausted("cookie"));
        }
        let cookie = Cookie::forward(self.next_cookie);
        self.next_cookie += 1;
        Ok(cookie)
    }

    fn meter(&mut self) -> Result<MeterId> {
        let meter = MeterId::new(self.next_meter)
            .map_err(|_| PathComputationError::ResourceExhausted("meter"))?;
        self.next_meter = self
            .next_meter
            .checked_add(1)
            .ok_or(PathComputationError::ResourceExhausted("meter"))?;
        Ok(meter)
    }

    fn transit_vlan(&mut self) -> Result<VlanId> {
        let vlan = VlanId::new(self.next_transit_vlan)
            .map_err(|_| PathComputationError::ResourceExhausted("transit vlan"))?;
        self.next_transit_vlan = if self.next_transit_vlan >= VlanId::MAX {
            Self::FIRST_TRANSIT_VLAN
        } else {
            self.next_transit_vlan + 1
        };
        Ok(vlan)
    }
}

/// Serves preconfigured routes keyed by (source switch, destination switch).
#[derive(Debug)]
pub struct StaticPathComputer {
    routes: RwLock<HashMap<(SwitchId, SwitchId), Vec<PathSegment>>>,
    pool: Mutex<ResourcePool>,
}

impl Default for StaticPathComputer {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticPathComputer {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            pool: Mutex::new(ResourcePool::new()),
        }
    }

    /// Registers (or replaces) the route between two switches.
    pub fn add_route(&self, src: SwitchId, dst: SwitchId, segments: Vec<PathSegment>) {
        match self.routes.write() {
            Ok(mut routes) => {
                routes.insert((src, dst), segments);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert((src, dst), segments);
            }
        }
    }

    fn route(&self, src: SwitchId, dst: SwitchId) -> Result<Vec<PathSegment>> {
        if src == dst {
            return Ok(Vec::new());
        }
        let routes = self
            .routes
            .read()
            .map_err(|e| PathComputationError::Unavailable(e.to_string()))?;
        routes
            .get(&(src, dst))
            .cloned()
            .ok_or(PathComputationError::NoRoute { src, dst })
    }
}

impl PathComputer for StaticPathComputer {
    fn compute(&self, flow: &Flow) -> Result<FlowPath> {
        let src = flow.source.switch_id;
        let dst = flow.destination.switch_id;
        let segments = self.route(src, dst)?;

        let mut pool = self
            .pool
            .lock()
            .map_err(|e| PathComputationError::Unavailable(e.to_string()))?;
        let cookie = pool.cookie()?;

        let mut path = FlowPath::new(
            PathId::for_flow(&flow.flow_id, Uuid::new_v4()),
            flow.flow_id.clone(),
            cookie,
            src,
            dst,
            segments,
        );
        if flow.bandwidth > 0 {
            path = path.with_meter(pool.meter()?);
        }
        if !path.is_one_switch() {
            path = path.with_transit_vlan(pool.transit_vlan()?);
        }

        debug!(
            "Computed path {} for flow {} over {} segment(s), cookie {}",
            path.path_id,
            flow.flow_id,
            path.segments().len(),
            path.cookie
        );
        Ok(path)
    }
}
