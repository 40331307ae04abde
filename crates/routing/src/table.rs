//! Routing table with metric-based selection and independent expiry.

use serde::{Deserialize, Serialize};
use sovra_core::{time::now_ms, EventBus, NodeEvent};
use std::collections::{HashMap, HashSet};

/// Route entry lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteState {
    Active,
    Expired,
}

/// One known path toward a destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination: String,
    pub next_hop: String,
    /// Lower is preferred
    pub metric: u32,
    /// Ordered hop list from this node to the destination, inclusive
    pub path: Vec<String>,
    pub state: RouteState,
    pub created_at: u64,
    pub expires_at: u64,
    pub last_used: u64,
}

/// Outcome of a route insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteUpdate {
    Added,
    /// Existing entry replaced by a strictly better metric
    Replaced,
    /// Existing entry kept; new route was not strictly better
    Ignored,
}

/// Table of known next-hops, owned by the routing fabric.
#[derive(Debug)]
pub struct RoutingTable {
    routes: HashMap<String, RouteEntry>,
    lifetime_ms: u64,
    bus: EventBus,
}

impl RoutingTable {
    pub fn new(lifetime_ms: u64, bus: EventBus) -> Self {
        Self {
            routes: HashMap::new(),
            lifetime_ms,
            bus,
        }
    }

    /// Insert a route. An existing live entry is kept unless the new metric
    /// is strictly lower, which prevents metric flapping from cheap
    /// replacement.
    pub fn add_route(
        &mut self,
        destination: impl Into<String>,
        next_hop: impl Into<String>,
        metric: u32,
        path: Vec<String>,
    ) -> RouteUpdate {
        let destination = destination.into();
        let next_hop = next_hop.into();
        let now = now_ms();

        let outcome = match self.routes.get(&destination) {
            Some(existing) if existing.expires_at > now && metric >= existing.metric => {
                return RouteUpdate::Ignored;
            }
            Some(_) => RouteUpdate::Replaced,
            None => RouteUpdate::Added,
        };

        self.routes.insert(
            destination.clone(),
            RouteEntry {
                destination: destination.clone(),
                next_hop: next_hop.clone(),
                metric,
                path,
                state: RouteState::Active,
                created_at: now,
                expires_at: now + self.lifetime_ms,
                last_used: now,
            },
        );

        self.bus.emit(NodeEvent::RouteAdded {
            destination,
            next_hop,
            metric,
        });
        outcome
    }

    /// Look up a route. Expired entries are treated as absent and removed
    /// lazily.
    pub fn get_route(&mut self, destination: &str) -> Option<&RouteEntry> {
        let now = now_ms();
        if let Some(entry) = self.routes.get(destination) {
            if entry.expires_at <= now {
                self.routes.remove(destination);
                self.bus.emit(NodeEvent::RouteRemoved {
                    destination: destination.to_string(),
                });
                return None;
            }
        }
        if let Some(entry) = self.routes.get_mut(destination) {
            entry.last_used = now;
            return Some(entry);
        }
        None
    }

    pub fn remove_route(&mut self, destination: &str) -> Option<RouteEntry> {
        let removed = self.routes.remove(destination);
        if removed.is_some() {
            self.bus.emit(NodeEvent::RouteRemoved {
                destination: destination.to_string(),
            });
        }
        removed
    }

    /// Periodic sweep removing expired entries.
    pub fn prune_expired(&mut self) -> usize {
        let now = now_ms();
        let expired: Vec<String> = self
            .routes
            .values()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.destination.clone())
            .collect();
        for destination in &expired {
            self.routes.remove(destination);
            self.bus.emit(NodeEvent::RouteRemoved {
                destination: destination.clone(),
            });
        }
        expired.len()
    }

    /// Best-effort depth-first search over recorded paths when no direct
    /// entry exists.
    ///
    /// Walks the hop graph implied by every live entry's path, tracking
    /// visited nodes to avoid cycles. This is a fallback, not a
    /// shortest-path algorithm, and is expected to be slow on large tables.
    pub fn find_path(&self, destination: &str) -> Option<Vec<String>> {
        let now = now_ms();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut roots: Vec<&str> = Vec::new();

        for entry in self.routes.values().filter(|e| e.expires_at > now) {
            if entry.path.is_empty() {
                continue;
            }
            roots.push(&entry.path[0]);
            for pair in entry.path.windows(2) {
                adjacency
                    .entry(pair[0].as_str())
                    .or_default()
                    .push(pair[1].as_str());
            }
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<Vec<&str>> = roots.into_iter().map(|root| vec![root]).collect();

        while let Some(path) = stack.pop() {
            let last = *path.last()?;
            if last == destination {
                return Some(path.into_iter().map(String::from).collect());
            }
            if !visited.insert(last) {
                continue;
            }
            if let Some(neighbors) = adjacency.get(last) {
                for &next in neighbors {
                    let mut extended = path.clone();
                    extended.push(next);
                    stack.push(extended);
                }
            }
        }

        None
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}
